use crate::Error;
use crate::ast::{Builtin, NativeFn, Value};
use crate::evaluator::Arity;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// A scope frame of name bindings with an optional parent frame.
///
/// Frames are shared through `Rc`: a child frame keeps its parent alive, and so does every
/// closure created while the frame was current. Storing a value in a frame roots it in the
/// unrooted registry; when the frame goes away, bindings that are still held elsewhere are
/// registered as unrooted again.
pub struct Environment {
    bindings: RefCell<HashMap<String, Value>>,
    parent: Option<Rc<Environment>>,
}

impl Environment {
    /// Create a frame without a parent (a global scope)
    pub fn new() -> Rc<Self> {
        Rc::new(Environment {
            bindings: RefCell::new(HashMap::new()),
            parent: None,
        })
    }

    pub fn with_parent(parent: Rc<Environment>) -> Rc<Self> {
        Rc::new(Environment {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(parent),
        })
    }

    pub fn parent(&self) -> Option<&Rc<Environment>> {
        self.parent.as_ref()
    }

    /// Bind `name` in this frame only, replacing any existing binding here
    pub fn define(&self, name: &str, value: Value) {
        value.root();
        let replaced = self.bindings.borrow_mut().insert(name.to_owned(), value);
        if let Some(old) = replaced {
            release_binding(name, old);
        }
    }

    /// Rebind `name` in the nearest frame that binds it, or define it here if none does
    pub fn set(&self, name: &str, value: Value) {
        let mut frame = self;
        loop {
            if frame.bindings.borrow().contains_key(name) {
                frame.define(name, value);
                return;
            }
            match &frame.parent {
                Some(parent) => frame = &**parent,
                None => break,
            }
        }
        self.define(name, value);
    }

    /// Look up `name` from this frame outwards
    pub fn resolve(&self, name: &str) -> Result<Value, Error> {
        let mut frame = self;
        loop {
            if let Some(value) = frame.bindings.borrow().get(name) {
                return Ok(value.clone());
            }
            match &frame.parent {
                Some(parent) => frame = &**parent,
                None => return Err(Error::UnboundName(name.to_owned())),
            }
        }
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.resolve(name).is_ok()
    }

    /// Bindings of this frame alone, sorted by name
    pub fn local_bindings(&self) -> Vec<(String, Value)> {
        let mut result: Vec<_> = self
            .bindings
            .borrow()
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }

    /// Get all bindings visible from this frame, inner bindings shadowing outer ones.
    /// Returns a Vec of (name, value) pairs sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut bindings = HashMap::new();
        for frame in self.frames() {
            for (name, value) in frame.bindings.borrow().iter() {
                bindings
                    .entry(name.clone())
                    .or_insert_with(|| value.clone());
            }
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }

    /// This frame followed by its ancestors, innermost first
    pub fn frames(&self) -> impl Iterator<Item = &Environment> {
        std::iter::successors(Some(self), |frame| frame.parent.as_deref())
    }

    /// Number of frames from this one up to the global scope, inclusive
    pub fn depth(&self) -> usize {
        self.frames().count()
    }

    /// Register a native procedure that receives evaluated arguments.
    ///
    /// # Example
    /// ```
    /// use rcscheme::evaluator::{Arity, Environment, create_global_env};
    /// use rcscheme::ast::{EvalResult, Value};
    /// use std::rc::Rc;
    ///
    /// fn answer(_args: Value, _env: &Rc<Environment>) -> EvalResult {
    ///     Ok(Value::from(42))
    /// }
    ///
    /// let env = create_global_env();
    /// env.register_builtin("answer", Arity::Exact(0), answer);
    /// // Now (answer) can be called from evaluated expressions
    /// ```
    pub fn register_builtin(&self, name: &'static str, arity: Arity, func: NativeFn) {
        self.define(name, Value::Builtin(Builtin { name, arity, func }));
    }

    /// Register a native procedure that receives its operand expressions unevaluated
    pub fn register_special_form(&self, name: &'static str, arity: Arity, func: NativeFn) {
        self.define(name, Value::BuiltinSpecialForm(Builtin { name, arity, func }));
    }
}

/// Drop a binding's value, re-registering it as unrooted if it lives on elsewhere
fn release_binding(name: &str, value: Value) {
    if value.is_shared() {
        tracing::trace!(name, kind = value.type_name(), "binding released while still held");
        value.unroot();
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        for (name, value) in self.bindings.get_mut().drain() {
            release_binding(&name, value);
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.bindings.borrow().keys().cloned().collect();
        names.sort();
        f.debug_struct("Environment")
            .field("bindings", &names)
            .field("depth", &self.depth())
            .finish()
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::val;
    use crate::memory::unrooted_count;
    use proptest::prelude::*;

    #[test]
    fn test_define_and_resolve() {
        let env = Environment::new();
        env.define("x", val(1));
        assert_eq!(env.resolve("x").unwrap(), val(1));

        env.define("x", val(2));
        assert_eq!(env.resolve("x").unwrap(), val(2));
        assert_eq!(env.local_bindings().len(), 1);

        match env.resolve("missing") {
            Err(Error::UnboundName(name)) => assert_eq!(name, "missing"),
            other => panic!("expected UnboundName, got {other:?}"),
        }
        assert!(env.is_bound("x"));
        assert!(!env.is_bound("missing"));
    }

    #[test]
    fn test_shadowing_and_discarded_frame() {
        let outer = Environment::new();
        outer.define("x", val("outer"));

        let inner = Environment::with_parent(outer.clone());
        inner.define("x", val("inner"));
        inner.define("y", val(5));

        assert_eq!(inner.resolve("x").unwrap(), val("inner"));
        assert_eq!(inner.resolve("y").unwrap(), val(5));
        assert!(outer.resolve("y").is_err());
        assert_eq!(inner.depth(), 2);

        drop(inner);
        assert_eq!(outer.resolve("x").unwrap(), val("outer"));
        assert_eq!(Rc::strong_count(&outer), 1);
    }

    #[test]
    fn test_set_rebinds_at_holder() {
        let global = Environment::new();
        global.define("counter", val(0));

        let middle = Environment::with_parent(global.clone());
        let inner = Environment::with_parent(middle.clone());

        inner.set("counter", val(1));
        assert_eq!(global.resolve("counter").unwrap(), val(1));
        assert!(inner.local_bindings().is_empty());
        assert!(middle.local_bindings().is_empty());

        // Unknown names are created in the frame where set! ran
        inner.set("fresh", val(true));
        assert_eq!(inner.resolve("fresh").unwrap(), val(true));
        assert!(global.resolve("fresh").is_err());
    }

    #[test]
    fn test_get_all_bindings_shadowing() {
        let global = Environment::new();
        global.define("a", val(1));
        global.define("b", val(2));
        let local = Environment::with_parent(global);
        local.define("b", val(20));
        local.define("c", val(30));

        let all = local.get_all_bindings();
        let names: Vec<_> = all.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(all[1].1, val(20));
    }

    #[test]
    fn test_binding_roots_value() {
        let baseline = unrooted_count();
        let env = Environment::new();
        env.define("xs", val([1, 2]));
        // Only the head pair is rooted; the rest of the chain stays registered
        assert_eq!(unrooted_count(), baseline + 1);
        drop(env);
        assert_eq!(unrooted_count(), baseline);
    }

    #[test]
    fn test_frame_drop_relinks_shared_values() {
        let baseline = unrooted_count();
        let list = val([1]);
        let env = Environment::new();
        env.define("xs", list.clone());
        assert_eq!(unrooted_count(), baseline);

        drop(env);
        // Still held by `list`, so it is an orphan again
        assert_eq!(unrooted_count(), baseline + 1);
        drop(list);
        assert_eq!(unrooted_count(), baseline);
    }

    #[test]
    fn test_replacing_shared_binding_relinks() {
        let baseline = unrooted_count();
        let env = Environment::new();
        let kept = val([1]);
        env.define("x", kept.clone());
        env.define("x", val(2));
        assert_eq!(unrooted_count(), baseline + 1);
        drop(kept);
        assert_eq!(unrooted_count(), baseline);
    }

    fn answer(_args: Value, _env: &Rc<Environment>) -> crate::ast::EvalResult {
        Ok(val(42))
    }

    #[test]
    fn test_register_natives() {
        let env = Environment::new();
        env.register_builtin("answer", Arity::Exact(0), answer);
        env.register_special_form("answer-form", Arity::Any, answer);
        assert!(matches!(env.resolve("answer").unwrap(), Value::Builtin(b) if b.name == "answer"));
        assert!(matches!(
            env.resolve("answer-form").unwrap(),
            Value::BuiltinSpecialForm(_)
        ));
    }

    proptest! {
        #[test]
        fn prop_inner_binding_wins(outer in any::<i32>(), inner in any::<i32>(), name in "[a-z]{1,8}") {
            let global = Environment::new();
            global.define(&name, val(outer));
            let frame = Environment::with_parent(global.clone());
            frame.define(&name, val(inner));
            prop_assert_eq!(frame.resolve(&name).unwrap(), val(inner));
            drop(frame);
            prop_assert_eq!(global.resolve(&name).unwrap(), val(outer));
        }
    }
}
