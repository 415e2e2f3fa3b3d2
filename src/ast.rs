//! This module defines the core value type of the interpreter. [`Value`] is a closed tagged
//! union covering data (numbers, atoms, strings, booleans, lists), procedures (user-defined
//! functions and macros, native builtins and special forms) and exceptions.
//!
//! Lists are chains of shared [`Pair`] nodes terminated by `Null`. A pair's tail is always
//! list-shaped: [`Value::cons`] wraps any other tail in a singleton list, so improper lists
//! cannot be built. Cloning a `Value` shares its heap nodes; nothing is deep-copied.
//!
//! Ergonomic helper functions such as [`val`], [`sym`] and [`nil`] are provided for
//! convenient construction in tests, along with `From` conversions for common Rust types.

use crate::Error;
use crate::evaluator::{Arity, Environment};
use crate::memory::Tracked;
use crate::number::{IntType, Number};
use std::fmt;
use std::rc::Rc;

/// Result of evaluating an expression; the error side is an in-flight exception
pub type EvalResult = Result<Value, Exception>;

/// Native procedure signature: an owned argument list and the calling environment
pub type NativeFn = fn(Value, &Rc<Environment>) -> EvalResult;

/// Core value type in interpreter
///
/// To build values in tests, use the helper functions:
/// - `val(42)` for values, `sym("name")` for atoms, `nil()` for the empty list
/// - `val([1, 2, 3])` for homogeneous lists
/// - `val(vec![sym("op"), val(42)])` for mixed lists
#[derive(Clone, Default)]
pub enum Value {
    /// The empty list
    #[default]
    Null,
    /// Symbols, compared by content
    Atom(Rc<str>),
    Number(Number),
    /// A list node; the tail is always `Null` or another `Pair`
    Pair(Rc<Pair>),
    String(Rc<str>),
    Boolean(bool),
    /// User-defined procedure receiving evaluated arguments
    Function(Rc<Lambda>),
    /// User-defined procedure receiving its operand expressions unevaluated
    Macro(Rc<Lambda>),
    /// Native procedure receiving evaluated arguments
    Builtin(Builtin),
    /// Native procedure receiving its operand expressions unevaluated
    BuiltinSpecialForm(Builtin),
    /// An in-flight error
    Exception(Exception),
    /// An error that has been delivered to a `try` handler
    BoundException(Exception),
}

/// A list node
pub struct Pair {
    head: Value,
    tail: Value,
    node: Tracked,
}

impl Pair {
    pub fn head(&self) -> &Value {
        &self.head
    }

    pub fn tail(&self) -> &Value {
        &self.tail
    }
}

impl Drop for Pair {
    fn drop(&mut self) {
        // Unlink uniquely owned tails one by one so long lists don't recurse
        let mut next = std::mem::take(&mut self.tail);
        loop {
            let Value::Pair(rc) = next else { break };
            match Rc::try_unwrap(rc) {
                Ok(mut pair) => next = std::mem::take(&mut pair.tail),
                Err(_) => break,
            }
        }
    }
}

/// A closure: formal parameters, body and the environment captured at creation
pub struct Lambda {
    pub(crate) params: Value,
    pub(crate) body: Value,
    pub(crate) env: Rc<Environment>,
    pub(crate) arity: Arity,
    node: Tracked,
}

impl Lambda {
    pub(crate) fn new(params: Value, body: Value, env: Rc<Environment>, arity: Arity) -> Rc<Self> {
        Rc::new(Lambda {
            params,
            body,
            env,
            arity,
            node: Tracked::new("closure"),
        })
    }

    pub fn params(&self) -> &Value {
        &self.params
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn env(&self) -> &Rc<Environment> {
        &self.env
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }
}

/// A native procedure or special form
#[derive(Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub arity: Arity,
    pub func: NativeFn,
}

/// Shared exception payload.
///
/// Re-tagging between `Value::Exception` and `Value::BoundException` shares the same
/// payload; the payload itself is never mutated.
#[derive(Clone)]
pub struct Exception(Rc<ExceptionData>);

struct ExceptionData {
    error: Error,
    node: Tracked,
}

impl Exception {
    pub fn new(error: Error) -> Self {
        Exception(Rc::new(ExceptionData {
            error,
            node: Tracked::new("exception"),
        }))
    }

    pub fn error(&self) -> &Error {
        &self.0.error
    }

    pub fn message(&self) -> String {
        self.0.error.to_string()
    }

    pub fn shares_payload(&self, other: &Exception) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl From<Error> for Exception {
    fn from(error: Error) -> Self {
        Exception::new(error)
    }
}

impl fmt::Debug for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Exception({:?})", self.0.error)
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.error)
    }
}

impl PartialEq for Exception {
    fn eq(&self, other: &Self) -> bool {
        self.shares_payload(other) || self.message() == other.message()
    }
}

/// Iterator over the elements of a list value
pub struct ListIter<'a> {
    current: &'a Value,
}

impl<'a> Iterator for ListIter<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<&'a Value> {
        match self.current {
            Value::Pair(pair) => {
                self.current = &pair.tail;
                Some(&pair.head)
            }
            _ => None,
        }
    }
}

impl Value {
    /// Build a pair. A tail that is not list-shaped is wrapped in a singleton list.
    pub fn cons(head: Value, tail: Value) -> Value {
        let tail = if tail.is_list() {
            tail
        } else {
            Value::cons(tail, Value::Null)
        };
        Value::Pair(Rc::new(Pair {
            head,
            tail,
            node: Tracked::new("pair"),
        }))
    }

    /// Build a proper list from its elements
    pub fn list(items: Vec<Value>) -> Value {
        items
            .into_iter()
            .rev()
            .fold(Value::Null, |tail, head| Value::cons(head, tail))
    }

    pub fn atom(name: &str) -> Value {
        Value::Atom(Rc::from(name))
    }

    pub fn string(s: &str) -> Value {
        Value::String(Rc::from(s))
    }

    /// Iterate over list elements; non-list values yield nothing
    pub fn iter(&self) -> ListIter<'_> {
        ListIter { current: self }
    }

    /// Clone list elements into a vector, for slice-pattern matching
    pub fn to_vec(&self) -> Vec<Value> {
        self.iter().cloned().collect()
    }

    pub fn list_len(&self) -> usize {
        self.iter().count()
    }

    pub fn head(&self) -> Option<&Value> {
        match self {
            Value::Pair(pair) => Some(&pair.head),
            _ => None,
        }
    }

    pub fn tail(&self) -> Option<&Value> {
        match self {
            Value::Pair(pair) => Some(&pair.tail),
            _ => None,
        }
    }

    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Value::Atom(name) => Some(name.as_ref()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// `Null` or a `Pair`
    pub fn is_list(&self) -> bool {
        matches!(self, Value::Null | Value::Pair(_))
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Function(_) | Value::Macro(_) | Value::Builtin(_) | Value::BuiltinSpecialForm(_)
        )
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Atom(_) => "atom",
            Value::Number(_) => "number",
            Value::Pair(_) => "pair",
            Value::String(_) => "string",
            Value::Boolean(_) => "boolean",
            Value::Function(_) => "function",
            Value::Macro(_) => "macro",
            Value::Builtin(_) => "builtin",
            Value::BuiltinSpecialForm(_) => "special-form",
            Value::Exception(_) => "exception",
            Value::BoundException(_) => "bound-exception",
        }
    }

    fn node(&self) -> Option<&Tracked> {
        match self {
            Value::Pair(pair) => Some(&pair.node),
            Value::Function(lambda) | Value::Macro(lambda) => Some(&lambda.node),
            Value::Exception(e) | Value::BoundException(e) => Some(&e.0.node),
            _ => None,
        }
    }

    /// Remove this value's heap node from the unrooted registry
    pub(crate) fn root(&self) {
        if let Some(node) = self.node() {
            node.root();
        }
    }

    /// Put this value's heap node back into the unrooted registry
    pub(crate) fn unroot(&self) {
        if let Some(node) = self.node() {
            node.unroot();
        }
    }

    /// True when some holder other than this handle keeps the heap node alive
    pub(crate) fn is_shared(&self) -> bool {
        match self {
            Value::Pair(pair) => Rc::strong_count(pair) > 1,
            Value::Function(lambda) | Value::Macro(lambda) => Rc::strong_count(lambda) > 1,
            Value::Exception(e) | Value::BoundException(e) => Rc::strong_count(&e.0) > 1,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Atom(s) => write!(f, "Atom({s})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Pair(_) => {
                write!(f, "List(")?;
                for (i, v) in self.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v:?}")?;
                }
                write!(f, ")")
            }
            Value::String(s) => write!(f, "String(\"{s}\")"),
            Value::Boolean(b) => write!(f, "Boolean({b})"),
            Value::Function(l) => write!(f, "Function(params={:?}, body={:?})", l.params, l.body),
            Value::Macro(l) => write!(f, "Macro(params={:?}, body={:?})", l.params, l.body),
            Value::Builtin(b) => write!(f, "Builtin({})", b.name),
            Value::BuiltinSpecialForm(b) => write!(f, "BuiltinSpecialForm({})", b.name),
            Value::Exception(e) => write!(f, "{e:?}"),
            Value::BoundException(e) => write!(f, "Bound{e:?}"),
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Number(Number::Float(f))
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Number(Number::Int(IntType::from(n)))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(IntType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::list(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::list(arr.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value> + Clone> From<&[T]> for Value {
    fn from(slice: &[T]) -> Self {
        Value::list(slice.iter().cloned().map(Into::into).collect())
    }
}

impl TryFrom<&Value> for Number {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Number, Error> {
        match value {
            Value::Number(n) => Ok(*n),
            other => Err(Error::type_mismatch(format!(
                "expected number, got {}",
                other.type_name()
            ))),
        }
    }
}

/// Helper function for creating atoms - works great in mixed lists!
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::atom(name.as_ref())
}

/// Helper function for creating Values from anything convertible
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for the empty list
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn nil() -> Value {
    Value::Null
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "()"),
            Value::Atom(s) => write!(f, "{s}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Pair(_) => {
                write!(f, "(")?;
                for (i, elem) in self.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, ")")
            }
            Value::String(s) => {
                write!(f, "\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
            Value::Boolean(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Value::Function(l) => write!(f, "(lambda {} {})", l.params, l.body),
            Value::Macro(l) => write!(f, "(macro {} {})", l.params, l.body),
            Value::Builtin(b) => write!(f, "#<builtin {}>", b.name),
            Value::BuiltinSpecialForm(b) => write!(f, "#<special-form {}>", b.name),
            Value::Exception(e) | Value::BoundException(e) => write!(f, "exception: {e}"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Atom(a), Value::Atom(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Pair(a), Value::Pair(b)) => {
                // Walk tails iteratively; only heads recurse
                let (mut a, mut b) = (a, b);
                loop {
                    if Rc::ptr_eq(a, b) {
                        return true;
                    }
                    if a.head != b.head {
                        return false;
                    }
                    match (&a.tail, &b.tail) {
                        (Value::Pair(next_a), Value::Pair(next_b)) => {
                            a = next_a;
                            b = next_b;
                        }
                        (tail_a, tail_b) => return tail_a == tail_b,
                    }
                }
            }
            (Value::Function(a), Value::Function(b)) | (Value::Macro(a), Value::Macro(b)) => {
                Rc::ptr_eq(a, b)
                    || (a.params == b.params && a.body == b.body && Rc::ptr_eq(&a.env, &b.env))
            }
            (Value::Builtin(a), Value::Builtin(b))
            | (Value::BuiltinSpecialForm(a), Value::BuiltinSpecialForm(b)) => a.name == b.name,
            (Value::Exception(a), Value::Exception(b))
            | (Value::BoundException(a), Value::BoundException(b)) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod helper_function_tests {
    use super::*;
    use crate::memory::unrooted_count;

    #[test]
    fn test_helper_functions_data_driven() {
        let test_cases = vec![
            (val(42), Value::Number(Number::Int(42))),
            (val(-17), Value::Number(Number::Int(-17))),
            (val(255u8), Value::Number(Number::Int(255))),
            (val(-32768i16), Value::Number(Number::Int(-32768))),
            (val(IntType::MAX), Value::Number(Number::Int(IntType::MAX))),
            (val(2.5), Value::Number(Number::Float(2.5))),
            // Numeric equality crosses representations
            (val(2.0), val(2)),
            (val(true), Value::Boolean(true)),
            (val("hello"), Value::string("hello")),
            (val(String::from("owned")), Value::string("owned")),
            (sym("foo-bar?"), Value::atom("foo-bar?")),
            (sym(String::from("&rest")), Value::atom("&rest")),
            (nil(), Value::Null),
            (
                val([1, 2, 3]),
                Value::cons(val(1), Value::cons(val(2), Value::cons(val(3), Value::Null))),
            ),
            (
                val(vec![sym("op"), val(42), val("s"), val(false)]),
                Value::list(vec![
                    Value::atom("op"),
                    val(42),
                    Value::string("s"),
                    Value::Boolean(false),
                ]),
            ),
            (val([val([1]), nil()]), Value::list(vec![val([1]), Value::Null])),
        ];

        for (i, (actual, expected)) in test_cases.iter().enumerate() {
            assert_eq!(
                actual,
                expected,
                "Test case {} failed:\n  Expected: {:?}\n  Got: {:?}",
                i + 1,
                expected,
                actual
            );
        }
    }

    #[test]
    fn test_inequality() {
        let cases = vec![
            (val(1), val("1")),
            (val([1, 2]), val([1, 2, 3])),
            (val([1, 2, 3]), val([1, 2])),
            (sym("a"), val("a")),
            (nil(), val(false)),
            (val([1, 2]), val([1, 3])),
        ];
        for (a, b) in cases {
            assert_ne!(a, b);
        }
    }

    #[test]
    fn test_cons_wraps_non_list_tail() {
        let pair = Value::cons(val(1), val(2));
        assert_eq!(pair, val([1, 2]));
        assert!(pair.tail().unwrap().is_list());

        let onto_list = Value::cons(val(0), val([1, 2]));
        assert_eq!(onto_list, val([0, 1, 2]));

        let onto_null = Value::cons(val(1), Value::Null);
        assert_eq!(onto_null.list_len(), 1);
    }

    #[test]
    fn test_list_accessors() {
        let list = val(vec![sym("a"), val(2), val("c")]);
        assert_eq!(list.list_len(), 3);
        assert_eq!(list.head(), Some(&sym("a")));
        assert_eq!(list.tail().unwrap(), &val(vec![val(2), val("c")]));
        assert_eq!(list.to_vec(), vec![sym("a"), val(2), val("c")]);
        assert_eq!(val(5).iter().count(), 0);
        assert!(val(5).head().is_none());
        assert_eq!(sym("x").as_atom(), Some("x"));
    }

    #[test]
    fn test_display() {
        let cases = vec![
            (nil(), "()"),
            (val(42), "42"),
            (val(0.5), "0.5"),
            (val(true), "#t"),
            (val(false), "#f"),
            (sym("hello"), "hello"),
            (val("say \"hi\"\n"), "\"say \\\"hi\\\"\\n\""),
            (val("tab\there"), "\"tab\\there\""),
            (val("back\\slash"), "\"back\\\\slash\""),
            (val(vec![sym("+"), val(1), val([2, 3])]), "(+ 1 (2 3))"),
            (val(vec![nil(), nil()]), "(() ())"),
            (
                Value::Exception(Error::Raised("boom".into()).into()),
                "exception: boom",
            ),
        ];
        for (value, expected) in cases {
            assert_eq!(value.to_string(), expected);
        }
    }

    #[test]
    fn test_type_names() {
        let err = Exception::new(Error::Raised("x".into()));
        let cases = vec![
            (nil(), "null"),
            (sym("a"), "atom"),
            (val(1), "number"),
            (val([1]), "pair"),
            (val("s"), "string"),
            (val(true), "boolean"),
            (Value::Exception(err.clone()), "exception"),
            (Value::BoundException(err), "bound-exception"),
        ];
        for (value, expected) in cases {
            assert_eq!(value.type_name(), expected);
            assert!(!value.is_callable());
        }
    }

    #[test]
    fn test_exception_equality_by_message() {
        let a = Exception::new(Error::Raised("same".into()));
        let b = Exception::new(Error::Raised("same".into()));
        let c = Exception::new(Error::Raised("other".into()));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.shares_payload(&b));
        assert!(a.shares_payload(&a.clone()));
        assert_ne!(Value::Exception(a.clone()), Value::BoundException(a));
    }

    #[test]
    fn test_sharing_does_not_copy() {
        let list = val([1, 2, 3]);
        let alias = list.clone();
        assert!(list.is_shared());
        match (&list, &alias) {
            (Value::Pair(a), Value::Pair(b)) => assert!(Rc::ptr_eq(a, b)),
            _ => panic!("expected pairs"),
        }
        drop(alias);
        assert!(!list.is_shared());
        assert!(!val(1).is_shared());
    }

    #[test]
    fn test_pairs_register_until_freed() {
        let baseline = unrooted_count();
        let list = val([1, 2, 3]);
        assert_eq!(unrooted_count(), baseline + 3);

        list.root();
        assert_eq!(unrooted_count(), baseline + 2);
        list.unroot();
        assert_eq!(unrooted_count(), baseline + 3);

        drop(list);
        assert_eq!(unrooted_count(), baseline);
    }

    #[test]
    fn test_long_list_drop_and_compare() {
        let baseline = unrooted_count();
        let build = || Value::list((0..100_000).map(val).collect());
        let a = build();
        let b = build();
        assert_eq!(a, b);
        assert_eq!(a.list_len(), 100_000);
        drop(a);
        drop(b);
        assert_eq!(unrooted_count(), baseline);
    }

    #[test]
    fn test_shared_tail_survives_drop() {
        let tail = val([2, 3]);
        let list = Value::cons(val(1), tail.clone());
        drop(list);
        assert_eq!(tail, val([2, 3]));
    }
}
