//! Built-in operations registry.
//!
//! Every global environment is populated from a single static table of [`BuiltinOp`]
//! entries. Each entry pairs a Scheme identifier with its implementation and arity.
//!
//! ## Functions vs Special Forms
//!
//! - **Functions**: Receive their arguments evaluated, left to right (e.g. `+`, `car`, `print`)
//! - **Special Forms**: Receive their operand expressions unevaluated (e.g. `quote`, `cond`, `try`)
//!
//! Special forms live in the evaluator; this registry only names them.
//!
//! ## Catalog
//!
//! ```scheme
//! (+ 1 2 3)              ; => 6, folds from 0
//! (- 5)                  ; => -5, unary forms start from 0 (or 1 for /)
//! (/ 7 2)                ; => 3, integer division truncates
//! (< 1 2 3)              ; => #t, comparisons chain
//! (= '(1 2) (list 1 2))  ; => #t, structural equality against the first argument
//! (string->number "42")  ; => 42
//! (concat "a" "b")       ; => "ab"
//! (eval '(+ 1 2))        ; => 3
//! ```
//!
//! ## Error Handling
//!
//! Builtins never coerce: arithmetic on a string, `car` of a number or `concat` of a
//! number all raise a type error. Integer overflow is not an error; it promotes the
//! result to a float. Integer division by zero raises an arithmetic error.

use crate::ast::{EvalResult, NativeFn, Value};
use crate::evaluator::{
    Arity, Environment, eval_block, eval_cond, eval_define, eval_lambda, eval_macro, eval_quote,
    eval_set, eval_try,
};
use crate::interpreter::run_script;
use crate::number::{IntType, Number, parse_numeral};
use crate::Error;
use rand::Rng;
use std::rc::Rc;

/// Represents the implementation of a built-in expression (function or special form)
#[derive(Debug, Clone, Copy)]
pub enum OpKind {
    /// Native procedure receiving its arguments evaluated
    Function(NativeFn),
    /// Native procedure receiving its operand expressions unevaluated
    SpecialForm(NativeFn),
}

/// Definition of a built-in operation
#[derive(Debug, Clone, Copy)]
pub struct BuiltinOp {
    /// The Scheme identifier for this operation
    pub scheme_id: &'static str,
    /// The implementation of this operation (function or special form)
    pub op_kind: OpKind,
    /// Expected number of arguments
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.scheme_id == other.scheme_id
    }
}

impl BuiltinOp {
    /// Check if this operation is a special form
    #[cfg_attr(not(test), expect(dead_code))]
    pub(crate) fn is_special_form(&self) -> bool {
        matches!(self.op_kind, OpKind::SpecialForm(_))
    }
}

//
// Builtin Function Implementations
//

const ARITHMETIC_OPERANDS: &str = "Can only perform arithmetic on numbers";
const ARITHMETIC_FIRST_OPERAND: &str = "First argument to -, / or remainder must be a number";

fn number_arg(value: &Value, message: &str) -> Result<Number, Error> {
    match value {
        Value::Number(n) => Ok(*n),
        _ => Err(Error::type_mismatch(message)),
    }
}

fn string_arg<'a>(value: &'a Value, message: &str) -> Result<&'a str, Error> {
    match value {
        Value::String(s) => Ok(s),
        _ => Err(Error::type_mismatch(message)),
    }
}

// Macro to generate the arithmetic folds that start from an identity element
macro_rules! identity_fold {
    ($name:ident, $method:ident, $identity:expr) => {
        fn $name(args: Value, _env: &Rc<Environment>) -> EvalResult {
            let mut total = Number::Int($identity);
            for arg in args.iter() {
                total = total.$method(number_arg(arg, ARITHMETIC_OPERANDS)?);
            }
            Ok(Value::Number(total))
        }
    };
}

identity_fold!(builtin_add, add, 0);
identity_fold!(builtin_mul, mul, 1);

fn division_error(divisor: Number) -> Error {
    if divisor.num_eq(Number::Int(0)) {
        Error::Arithmetic("integer division by zero".into())
    } else {
        Error::Arithmetic("integer division overflow".into())
    }
}

/// Fold the rest of the arguments into the first; a lone argument `x` becomes `unary op x`
fn fold_from_first(
    args: &Value,
    unary: IntType,
    op: fn(Number, Number) -> Option<Number>,
) -> EvalResult {
    let mut items = args.iter();
    let first = match items.next() {
        Some(value) => number_arg(value, ARITHMETIC_FIRST_OPERAND)?,
        None => return Err(Error::type_mismatch(ARITHMETIC_FIRST_OPERAND).into()),
    };

    let mut rest = items.peekable();
    if rest.peek().is_none() {
        let result = op(Number::Int(unary), first).ok_or_else(|| division_error(first))?;
        return Ok(Value::Number(result));
    }

    let mut total = first;
    for arg in rest {
        let operand = number_arg(arg, ARITHMETIC_OPERANDS)?;
        total = op(total, operand).ok_or_else(|| division_error(operand))?;
    }
    Ok(Value::Number(total))
}

fn builtin_sub(args: Value, _env: &Rc<Environment>) -> EvalResult {
    fold_from_first(&args, 0, |a, b| Some(a.sub(b)))
}

fn builtin_div(args: Value, _env: &Rc<Environment>) -> EvalResult {
    fold_from_first(&args, 1, Number::div)
}

fn builtin_rem(args: Value, _env: &Rc<Environment>) -> EvalResult {
    fold_from_first(&args, 0, Number::rem)
}

// Macro to generate numeric comparison functions
macro_rules! numeric_comparison {
    ($name:ident, $method:ident) => {
        fn $name(args: Value, _env: &Rc<Environment>) -> EvalResult {
            // Chain comparisons: all adjacent pairs must satisfy the comparison
            let mut prev: Option<Number> = None;
            for arg in args.iter() {
                let current = number_arg(arg, "Comparisons only work with numbers")?;
                if let Some(prev) = prev
                    && !prev.$method(current)
                {
                    return Ok(Value::Boolean(false));
                }
                prev = Some(current);
            }
            Ok(Value::Boolean(true))
        }
    };
}

// Generate all comparison functions
numeric_comparison!(builtin_lt, lt);
numeric_comparison!(builtin_gt, gt);
numeric_comparison!(builtin_le, lte);
numeric_comparison!(builtin_ge, gte);

fn builtin_equal(args: Value, _env: &Rc<Environment>) -> EvalResult {
    let mut items = args.iter();
    let Some(first) = items.next() else {
        return Ok(Value::Boolean(true));
    };
    Ok(Value::Boolean(items.all(|other| other == first)))
}

// Macro to generate single-argument type predicates
macro_rules! type_predicate {
    ($name:ident, $pattern:pat) => {
        fn $name(args: Value, _env: &Rc<Environment>) -> EvalResult {
            Ok(Value::Boolean(matches!(args.head(), Some($pattern))))
        }
    };
}

type_predicate!(builtin_is_null, Value::Null);
type_predicate!(builtin_is_atom, Value::Atom(_));
type_predicate!(builtin_is_list, Value::Null | Value::Pair(_));
type_predicate!(builtin_is_number, Value::Number(_));
type_predicate!(builtin_is_boolean, Value::Boolean(_));
type_predicate!(builtin_is_string, Value::String(_));
type_predicate!(
    builtin_is_exception,
    Value::Exception(_) | Value::BoundException(_)
);
type_predicate!(
    builtin_is_function,
    Value::Function(_) | Value::Macro(_) | Value::Builtin(_) | Value::BuiltinSpecialForm(_)
);

fn builtin_car(args: Value, _env: &Rc<Environment>) -> EvalResult {
    match args.head() {
        Some(Value::Pair(pair)) => Ok(pair.head().clone()),
        Some(Value::Null) | None => Ok(Value::Null),
        Some(other) => Err(Error::type_mismatch(format!(
            "car expects a list, got {}",
            other.type_name()
        ))
        .into()),
    }
}

fn builtin_cdr(args: Value, _env: &Rc<Environment>) -> EvalResult {
    match args.head() {
        Some(Value::Pair(pair)) => Ok(pair.tail().clone()),
        Some(Value::Null) | None => Ok(Value::Null),
        Some(other) => Err(Error::type_mismatch(format!(
            "cdr expects a list, got {}",
            other.type_name()
        ))
        .into()),
    }
}

fn builtin_cons(args: Value, _env: &Rc<Environment>) -> EvalResult {
    match args.to_vec().as_slice() {
        [head, tail] => Ok(Value::cons(head.clone(), tail.clone())),
        other => Err(Error::arity_error(Arity::Exact(2), other.len()).into()),
    }
}

/// The evaluated argument list is already a fresh list
fn builtin_list(args: Value, _env: &Rc<Environment>) -> EvalResult {
    Ok(args)
}

/// One converted value for a single argument, a list of them otherwise
fn map_arguments(args: &Value, convert: impl Fn(&Value) -> Result<Value, Error>) -> EvalResult {
    let mut converted = Vec::new();
    for arg in args.iter() {
        converted.push(convert(arg)?);
    }
    match converted.len() {
        1 => Ok(converted.swap_remove(0)),
        _ => Ok(Value::list(converted)),
    }
}

fn builtin_string_to_number(args: Value, _env: &Rc<Environment>) -> EvalResult {
    map_arguments(&args, |arg| {
        let text = string_arg(arg, "string->number expects a string as an argument")?;
        match parse_numeral(text.trim()) {
            Some((number, consumed)) if consumed == text.trim().len() => Ok(Value::Number(number)),
            _ => Err(Error::type_mismatch(format!(
                "string->number cannot read \"{text}\" as a number"
            ))),
        }
    })
}

fn builtin_number_to_string(args: Value, _env: &Rc<Environment>) -> EvalResult {
    map_arguments(&args, |arg| {
        let number = number_arg(arg, "number->string expects a number as an argument")?;
        Ok(Value::from(number.to_string()))
    })
}

fn builtin_concat(args: Value, _env: &Rc<Environment>) -> EvalResult {
    let mut result = String::new();
    for arg in args.iter() {
        result.push_str(string_arg(arg, "concat expects strings")?);
    }
    Ok(Value::from(result))
}

/// Evaluate each argument value as an expression, in the caller's environment
fn builtin_eval(args: Value, env: &Rc<Environment>) -> EvalResult {
    eval_block(&args, env)
}

fn builtin_raise(args: Value, _env: &Rc<Environment>) -> EvalResult {
    match args.head() {
        Some(Value::String(message)) => Err(Error::Raised(message.to_string()).into()),
        // Re-raising propagates the same payload as an in-flight exception
        Some(Value::Exception(e) | Value::BoundException(e)) => Err(e.clone()),
        _ => Err(Error::type_mismatch("raise expects a string or exception as an argument").into()),
    }
}

fn builtin_print(args: Value, _env: &Rc<Environment>) -> EvalResult {
    let line: Vec<String> = args.iter().map(ToString::to_string).collect();
    println!("{}", line.join(" "));
    Ok(Value::Null)
}

/// Render every frame visible from `env`, innermost first
pub(crate) fn format_frames(env: &Environment) -> String {
    let mut out = String::new();
    for (depth, frame) in env.frames().enumerate() {
        out.push_str(&format!("frame {depth}:\n"));
        for (name, value) in frame.local_bindings() {
            out.push_str(&format!("  {name} = {value}\n"));
        }
    }
    out
}

fn builtin_print_env(_args: Value, env: &Rc<Environment>) -> EvalResult {
    print!("{}", format_frames(env));
    Ok(Value::Null)
}

fn builtin_random(args: Value, _env: &Rc<Environment>) -> EvalResult {
    let bound = match args.head() {
        Some(Value::Number(n)) => match n.floor() {
            Number::Int(bound) => bound,
            Number::Float(bound) => bound as IntType,
        },
        _ => return Err(Error::type_mismatch("random expects number").into()),
    };
    if bound <= 0 {
        return Err(Error::Arithmetic(format!("random expects a positive bound, got {bound}")).into());
    }
    Ok(Value::from(rand::thread_rng().gen_range(0..bound)))
}

/// Run each named script in the caller's environment; the last script's result is returned
fn builtin_include(args: Value, env: &Rc<Environment>) -> EvalResult {
    let mut last = Ok(Value::Null);
    for arg in args.iter() {
        let path = string_arg(arg, "include only accepts strings")?;
        if let Err(discarded) = &last {
            tracing::debug!(error = %discarded, "discarding exception from included script");
        }
        last = run_script(path, env);
    }
    last
}

fn builtin_read_file(args: Value, _env: &Rc<Environment>) -> EvalResult {
    let path = match args.head() {
        Some(Value::String(path)) => path,
        _ => return Err(Error::type_mismatch("read-file expects a single string argument").into()),
    };
    match std::fs::read_to_string(path.as_ref()) {
        Ok(content) => Ok(Value::from(content)),
        Err(err) => {
            tracing::debug!(%path, %err, "read-file failed");
            Err(Error::Io(format!("Cannot open file '{path}'")).into())
        }
    }
}

/// Global registry of all built-in operations.
///
/// Kept as a single contiguous table for ease of auditing; the evaluator installs it
/// into each new global environment.
static BUILTIN_OPS: &[BuiltinOp] = &[
    // Arithmetic operations
    BuiltinOp {
        scheme_id: "+",
        op_kind: OpKind::Function(builtin_add),
        arity: Arity::AtLeast(0),
    },
    BuiltinOp {
        scheme_id: "-",
        op_kind: OpKind::Function(builtin_sub),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        scheme_id: "*",
        op_kind: OpKind::Function(builtin_mul),
        arity: Arity::AtLeast(0),
    },
    BuiltinOp {
        scheme_id: "/",
        op_kind: OpKind::Function(builtin_div),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        scheme_id: "remainder",
        op_kind: OpKind::Function(builtin_rem),
        arity: Arity::AtLeast(1),
    },
    // Comparison operations
    BuiltinOp {
        scheme_id: "=",
        op_kind: OpKind::Function(builtin_equal),
        arity: Arity::Any,
    },
    BuiltinOp {
        scheme_id: "<",
        op_kind: OpKind::Function(builtin_lt),
        arity: Arity::Any,
    },
    BuiltinOp {
        scheme_id: ">",
        op_kind: OpKind::Function(builtin_gt),
        arity: Arity::Any,
    },
    BuiltinOp {
        scheme_id: "<=",
        op_kind: OpKind::Function(builtin_le),
        arity: Arity::Any,
    },
    BuiltinOp {
        scheme_id: ">=",
        op_kind: OpKind::Function(builtin_ge),
        arity: Arity::Any,
    },
    // Type predicates
    BuiltinOp {
        scheme_id: "null?",
        op_kind: OpKind::Function(builtin_is_null),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        scheme_id: "atom?",
        op_kind: OpKind::Function(builtin_is_atom),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        scheme_id: "list?",
        op_kind: OpKind::Function(builtin_is_list),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        scheme_id: "number?",
        op_kind: OpKind::Function(builtin_is_number),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        scheme_id: "boolean?",
        op_kind: OpKind::Function(builtin_is_boolean),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        scheme_id: "string?",
        op_kind: OpKind::Function(builtin_is_string),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        scheme_id: "exception?",
        op_kind: OpKind::Function(builtin_is_exception),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        scheme_id: "function?",
        op_kind: OpKind::Function(builtin_is_function),
        arity: Arity::Exact(1),
    },
    // List operations
    BuiltinOp {
        scheme_id: "car",
        op_kind: OpKind::Function(builtin_car),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        scheme_id: "cdr",
        op_kind: OpKind::Function(builtin_cdr),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        scheme_id: "cons",
        op_kind: OpKind::Function(builtin_cons),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        scheme_id: "list",
        op_kind: OpKind::Function(builtin_list),
        arity: Arity::Any,
    },
    // String and number conversions
    BuiltinOp {
        scheme_id: "string->number",
        op_kind: OpKind::Function(builtin_string_to_number),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        scheme_id: "number->string",
        op_kind: OpKind::Function(builtin_number_to_string),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        scheme_id: "concat",
        op_kind: OpKind::Function(builtin_concat),
        arity: Arity::Any,
    },
    // Control
    BuiltinOp {
        scheme_id: "eval",
        op_kind: OpKind::Function(builtin_eval),
        arity: Arity::Any,
    },
    BuiltinOp {
        scheme_id: "raise",
        op_kind: OpKind::Function(builtin_raise),
        arity: Arity::Exact(1),
    },
    // I/O
    BuiltinOp {
        scheme_id: "print",
        op_kind: OpKind::Function(builtin_print),
        arity: Arity::Any,
    },
    BuiltinOp {
        scheme_id: "print-env",
        op_kind: OpKind::Function(builtin_print_env),
        arity: Arity::Exact(0),
    },
    BuiltinOp {
        scheme_id: "random",
        op_kind: OpKind::Function(builtin_random),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        scheme_id: "include",
        op_kind: OpKind::Function(builtin_include),
        arity: Arity::Any,
    },
    BuiltinOp {
        scheme_id: "read-file",
        op_kind: OpKind::Function(builtin_read_file),
        arity: Arity::Exact(1),
    },
    // Special forms
    BuiltinOp {
        scheme_id: "quote",
        op_kind: OpKind::SpecialForm(eval_quote),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        scheme_id: "lambda",
        op_kind: OpKind::SpecialForm(eval_lambda),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        scheme_id: "macro",
        op_kind: OpKind::SpecialForm(eval_macro),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        scheme_id: "define",
        op_kind: OpKind::SpecialForm(eval_define),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        scheme_id: "set!",
        op_kind: OpKind::SpecialForm(eval_set),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        scheme_id: "cond",
        op_kind: OpKind::SpecialForm(eval_cond),
        arity: Arity::Any,
    },
    BuiltinOp {
        scheme_id: "try",
        op_kind: OpKind::SpecialForm(eval_try),
        arity: Arity::Exact(2),
    },
];

/// Get all builtin operations (for internal use by evaluator)
pub(crate) fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS
}

/// Find a builtin operation by its Scheme identifier
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn find_scheme_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_OPS.iter().find(|op| op.scheme_id == id)
}
