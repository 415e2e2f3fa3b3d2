use crate::ast::{EvalResult, Exception, Lambda, Value};
use crate::builtinops::{OpKind, get_builtin_ops};
use crate::{Error, REST_MARKER};
use std::fmt;
use std::rc::Rc;

mod environment;

pub use environment::Environment;

/// Number of arguments a procedure accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly n arguments
    Exact(usize),
    /// At least n arguments
    AtLeast(usize),
    Any,
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
            Arity::Any => true,
        }
    }

    pub fn validate(&self, count: usize) -> Result<(), Error> {
        if self.accepts(count) {
            Ok(())
        } else {
            Err(Error::arity_error(*self, count))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// Evaluate an expression.
///
/// Atoms resolve through `env`, pairs are applications, everything else evaluates to
/// itself. An in-flight exception value "evaluates" by propagating.
pub fn eval(expr: &Value, env: &Rc<Environment>) -> EvalResult {
    match expr {
        Value::Atom(name) => match env.resolve(name)? {
            Value::Exception(e) => Err(e),
            value => Ok(value),
        },
        Value::Pair(pair) => {
            let operator = eval(pair.head(), env)?;
            apply(&operator, pair.tail(), env)
        }
        Value::Exception(e) => Err(e.clone()),
        other => Ok(other.clone()),
    }
}

/// Evaluate an expression, folding any exception into a `Value::Exception`
pub fn evaluate(expr: &Value, env: &Rc<Environment>) -> Value {
    eval(expr, env).unwrap_or_else(Value::Exception)
}

/// Evaluate each expression of a list in order and return the last result.
///
/// An exception from a non-final expression does not stop the block; it is discarded
/// like any other intermediate result. An empty block yields `()`.
pub fn eval_block(exprs: &Value, env: &Rc<Environment>) -> EvalResult {
    let mut last = Ok(Value::Null);
    for expr in exprs.iter() {
        if let Err(discarded) = &last {
            tracing::debug!(error = %discarded, "discarding exception from block");
        }
        last = eval(expr, env);
    }
    last
}

/// Apply an operator value to a list of operand expressions
pub fn apply(operator: &Value, args: &Value, env: &Rc<Environment>) -> EvalResult {
    match operator {
        Value::Builtin(builtin) => {
            let evaluated = eval_list(args, env)?;
            builtin.arity.validate(evaluated.list_len())?;
            (builtin.func)(evaluated, env)
        }
        Value::BuiltinSpecialForm(form) => {
            if !form.arity.accepts(args.list_len()) {
                return Err(malformed(form.name));
            }
            (form.func)(args.clone(), env)
        }
        Value::Function(lambda) => apply_lambda(lambda, args, env, true),
        Value::Macro(lambda) => apply_lambda(lambda, args, env, false),
        Value::Exception(e) => Err(e.clone()),
        other => Err(Error::NotCallable(other.type_name().to_owned()).into()),
    }
}

/// Evaluate every element of a list left to right, stopping at the first exception
fn eval_list(args: &Value, env: &Rc<Environment>) -> EvalResult {
    let mut values = Vec::new();
    for arg in args.iter() {
        values.push(eval(arg, env)?);
    }
    Ok(Value::list(values))
}

fn apply_lambda(
    lambda: &Rc<Lambda>,
    args: &Value,
    env: &Rc<Environment>,
    evaluate_args: bool,
) -> EvalResult {
    let actuals = if evaluate_args {
        eval_list(args, env)?
    } else {
        args.clone()
    };
    lambda.arity.validate(actuals.list_len())?;

    // Macro frames extend the caller's scope
    let parent = if evaluate_args { &lambda.env } else { env };
    let frame = Environment::with_parent(parent.clone());
    bind_formals(&frame, &lambda.params, actuals);

    tracing::trace!(
        params = %lambda.params,
        depth = frame.depth(),
        "applying closure"
    );
    eval(&lambda.body, &frame)
}

/// Bind formals to actuals. `&rest name` receives the remaining actuals as a list.
/// The formal list has been validated and the count checked against its arity.
fn bind_formals(frame: &Environment, params: &Value, actuals: Value) {
    let mut formals = params.iter();
    let mut remaining = actuals;

    while let Some(name) = formals.next().and_then(Value::as_atom) {
        if name == REST_MARKER {
            if let Some(rest_name) = formals.next().and_then(Value::as_atom) {
                frame.define(rest_name, remaining);
            }
            return;
        }
        let (value, tail) = match &remaining {
            Value::Pair(pair) => (pair.head().clone(), pair.tail().clone()),
            _ => (Value::Null, Value::Null),
        };
        frame.define(name, value);
        remaining = tail;
    }
}

/// Check a formal parameter list and derive its arity
fn formal_arity(params: &Value) -> Result<Arity, Error> {
    if !params.is_list() {
        return Err(Error::validation("formal parameters must be a list"));
    }

    let formals = params.to_vec();
    for (i, formal) in formals.iter().enumerate() {
        let Some(name) = formal.as_atom() else {
            return Err(Error::validation(format!(
                "formal parameter {formal} is not an atom"
            )));
        };
        if name == REST_MARKER {
            return match &formals[i + 1..] {
                [Value::Atom(rest)] if rest.as_ref() != REST_MARKER => Ok(Arity::AtLeast(i)),
                _ => Err(Error::validation(format!(
                    "{REST_MARKER} must be followed by exactly one name"
                ))),
            };
        }
    }
    Ok(Arity::Exact(formals.len()))
}

pub(crate) fn make_lambda(
    params: &Value,
    body: &Value,
    env: &Rc<Environment>,
) -> Result<Rc<Lambda>, Error> {
    let arity = formal_arity(params)?;
    Ok(Lambda::new(params.clone(), body.clone(), env.clone(), arity))
}

fn malformed(form: &str) -> Exception {
    Error::validation(format!("malformed {form} expression")).into()
}

/// Evaluate quote special form
pub(crate) fn eval_quote(args: Value, _env: &Rc<Environment>) -> EvalResult {
    match args.to_vec().as_slice() {
        [expr] => Ok(expr.clone()),
        _ => Err(malformed("quote")),
    }
}

/// Shared by `define` and `set!`: `(name expr)` or `((name . formals) body)`
fn eval_binding(
    args: &Value,
    env: &Rc<Environment>,
    form: &str,
) -> Result<(Rc<str>, Value), Exception> {
    match args.to_vec().as_slice() {
        [Value::Atom(name), expr] => Ok((name.clone(), eval(expr, env)?)),
        [Value::Pair(signature), body] => match signature.head() {
            Value::Atom(name) => {
                let lambda = make_lambda(signature.tail(), body, env)?;
                Ok((name.clone(), Value::Function(lambda)))
            }
            _ => Err(Error::validation(format!("name in {form} expression must be an atom")).into()),
        },
        [_, _] => Err(Error::validation(format!("name in {form} expression must be an atom")).into()),
        _ => Err(malformed(form)),
    }
}

/// Evaluate define special form
pub(crate) fn eval_define(args: Value, env: &Rc<Environment>) -> EvalResult {
    let (name, value) = eval_binding(&args, env, "define")?;
    tracing::trace!(%name, kind = value.type_name(), "define");
    env.define(&name, value);
    Ok(Value::Null)
}

/// Evaluate set! special form
pub(crate) fn eval_set(args: Value, env: &Rc<Environment>) -> EvalResult {
    let (name, value) = eval_binding(&args, env, "set!")?;
    tracing::trace!(%name, kind = value.type_name(), "set!");
    env.set(&name, value);
    Ok(Value::Null)
}

/// Evaluate lambda special form
pub(crate) fn eval_lambda(args: Value, env: &Rc<Environment>) -> EvalResult {
    match args.to_vec().as_slice() {
        [params, body] => Ok(Value::Function(make_lambda(params, body, env)?)),
        [_] => Err(Error::validation("lambda must have a body").into()),
        _ => Err(malformed("lambda")),
    }
}

/// Evaluate macro special form
pub(crate) fn eval_macro(args: Value, env: &Rc<Environment>) -> EvalResult {
    match args.to_vec().as_slice() {
        [params, body] => Ok(Value::Macro(make_lambda(params, body, env)?)),
        [_] => Err(Error::validation("macro must have a body").into()),
        _ => Err(malformed("macro")),
    }
}

/// Evaluate cond special form. Only the boolean true selects a clause.
pub(crate) fn eval_cond(args: Value, env: &Rc<Environment>) -> EvalResult {
    for clause in args.iter() {
        match clause.to_vec().as_slice() {
            [test, result] if clause.is_list() => {
                if matches!(eval(test, env)?, Value::Boolean(true)) {
                    return eval(result, env);
                }
            }
            _ => {
                return Err(
                    Error::validation("cond clauses must be two-element lists").into(),
                );
            }
        }
    }
    Ok(Value::Null)
}

/// Evaluate try special form: run the body, and on an exception hand it to the handler
/// as a bound exception
pub(crate) fn eval_try(args: Value, env: &Rc<Environment>) -> EvalResult {
    let args = args.to_vec();
    let [body, handler] = args.as_slice() else {
        return Err(malformed("try"));
    };

    match eval(body, env) {
        Ok(value) => Ok(value),
        Err(exception) => {
            let handler = eval(handler, env)?;
            if !handler.is_callable() {
                return Err(Error::type_mismatch(format!(
                    "second argument to try must be callable, not {}",
                    handler.type_name()
                ))
                .into());
            }
            tracing::debug!(error = %exception, "delivering exception to handler");
            let bound = Value::list(vec![Value::BoundException(exception)]);
            apply(&handler, &bound, env)
        }
    }
}

/// Create a global environment with built-in functions and special forms
pub fn create_global_env() -> Rc<Environment> {
    let env = Environment::new();

    for builtin_op in get_builtin_ops() {
        match builtin_op.op_kind {
            OpKind::Function(func) => {
                env.register_builtin(builtin_op.scheme_id, builtin_op.arity, func);
            }
            OpKind::SpecialForm(func) => {
                env.register_special_form(builtin_op.scheme_id, builtin_op.arity, func);
            }
        }
    }

    env.define("true", Value::Boolean(true));
    env.define("false", Value::Boolean(false));

    env
}
