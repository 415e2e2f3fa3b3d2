//! rcscheme - a small Scheme-family interpreter
//!
//! This crate provides a tree-walking evaluator for a minimal Lisp dialect with closures,
//! user-defined macros, first-class exceptions and a two-representation numeric tower.
//!
//! ```scheme
//! (define (square x) (* x x))        ; function definition
//! ((lambda (&rest xs) xs) 1 2 3)     ; rest parameters => (1 2 3)
//! ((macro (x) x) (+ 1 2))            ; macros see their operands unevaluated => (+ 1 2)
//! (try (car 5) (lambda (e) "caught")) ; exceptions are values => "caught"
//! (+ 9223372036854775807 1)          ; integer overflow promotes to float => 9.22337e+18
//! ```
//!
//! ## Memory Model
//!
//! Composite values (pairs, closures, exception payloads) are shared through `Rc` and are
//! freed eagerly when their last holder goes away. There is no tracing collector: a
//! closure whose captured environment transitively refers back to the closure forms a
//! reference cycle and is never freed. The [`memory`] module keeps a diagnostic registry
//! of heap nodes that are not held by any environment binding, which makes such leaks
//! observable.
//!
//! ## Errors as Values
//!
//! Evaluation returns `Result<Value, Exception>`. An [`ast::Exception`] propagates with
//! `?` until a `try` form intercepts it, at which point it is delivered to the handler as
//! a `BoundException` value. [`evaluator::evaluate`] folds the error side back into a
//! `Value::Exception` for callers that prefer to treat errors as data.
//!
//! ## Modules
//!
//! - `number`: overflow-aware integer/float arithmetic and numeral parsing
//! - `memory`: diagnostic registry of unrooted heap nodes
//! - `ast`: the `Value` type, pairs, closures and exceptions
//! - `evaluator`: environments, special forms and function application
//! - `builtinops`: the builtin catalog installed into every global environment
//! - `scheme`: S-expression parsing from text
//! - `interpreter`: a persistent global environment plus script running

use std::fmt;

/// Maximum nesting depth accepted by the reader
pub const MAX_PARSE_DEPTH: usize = 256;

/// Formal parameter marker that collects the remaining arguments into a list
pub const REST_MARKER: &str = "&rest";

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Clone)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (bad tokens, stray closing parens)
    InvalidSyntax,
    /// Input ended before the expression was complete (EOF, unterminated string, unclosed parens)
    Incomplete,
    /// Expression nesting exceeded the maximum parse depth
    TooDeeplyNested,
    /// Extra input found after a complete, valid expression
    TrailingContent,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
    /// The problematic token or character encountered, if identifiable
    pub found: Option<String>,
}

impl ParseError {
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        context: Option<String>,
        found: Option<String>,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context,
            found,
        }
    }

    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None, None)
    }

    /// Create a ParseError with context extracted from input at a given byte offset
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
    ) -> Self {
        Self::with_context_and_found(kind, message, input, error_offset, None)
    }

    pub fn with_context_and_found(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
        found: Option<String>,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;
        const LOOKBEHIND: usize = 20;

        let error_char = input
            .char_indices()
            .take_while(|(idx, _)| *idx < error_offset)
            .count();
        let context_start = error_char.saturating_sub(LOOKBEHIND);

        let context_str: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.chars().count() < input.chars().count() {
            display_context.push_str("[...]");
        }

        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        Self::new(kind, message, Some(display_context), found)
    }
}

/// Error payloads carried by exceptions and reported by the reader
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Parse(ParseError),
    /// Atom resolution failure
    UnboundName(String),
    /// Application of a value that is not a procedure; carries the value's type name
    NotCallable(String),
    ArityMismatch {
        expected: evaluator::Arity,
        got: usize,
    },
    TypeMismatch(String),
    /// Malformed special-form syntax
    Validation(String),
    Arithmetic(String),
    Io(String),
    /// User-level `raise` with a message string
    Raised(String),
}

impl Error {
    pub fn arity_error(expected: evaluator::Arity, got: usize) -> Self {
        Error::ArityMismatch { expected, got }
    }

    pub(crate) fn type_mismatch(msg: impl Into<String>) -> Self {
        Error::TypeMismatch(msg.into())
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// True when the reader ran out of input in the middle of a form
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Error::Parse(e) if e.kind == ParseErrorKind::Incomplete)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Parse(e) => {
                write!(f, "Parse error: {}", e.message)?;
                if let Some(found) = &e.found {
                    write!(f, "\nFound: {found}")?;
                }
                if let Some(context) = &e.context {
                    write!(f, "\nContext: {context}")?;
                }
                Ok(())
            }
            Error::UnboundName(name) => write!(f, "Could not resolve '{name}'"),
            Error::NotCallable(type_name) => write!(f, "Cannot apply value of type {type_name}"),
            Error::ArityMismatch { expected, got } => {
                write!(f, "Arity mismatch: expected {expected} arguments, got {got}")
            }
            Error::TypeMismatch(msg) => write!(f, "Type error: {msg}"),
            Error::Validation(msg) => write!(f, "Validation error: {msg}"),
            Error::Arithmetic(msg) => write!(f, "Arithmetic error: {msg}"),
            Error::Io(msg) => write!(f, "I/O error: {msg}"),
            Error::Raised(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::Parse(err)
    }
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod interpreter;
pub mod memory;
pub mod number;
pub mod scheme;

pub use ast::{EvalResult, Exception, Value};
pub use evaluator::Environment;
pub use interpreter::Interpreter;
