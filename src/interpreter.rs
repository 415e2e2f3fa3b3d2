//! A persistent global environment and the script runner.
//!
//! [`Interpreter`] owns one global environment for its whole lifetime, so definitions made
//! by one call are visible to the next. [`run_script`] is shared with the `include`
//! builtin, which runs scripts in whatever environment it is called from.

use crate::ast::{EvalResult, Value};
use crate::evaluator::{Environment, create_global_env, eval_block, evaluate};
use crate::scheme::{ParseConfig, parse_program_with_config};
use crate::Error;
use std::rc::Rc;

pub struct Interpreter {
    env: Rc<Environment>,
    config: ParseConfig,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_config(ParseConfig::default())
    }

    pub fn with_config(config: ParseConfig) -> Self {
        Interpreter {
            env: create_global_env(),
            config,
        }
    }

    /// The global environment
    pub fn env(&self) -> &Rc<Environment> {
        &self.env
    }

    pub fn config(&self) -> ParseConfig {
        self.config
    }

    /// Evaluate every form in `source` as a block and return the last result.
    /// A parse error is returned as an exception before anything is evaluated.
    pub fn eval_str(&self, source: &str) -> EvalResult {
        let program = parse_program_with_config(source, self.config)?;
        eval_block(&program, &self.env)
    }

    /// Evaluate every form in `source`, returning one value per top-level form.
    /// Exceptions are folded into `Value::Exception` so later forms still run.
    pub fn eval_forms(&self, source: &str) -> Result<Vec<Value>, Error> {
        let program = parse_program_with_config(source, self.config)?;
        Ok(program
            .iter()
            .map(|form| evaluate(form, &self.env))
            .collect())
    }

    /// Run a script file in the global environment
    pub fn run_script(&self, path: &str) -> EvalResult {
        run_script_with_config(path, &self.env, self.config)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// Read, parse and evaluate a script file in `env` as a single block
pub fn run_script(path: &str, env: &Rc<Environment>) -> EvalResult {
    run_script_with_config(path, env, ParseConfig::default())
}

pub fn run_script_with_config(
    path: &str,
    env: &Rc<Environment>,
    config: ParseConfig,
) -> EvalResult {
    let source = std::fs::read_to_string(path).map_err(|err| {
        tracing::debug!(path, %err, "cannot read script");
        Error::Io(format!("Cannot open file '{path}'"))
    })?;

    let program = parse_program_with_config(&source, config)?;
    tracing::debug!(path, forms = program.list_len(), "running script");
    eval_block(&program, env)
}
