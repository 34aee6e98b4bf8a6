use std::io::Read;

use crate::{builtin::{self, Builtin}, interpreter::{Env, Environment}, parser::Parser, value::Value};


/// An interpreter session: a root environment that successive evaluations
/// share, so definitions made by one are visible to the next.
///
/// ```
/// use tabp::{EvaluationContext, Value};
///
/// let mut context = EvaluationContext::new();
/// context.evaluate_str("(DEFUN SQUARE (x) (MUL x x))");
/// assert_eq!(context.evaluate_str("(SQUARE 12)"), Value::Int(144));
/// ```
pub struct EvaluationContext {
    environment: Env,
}

impl Default for EvaluationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::with_builtins(builtin::standard())
    }

    pub fn with_builtins(builtins: impl IntoIterator<Item = Builtin>) -> Self {
        Self { environment: Environment::root(builtins) }
    }

    pub fn environment(&self) -> &Env {
        &self.environment
    }

    pub fn evaluate(&mut self, value: &Value) -> Value {
        self.environment.eval(value)
    }

    /// Evaluates every expression of `source` in order and returns the value
    /// of the last one. Stops at the first error, which is returned instead;
    /// a malformed expression comes back as a [crate::TabpError::Parse] error.
    pub fn evaluate_str(&mut self, source: &str) -> Value {
        self.evaluate_reader(source.as_bytes())
    }

    pub fn evaluate_reader(&mut self, reader: impl Read) -> Value {
        let mut result = Value::Nil;
        for expression in Parser::new(reader) {
            result = match expression {
                Ok(expression) => self.evaluate(&expression),
                Err(error) => Value::error(error),
            };
            if result.is_error() {
                break;
            }
        }
        result
    }
}
