use std::rc::Rc;

use thiserror::Error;

use crate::{parser::ParseError, value::{Symbol, Value}};


/// Errors produced while evaluating tabp programs. They travel as ordinary
/// values ([Value::Error]) rather than through a separate channel, so a
/// builtin signals failure simply by returning one.
#[derive(Debug, Error)]
pub enum TabpError {
    #[error("function not found: {0}")]
    FunctionNotFound(Symbol),

    #[error("function/macro name is not a symbol: {0}")]
    NameNotSymbol(Value),

    #[error("can't {operation} non number type")]
    NotANumber { operation: &'static str },

    #[error("can't {operation}: result is not a finite number")]
    NotFinite { operation: &'static str },

    #[error("no argument provided")]
    MissingArgument,

    #[error("format is not a string")]
    FormatNotString,

    #[error("variable name isn't a symbol")]
    VariableNameNotSymbol,

    #[error(transparent)]
    Defun(#[from] DefunError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("{0}")]
    Raised(String),

    /// The evaluator wraps every failure with the expression that was being
    /// evaluated, so nested calls produce a chain down to the root cause.
    #[error("failed to evaluate expression {expr}: {cause}")]
    Eval { cause: Rc<TabpError>, expr: Value },
}

impl TabpError {
    pub fn eval(cause: impl Into<Rc<TabpError>>, expr: Value) -> Self {
        Self::Eval { cause: cause.into(), expr }
    }

    /// Innermost error, skipping every [TabpError::Eval] wrapper.
    pub fn root_cause(&self) -> &TabpError {
        match self {
            Self::Eval { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// Expression recorded by the outermost [TabpError::Eval] wrapper.
    pub fn expression(&self) -> Option<&Value> {
        match self {
            Self::Eval { expr, .. } => Some(expr),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefunError {
    #[error("function name isn't a symbol")]
    NameNotSymbol,

    #[error("function args isn't a table")]
    ParametersNotTable,

    #[error("args list of function in defun call is not a symbol")]
    ParameterNotSymbol,
}
