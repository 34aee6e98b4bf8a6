
mod builtin;
mod context;
mod error;
mod format;
mod interpreter;
mod parser;
mod table;
mod value;

#[cfg(test)]
mod test_utils;

pub use builtin::{standard as standard_builtins, Builtin};
pub use context::EvaluationContext;
pub use error::{DefunError, TabpError};
pub use format::sprintf;
pub use interpreter::{Args, Env, Environment};
pub use parser::{parse, unescape, ParseError, ParseErrorKind, Parser, Position};
pub use table::{Table, TableError};
pub use value::{format_float, quote, Callable, CallableKind, NativeFn, Symbol, TableRef, Value};

/// A root environment with every standard builtin installed.
pub fn new_root_environment() -> Env {
    Environment::root(builtin::standard())
}
