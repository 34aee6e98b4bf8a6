use core::fmt;
use std::{cell::RefCell, rc::Rc};

use crate::{error::TabpError, interpreter::{Args, Env}, table::Table};


/// Shared handle to a table. Wrapping a table in a [Value] never copies it.
pub type TableRef = Rc<RefCell<Table>>;

/// Identifier of the language. Symbols are normalized to uppercase on
/// construction, so `foo` and `FOO` name the same thing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(Rc<str>);

impl Symbol {
    pub fn new(name: &str) -> Self {
        Self(name.to_uppercase().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Symbol {
    fn from(name: String) -> Self {
        Self::new(&name)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub type NativeFn = dyn Fn(&Env, &Args) -> Value;

/// How the evaluator treats the value a callable returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallableKind {
    /// Receives evaluated arguments, its result is final.
    Function,
    /// Receives the raw call form, its result is evaluated once more.
    Macro,
    /// Receives the raw call form, its result is final.
    Special,
}

/// Host supplied function or macro.
#[derive(Clone)]
pub struct Callable {
    name: Symbol,
    kind: CallableKind,
    func: Rc<NativeFn>,
}

impl Callable {
    pub fn new(name: impl Into<Symbol>, kind: CallableKind, func: impl Fn(&Env, &Args) -> Value + 'static) -> Self {
        Self { name: name.into(), kind, func: Rc::new(func) }
    }

    pub fn function(name: impl Into<Symbol>, func: impl Fn(&Env, &Args) -> Value + 'static) -> Self {
        Self::new(name, CallableKind::Function, func)
    }

    pub fn macro_expander(name: impl Into<Symbol>, func: impl Fn(&Env, &Args) -> Value + 'static) -> Self {
        Self::new(name, CallableKind::Macro, func)
    }

    pub fn special_form(name: impl Into<Symbol>, func: impl Fn(&Env, &Args) -> Value + 'static) -> Self {
        Self::new(name, CallableKind::Special, func)
    }

    pub fn name(&self) -> &Symbol {
        &self.name
    }

    pub fn kind(&self) -> CallableKind {
        self.kind
    }

    pub fn is_macro(&self) -> bool {
        self.kind != CallableKind::Function
    }

    pub fn call(&self, env: &Env, args: &Args) -> Value {
        (self.func)(env, args)
    }

    pub(crate) fn address(&self) -> usize {
        Rc::as_ptr(&self.func) as *const () as usize
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.kind, self.name)
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.func, &other.func)
    }
}

/// Every runtime datum of the language.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Int(i64),
    Float(f64),
    String(Rc<str>),
    Symbol(Symbol),
    Error(Rc<TabpError>),
    Table(TableRef),
    Callable(Callable),
}

impl Value {
    pub fn string(text: impl Into<Rc<str>>) -> Self {
        Self::String(text.into())
    }

    pub fn symbol(name: &str) -> Self {
        Self::Symbol(Symbol::new(name))
    }

    pub fn error(error: impl Into<TabpError>) -> Self {
        Self::Error(Rc::new(error.into()))
    }

    pub fn table(table: Table) -> Self {
        Self::Table(Rc::new(RefCell::new(table)))
    }

    /// The canonical true value.
    pub fn t() -> Self {
        Self::symbol("T")
    }

    pub fn from_bool(value: bool) -> Self {
        if value { Self::t() } else { Self::Nil }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Only [Value::Nil] is false.
    pub fn is_truthy(&self) -> bool {
        !self.is_nil()
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn as_error(&self) -> Option<&TabpError> {
        match self {
            Self::Error(error) => Some(error.as_ref()),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Self::Symbol(symbol) => Some(symbol),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(text) => Some(text.as_ref()),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Self::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::Error(_) => "error",
            Self::Table(_) => "table",
            Self::Callable(_) => "callable",
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::string(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::string(value)
    }
}

impl From<Symbol> for Value {
    fn from(value: Symbol) -> Self {
        Self::Symbol(value)
    }
}

impl From<Table> for Value {
    fn from(value: Table) -> Self {
        Self::table(value)
    }
}

// Structural equality. Integers and floats never compare equal to each other,
// errors and callables compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Symbol(a), Self::Symbol(b)) => a == b,
            (Self::Error(a), Self::Error(b)) => Rc::ptr_eq(a, b),
            (Self::Table(a), Self::Table(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Self::Callable(a), Self::Callable(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("()"),
            Self::Int(value) => write!(f, "{}", value),
            Self::Float(value) => f.write_str(&format_float(*value)),
            Self::String(text) => f.write_str(&quote(text)),
            Self::Symbol(symbol) => fmt::Display::fmt(symbol, f),
            Self::Error(error) => fmt::Display::fmt(error, f),
            Self::Table(table) => fmt::Display::fmt(&*table.borrow(), f),
            Self::Callable(callable) if callable.is_macro() => write!(f, "#<MACRO {}>", callable.name),
            Self::Callable(callable) => write!(f, "#<FUNCTION {}>", callable.name),
        }
    }
}

/// Shortest round-tripping text. Integral floats keep a `.0` so that reading
/// the text back produces a float again. Infinities and NaN print as `inf`
/// and `NaN`, which read back as symbols; the reader and the numeric builtins
/// never produce them.
pub fn format_float(value: f64) -> String {
    let text = value.to_string();
    if value.is_finite() && !text.contains('.') {
        return text + ".0";
    }
    text
}

/// Double quotes `text`, escaping it so that the reader's unescaping gives
/// the original back.
pub fn quote(text: &str) -> String {
    let mut result = String::with_capacity(text.len() + 2);
    result.push('"');
    for c in text.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\t' => result.push_str("\\t"),
            '\r' => result.push_str("\\r"),
            '\u{07}' => result.push_str("\\a"),
            '\u{08}' => result.push_str("\\b"),
            '\u{0c}' => result.push_str("\\f"),
            '\u{0b}' => result.push_str("\\v"),
            c if c.is_control() && (c as u32) < 0x80 => result.push_str(&format!("\\x{:02x}", c as u32)),
            c if c.is_control() => result.push_str(&format!("\\u{:04x}", c as u32)),
            c => result.push(c),
        }
    }
    result.push('"');
    result
}
