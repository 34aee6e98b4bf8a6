use std::{cell::RefCell, collections::HashMap, iter, ops::Deref, rc::Rc};

use crate::{
    builtin::Builtin,
    error::{DefunError, TabpError},
    table::Table,
    value::{Callable, CallableKind, Symbol, Value},
};

pub type Env = Rc<Environment>;

/// A scope of bindings. Functions, macros and variables live in separate
/// namespaces; lookups that miss fall through to the parent scope.
#[derive(Debug, Default)]
pub struct Environment {
    parent: Option<Env>,
    functions: RefCell<HashMap<Symbol, Callable>>,
    macros: RefCell<HashMap<Symbol, Callable>>,
    variables: RefCell<HashMap<Symbol, Value>>,
}

impl Environment {
    /// An empty root scope, without any builtin installed.
    pub fn new() -> Env {
        Rc::new(Self::default())
    }

    pub fn root(builtins: impl IntoIterator<Item = Builtin>) -> Env {
        let environment = Self::new();
        for builtin in builtins {
            environment.install(builtin);
        }
        environment
    }

    pub fn child(parent: &Env) -> Env {
        Rc::new(Self { parent: Some(Rc::clone(parent)), ..Self::default() })
    }

    pub fn parent(&self) -> Option<&Env> {
        self.parent.as_ref()
    }

    pub fn install(&self, builtin: Builtin) {
        match builtin {
            Builtin::Callable(callable) => self.define(callable),
            Builtin::Variable(name, value) => self.define_variable(name, value),
        }
    }

    /// Binds `callable` in the namespace its kind belongs to.
    pub fn define(&self, callable: Callable) {
        let name = callable.name().clone();
        match callable.kind() {
            CallableKind::Function => self.functions.borrow_mut().insert(name, callable),
            CallableKind::Macro | CallableKind::Special => self.macros.borrow_mut().insert(name, callable),
        };
    }

    pub fn define_function(&self, name: impl Into<Symbol>, function: impl Fn(&Env, &Args) -> Value + 'static) {
        self.define(Callable::function(name, function));
    }

    /// Defines a macro whose result is evaluated once more by the caller.
    pub fn define_macro(&self, name: impl Into<Symbol>, expander: impl Fn(&Env, &Args) -> Value + 'static) {
        self.define(Callable::macro_expander(name, expander));
    }

    /// Defines a macro whose result is the final value of the call.
    pub fn define_special(&self, name: impl Into<Symbol>, special: impl Fn(&Env, &Args) -> Value + 'static) {
        self.define(Callable::special_form(name, special));
    }

    pub fn define_variable(&self, name: impl Into<Symbol>, value: Value) {
        self.variables.borrow_mut().insert(name.into(), value);
    }

    fn scopes(&self) -> impl Iterator<Item = &Environment> {
        iter::successors(Some(self), |environment| environment.parent.as_deref())
    }

    /// Unbound variables are [Value::Nil].
    pub fn lookup_variable(&self, name: &Symbol) -> Value {
        self.scopes()
            .find_map(|scope| scope.variables.borrow().get(name).cloned())
            .unwrap_or_default()
    }

    pub fn lookup_function(&self, name: &Symbol) -> Option<Callable> {
        self.scopes().find_map(|scope| scope.functions.borrow().get(name).cloned())
    }

    pub fn lookup_macro(&self, name: &Symbol) -> Option<Callable> {
        self.scopes().find_map(|scope| scope.macros.borrow().get(name).cloned())
    }

    pub fn eval(self: &Rc<Self>, value: &Value) -> Value {
        match value {
            Value::Symbol(symbol) => self.lookup_variable(symbol),
            Value::Table(table) => {
                // Callees may mutate the table they were called with, evaluate a copy.
                let form = table.borrow().clone();
                self.evaluate_form(form, value)
            }
            other => other.clone(),
        }
    }

    /// Evaluates `forms` in order and returns the last result, or the first
    /// error. [Value::Nil] when there is nothing to evaluate.
    pub fn eval_all<'a>(self: &Rc<Self>, forms: impl IntoIterator<Item = &'a Value>) -> Value {
        let mut result = Value::Nil;
        for form in forms {
            result = self.eval(form);
            if result.is_error() {
                break;
            }
        }
        result
    }

    fn evaluate_form(self: &Rc<Self>, form: Table, expr: &Value) -> Value {
        if form.sequence_len() == 0 {
            return expr.clone();
        }

        let head = form.get_int(0);
        let Some(name) = head.as_symbol() else {
            return failure(TabpError::NameNotSymbol(head.clone()), expr);
        };
        let mut args = Args::new(form);

        if let Some(expander) = self.lookup_macro(name) {
            tracing::trace!(name = %name, "expanding macro");
            let expansion = expander.call(self, &args);
            if let Value::Error(cause) = &expansion {
                return failure(Rc::clone(cause), expr);
            }
            if expander.kind() == CallableKind::Special {
                return expansion;
            }

            tracing::trace!(name = %name, expansion = %expansion, "evaluating macro expansion");
            return match self.eval(&expansion) {
                Value::Error(cause) => failure(cause, expr),
                result => result,
            };
        }

        let Some(function) = self.lookup_function(name) else {
            tracing::debug!(name = %name, "function not found");
            return failure(TabpError::FunctionNotFound(name.clone()), expr);
        };

        let mut error = None;
        args.table.map(|key, value| {
            if *key == Value::Int(0) {
                return (value.clone(), false);
            }

            let result = self.eval(value);
            if let Value::Error(cause) = &result {
                error = Some(Rc::clone(cause));
                return (result, true);
            }
            (result, false)
        });
        if let Some(cause) = error {
            return failure(cause, expr);
        }

        tracing::trace!(name = %name, args = %args.table, arity = args.arity, "calling function");
        match function.call(self, &args) {
            Value::Error(cause) => failure(cause, expr),
            result => result,
        }
    }
}

fn failure(cause: impl Into<Rc<TabpError>>, expr: &Value) -> Value {
    Value::error(TabpError::eval(cause, expr.clone()))
}

/// What a callable receives: the call form, with its arguments already
/// evaluated when the callable is a function.
///
/// Positional arguments are the sequence entries of the form as written,
/// after the head. An argument that evaluated to nil leaves a hole, which
/// still counts as a positional slot. Integer keys written as `key: value`
/// beyond the sequence never do.
#[derive(Debug, Clone)]
pub struct Args {
    table: Table,
    arity: usize,
}

impl Args {
    pub fn new(table: Table) -> Self {
        let arity = table.sequence_len().saturating_sub(1);
        Self { table, arity }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Number of positional arguments, the head excluded.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Positional arguments in order. Holes read as [Value::Nil].
    pub fn positional(&self) -> impl Iterator<Item = Value> + '_ {
        (1..=self.arity).map(|index| self.table.get_int(index as i64))
    }
}

impl From<Table> for Args {
    fn from(table: Table) -> Self {
        Self::new(table)
    }
}

impl Deref for Args {
    type Target = Table;

    fn deref(&self) -> &Table {
        &self.table
    }
}

/// A declared parameter of a user function. Named parameters carry the
/// unevaluated default written in the declaration.
#[derive(Debug, Clone)]
pub(crate) struct Parameter {
    name: Symbol,
    default: Value,
}

impl Parameter {
    pub(crate) fn from_declaration(declaration: &Table) -> Result<Vec<Self>, DefunError> {
        declaration.iter()
            .map(|(key, value)| match (key, value) {
                (Value::Symbol(name), default) => Ok(Self { name, default: default.clone() }),
                (_, Value::Symbol(name)) => Ok(Self { name: name.clone(), default: Value::Nil }),
                _ => Err(DefunError::ParameterNotSymbol),
            })
            .collect()
    }
}

/// Hands out the values of a call's arguments, by keyword when the caller
/// named the argument and by position otherwise.
struct ArgumentCursor<'a> {
    args: &'a Args,
    cursor: usize,
}

impl<'a> ArgumentCursor<'a> {
    fn new(args: &'a Args) -> Self {
        Self { args, cursor: 0 }
    }

    fn consume(&mut self, name: &Symbol) -> Value {
        let value = self.args.get(&Value::Symbol(name.clone()));
        if !value.is_nil() {
            return value;
        }

        self.cursor += 1;
        if self.cursor > self.args.arity() {
            return Value::Nil;
        }
        self.args.get_int(self.cursor as i64)
    }
}

/// Function defined from tabp code with `DEFUN`.
#[derive(Debug, Clone)]
pub(crate) struct UserFunction {
    pub(crate) name: Symbol,
    pub(crate) parameters: Vec<Parameter>,
    pub(crate) body: Vec<Value>,
}

impl UserFunction {
    pub(crate) fn call(&self, env: &Env, args: &Args) -> Value {
        let scope = Environment::child(env);
        let mut arguments = ArgumentCursor::new(args);

        for parameter in &self.parameters {
            let value = match arguments.consume(&parameter.name) {
                Value::Nil => parameter.default.clone(),
                value => value,
            };
            scope.define_variable(parameter.name.clone(), value);
        }

        tracing::trace!(name = %self.name, "entering function body");
        scope.eval_all(&self.body)
    }

    pub(crate) fn into_callable(self) -> Callable {
        let name = self.name.clone();
        Callable::function(name, move |env, args| self.call(env, args))
    }
}
