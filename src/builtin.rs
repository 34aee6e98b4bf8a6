use crate::{
    error::{DefunError, TabpError},
    format::sprintf,
    interpreter::{Args, Env, Parameter, UserFunction},
    table::Table,
    value::{Callable, Symbol, Value},
};

/// Something to install in a root environment.
#[derive(Debug, Clone)]
pub enum Builtin {
    Callable(Callable),
    Variable(Symbol, Value),
}

impl From<Callable> for Builtin {
    fn from(callable: Callable) -> Self {
        Self::Callable(callable)
    }
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn from_value(value: &Value, operation: &'static str) -> Result<Self, TabpError> {
        match value {
            Value::Int(value) => Ok(Self::Int(*value)),
            Value::Float(value) => Ok(Self::Float(*value)),
            _ => Err(TabpError::NotANumber { operation }),
        }
    }

    fn as_float(self) -> f64 {
        match self {
            Self::Int(value) => value as f64,
            Self::Float(value) => value,
        }
    }

    fn combine(self, other: Self, int: fn(i64, i64) -> i64, float: fn(f64, f64) -> f64) -> Self {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Self::Int(int(a, b)),
            (a, b) => Self::Float(float(a.as_float(), b.as_float())),
        }
    }
}

impl From<Number> for Value {
    fn from(number: Number) -> Self {
        match number {
            Number::Int(value) => Value::Int(value),
            Number::Float(value) => Value::Float(value),
        }
    }
}

fn numbers(args: &Args, operation: &'static str) -> Result<Vec<Number>, TabpError> {
    args.positional()
        .map(|value| Number::from_value(&value, operation))
        .collect()
}

fn fold_numbers(args: &Args, operation: &'static str, int: fn(i64, i64) -> i64, float: fn(f64, f64) -> f64) -> Value {
    let numbers = match numbers(args, operation) {
        Ok(numbers) => numbers,
        Err(error) => return Value::error(error),
    };

    let mut numbers = numbers.into_iter();
    let Some(first) = numbers.next() else {
        return Value::error(TabpError::MissingArgument);
    };

    match numbers.fold(first, |acc, number| acc.combine(number, int, float)) {
        Number::Float(value) if !value.is_finite() => Value::error(TabpError::NotFinite { operation }),
        number => number.into(),
    }
}

fn builtin_add(_env: &Env, args: &Args) -> Value {
    fold_numbers(args, "add", i64::wrapping_add, |a, b| a + b)
}

fn builtin_sub(_env: &Env, args: &Args) -> Value {
    fold_numbers(args, "subtract", i64::wrapping_sub, |a, b| a - b)
}

fn builtin_mul(_env: &Env, args: &Args) -> Value {
    fold_numbers(args, "multiply", i64::wrapping_mul, |a, b| a * b)
}

fn builtin_compare(args: &Args, int: fn(&i64, &i64) -> bool, float: fn(&f64, &f64) -> bool) -> Value {
    let operands = Number::from_value(&args.get_int(1), "compare")
        .and_then(|a| Ok((a, Number::from_value(&args.get_int(2), "compare")?)));

    match operands {
        Ok((Number::Int(a), Number::Int(b))) => Value::from_bool(int(&a, &b)),
        Ok((a, b)) => Value::from_bool(float(&a.as_float(), &b.as_float())),
        Err(error) => Value::error(error),
    }
}

fn builtin_lt(_env: &Env, args: &Args) -> Value {
    builtin_compare(args, i64::lt, f64::lt)
}

fn builtin_le(_env: &Env, args: &Args) -> Value {
    builtin_compare(args, i64::le, f64::le)
}

fn builtin_gt(_env: &Env, args: &Args) -> Value {
    builtin_compare(args, i64::gt, f64::gt)
}

fn builtin_ge(_env: &Env, args: &Args) -> Value {
    builtin_compare(args, i64::ge, f64::ge)
}

fn builtin_eq(_env: &Env, args: &Args) -> Value {
    let mut operands = args.positional();
    let Some(first) = operands.next() else {
        return Value::error(TabpError::MissingArgument);
    };

    Value::from_bool(operands.all(|operand| operand == first))
}

fn special_progn(env: &Env, form: &Args) -> Value {
    env.eval_all(form.iter_seq().skip(1))
}

fn format_arguments(args: &Args) -> Result<String, TabpError> {
    let mut operands = args.positional();
    let format = operands.next().ok_or(TabpError::MissingArgument)?;
    let Some(format) = format.as_str() else {
        return Err(TabpError::FormatNotString);
    };

    Ok(sprintf(format, &operands.collect::<Vec<_>>()))
}

fn builtin_printf(_env: &Env, args: &Args) -> Value {
    match format_arguments(args) {
        Ok(text) => {
            print!("{}", text);
            Value::Nil
        }
        Err(error) => Value::error(error),
    }
}

fn builtin_sprintf(_env: &Env, args: &Args) -> Value {
    match format_arguments(args) {
        Ok(text) => Value::string(text),
        Err(error) => Value::error(error),
    }
}

fn special_quote(_env: &Env, form: &Args) -> Value {
    form.get_int(1)
}

fn quasiquote(env: &Env, value: &Value) -> Value {
    let Some(table) = value.as_table() else { return value.clone() };
    let mut table = table.borrow().clone();

    if table.get_int(0) == Value::symbol("UNQUOTE") && table.sequence_len() == 2 {
        return env.eval(&table.get_int(1));
    }

    let mut failure = None;
    table.map(|_, entry| {
        let entry = quasiquote(env, entry);
        let stop = entry.is_error();
        if stop {
            failure = Some(entry.clone());
        }
        (entry, stop)
    });

    failure.unwrap_or_else(|| Value::table(table))
}

fn special_quasiquote(env: &Env, form: &Args) -> Value {
    quasiquote(env, &form.get_int(1))
}

fn special_defvar(env: &Env, form: &Args) -> Value {
    let Value::Symbol(name) = form.get_int(1) else {
        return Value::error(TabpError::VariableNameNotSymbol);
    };

    let value = env.eval(&form.get_int(2));
    if value.is_error() {
        return value;
    }

    tracing::debug!(name = %name, value = %value, "defining variable");
    env.define_variable(name.clone(), value);
    Value::Symbol(name)
}

fn macro_if(env: &Env, form: &Args) -> Value {
    let condition = env.eval(&form.get_int(1));
    if condition.is_error() {
        return condition;
    }

    if condition.is_truthy() { form.get_int(2) } else { form.get_int(3) }
}

fn defun(form: &Table) -> Result<UserFunction, DefunError> {
    let Value::Symbol(name) = form.get_int(1) else {
        return Err(DefunError::NameNotSymbol);
    };
    let declaration = form.get_int(2);
    let Some(declaration) = declaration.as_table() else {
        return Err(DefunError::ParametersNotTable);
    };
    let parameters = Parameter::from_declaration(&declaration.borrow())?;

    let body = form.iter_seq().skip(3).cloned().collect();

    Ok(UserFunction { name, parameters, body })
}

fn macro_defun(env: &Env, form: &Args) -> Value {
    match defun(form) {
        Ok(function) => {
            tracing::debug!(name = %function.name, parameters = function.parameters.len(), "defining function");
            env.define(function.into_callable());
            Value::Nil
        }
        Err(error) => Value::error(error),
    }
}

/// Everything a fresh interpreter starts with.
pub fn standard() -> Vec<Builtin> {
    vec![
        Builtin::Variable(Symbol::new("TABP-VERSION"), Value::string(env!("CARGO_PKG_VERSION"))),
        Builtin::Variable(Symbol::new("T"), Value::t()),

        Callable::special_form("QUOTE", special_quote).into(),
        Callable::special_form("QUASIQUOTE", special_quasiquote).into(),
        Callable::special_form("DEFVAR", special_defvar).into(),
        Callable::special_form("PROGN", special_progn).into(),
        Callable::macro_expander("IF", macro_if).into(),
        Callable::macro_expander("DEFUN", macro_defun).into(),

        Callable::function("ADD", builtin_add).into(),
        Callable::function("SUB", builtin_sub).into(),
        Callable::function("MUL", builtin_mul).into(),

        Callable::function("LT", builtin_lt).into(),
        Callable::function("LE", builtin_le).into(),
        Callable::function("GT", builtin_gt).into(),
        Callable::function("GE", builtin_ge).into(),
        Callable::function("EQ", builtin_eq).into(),

        Callable::function("PRINTF", builtin_printf).into(),
        Callable::function("SPRINTF", builtin_sprintf).into(),
    ]
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::context::EvaluationContext;

    use super::*;

    fn run(source: &str) -> Value {
        EvaluationContext::new().evaluate_str(source)
    }

    fn root_cause(value: &Value) -> Option<String> {
        value.as_error().map(|error| error.root_cause().to_string())
    }

    #[test]
    fn add_keeps_integers_apart_from_floats() {
        assert_eq!(run("(ADD 1 2)"), Value::Int(3));
        assert_eq!(run("(ADD 1 2.0)"), Value::Float(3.0));
        assert_eq!(run("(ADD 0.5 0.25 1)"), Value::Float(1.75));
        assert_eq!(run("(ADD 7)"), Value::Int(7));
    }

    #[test]
    fn add_rejects_non_numbers() {
        assert_eq!(root_cause(&run(r#"(ADD 1 "two")"#)).as_deref(), Some("can't add non number type"));
        assert_eq!(root_cause(&run("(ADD)")).as_deref(), Some("no argument provided"));
    }

    #[test]
    fn sub_and_mul() {
        assert_eq!(run("(SUB 10 3 2)"), Value::Int(5));
        assert_eq!(run("(SUB 10 0.5)"), Value::Float(9.5));
        assert_eq!(run("(SUB 4)"), Value::Int(4));
        assert_eq!(run("(MUL 2 3 4)"), Value::Int(24));
        assert_eq!(run("(MUL 2 1.5)"), Value::Float(3.0));
    }

    #[test]
    fn integer_overflow_wraps() {
        assert_eq!(run("(ADD 9223372036854775807 1)"), Value::Int(i64::MIN));
    }

    #[test]
    fn comparisons() {
        assert_eq!(run("(LT 1 2)"), Value::t());
        assert_eq!(run("(LT 2 1)"), Value::Nil);
        assert_eq!(run("(LE 2 2.0)"), Value::t());
        assert_eq!(run("(GT 2.5 2)"), Value::t());
        assert_eq!(run("(GE 1 2)"), Value::Nil);
        assert_eq!(root_cause(&run("(LT 1 'a)")).as_deref(), Some("can't compare non number type"));
        assert_eq!(root_cause(&run("(GT 1)")).as_deref(), Some("can't compare non number type"));
    }

    #[test]
    fn equality_is_structural() {
        assert_eq!(run("(EQ 1 1 1)"), Value::t());
        assert_eq!(run("(EQ 1 1.0)"), Value::Nil);
        assert_eq!(run(r#"(EQ "a" "a")"#), Value::t());
        assert_eq!(run("(EQ '(1 2 k: v) '(1 2 k: v))"), Value::t());
        assert_eq!(run("(EQ '(1 2) '(1 3))"), Value::Nil);
    }

    #[test]
    fn progn_returns_last() {
        assert_eq!(run("(PROGN 1 2 3)"), Value::Int(3));
        assert_eq!(run("(PROGN)"), Value::Nil);
    }

    #[test]
    fn progn_returns_a_nil_last_result() {
        assert_eq!(run("(PROGN 1 2 nil)"), Value::Nil);
        assert_eq!(run("(PROGN 1 (DEFUN F ()))"), Value::Nil);
        assert_eq!(run("(PROGN 1 50000000: 2)"), Value::Int(1));
    }

    #[test]
    fn progn_stops_at_first_error() {
        let mut context = EvaluationContext::new();
        assert!(context.evaluate_str("(PROGN (DEFVAR X 1) (NOPE) (DEFVAR X 2))").is_error());
        assert_eq!(context.evaluate_str("X"), Value::Int(1));
    }

    #[test]
    fn mapping_keys_are_not_operands() {
        assert_eq!(run("(ADD 1 2 5: 4)"), Value::Int(3));
        assert_eq!(run("(EQ 1 1 9223372036854775807: 2)"), Value::t());
        assert_eq!(run(r#"(SPRINTF "%v" 1 200000: 2)"#), Value::string("1"));
    }

    #[test]
    fn nil_operands_keep_their_position() {
        assert_eq!(root_cause(&run("(ADD 1 nil 3)")).as_deref(), Some("can't add non number type"));
        assert_eq!(run(r#"(SPRINTF "%v|%v" nil 2)"#), Value::string("()|2"));
    }

    #[test]
    fn float_overflow_is_an_error() {
        let big = format!("1{}.0", "0".repeat(300));
        let result = run(&format!("(MUL {} {})", big, big));
        assert_eq!(root_cause(&result).as_deref(), Some("can't multiply: result is not a finite number"));
        assert_eq!(run(&format!("(ADD {} {})", big, big)), Value::Float(2e300));
    }

    #[test]
    fn sprintf_formats() {
        assert_eq!(run(r#"(SPRINTF "%d + %d = %v" 1 2 (ADD 1 2))"#), Value::string("1 + 2 = 3"));
        assert_eq!(run(r#"(SPRINTF "%s" '(a b))"#), Value::string("(A B)"));
    }

    #[test]
    fn sprintf_needs_string_format() {
        assert_eq!(root_cause(&run("(SPRINTF 1 2)")).as_deref(), Some("format is not a string"));
        assert_eq!(root_cause(&run("(PRINTF 'x)")).as_deref(), Some("format is not a string"));
        assert_eq!(root_cause(&run("(SPRINTF)")).as_deref(), Some("no argument provided"));
    }

    #[test]
    fn printf_returns_nil() {
        assert_eq!(run(r#"(PRINTF "")"#), Value::Nil);
    }

    #[test]
    fn defvar_needs_symbol() {
        assert_eq!(root_cause(&run("(DEFVAR 1 2)")).as_deref(), Some("variable name isn't a symbol"));
    }

    #[test]
    fn unquote_errors_propagate() {
        assert!(run("`(a ,(NOPE))").is_error());
    }

    #[test]
    fn root_variables() {
        assert_eq!(run("TABP-VERSION"), Value::string(env!("CARGO_PKG_VERSION")));
        assert_eq!(run("T"), Value::t());
    }
}
