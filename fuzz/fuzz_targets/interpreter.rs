#![no_main]

use core::fmt;

use itertools::Itertools;
use libfuzzer_sys::{arbitrary::Arbitrary, fuzz_target};

// Builtins and variable loads
#[derive(Arbitrary, Debug)]
enum TabpAtom {
    Add, Sub, Mul,
    Lt, Le, Gt, Ge, Eq,
    Progn, Sprintf,
    T, Nil,

    Symbol(u8),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for TabpAtom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", match self {
            TabpAtom::Add => "ADD",
            TabpAtom::Sub => "SUB",
            TabpAtom::Mul => "MUL",
            TabpAtom::Lt => "LT",
            TabpAtom::Le => "LE",
            TabpAtom::Gt => "GT",
            TabpAtom::Ge => "GE",
            TabpAtom::Eq => "EQ",
            TabpAtom::Progn => "PROGN",
            TabpAtom::Sprintf => "SPRINTF",
            TabpAtom::T => "T",
            TabpAtom::Nil => "NIL",
            TabpAtom::Symbol(index) => return write!(f, "V{}", index % 8),
            TabpAtom::Int(value) => return write!(f, "{}", value),
            TabpAtom::Float(value) => return write!(f, "{}", tabp::format_float(*value)),
            TabpAtom::Text(text) => return write!(f, "{}", tabp::quote(text)),
        })
    }
}

#[derive(Arbitrary, Debug)]
enum TabpCommand {
    // Macros and special forms
    Defun(u8, Vec<TabpAtom>, Vec<TabpCommand>),
    Defvar(u8, Box<TabpCommand>),
    If(Vec<TabpCommand>),
    Quote(Box<TabpCommand>),
    Quasiquote(Vec<TabpCommand>),
    Unquote(Box<TabpCommand>),

    Call(Vec<TabpCommand>),
    Keyword(u8, Box<TabpCommand>),
    Atom(TabpAtom),
}

fn stringify_arguments(values: &[TabpCommand]) -> String {
    values.iter()
        .map(TabpCommand::to_string)
        .join(" ")
}

impl fmt::Display for TabpCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Defun(name, parameters, body) => write!(f, "(DEFUN F{} ({}) {})",
                name % 8, parameters.iter().join(" "), stringify_arguments(body)),
            Self::Defvar(name, value) => write!(f, "(DEFVAR V{} {})", name % 8, value),
            Self::If(args) => write!(f, "(IF {})", stringify_arguments(args)),
            Self::Quote(value) => write!(f, "'{}", value),
            Self::Quasiquote(args) => write!(f, "`({})", stringify_arguments(args)),
            Self::Unquote(value) => write!(f, ",{}", value),
            Self::Call(args) => write!(f, "({})", stringify_arguments(args)),
            Self::Keyword(name, value) => write!(f, "V{}: {}", name % 8, value),
            Self::Atom(atom) => atom.fmt(f),
        }
    }
}

fuzz_target!(|commands: Vec<TabpCommand>| {
    let mut context = tabp::EvaluationContext::new();

    for command in commands {
        let _ = context.evaluate_str(&command.to_string());
    }
});
