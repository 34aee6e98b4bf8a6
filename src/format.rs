use std::{iter::Peekable, str::Chars};

use itertools::Itertools;

use crate::value::{quote, Value};


/// Widths and precisions above this are reported as `%!(BADWIDTH)` or
/// `%!(BADPREC)` and then ignored, as Go's fmt does.
const MAX_COUNT: usize = 1_000_000;

/// Past this many fractional digits every f64 expands to zeros only.
const EXACT_DIGITS: usize = 1074;

#[derive(Debug, Default, Clone, Copy)]
struct Directive {
    minus: bool,
    plus: bool,
    space: bool,
    sharp: bool,
    zero: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

struct TooLarge;

fn digits(chars: &mut Peekable<Chars<'_>>) -> Result<Option<usize>, TooLarge> {
    let mut text = String::new();
    while let Some(c) = chars.next_if(char::is_ascii_digit) {
        text.push(c);
    }
    if text.is_empty() {
        return Ok(None);
    }

    match text.parse::<usize>() {
        Ok(count) if count <= MAX_COUNT => Ok(Some(count)),
        _ => Err(TooLarge),
    }
}

/// Formats `args` into `format` with printf directives
/// (`%[flags][width][.precision]verb`).
///
/// Mismatches never fail, they are reported inline: `%!d(string="x")` for a
/// verb that does not apply to its argument, `%!v(MISSING)` when arguments
/// run out, `%!(EXTRA int=1)` for unused ones and `%!(NOVERB)` when the
/// format ends on a lone `%`. Widths or precisions above one million print
/// `%!(BADWIDTH)` or `%!(BADPREC)` and are dropped.
pub fn sprintf(format: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars().peekable();
    let mut next_arg = 0;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut directive = Directive::default();
        while let Some(flag) = chars.next_if(|c| matches!(c, '-' | '+' | ' ' | '#' | '0')) {
            match flag {
                '-' => directive.minus = true,
                '+' => directive.plus = true,
                ' ' => directive.space = true,
                '#' => directive.sharp = true,
                _ => directive.zero = true,
            }
        }
        match digits(&mut chars) {
            Ok(width) => directive.width = width,
            Err(TooLarge) => out.push_str("%!(BADWIDTH)"),
        }
        if chars.next_if_eq(&'.').is_some() {
            match digits(&mut chars) {
                Ok(precision) => directive.precision = Some(precision.unwrap_or(0)),
                Err(TooLarge) => out.push_str("%!(BADPREC)"),
            }
        }

        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }

        match args.get(next_arg) {
            Some(arg) => {
                next_arg += 1;
                out.push_str(&render(verb, &directive, arg));
            }
            None => out.push_str(&format!("%!{}(MISSING)", verb)),
        }
    }

    if let Some(extra) = args.get(next_arg..).filter(|extra| !extra.is_empty()) {
        let extra = extra.iter()
            .map(|arg| format!("{}={}", arg.type_name(), plain(arg)))
            .join(", ");
        out.push_str(&format!("%!(EXTRA {})", extra));
    }

    out
}

/// Strings without their quotes, everything else as printed.
fn plain(value: &Value) -> String {
    match value {
        Value::String(text) => text.to_string(),
        other => other.to_string(),
    }
}

fn render(verb: char, directive: &Directive, arg: &Value) -> String {
    match (verb, arg) {
        ('v' | 's', value) => {
            let text = plain(value);
            let text = match directive.precision {
                Some(precision) => text.chars().take(precision).collect(),
                None => text,
            };
            pad(text, directive)
        }
        ('d', Value::Int(value)) => integer(*value, 10, verb, directive),
        ('x' | 'X' | 'o' | 'b', Value::Int(value)) => {
            let radix = match verb {
                'o' => 8,
                'b' => 2,
                _ => 16,
            };
            integer(*value, radix, verb, directive)
        }
        ('x', Value::String(text)) => pad(text.bytes().map(|byte| format!("{:02x}", byte)).join(""), directive),
        ('X', Value::String(text)) => pad(text.bytes().map(|byte| format!("{:02X}", byte)).join(""), directive),
        ('c', Value::Int(value)) => pad(code_point(*value).to_string(), directive),
        ('q', Value::Int(value)) => pad(format!("'{}'", code_point(*value)), directive),
        ('q', Value::String(text)) => pad(quote(text), directive),
        ('t', value) => pad(value.is_truthy().to_string(), directive),
        ('f' | 'F' | 'e' | 'E' | 'g' | 'G', Value::Float(value)) => float(*value, verb, directive),
        (verb, arg) => format!("%!{}({}={})", verb, arg.type_name(), plain(arg)),
    }
}

fn code_point(value: i64) -> char {
    u32::try_from(value).ok()
        .and_then(char::from_u32)
        .unwrap_or(char::REPLACEMENT_CHARACTER)
}

fn integer(value: i64, radix: u32, verb: char, directive: &Directive) -> String {
    let magnitude = value.unsigned_abs();
    let mut body = match (radix, verb) {
        (16, 'X') => format!("{:X}", magnitude),
        (16, _) => format!("{:x}", magnitude),
        (8, _) => format!("{:o}", magnitude),
        (2, _) => format!("{:b}", magnitude),
        _ => magnitude.to_string(),
    };

    if let Some(precision) = directive.precision {
        if body.len() < precision {
            body = "0".repeat(precision - body.len()) + &body;
        }
    }

    if directive.sharp {
        let prefix = match (radix, verb) {
            (16, 'X') => "0X",
            (16, _) => "0x",
            (8, _) if !body.starts_with('0') => "0",
            (2, _) => "0b",
            _ => "",
        };
        body.insert_str(0, prefix);
    }

    // Go ignores the 0 flag once a precision is given.
    let zero = directive.zero && directive.precision.is_none();
    signed(value < 0, body, directive, zero)
}

fn float(value: f64, verb: char, directive: &Directive) -> String {
    if value.is_nan() {
        return pad("NaN".to_owned(), directive);
    }
    if value.is_infinite() {
        let sign = if value < 0.0 { '-' } else { '+' };
        return pad(format!("{}Inf", sign), directive);
    }

    let magnitude = value.abs();
    let body = match verb {
        'f' | 'F' => fixed(magnitude, directive.precision.unwrap_or(6)),
        'e' | 'E' => exponent(magnitude, directive.precision.unwrap_or(6)),
        _ => general(magnitude, directive.precision, directive.sharp),
    };
    let body = if verb.is_ascii_uppercase() { body.to_uppercase() } else { body };

    signed(value.is_sign_negative(), body, directive, directive.zero)
}

/// Splits Rust's `1.5e-7` notation into mantissa and exponent.
fn split_exponent(text: &str) -> (&str, i32) {
    match text.split_once('e') {
        Some((mantissa, exponent)) => (mantissa, exponent.parse().unwrap_or(0)),
        None => (text, 0),
    }
}

fn join_exponent(mantissa: &str, exponent: i32) -> String {
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{}e{}{:02}", mantissa, sign, exponent.abs())
}

fn zeros(count: usize) -> String {
    "0".repeat(count)
}

// Rust's formatter caps precision far below MAX_COUNT, digits past
// EXACT_DIGITS are appended by hand.
fn fixed(magnitude: f64, precision: usize) -> String {
    format!("{:.*}", precision.min(EXACT_DIGITS), magnitude) + &zeros(precision.saturating_sub(EXACT_DIGITS))
}

/// Rust's `1.50e-7` notation with `precision` mantissa decimals.
fn scientific(magnitude: f64, precision: usize) -> String {
    let text = format!("{:.*e}", precision.min(EXACT_DIGITS), magnitude);
    let padding = precision.saturating_sub(EXACT_DIGITS);
    match text.split_once('e') {
        Some((mantissa, exponent)) if padding > 0 => format!("{}{}e{}", mantissa, zeros(padding), exponent),
        _ => text,
    }
}

fn exponent(magnitude: f64, precision: usize) -> String {
    let text = scientific(magnitude, precision);
    let (mantissa, exponent) = split_exponent(&text);
    join_exponent(mantissa, exponent)
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

fn general(magnitude: f64, precision: Option<usize>, sharp: bool) -> String {
    let Some(precision) = precision else {
        let text = format!("{:e}", magnitude);
        let (mantissa, exponent) = split_exponent(&text);
        if !(-4..21).contains(&exponent) {
            return join_exponent(mantissa, exponent);
        }
        return magnitude.to_string();
    };

    let precision = precision.max(1);
    let text = scientific(magnitude, precision - 1);
    let (mantissa, exponent) = split_exponent(&text);

    if exponent < -4 || exponent >= precision as i32 {
        let mantissa = if sharp { mantissa } else { trim_fraction(mantissa) };
        return join_exponent(mantissa, exponent);
    }

    let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
    let text = fixed(magnitude, decimals);
    if sharp { text } else { trim_fraction(&text).to_owned() }
}

fn signed(negative: bool, body: String, directive: &Directive, zero: bool) -> String {
    let sign = match (negative, directive.plus, directive.space) {
        (true, _, _) => "-",
        (false, true, _) => "+",
        (false, false, true) => " ",
        _ => "",
    };

    match directive.width {
        Some(width) if zero && !directive.minus => {
            let length = sign.len() + body.chars().count();
            let zeros = "0".repeat(width.saturating_sub(length));
            format!("{}{}{}", sign, zeros, body)
        }
        _ => pad(format!("{}{}", sign, body), directive),
    }
}

fn pad(text: String, directive: &Directive) -> String {
    let Some(width) = directive.width else { return text };
    let length = text.chars().count();
    if length >= width {
        return text;
    }

    let fill = " ".repeat(width - length);
    if directive.minus { text + &fill } else { fill + &text }
}
