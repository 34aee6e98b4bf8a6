use core::fmt;
use std::{
    io::{self, BufRead, BufReader, Read},
    num::{ParseFloatError, ParseIntError},
};

use thiserror::Error;

use crate::{table::Table, value::{Symbol, Value}};


/// Byte offset, line and column of the reader in its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub byte: usize,
    pub line: usize,
    pub column: usize,
}

impl Default for Position {
    fn default() -> Self {
        Self { byte: 0, line: 1, column: 0 }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({} bytes)", self.line, self.column, self.byte)
    }
}

#[derive(Debug, Error)]
pub enum ParseErrorKind {
    #[error("end of stream")]
    EndOfStream,

    #[error("unexpected end of stream after {0}")]
    UnexpectedEof(&'static str),

    #[error("unexpected end of stream, table closing parenthesis missing")]
    UnterminatedTable,

    #[error("unexpected end of stream, string closing quote missing")]
    UnterminatedString,

    #[error("unexpected end of stream, symbol closing pipe missing")]
    UnterminatedSymbol,

    #[error("unexpected end of stream, comment is never closed")]
    UnterminatedComment,

    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),

    #[error("invalid integer {text:?}: {source}")]
    InvalidInteger { text: String, source: ParseIntError },

    #[error("invalid float {text:?}: {source}")]
    InvalidFloat { text: String, source: ParseFloatError },

    #[error("float {0:?} is out of range")]
    FloatOutOfRange(String),

    #[error("invalid escape sequence in {0}")]
    InvalidEscape(String),

    #[error("input is not valid utf-8")]
    InvalidUtf8,

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
#[error("failed to parse tabp expression at {position}: {kind}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub position: Position,
}

impl ParseError {
    /// Whether the input simply ran out between two expressions. This is how
    /// a host knows to stop reading, it is not a failure.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self.kind, ParseErrorKind::EndOfStream)
    }
}

type ParseResult<O> = Result<O, ParseError>;

/// Reads one expression at a time from a byte stream. Every call to
/// [Parser::parse] picks up where the previous one stopped.
pub struct Parser<R> {
    reader: BufReader<R>,
    position: Position,
    lookahead: Option<char>,
    finished: bool,
}

impl<'a> Parser<&'a [u8]> {
    pub fn from_source(source: &'a str) -> Self {
        Self::new(source.as_bytes())
    }
}

impl<R: Read> Parser<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            position: Position::default(),
            lookahead: None,
            finished: false,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    fn error(&self, kind: ParseErrorKind) -> ParseError {
        ParseError { kind, position: self.position }
    }

    fn read_byte(&mut self) -> ParseResult<Option<u8>> {
        loop {
            match self.reader.fill_buf() {
                Ok(buffer) => {
                    let byte = buffer.first().copied();
                    if byte.is_some() {
                        self.reader.consume(1);
                    }
                    return Ok(byte);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(self.error(err.into())),
            }
        }
    }

    fn read_char(&mut self) -> ParseResult<Option<char>> {
        let Some(first) = self.read_byte()? else { return Ok(None) };

        let width = match first {
            0x00..=0x7f => return Ok(Some(first as char)),
            0xc0..=0xdf => 2,
            0xe0..=0xef => 3,
            0xf0..=0xf7 => 4,
            _ => return Err(self.error(ParseErrorKind::InvalidUtf8)),
        };

        let mut bytes = [first, 0, 0, 0];
        for slot in bytes.iter_mut().take(width).skip(1) {
            *slot = self.read_byte()?.ok_or_else(|| self.error(ParseErrorKind::InvalidUtf8))?;
        }

        std::str::from_utf8(&bytes[..width]).ok()
            .and_then(|text| text.chars().next())
            .map(Some)
            .ok_or_else(|| self.error(ParseErrorKind::InvalidUtf8))
    }

    fn peek_char(&mut self) -> ParseResult<Option<char>> {
        if self.lookahead.is_none() {
            self.lookahead = self.read_char()?;
        }
        Ok(self.lookahead)
    }

    fn bump(&mut self) -> ParseResult<Option<char>> {
        let c = match self.lookahead.take() {
            Some(c) => Some(c),
            None => self.read_char()?,
        };

        if let Some(c) = c {
            self.position.byte += c.len_utf8();
            self.position.column += 1;
            if c == '\n' {
                self.position.line += 1;
                self.position.column = 0;
            }
        }

        Ok(c)
    }

    fn collect_while(&mut self, buffer: &mut String, predicate: impl Fn(char) -> bool) -> ParseResult<()> {
        while let Some(c) = self.peek_char()? {
            if !predicate(c) {
                break;
            }
            buffer.push(c);
            self.bump()?;
        }
        Ok(())
    }

    /// Consumes whitespace and comments and returns the next meaningful
    /// character, already consumed. `None` at end of stream.
    fn next_significant(&mut self) -> ParseResult<Option<char>> {
        loop {
            let Some(c) = self.bump()? else { return Ok(None) };

            match c {
                c if c.is_whitespace() => {}
                ';' => self.skip_line()?,
                '/' => match self.peek_char()? {
                    Some('/') => {
                        self.bump()?;
                        self.skip_line()?;
                    }
                    Some('*') => {
                        self.bump()?;
                        self.skip_block_comment()?;
                    }
                    _ => return Ok(Some('/')),
                },
                c => return Ok(Some(c)),
            }
        }
    }

    /// Discards the rest of the current line. Hosts reading interactively
    /// use it to resynchronize after a malformed expression.
    pub fn skip_line(&mut self) -> ParseResult<()> {
        while let Some(c) = self.bump()? {
            if c == '\n' {
                break;
            }
        }
        Ok(())
    }

    fn skip_block_comment(&mut self) -> ParseResult<()> {
        let mut previous = '/';
        loop {
            match self.bump()? {
                None => return Err(self.error(ParseErrorKind::UnterminatedComment)),
                Some('/') if previous == '*' => return Ok(()),
                Some(c) => previous = c,
            }
        }
    }

    /// Parses the next expression. At the end of the input this fails with
    /// [ParseErrorKind::EndOfStream], see [ParseError::is_end_of_stream].
    pub fn parse(&mut self) -> ParseResult<Value> {
        let Some(c) = self.next_significant()? else {
            return Err(self.error(ParseErrorKind::EndOfStream));
        };

        let value = self.parse_from(c)?;
        tracing::trace!(position = %self.position, value = %value, "parsed expression");
        Ok(value)
    }

    fn parse_from(&mut self, c: char) -> ParseResult<Value> {
        match c {
            '(' => self.parse_table(),
            ')' | ':' => Err(self.error(ParseErrorKind::UnexpectedChar(c))),
            '\'' => self.parse_quoted("QUOTE", "quote"),
            '`' => self.parse_quoted("QUASIQUOTE", "quasiquote"),
            ',' => self.parse_quoted("UNQUOTE", "unquote"),
            '+' | '-' | '.' => self.parse_number(c),
            c if c.is_ascii_digit() => self.parse_number(c),
            '"' => self.parse_string(),
            '|' => self.parse_pipe_symbol(),
            c if c.is_control() => Err(self.error(ParseErrorKind::UnexpectedChar(c))),
            c => self.parse_symbol(c),
        }
    }

    fn parse_table(&mut self) -> ParseResult<Value> {
        let mut table = Table::new();
        let mut next = self.next_significant()?;

        loop {
            let c = match next {
                None => return Err(self.error(ParseErrorKind::UnterminatedTable)),
                Some(')') => return Ok(Value::table(table)),
                Some(c) => c,
            };

            let value = self.parse_from(c)?;
            next = self.next_significant()?;

            // The value just read is a key.
            if next == Some(':') {
                let c = self.next_significant()?
                    .ok_or_else(|| self.error(ParseErrorKind::UnterminatedTable))?;
                let entry = self.parse_from(c)?;
                table.set(value, entry);
                next = self.next_significant()?;
            } else {
                table.append(value);
            }
        }
    }

    fn parse_quoted(&mut self, operator: &str, what: &'static str) -> ParseResult<Value> {
        let c = self.next_significant()?
            .ok_or_else(|| self.error(ParseErrorKind::UnexpectedEof(what)))?;
        let quoted = self.parse_from(c)?;

        Ok(Value::table([Value::symbol(operator), quoted].into_iter().collect()))
    }

    fn parse_number(&mut self, first: char) -> ParseResult<Value> {
        let mut text = String::from(first);
        let mut is_float = first == '.';

        self.collect_while(&mut text, |c| c.is_ascii_digit())?;
        if !is_float && self.peek_char()? == Some('.') {
            is_float = true;
            text.push('.');
            self.bump()?;
            self.collect_while(&mut text, |c| c.is_ascii_digit())?;
        }

        if is_float {
            return match text.parse::<f64>() {
                Ok(value) if value.is_finite() => Ok(Value::Float(value)),
                Ok(_) => Err(self.error(ParseErrorKind::FloatOutOfRange(text))),
                Err(source) => Err(self.error(ParseErrorKind::InvalidFloat { text, source })),
            };
        }

        match text.parse::<i64>() {
            Ok(value) => Ok(Value::Int(value)),
            Err(source) => Err(self.error(ParseErrorKind::InvalidInteger { text, source })),
        }
    }

    fn parse_string(&mut self) -> ParseResult<Value> {
        let mut raw = String::new();

        loop {
            match self.bump()? {
                None => return Err(self.error(ParseErrorKind::UnterminatedString)),
                Some('"') => break,
                Some('\\') => {
                    raw.push('\\');
                    let escaped = self.bump()?
                        .ok_or_else(|| self.error(ParseErrorKind::UnterminatedString))?;
                    raw.push(escaped);
                }
                Some(c) => raw.push(c),
            }
        }

        match unescape(&raw) {
            Some(text) => Ok(Value::string(text)),
            None => Err(self.error(ParseErrorKind::InvalidEscape(format!("\"{}\"", raw)))),
        }
    }

    fn parse_pipe_symbol(&mut self) -> ParseResult<Value> {
        let mut text = String::from('|');

        loop {
            match self.bump()? {
                None => return Err(self.error(ParseErrorKind::UnterminatedSymbol)),
                Some('|') => break,
                Some(c) => text.push(c),
            }
        }
        text.push('|');

        Ok(Value::Symbol(Symbol::new(&text)))
    }

    fn parse_symbol(&mut self, first: char) -> ParseResult<Value> {
        let mut text = String::from(first);
        self.collect_while(&mut text, |c| {
            !c.is_whitespace() && !c.is_control() && !matches!(c, '(' | ')' | ':')
        })?;

        Ok(Value::Symbol(Symbol::new(&text)))
    }
}

impl<R: Read> Iterator for Parser<R> {
    type Item = ParseResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.parse() {
            Ok(value) => Some(Ok(value)),
            Err(err) => {
                self.finished = true;
                if err.is_end_of_stream() { None } else { Some(Err(err)) }
            }
        }
    }
}

/// Parses a single expression from `source`.
pub fn parse(source: &str) -> ParseResult<Value> {
    Parser::from_source(source).parse()
}

fn hex_digits(chars: &mut std::str::Chars<'_>, count: usize) -> Option<u32> {
    let digits: String = chars.take(count).collect();
    if digits.len() != count || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(&digits, 16).ok()
}

/// Resolves backslash escapes of a double quoted literal, without the quotes.
/// `None` if an escape is malformed.
pub fn unescape(raw: &str) -> Option<String> {
    let mut result = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }

        let c = match chars.next()? {
            'a' => '\u{07}',
            'b' => '\u{08}',
            'f' => '\u{0c}',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'v' => '\u{0b}',
            '\\' => '\\',
            '"' => '"',
            '\'' => '\'',
            'x' => char::from_u32(hex_digits(&mut chars, 2)?)?,
            'u' => char::from_u32(hex_digits(&mut chars, 4)?)?,
            'U' => char::from_u32(hex_digits(&mut chars, 8)?)?,
            first @ '0'..='7' => {
                let rest: String = chars.by_ref().take(2).collect();
                if rest.len() != 2 {
                    return None;
                }
                let code = u32::from_str_radix(&format!("{}{}", first, rest), 8).ok()?;
                if code > 0xff {
                    return None;
                }
                char::from_u32(code)?
            }
            _ => return None,
        };
        result.push(c);
    }

    Some(result)
}
