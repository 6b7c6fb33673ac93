//! Parser for `.odvd` message specifications.
//!
//! The grammar is small enough for a hand-rolled scanner and recursive
//! descent:
//!
//! ```text
//! file     := { message } ;
//! message  := "message" dotted_ident "[" "id" "=" uint "]" "{" { field } "}" ;
//! field    := type ident "[" attr { "," attr } "]" ";" ;
//! attr     := ("id" "=" uint) | ("default" "=" literal) ;
//! type     := primitive | dotted_ident ;
//! literal  := number | quoted_string | bool_lit ;
//! ```
//!
//! Whitespace and `//` line comments are skipped. Message types must be
//! declared before they are referenced.

use std::error::Error;
use std::fmt;

use crate::meta::{Literal, MetaField, MetaMessage, TypeTag};

/// Classification of specification errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseErrorKind {
    Syntax,
    DuplicateFieldId,
    DuplicateMessageId,
    UnknownType,
}

/// A diagnostic produced while parsing a specification.
#[derive(Clone, Debug, PartialEq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    /// 1-based line of the offending token.
    pub line: usize,
    pub message: String,
}

impl ParseError {
    fn new(kind: ParseErrorKind, line: usize, message: impl Into<String>) -> ParseError {
        ParseError {
            kind,
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl Error for ParseError {}

/// Parses a specification into an ordered list of [`MetaMessage`]s.
///
/// Messages parsed before an error occurred are returned alongside the
/// diagnostic, so callers can keep partial results.
pub fn parse(input: &str) -> (Vec<MetaMessage>, Result<(), ParseError>) {
    let mut parser = Parser::new(input);
    let mut messages: Vec<MetaMessage> = Vec::new();

    loop {
        match parser.parse_message(&messages) {
            Ok(Some(message)) => messages.push(message),
            Ok(None) => return (messages, Ok(())),
            Err(error) => return (messages, Err(error)),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    /// Identifier, possibly dotted (`a.b.Foo`).
    Ident(String),
    /// Numeric literal, sign and fraction included, still in textual form.
    Number(String),
    /// Quoted string literal, quotes stripped.
    Str(String),
    Symbol(char),
}

struct Parser<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    /// One token of lookahead.
    peeked: Option<Option<(Token, usize)>>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Parser<'a> {
        Parser {
            chars: input.chars().peekable(),
            line: 1,
            peeked: None,
        }
    }

    fn syntax(&self, line: usize, message: impl Into<String>) -> ParseError {
        ParseError::new(ParseErrorKind::Syntax, line, message)
    }

    fn skip_whitespace(&mut self) {
        loop {
            match self.chars.peek() {
                Some('\n') => {
                    self.line += 1;
                    self.chars.next();
                }
                Some(c) if c.is_whitespace() => {
                    self.chars.next();
                }
                Some('/') => {
                    // Only `//` line comments exist in the grammar.
                    let mut ahead = self.chars.clone();
                    ahead.next();
                    if ahead.peek() == Some(&'/') {
                        for c in self.chars.by_ref() {
                            if c == '\n' {
                                self.line += 1;
                                break;
                            }
                        }
                    } else {
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<(Token, usize)>, ParseError> {
        if let Some(peeked) = self.peeked.take() {
            return Ok(peeked);
        }
        self.skip_whitespace();
        let line = self.line;
        let c = match self.chars.peek() {
            Some(&c) => c,
            None => return Ok(None),
        };

        let token = if c.is_ascii_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&c) = self.chars.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    ident.push(c);
                    self.chars.next();
                } else if c == '.' {
                    // A dot continues the identifier only when followed by a
                    // fresh identifier segment.
                    let mut ahead = self.chars.clone();
                    ahead.next();
                    match ahead.peek() {
                        Some(&n) if n.is_ascii_alphabetic() || n == '_' => {
                            ident.push('.');
                            self.chars.next();
                        }
                        _ => break,
                    }
                } else {
                    break;
                }
            }
            Token::Ident(ident)
        } else if c.is_ascii_digit() || c == '-' || c == '+' {
            let mut number = String::new();
            number.push(c);
            self.chars.next();
            while let Some(&c) = self.chars.peek() {
                if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || c == '-' || c == '+' {
                    number.push(c);
                    self.chars.next();
                } else {
                    break;
                }
            }
            Token::Number(number)
        } else if c == '"' {
            self.chars.next();
            let mut value = String::new();
            loop {
                match self.chars.next() {
                    Some('"') => break,
                    Some('\n') | None => {
                        return Err(self.syntax(line, "unterminated string literal"));
                    }
                    Some(c) => value.push(c),
                }
            }
            Token::Str(value)
        } else if "[]{}=,;".contains(c) {
            self.chars.next();
            Token::Symbol(c)
        } else {
            return Err(self.syntax(line, format!("unexpected character '{}'", c)));
        };

        Ok(Some((token, line)))
    }

    fn peek_token(&mut self) -> Result<Option<&Token>, ParseError> {
        if self.peeked.is_none() {
            let token = self.next_token()?;
            self.peeked = Some(token);
        }
        Ok(self.peeked.as_ref().unwrap().as_ref().map(|(t, _)| t))
    }

    fn expect_symbol(&mut self, symbol: char) -> Result<(), ParseError> {
        match self.next_token()? {
            Some((Token::Symbol(c), _)) if c == symbol => Ok(()),
            Some((token, line)) => {
                Err(self.syntax(line, format!("expected '{}', found {:?}", symbol, token)))
            }
            None => Err(self.syntax(
                self.line,
                format!("expected '{}', found end of input", symbol),
            )),
        }
    }

    fn expect_ident(&mut self) -> Result<(String, usize), ParseError> {
        match self.next_token()? {
            Some((Token::Ident(ident), line)) => Ok((ident, line)),
            Some((token, line)) => {
                Err(self.syntax(line, format!("expected identifier, found {:?}", token)))
            }
            None => Err(self.syntax(self.line, "expected identifier, found end of input")),
        }
    }

    fn expect_uint(&mut self) -> Result<(u32, usize), ParseError> {
        match self.next_token()? {
            Some((Token::Number(number), line)) => number
                .parse::<u32>()
                .map(|value| (value, line))
                .map_err(|_| self.syntax(line, format!("invalid numeric identifier '{}'", number))),
            Some((token, line)) => {
                Err(self.syntax(line, format!("expected number, found {:?}", token)))
            }
            None => Err(self.syntax(self.line, "expected number, found end of input")),
        }
    }

    /// Parses one `message` block, or returns `None` at end of input.
    fn parse_message(&mut self, known: &[MetaMessage]) -> Result<Option<MetaMessage>, ParseError> {
        let (keyword, line) = match self.next_token()? {
            Some((Token::Ident(ident), line)) => (ident, line),
            Some((token, line)) => {
                return Err(self.syntax(line, format!("expected 'message', found {:?}", token)))
            }
            None => return Ok(None),
        };
        if keyword != "message" {
            return Err(self.syntax(line, format!("expected 'message', found '{}'", keyword)));
        }

        let (name, name_line) = self.expect_ident()?;
        if known.iter().any(|m| m.name == name) {
            return Err(ParseError::new(
                ParseErrorKind::DuplicateMessageId,
                name_line,
                format!("message '{}' declared twice", name),
            ));
        }

        self.expect_symbol('[')?;
        let (attr, attr_line) = self.expect_ident()?;
        if attr != "id" {
            return Err(self.syntax(attr_line, format!("expected 'id', found '{}'", attr)));
        }
        self.expect_symbol('=')?;
        let (message_identifier, id_line) = self.expect_uint()?;
        self.expect_symbol(']')?;

        if known
            .iter()
            .any(|m| m.message_identifier == message_identifier)
        {
            return Err(ParseError::new(
                ParseErrorKind::DuplicateMessageId,
                id_line,
                format!("message identifier {} used twice", message_identifier),
            ));
        }

        let mut message = MetaMessage::new(name, message_identifier);

        self.expect_symbol('{')?;
        loop {
            match self.peek_token()? {
                Some(Token::Symbol('}')) => {
                    self.next_token()?;
                    break;
                }
                Some(_) => {
                    let field = self.parse_field(known, &message)?;
                    message.fields.push(field);
                }
                None => {
                    return Err(self.syntax(self.line, "unexpected end of input in message body"))
                }
            }
        }

        Ok(Some(message))
    }

    fn parse_field(
        &mut self,
        known: &[MetaMessage],
        message: &MetaMessage,
    ) -> Result<MetaField, ParseError> {
        let (type_name, type_line) = self.expect_ident()?;
        let (name, _) = self.expect_ident()?;

        let (field_type, message_type) = match TypeTag::from_spec_name(&type_name) {
            Some(tag) => (tag, None),
            None => {
                let resolved = resolve_message_type(known, message.package_name(), &type_name)
                    .ok_or_else(|| {
                        ParseError::new(
                            ParseErrorKind::UnknownType,
                            type_line,
                            format!("unknown type '{}'", type_name),
                        )
                    })?;
                (TypeTag::Message, Some(resolved))
            }
        };

        self.expect_symbol('[')?;
        let mut field_identifier: Option<(u32, usize)> = None;
        let mut default: Option<Literal> = None;
        loop {
            let (attr, attr_line) = self.expect_ident()?;
            self.expect_symbol('=')?;
            match attr.as_str() {
                "id" => {
                    field_identifier = Some(self.expect_uint()?);
                }
                "default" => {
                    default = Some(self.parse_literal(field_type)?);
                }
                other => {
                    return Err(
                        self.syntax(attr_line, format!("unknown field attribute '{}'", other))
                    );
                }
            }
            match self.next_token()? {
                Some((Token::Symbol(','), _)) => continue,
                Some((Token::Symbol(']'), _)) => break,
                Some((token, line)) => {
                    return Err(self.syntax(line, format!("expected ',' or ']', found {:?}", token)))
                }
                None => return Err(self.syntax(self.line, "unexpected end of input in field")),
            }
        }
        self.expect_symbol(';')?;

        let (field_identifier, id_line) = field_identifier.ok_or_else(|| {
            self.syntax(
                type_line,
                format!("field '{}' is missing an id attribute", name),
            )
        })?;
        if field_identifier == 0 {
            return Err(self.syntax(id_line, "field identifiers must be strictly positive"));
        }
        if message.field(field_identifier).is_some() {
            return Err(ParseError::new(
                ParseErrorKind::DuplicateFieldId,
                id_line,
                format!(
                    "field identifier {} used twice in message '{}'",
                    field_identifier, message.name
                ),
            ));
        }

        let mut field = MetaField::new(field_identifier, field_type, name);
        field.default = default;
        field.message_type = message_type;
        Ok(field)
    }

    fn parse_literal(&mut self, field_type: TypeTag) -> Result<Literal, ParseError> {
        let (token, line) = match self.next_token()? {
            Some(pair) => pair,
            None => return Err(self.syntax(self.line, "expected literal, found end of input")),
        };

        let literal = match token {
            Token::Ident(ident) => match ident.as_str() {
                "true" => Literal::Bool(true),
                "false" => Literal::Bool(false),
                other => {
                    return Err(self.syntax(line, format!("invalid literal '{}'", other)));
                }
            },
            Token::Number(number) => {
                if number.contains(['.', 'e', 'E']) {
                    Literal::Float(number.parse::<f64>().map_err(|_| {
                        self.syntax(line, format!("invalid numeric literal '{}'", number))
                    })?)
                } else {
                    Literal::Integer(number.parse::<i64>().map_err(|_| {
                        self.syntax(line, format!("invalid numeric literal '{}'", number))
                    })?)
                }
            }
            Token::Str(value) => Literal::String(value),
            Token::Symbol(c) => {
                return Err(self.syntax(line, format!("invalid literal '{}'", c)));
            }
        };

        // The literal must fit the declared field type.
        let matches = match field_type {
            TypeTag::Bool => matches!(literal, Literal::Bool(_)),
            TypeTag::Char | TypeTag::String | TypeTag::Bytes => {
                matches!(literal, Literal::String(_))
            }
            TypeTag::Float | TypeTag::Double => {
                matches!(literal, Literal::Float(_) | Literal::Integer(_))
            }
            TypeTag::Message => false,
            _ => matches!(literal, Literal::Integer(_)),
        };
        if !matches {
            return Err(self.syntax(
                line,
                format!("default literal does not fit a '{}' field", field_type),
            ));
        }
        Ok(literal)
    }
}

/// Resolves a message type reference against previously declared messages.
///
/// Unqualified references are first looked up in the referencing message's
/// own package.
fn resolve_message_type(known: &[MetaMessage], package: &str, name: &str) -> Option<String> {
    if !name.contains('.') && !package.is_empty() {
        let qualified = format!("{}.{}", package, name);
        if known.iter().any(|m| m.name == qualified) {
            return Some(qualified);
        }
    }
    known
        .iter()
        .find(|m| m.name == name)
        .map(|m| m.name.clone())
}
