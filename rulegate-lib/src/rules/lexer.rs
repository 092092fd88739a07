//! Tokenizer for rule text.
//!
//! Words are runs of anything but whitespace and the operator characters, so IPv4/IPv6
//! literals, CIDR blocks (`10.0.0.0/8`), header names (`User-Agent`) and action labels all
//! lex as a single [`TokenKind::Word`]. A `/` only opens a regex literal at the start of a
//! token.

use std::fmt;

use super::error::{ParseError, ParseErrorKind, Position};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Word(String),
    Str(String),
    Regex(String),
    Eq,
    Tilde,
    Gt,
    Not,
    And,
    Or,
    LParen,
    RParen,
    Arrow,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Word(w) => write!(f, "'{w}'"),
            TokenKind::Str(s) => write!(f, "string {s:?}"),
            TokenKind::Regex(r) => write!(f, "regex /{r}/"),
            TokenKind::Eq => f.write_str("'='"),
            TokenKind::Tilde => f.write_str("'~'"),
            TokenKind::Gt => f.write_str("'>'"),
            TokenKind::Not => f.write_str("'!'"),
            TokenKind::And => f.write_str("'&&'"),
            TokenKind::Or => f.write_str("'||'"),
            TokenKind::LParen => f.write_str("'('"),
            TokenKind::RParen => f.write_str("')'"),
            TokenKind::Arrow => f.write_str("'=>'"),
            TokenKind::Eof => f.write_str("end of rule"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: Position,
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | '!' | '&' | '|' | '=' | '~' | '>' | '"')
}

struct Lexer<'a> {
    text: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, chars: text.char_indices().peekable(), line: 1, column: 1 }
    }

    fn position(&mut self) -> Position {
        let offset = self.chars.peek().map(|&(i, _)| i).unwrap_or(self.text.len());
        Position { offset, line: self.line, column: self.column }
    }

    fn bump(&mut self) -> Option<char> {
        let (_, c) = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn tokenize(&mut self, out: &mut Vec<Token>) -> Result<(), ParseError> {
        loop {
            while self.peek().is_some_and(char::is_whitespace) {
                self.bump();
            }
            let position = self.position();
            let Some(c) = self.bump() else {
                out.push(Token { kind: TokenKind::Eof, position });
                return Ok(());
            };
            let kind = match c {
                '(' => TokenKind::LParen,
                ')' => TokenKind::RParen,
                '!' => TokenKind::Not,
                '~' => TokenKind::Tilde,
                '>' => TokenKind::Gt,
                '=' => {
                    if self.peek() == Some('>') {
                        self.bump();
                        TokenKind::Arrow
                    } else {
                        TokenKind::Eq
                    }
                }
                '&' => self.pair('&', TokenKind::And, position)?,
                '|' => self.pair('|', TokenKind::Or, position)?,
                '"' => TokenKind::Str(self.string(position)?),
                '/' => TokenKind::Regex(self.regex(position)?),
                c => {
                    let mut word = String::from(c);
                    while let Some(next) = self.peek().filter(|&n| is_word_char(n)) {
                        word.push(next);
                        self.bump();
                    }
                    TokenKind::Word(word)
                }
            };
            out.push(Token { kind, position });
        }
    }

    fn pair(
        &mut self,
        second: char,
        kind: TokenKind,
        position: Position,
    ) -> Result<TokenKind, ParseError> {
        if self.peek() == Some(second) {
            self.bump();
            Ok(kind)
        } else {
            Err(ParseError::new(ParseErrorKind::UnexpectedChar(second), position))
        }
    }

    /// Double quoted string. `\"` and `\\` are the escapes; a backslash before any other
    /// character is dropped.
    fn string(&mut self, start: Position) -> Result<String, ParseError> {
        let mut value = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(ParseError::new(ParseErrorKind::Unterminated("string"), start))
                }
                Some('"') => return Ok(value),
                Some('\\') => match self.bump() {
                    Some(escaped) => value.push(escaped),
                    None => {
                        return Err(ParseError::new(ParseErrorKind::Unterminated("string"), start))
                    }
                },
                Some(c) => value.push(c),
            }
        }
    }

    /// Slash delimited regex. `\/` stands for a literal slash; every other escape is kept
    /// verbatim for the regex engine.
    fn regex(&mut self, start: Position) -> Result<String, ParseError> {
        let mut pattern = String::new();
        loop {
            match self.bump() {
                None => return Err(ParseError::new(ParseErrorKind::Unterminated("regex"), start)),
                Some('/') => return Ok(pattern),
                Some('\\') => match self.bump() {
                    Some('/') => pattern.push('/'),
                    Some(escaped) => {
                        pattern.push('\\');
                        pattern.push(escaped);
                    }
                    None => {
                        return Err(ParseError::new(ParseErrorKind::Unterminated("regex"), start))
                    }
                },
                Some(c) => pattern.push(c),
            }
        }
    }
}

/// Tokenize `text` into `out`, which is cleared first. The last token is always
/// [`TokenKind::Eof`].
pub fn tokenize_into(text: &str, out: &mut Vec<Token>) -> Result<(), ParseError> {
    out.clear();
    Lexer::new(text).tokenize(out)
}
