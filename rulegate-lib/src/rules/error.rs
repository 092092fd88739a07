use std::fmt;
use thiserror::Error;

use crate::net::CidrError;

/// Location in rule text. `line` and `column` are 1-based, `offset` is a byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Malformed rule text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at {position}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub position: Position,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, position: Position) -> Self {
        Self { kind, position }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("unexpected {found}, expected {expected}")]
    Unexpected { found: String, expected: &'static str },

    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),

    #[error("unterminated {0} literal")]
    Unterminated(&'static str),

    #[error("invalid IP address '{0}'")]
    InvalidAddress(String),

    #[error("{0}")]
    InvalidCidr(#[from] CidrError),

    #[error("invalid regular expression /{pattern}/: {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("invalid hit count '{0}'")]
    InvalidNumber(String),

    #[error("rule nested deeper than {0} levels")]
    TooDeep(usize),
}
