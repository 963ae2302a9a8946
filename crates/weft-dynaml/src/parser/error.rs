//! Parse errors with source location.

use crate::lexer::Token;
use std::fmt;

/// Parse error with 1-based line/column and a human-readable message.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

/// Category of parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A specific token was expected but something else was found.
    UnexpectedToken,
    /// Input ended while a construct was incomplete.
    UnexpectedEof,
    /// Tokens are present but violate the grammar.
    InvalidSyntax,
}

impl ParseError {
    pub fn expected_token(expected: &Token, found: Option<&Token>, at: (usize, usize)) -> Self {
        let message = match found {
            Some(token) => format!("expected {:?}, found {:?}", expected, token),
            None => format!("expected {:?}, found end of input", expected),
        };
        Self {
            kind: if found.is_none() {
                ParseErrorKind::UnexpectedEof
            } else {
                ParseErrorKind::UnexpectedToken
            },
            line: at.0,
            column: at.1,
            message,
        }
    }

    pub fn unexpected_token(found: Option<&Token>, context: &str, at: (usize, usize)) -> Self {
        let message = match found {
            Some(token) => format!("unexpected {:?} {}", token, context),
            None => format!("unexpected end of input {}", context),
        };
        Self {
            kind: if found.is_none() {
                ParseErrorKind::UnexpectedEof
            } else {
                ParseErrorKind::UnexpectedToken
            },
            line: at.0,
            column: at.1,
            message,
        }
    }

    pub fn invalid_syntax(message: impl Into<String>, at: (usize, usize)) -> Self {
        Self {
            kind: ParseErrorKind::InvalidSyntax,
            line: at.0,
            column: at.1,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (line {}, column {})",
            self.message, self.line, self.column
        )
    }
}

impl std::error::Error for ParseError {}
