//! Token stream wrapper for the hand-written parser.

use crate::lexer::Token;
use std::ops::Range;

/// Token stream with lookahead, backtracking and gap tracking.
///
/// DynaML concatenation is juxtaposition and several forms change meaning
/// with adjacency (`merge(` vs `merge (`), so the stream keeps the source
/// text and byte spans: `gap_before` reports whether whitespace separated
/// the previous token from the current one.
pub struct TokenStream<'src> {
    src: &'src str,
    tokens: &'src [(Token, Range<usize>)],
    pos: usize,
}

impl<'src> TokenStream<'src> {
    pub fn new(src: &'src str, tokens: &'src [(Token, Range<usize>)]) -> Self {
        Self {
            src,
            tokens,
            pos: 0,
        }
    }

    /// Peek at the current token without consuming it.
    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(tok, _)| tok)
    }

    /// Peek at the nth token ahead without consuming.
    pub fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|(tok, _)| tok)
    }

    /// Advance to the next token and return the consumed one.
    pub fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos).map(|(tok, _)| tok);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Check whether the current token matches (by discriminant).
    pub fn check(&self, expected: &Token) -> bool {
        matches!(self.peek(), Some(t) if std::mem::discriminant(t) == std::mem::discriminant(expected))
    }

    /// Expect a specific token and advance past it.
    pub fn expect(&mut self, expected: Token) -> Result<(), super::ParseError> {
        if self.check(&expected) {
            self.advance();
            Ok(())
        } else {
            Err(super::ParseError::expected_token(
                &expected,
                self.peek(),
                self.position(),
            ))
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Current position for save/restore backtracking.
    pub fn mark(&self) -> usize {
        self.pos
    }

    /// Restore a position previously returned by `mark`.
    pub fn reset(&mut self, mark: usize) {
        self.pos = mark;
    }

    /// Whether whitespace separates the previous token from the current
    /// one. The start of input counts as a gap.
    pub fn gap_before(&self) -> bool {
        self.gap_before_nth(0)
    }

    /// Whether whitespace separates token `pos + n - 1` from `pos + n`.
    pub fn gap_before_nth(&self, n: usize) -> bool {
        let idx = self.pos + n;
        if idx == 0 {
            return true;
        }
        match (self.tokens.get(idx - 1), self.tokens.get(idx)) {
            (Some((_, prev)), Some((_, cur))) => prev.end != cur.start,
            // At EOF the question is moot; report a gap.
            _ => true,
        }
    }

    /// Byte span of the nth token ahead.
    pub fn span_nth(&self, n: usize) -> Option<Range<usize>> {
        self.tokens.get(self.pos + n).map(|(_, span)| span.clone())
    }

    /// Source text covered by a byte range.
    pub fn src_slice(&self, range: Range<usize>) -> &'src str {
        &self.src[range]
    }

    /// Byte span of the current token (or the end of input).
    pub fn current_span(&self) -> Range<usize> {
        match self.tokens.get(self.pos) {
            Some((_, span)) => span.clone(),
            None => self.src.len()..self.src.len(),
        }
    }

    /// Source text of the current token.
    pub fn current_slice(&self) -> &'src str {
        let span = self.current_span();
        &self.src[span]
    }

    /// (line, column) of the current token, both 1-based.
    pub fn position(&self) -> (usize, usize) {
        self.line_col(self.current_span().start)
    }

    /// (line, column) for a byte offset, both 1-based.
    pub fn line_col(&self, byte: usize) -> (usize, usize) {
        line_col(self.src, byte)
    }
}

/// Compute the 1-based (line, column) of a byte offset in `src`.
pub fn line_col(src: &str, byte: usize) -> (usize, usize) {
    let byte = byte.min(src.len());
    let mut line = 1;
    let mut col = 1;
    for (i, c) in src.char_indices() {
        if i >= byte {
            break;
        }
        if c == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}
