//! Hand-written recursive descent parser for DynaML.
//!
//! ## Architecture
//!
//! - `stream`: token stream with lookahead, backtracking and gap tracking
//! - `error`: ParseError with line/column
//! - `levels`: precedence climbing over the eight expression levels
//! - `chained`: primaries and postfix chains (refs, calls, projections)
//! - `atoms`: collection literals, lambdas, directives, bracket forms
//!
//! Document scalars enter through [`scan_scalar`], which detects whole
//! `(( … ))` expressions, `((! … ))` escapes and — when interpolation is
//! enabled — embedded expression segments inside plain strings.

mod atoms;
mod chained;
mod error;
mod levels;
mod stream;

pub use error::{ParseError, ParseErrorKind};
use stream::TokenStream;

use crate::ast::{Expr, ExprKind};
use crate::lexer;

/// Parse a complete DynaML expression (markers and `prefer` allowed).
pub fn parse_expression(text: &str) -> Result<Expr, ParseError> {
    let tokens = lexer::tokenize(text).map_err(|byte| {
        let at = stream::line_col(text, byte);
        ParseError::invalid_syntax("unrecognized input", at)
    })?;
    if tokens.is_empty() {
        return Err(ParseError::invalid_syntax("empty expression", (1, 1)));
    }
    let mut s = TokenStream::new(text, &tokens);
    let expr = levels::parse_dynaml(&mut s)?;
    if !s.at_end() {
        return Err(ParseError::invalid_syntax(
            "unexpected trailing input",
            s.position(),
        ));
    }
    Ok(expr)
}

/// Result of scanning a document scalar for expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarScan {
    /// Plain text, possibly with escapes unquoted.
    Literal(String),
    /// The scalar is (or contains) DynaML to evaluate.
    Expression(Expr),
}

/// Scan a document string scalar.
///
/// A scalar that is exactly `(( expr ))` yields that expression. The
/// `((! … ))` form escapes evaluation: one escape level is stripped
/// unless `preserve_escapes` is set. With `interpolation` enabled,
/// embedded `(( … ))` segments inside a longer string produce a
/// concatenation expression.
pub fn scan_scalar(
    text: &str,
    interpolation: bool,
    preserve_escapes: bool,
) -> Result<ScalarScan, ParseError> {
    let trimmed = text.trim();

    if trimmed.starts_with("((!") && trimmed.ends_with("))") {
        let literal = if preserve_escapes {
            text.to_string()
        } else {
            text.replacen("((!", "((", 1)
        };
        return Ok(ScalarScan::Literal(literal));
    }

    if trimmed.starts_with("((") {
        if let Some(end) = find_expr_end(trimmed, 0) {
            if end == trimmed.len() {
                let inner = &trimmed[2..trimmed.len() - 2];
                return Ok(ScalarScan::Expression(parse_expression(inner)?));
            }
        }
    }

    if interpolation && text.contains("((") {
        return scan_interpolated(text, preserve_escapes);
    }

    Ok(ScalarScan::Literal(text.to_string()))
}

fn scan_interpolated(text: &str, preserve_escapes: bool) -> Result<ScalarScan, ParseError> {
    let mut parts: Vec<Expr> = Vec::new();
    let mut any_expr = false;
    let mut i = 0usize;

    while let Some(found) = text[i..].find("((") {
        let abs = i + found;
        if abs > i {
            parts.push(Expr::new(ExprKind::Str(text[i..abs].to_string())));
        }
        let end = match find_expr_end(text, abs) {
            Some(end) => end,
            None => {
                // Unterminated segment: keep the rest literal.
                parts.push(Expr::new(ExprKind::Str(text[abs..].to_string())));
                i = text.len();
                break;
            }
        };
        if text[abs..].starts_with("((!") {
            let segment = if preserve_escapes {
                text[abs..end].to_string()
            } else {
                text[abs..end].replacen("((!", "((", 1)
            };
            parts.push(Expr::new(ExprKind::Str(segment)));
        } else {
            let inner = &text[abs + 2..end - 2];
            parts.push(parse_expression(inner)?);
            any_expr = true;
        }
        i = end;
    }
    if i < text.len() {
        parts.push(Expr::new(ExprKind::Str(text[i..].to_string())));
    }

    if !any_expr {
        return Ok(ScalarScan::Literal(text.to_string()));
    }
    let mut iter = parts.into_iter();
    let mut expr = match iter.next() {
        Some(first) => first,
        None => Expr::new(ExprKind::Str(String::new())),
    };
    for part in iter {
        expr = Expr::new(ExprKind::Concat {
            left: Box::new(expr),
            right: Box::new(part),
        });
    }
    Ok(ScalarScan::Expression(expr))
}

/// Find the byte offset just past the `))` matching the `((` at `start`,
/// skipping over string literals.
fn find_expr_end(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    let mut i = start;
    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
        } else {
            match b {
                b'"' => in_string = true,
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i + 1);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}
