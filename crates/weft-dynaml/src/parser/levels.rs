//! Precedence-climbing core for DynaML's eight expression levels.
//!
//! From loosest to tightest binding:
//! L7 alternative (`||`, `//`), L6 conditional (`? :`), L5 concatenation
//! (juxtaposition), L4 logical (`-and`, `-or`), L3 comparison, L2 additive,
//! L1 multiplicative, L0 unary and primaries.
//!
//! DynaML requires whitespace after binary operator symbols (`a + b`, not
//! `a +b` — the latter reads as concatenation with a signed number), which
//! the level loops enforce through the stream's gap tracking.

use super::{chained, ParseError, TokenStream};
use crate::ast::{BinaryOp, Expr, ExprKind, Marker};
use crate::lexer::Token;

/// Parse a full expression: a scoped expression, a bare lambda, or L7.
pub(super) fn parse_expression(s: &mut TokenStream) -> Result<Expr, ParseError> {
    if matches!(s.peek(), Some(Token::LParen)) {
        if let Some(scoped) = try_parse_scoped(s)? {
            return Ok(scoped);
        }
    }
    if matches!(s.peek(), Some(Token::Pipe)) {
        let ast = super::atoms::parse_lambda_tail(s)?;
        return Ok(Expr::new(ExprKind::Lambda(ast)));
    }
    parse_l7(s)
}

/// Top-level entry: `prefer expr`, a marked expression, or a plain one.
pub(super) fn parse_dynaml(s: &mut TokenStream) -> Result<Expr, ParseError> {
    match s.peek() {
        Some(Token::Prefer) => {
            s.advance();
            let inner = parse_expression(s)?;
            Ok(Expr::new(ExprKind::Prefer(Box::new(inner))))
        }
        Some(Token::Amp) => parse_marked(s),
        _ => parse_expression(s),
    }
}

/// Parse `&marker…` followed by an optional parenthesized expression.
fn parse_marked(s: &mut TokenStream) -> Result<Expr, ParseError> {
    let mut markers = Vec::new();
    while matches!(s.peek(), Some(Token::Amp)) {
        s.advance();
        markers.push(parse_marker(s)?);
    }
    let expr = if matches!(s.peek(), Some(Token::LParen)) {
        s.advance();
        let inner = parse_expression(s)?;
        s.expect(Token::RParen)?;
        Some(Box::new(inner))
    } else if s.at_end() {
        None
    } else {
        return Err(ParseError::invalid_syntax(
            "marker expression must be parenthesized",
            s.position(),
        ));
    };
    Ok(Expr::new(ExprKind::Marked { markers, expr }))
}

fn parse_marker(s: &mut TokenStream) -> Result<Marker, ParseError> {
    let at = s.position();
    if s.gap_before() {
        return Err(ParseError::invalid_syntax(
            "marker name must follow '&' directly",
            at,
        ));
    }
    let name = match s.advance() {
        Some(Token::Ident(name)) => name.clone(),
        other => return Err(ParseError::unexpected_token(other, "as marker name", at)),
    };
    match name.as_str() {
        "temporary" => Ok(Marker::Temporary),
        "local" => Ok(Marker::Local),
        "state" => Ok(Marker::State),
        "inject" => Ok(Marker::Inject),
        "default" => Ok(Marker::Default),
        "dynamic" => Ok(Marker::Dynamic),
        "template" => Ok(Marker::Template),
        "tag" => {
            s.expect(Token::Colon)?;
            let global = if matches!(s.peek(), Some(Token::Star)) {
                s.advance();
                true
            } else {
                false
            };
            let tag_at = s.position();
            match s.advance() {
                Some(Token::Ident(tag)) => Ok(Marker::Tag {
                    name: tag.clone(),
                    global,
                }),
                other => Err(ParseError::unexpected_token(other, "as tag name", tag_at)),
            }
        }
        other => Err(ParseError::invalid_syntax(
            format!("unknown marker '&{}'", other),
            at,
        )),
    }
}

/// Speculatively parse `( a=1, b=2 ) body`. Returns `None` (with the
/// stream reset) when the parentheses turn out to be grouping.
fn try_parse_scoped(s: &mut TokenStream) -> Result<Option<Expr>, ParseError> {
    let mark = s.mark();
    s.advance(); // '('

    let mut decls = Vec::new();
    if matches!(s.peek(), Some(Token::RParen)) {
        s.advance();
    } else {
        let first = match parse_expression(s) {
            Ok(expr) => expr,
            Err(_) => {
                s.reset(mark);
                return Ok(None);
            }
        };
        if !matches!(s.peek(), Some(Token::Eq)) {
            s.reset(mark);
            return Ok(None);
        }
        s.advance();
        let value = parse_expression(s)?;
        decls.push((first, value));
        while matches!(s.peek(), Some(Token::Comma)) {
            s.advance();
            let key = parse_expression(s)?;
            s.expect(Token::Eq)?;
            let value = parse_expression(s)?;
            decls.push((key, value));
        }
        s.expect(Token::RParen)?;
    }

    // A scope must be followed by its body expression.
    if s.at_end() {
        s.reset(mark);
        return Ok(None);
    }
    let body = parse_expression(s)?;
    Ok(Some(Expr::new(ExprKind::Scoped {
        decls,
        body: Box::new(body),
    })))
}

fn parse_l7(s: &mut TokenStream) -> Result<Expr, ParseError> {
    let mut left = parse_l6(s)?;
    while matches!(s.peek(), Some(Token::Alt)) {
        s.advance();
        let right = parse_l6(s)?;
        left = Expr::new(ExprKind::Alt {
            left: Box::new(left),
            right: Box::new(right),
        });
    }
    Ok(left)
}

fn parse_l6(s: &mut TokenStream) -> Result<Expr, ParseError> {
    let cond = parse_l5(s)?;
    if matches!(s.peek(), Some(Token::Question)) {
        s.advance();
        let then = parse_expression(s)?;
        s.expect(Token::Colon)?;
        let otherwise = parse_expression(s)?;
        return Ok(Expr::new(ExprKind::Cond {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }));
    }
    Ok(cond)
}

fn parse_l5(s: &mut TokenStream) -> Result<Expr, ParseError> {
    let mut left = parse_l4(s)?;
    while s.gap_before() && starts_operand(s.peek()) {
        let right = parse_l4(s)?;
        left = Expr::new(ExprKind::Concat {
            left: Box::new(left),
            right: Box::new(right),
        });
    }
    Ok(left)
}

/// Tokens that can begin an L4 operand — the continuation test for
/// concatenation-by-juxtaposition.
fn starts_operand(token: Option<&Token>) -> bool {
    matches!(
        token,
        Some(
            Token::Ident(_)
                | Token::Integer(_)
                | Token::Float(_)
                | Token::Str(_)
                | Token::True
                | Token::False
                | Token::Nil
                | Token::Tilde
                | Token::Undef
                | Token::Dollar
                | Token::LParen
                | Token::LBracket
                | Token::LBrace
                | Token::Bang
                | Token::Star
                | Token::Dot
                | Token::Merge
                | Token::Auto
                | Token::Lambda
                | Token::Map
                | Token::Select
                | Token::Sum
                | Token::Sync
                | Token::Catch
        )
    )
}

fn parse_l4(s: &mut TokenStream) -> Result<Expr, ParseError> {
    let mut left = parse_l3(s)?;
    loop {
        let op = match s.peek() {
            Some(Token::LogAnd) => BinaryOp::And,
            Some(Token::LogOr) => BinaryOp::Or,
            _ => break,
        };
        if !s.gap_before_nth(1) {
            break;
        }
        s.advance();
        let right = parse_l3(s)?;
        left = Expr::new(ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        });
    }
    Ok(left)
}

fn parse_l3(s: &mut TokenStream) -> Result<Expr, ParseError> {
    let mut left = parse_l2(s)?;
    loop {
        let op = match s.peek() {
            Some(Token::EqEq) => BinaryOp::Eq,
            Some(Token::BangEq) => BinaryOp::Ne,
            Some(Token::LtEq) => BinaryOp::Le,
            Some(Token::GtEq) => BinaryOp::Ge,
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Gt) => BinaryOp::Gt,
            _ => break,
        };
        if !s.gap_before_nth(1) {
            break;
        }
        s.advance();
        let right = parse_l2(s)?;
        left = Expr::new(ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        });
    }
    Ok(left)
}

fn parse_l2(s: &mut TokenStream) -> Result<Expr, ParseError> {
    let mut left = parse_l1(s)?;
    loop {
        let op = match s.peek() {
            Some(Token::Plus) => BinaryOp::Add,
            Some(Token::Minus) => BinaryOp::Sub,
            _ => break,
        };
        if !s.gap_before_nth(1) {
            break;
        }
        s.advance();
        let right = parse_l1(s)?;
        left = Expr::new(ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        });
    }
    Ok(left)
}

fn parse_l1(s: &mut TokenStream) -> Result<Expr, ParseError> {
    let mut left = parse_l0(s)?;
    loop {
        let op = match s.peek() {
            Some(Token::Star) => BinaryOp::Mul,
            Some(Token::Slash) => BinaryOp::Div,
            Some(Token::Percent) => BinaryOp::Mod,
            _ => break,
        };
        if !s.gap_before_nth(1) {
            break;
        }
        s.advance();
        let right = parse_l0(s)?;
        left = Expr::new(ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        });
    }
    Ok(left)
}

fn parse_l0(s: &mut TokenStream) -> Result<Expr, ParseError> {
    match s.peek() {
        Some(Token::Bang) => {
            s.advance();
            let operand = parse_l0(s)?;
            Ok(Expr::new(ExprKind::Not(Box::new(operand))))
        }
        // Prefix `*expr` is template substitution; `x *(…)` currying is
        // handled postfix in the chained parser.
        Some(Token::Star) => {
            s.advance();
            let operand = parse_l0(s)?;
            Ok(Expr::new(ExprKind::Subst(Box::new(operand))))
        }
        Some(Token::Lambda) => {
            s.advance();
            if matches!(s.peek(), Some(Token::Pipe)) {
                let ast = super::atoms::parse_lambda_tail(s)?;
                Ok(Expr::new(ExprKind::Lambda(ast)))
            } else {
                let operand = parse_expression(s)?;
                Ok(Expr::new(ExprKind::LambdaRef(Box::new(operand))))
            }
        }
        _ => chained::parse_chained(s),
    }
}
