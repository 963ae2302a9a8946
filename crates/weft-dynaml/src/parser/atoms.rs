//! Collection literals, lambdas, merge directives and the bracketed
//! iteration forms (`map`, `select`, `sum`, `sync`, `catch`).

use super::{chained, levels, ParseError, TokenStream};
use crate::ast::{Expr, ExprKind, IterBody, LambdaAst, MergeSpec, Param};
use crate::lexer::Token;

/// Parse `[…]`: an empty list, a range `[a..b]`, or a list literal with
/// optional `expr...` expansions.
pub(super) fn parse_list_or_range(s: &mut TokenStream) -> Result<Expr, ParseError> {
    s.expect(Token::LBracket)?;

    if matches!(s.peek(), Some(Token::RBracket)) {
        s.advance();
        return Ok(Expr::new(ExprKind::List(Vec::new())));
    }

    if matches!(s.peek(), Some(Token::DotDot)) {
        s.advance();
        let end = if matches!(s.peek(), Some(Token::RBracket)) {
            None
        } else {
            Some(Box::new(levels::parse_expression(s)?))
        };
        s.expect(Token::RBracket)?;
        return Ok(Expr::new(ExprKind::Range { start: None, end }));
    }

    let first = parse_list_element(s)?;

    if matches!(s.peek(), Some(Token::DotDot)) {
        s.advance();
        let end = if matches!(s.peek(), Some(Token::RBracket)) {
            None
        } else {
            Some(Box::new(levels::parse_expression(s)?))
        };
        s.expect(Token::RBracket)?;
        return Ok(Expr::new(ExprKind::Range {
            start: Some(Box::new(first)),
            end,
        }));
    }

    let mut items = vec![first];
    while matches!(s.peek(), Some(Token::Comma)) {
        s.advance();
        items.push(parse_list_element(s)?);
    }
    s.expect(Token::RBracket)?;
    Ok(Expr::new(ExprKind::List(items)))
}

fn parse_list_element(s: &mut TokenStream) -> Result<Expr, ParseError> {
    let expr = levels::parse_expression(s)?;
    if matches!(s.peek(), Some(Token::Ellipsis)) && !s.gap_before() {
        s.advance();
        return Ok(Expr::new(ExprKind::Expansion(Box::new(expr))));
    }
    Ok(expr)
}

/// Parse `{ k = v, … }`.
pub(super) fn parse_map_literal(s: &mut TokenStream) -> Result<Expr, ParseError> {
    s.expect(Token::LBrace)?;
    let mut entries = Vec::new();
    if !matches!(s.peek(), Some(Token::RBrace)) {
        loop {
            let key = levels::parse_expression(s)?;
            s.expect(Token::Eq)?;
            let value = levels::parse_expression(s)?;
            entries.push((key, value));
            if matches!(s.peek(), Some(Token::Comma)) {
                s.advance();
            } else {
                break;
            }
        }
    }
    s.expect(Token::RBrace)?;
    Ok(Expr::new(ExprKind::MapLit(entries)))
}

/// Parse a lambda's `|params|->body` tail (the `lambda` keyword, when
/// present, has been consumed by the caller).
pub(super) fn parse_lambda_tail(s: &mut TokenStream) -> Result<LambdaAst, ParseError> {
    s.expect(Token::Pipe)?;
    let mut params = Vec::new();
    let mut varargs = false;

    if !matches!(s.peek(), Some(Token::Pipe)) {
        loop {
            let at = s.position();
            let name = match s.advance() {
                Some(Token::Ident(name)) => name.clone(),
                other => {
                    return Err(ParseError::unexpected_token(other, "as parameter name", at))
                }
            };
            let default = if matches!(s.peek(), Some(Token::Eq)) {
                s.advance();
                Some(levels::parse_expression(s)?)
            } else {
                None
            };
            params.push(Param { name, default });
            if matches!(s.peek(), Some(Token::Ellipsis)) {
                s.advance();
                varargs = true;
                break;
            }
            if matches!(s.peek(), Some(Token::Comma)) {
                s.advance();
            } else {
                break;
            }
        }
    }

    s.expect(Token::Pipe)?;
    s.expect(Token::Arrow)?;
    let body = levels::parse_expression(s)?;
    Ok(LambdaAst {
        params,
        varargs,
        body: Box::new(body),
    })
}

/// Parse the `x,y|body` iteration section of the bracketed forms. An
/// optional `->` after the parameter pipe keeps arrow-style bodies
/// working as well.
fn parse_iter_body(s: &mut TokenStream) -> Result<IterBody, ParseError> {
    let mut params = Vec::new();
    loop {
        let at = s.position();
        let name = match s.advance() {
            Some(Token::Ident(name)) => name.clone(),
            other => {
                return Err(ParseError::unexpected_token(
                    other,
                    "as iteration parameter",
                    at,
                ))
            }
        };
        params.push(name);
        if matches!(s.peek(), Some(Token::Comma)) {
            s.advance();
        } else {
            break;
        }
    }
    s.expect(Token::Pipe)?;
    if matches!(s.peek(), Some(Token::Arrow)) {
        s.advance();
    }
    let body = levels::parse_expression(s)?;
    Ok(IterBody {
        params,
        body: Box::new(body),
    })
}

/// `map[src|x,y|body]` or `map{src|x,y|body}`.
pub(super) fn parse_mapping(s: &mut TokenStream) -> Result<Expr, ParseError> {
    s.expect(Token::Map)?;
    let (close, to_map) = open_form(s)?;
    let source = levels::parse_expression(s)?;
    s.expect(Token::Pipe)?;
    let body = parse_iter_body(s)?;
    s.expect(close)?;
    Ok(Expr::new(ExprKind::Mapping {
        source: Box::new(source),
        to_map,
        body,
    }))
}

/// `select[src|x,y|body]` or `select{src|x,y|body}`.
pub(super) fn parse_selection(s: &mut TokenStream) -> Result<Expr, ParseError> {
    s.expect(Token::Select)?;
    let (close, to_map) = open_form(s)?;
    let source = levels::parse_expression(s)?;
    s.expect(Token::Pipe)?;
    let body = parse_iter_body(s)?;
    s.expect(close)?;
    Ok(Expr::new(ExprKind::Selection {
        source: Box::new(source),
        to_map,
        body,
    }))
}

fn open_form(s: &mut TokenStream) -> Result<(Token, bool), ParseError> {
    match s.peek() {
        Some(Token::LBracket) => {
            s.advance();
            Ok((Token::RBracket, false))
        }
        Some(Token::LBrace) => {
            s.advance();
            Ok((Token::RBrace, true))
        }
        other => Err(ParseError::unexpected_token(
            other,
            "after iteration keyword",
            s.position(),
        )),
    }
}

/// `sum[src|init|acc,x|body]`.
pub(super) fn parse_fold(s: &mut TokenStream) -> Result<Expr, ParseError> {
    s.expect(Token::Sum)?;
    s.expect(Token::LBracket)?;
    let source = levels::parse_expression(s)?;
    s.expect(Token::Pipe)?;
    let init = levels::parse_expression(s)?;
    s.expect(Token::Pipe)?;
    let body = parse_iter_body(s)?;
    s.expect(Token::RBracket)?;
    Ok(Expr::new(ExprKind::Fold {
        source: Box::new(source),
        init: Box::new(init),
        body,
    }))
}

/// `sync[expr|v|cond(|value)(,timeout)]`.
pub(super) fn parse_sync(s: &mut TokenStream) -> Result<Expr, ParseError> {
    s.expect(Token::Sync)?;
    s.expect(Token::LBracket)?;
    let expr = levels::parse_expression(s)?;
    s.expect(Token::Pipe)?;
    let cond = parse_iter_body(s)?;
    let value = if matches!(s.peek(), Some(Token::Pipe)) {
        s.advance();
        if matches!(s.peek(), Some(Token::Arrow)) {
            s.advance();
        }
        let body = levels::parse_expression(s)?;
        Some(IterBody {
            params: cond.params.clone(),
            body: Box::new(body),
        })
    } else {
        None
    };
    let timeout = if matches!(s.peek(), Some(Token::Comma)) {
        s.advance();
        Some(Box::new(levels::parse_expression(s)?))
    } else {
        None
    };
    s.expect(Token::RBracket)?;
    Ok(Expr::new(ExprKind::Sync {
        expr: Box::new(expr),
        cond,
        value,
        timeout,
    }))
}

/// `catch[expr]` or `catch[expr|e|handler]`.
pub(super) fn parse_catch(s: &mut TokenStream) -> Result<Expr, ParseError> {
    s.expect(Token::Catch)?;
    s.expect(Token::LBracket)?;
    let expr = levels::parse_expression(s)?;
    let handler = if matches!(s.peek(), Some(Token::Pipe)) {
        s.advance();
        Some(parse_iter_body(s)?)
    } else {
        None
    };
    s.expect(Token::RBracket)?;
    Ok(Expr::new(ExprKind::Catch {
        expr: Box::new(expr),
        handler,
    }))
}

/// Merge directive: `merge`, `merge replace`, `merge required`,
/// `merge on NAME`, each optionally followed by a redirect reference.
/// `merge(` never reaches this function — that is a call.
pub(super) fn parse_merge_directive(s: &mut TokenStream) -> Result<Expr, ParseError> {
    s.expect(Token::Merge)?;
    let mut spec = MergeSpec::plain();

    match s.peek() {
        Some(Token::Ident(word)) if word == "replace" => {
            s.advance();
            spec.replace = true;
        }
        Some(Token::Ident(word)) if word == "required" => {
            s.advance();
            spec.required = true;
        }
        Some(Token::Ident(word)) if word == "on" => {
            s.advance();
            let at = s.position();
            match s.advance() {
                Some(Token::Ident(name)) => spec.key = Some(name.clone()),
                other => {
                    return Err(ParseError::unexpected_token(other, "as merge key", at));
                }
            }
        }
        _ => {}
    }

    // `merge [replace|on k] some.path` redirects the stub lookup.
    if !spec.required && matches!(s.peek(), Some(Token::Ident(_)) | Some(Token::Dot)) {
        let at = s.position();
        let target = chained::parse_chained(s)?;
        match target.kind {
            ExprKind::Ref(path) => spec.redirect = Some(path),
            _ => {
                return Err(ParseError::invalid_syntax(
                    "merge redirect must be a reference",
                    at,
                ));
            }
        }
    }

    Ok(Expr::new(ExprKind::Merge(spec)))
}
