//! Primaries and postfix chains: references, calls, currying, dynamic
//! indices, slices and projections.
//!
//! Postfix continuation requires adjacency — `x[0]` indexes while `x [0]`
//! concatenates — so every loop here consults the stream's gap tracking.

use super::{atoms, levels, ParseError, TokenStream};
use crate::ast::{Arg, Expr, ExprKind, PathSeg, RefPath, RefQualifier};
use crate::lexer::{keyword_key, Token};

/// Parse a primary expression followed by its postfix chain.
pub(super) fn parse_chained(s: &mut TokenStream) -> Result<Expr, ParseError> {
    let mut expr = parse_primary(s)?;

    loop {
        if s.gap_before() {
            break;
        }
        match s.peek() {
            Some(Token::LParen) => {
                let args = parse_call_args(s)?;
                expr = Expr::new(ExprKind::Call {
                    callee: Box::new(expr),
                    args,
                });
            }
            Some(Token::Star)
                if matches!(s.peek_nth(1), Some(Token::LParen)) && !s.gap_before_nth(1) =>
            {
                s.advance();
                let args = parse_call_args(s)?;
                expr = Expr::new(ExprKind::Curry {
                    callee: Box::new(expr),
                    args,
                });
            }
            Some(Token::Dot) => {
                if matches!(s.peek_nth(1), Some(Token::LBracket)) && !s.gap_before_nth(1) {
                    s.advance();
                    expr = parse_bracket_postfix(s, expr)?;
                } else {
                    s.advance();
                    if s.gap_before() {
                        return Err(ParseError::invalid_syntax(
                            "path component must follow '.' directly",
                            s.position(),
                        ));
                    }
                    let segs = parse_key_component(s)?;
                    expr = append_path(expr, segs);
                }
            }
            Some(Token::LBracket) => {
                expr = parse_bracket_postfix(s, expr)?;
            }
            _ => break,
        }
    }

    Ok(expr)
}

/// Append static path steps to a reference, or fall back to dynamic
/// indexing for computed bases (`f(x).key`).
fn append_path(base: Expr, segs: Vec<PathSeg>) -> Expr {
    match base.kind {
        ExprKind::Ref(mut path) => {
            path.segments.extend(segs);
            Expr::new(ExprKind::Ref(path))
        }
        _ => {
            let mut expr = base;
            for seg in segs {
                let index = match seg {
                    PathSeg::Key(k) => Expr::new(ExprKind::Str(k)),
                    PathSeg::Index(i) => Expr::new(ExprKind::Int(i)),
                };
                expr = Expr::new(ExprKind::DynRef {
                    base: Box::new(expr),
                    index: Box::new(index),
                });
            }
            expr
        }
    }
}

/// Parse one path component after a consumed `.`.
///
/// A float token covers two numeric components at once (`foo.0.1` lexes
/// the tail as `0.1`), so this can return more than one step.
fn parse_key_component(s: &mut TokenStream) -> Result<Vec<PathSeg>, ParseError> {
    let at = s.position();
    match s.peek() {
        Some(Token::Ident(_)) => {
            let key = parse_key(s)?;
            Ok(vec![PathSeg::Key(key)])
        }
        Some(tok) if keyword_key(tok).is_some() => {
            let key = parse_key(s)?;
            Ok(vec![PathSeg::Key(key)])
        }
        Some(Token::Integer(n)) if *n >= 0 => {
            let n = *n;
            s.advance();
            Ok(vec![PathSeg::Index(n)])
        }
        Some(Token::Float(_)) => {
            let text = s.current_slice().to_string();
            s.advance();
            let mut segs = Vec::new();
            for part in text.split('.') {
                match part.parse::<i64>() {
                    Ok(n) => segs.push(PathSeg::Index(n)),
                    Err(_) => {
                        return Err(ParseError::invalid_syntax(
                            format!("invalid path component '{}'", part),
                            at,
                        ))
                    }
                }
            }
            Ok(segs)
        }
        other => Err(ParseError::unexpected_token(other, "after '.'", at)),
    }
}

/// Parse a reference key, joining adjacent `a:b` colon forms.
fn parse_key(s: &mut TokenStream) -> Result<String, ParseError> {
    let at = s.position();
    let mut key = match s.advance() {
        Some(Token::Ident(name)) => name.clone(),
        Some(tok) => match keyword_key(tok) {
            Some(k) => k.to_string(),
            None => {
                let tok = tok.clone();
                return Err(ParseError::unexpected_token(Some(&tok), "as key", at));
            }
        },
        None => return Err(ParseError::unexpected_token(None, "as key", at)),
    };
    if matches!(s.peek(), Some(Token::Colon))
        && !s.gap_before()
        && matches!(s.peek_nth(1), Some(Token::Ident(_)))
        && !s.gap_before_nth(1)
    {
        s.advance();
        if let Some(Token::Ident(suffix)) = s.advance() {
            key.push(':');
            key.push_str(suffix);
        }
    }
    Ok(key)
}

/// Postfix `[…]`: projection (`[*]`), slice (`[a..b]`), static index
/// (`[0]` on a reference) or dynamic index (`[expr]`).
fn parse_bracket_postfix(s: &mut TokenStream, base: Expr) -> Result<Expr, ParseError> {
    s.expect(Token::LBracket)?;

    // Projection: [*] followed by per-element path steps.
    if matches!(s.peek(), Some(Token::Star)) && matches!(s.peek_nth(1), Some(Token::RBracket)) {
        s.advance();
        s.advance();
        let follow = parse_projection_follow(s)?;
        return Ok(Expr::new(ExprKind::Projection {
            base: Box::new(base),
            follow,
        }));
    }

    // Slice with open start: [..end]
    if matches!(s.peek(), Some(Token::DotDot)) {
        s.advance();
        let end = if matches!(s.peek(), Some(Token::RBracket)) {
            None
        } else {
            Some(Box::new(levels::parse_expression(s)?))
        };
        s.expect(Token::RBracket)?;
        return Ok(Expr::new(ExprKind::Slice {
            base: Box::new(base),
            start: None,
            end,
        }));
    }

    let index = levels::parse_expression(s)?;

    if matches!(s.peek(), Some(Token::DotDot)) {
        s.advance();
        let end = if matches!(s.peek(), Some(Token::RBracket)) {
            None
        } else {
            Some(Box::new(levels::parse_expression(s)?))
        };
        s.expect(Token::RBracket)?;
        return Ok(Expr::new(ExprKind::Slice {
            base: Box::new(base),
            start: Some(Box::new(index)),
            end,
        }));
    }

    s.expect(Token::RBracket)?;

    // A literal integer index on a reference stays a static path step.
    if let (ExprKind::Ref(_), ExprKind::Int(n)) = (&base.kind, &index.kind) {
        let n = *n;
        return Ok(append_path(base, vec![PathSeg::Index(n)]));
    }

    Ok(Expr::new(ExprKind::DynRef {
        base: Box::new(base),
        index: Box::new(index),
    }))
}

/// Per-element steps after `[*]`: `.key` and `[idx]`.
fn parse_projection_follow(s: &mut TokenStream) -> Result<Vec<PathSeg>, ParseError> {
    let mut follow = Vec::new();
    loop {
        if s.gap_before() {
            break;
        }
        match s.peek() {
            Some(Token::Dot)
                if !matches!(s.peek_nth(1), Some(Token::LBracket)) =>
            {
                s.advance();
                follow.extend(parse_key_component(s)?);
            }
            Some(Token::LBracket) => {
                if let (Some(Token::Integer(n)), Some(Token::RBracket)) =
                    (s.peek_nth(1), s.peek_nth(2))
                {
                    let n = *n;
                    s.advance();
                    s.advance();
                    s.advance();
                    follow.push(PathSeg::Index(n));
                } else {
                    break;
                }
            }
            _ => break,
        }
    }
    Ok(follow)
}

/// Parse call arguments: `(a, k=v, rest...)`.
pub(super) fn parse_call_args(s: &mut TokenStream) -> Result<Vec<Arg>, ParseError> {
    s.expect(Token::LParen)?;
    let mut args = Vec::new();
    while !matches!(s.peek(), Some(Token::RParen)) {
        let name = if let (Some(Token::Ident(n)), Some(Token::Eq)) = (s.peek(), s.peek_nth(1)) {
            let n = n.clone();
            s.advance();
            s.advance();
            Some(n)
        } else {
            None
        };
        let expr = levels::parse_expression(s)?;
        let expand = if matches!(s.peek(), Some(Token::Ellipsis)) && !s.gap_before() {
            s.advance();
            true
        } else {
            false
        };
        args.push(Arg { name, expr, expand });
        if !matches!(s.peek(), Some(Token::RParen)) {
            s.expect(Token::Comma)?;
        }
    }
    s.expect(Token::RParen)?;
    Ok(args)
}

/// Parse a primary expression.
fn parse_primary(s: &mut TokenStream) -> Result<Expr, ParseError> {
    match s.peek() {
        Some(Token::Integer(_)) | Some(Token::Float(_)) => parse_number_or_ip(s),
        Some(Token::Str(_)) => {
            if let Some(Token::Str(text)) = s.advance() {
                Ok(Expr::new(ExprKind::Str(text.clone())))
            } else {
                unreachable!("peeked string token")
            }
        }
        Some(Token::True) => {
            // `true(…)` and friends fall back to reference keys.
            if call_follows(s) {
                return parse_reference(s);
            }
            s.advance();
            Ok(Expr::new(ExprKind::Bool(true)))
        }
        Some(Token::False) => {
            if call_follows(s) {
                return parse_reference(s);
            }
            s.advance();
            Ok(Expr::new(ExprKind::Bool(false)))
        }
        Some(Token::Nil) | Some(Token::Tilde) => {
            s.advance();
            Ok(Expr::new(ExprKind::Nil))
        }
        Some(Token::Undef) => {
            s.advance();
            Ok(Expr::new(ExprKind::Undefined))
        }
        Some(Token::Dollar) => {
            s.advance();
            let at = s.position();
            if s.gap_before() {
                return Err(ParseError::invalid_syntax(
                    "symbol name must follow '$' directly",
                    at,
                ));
            }
            match s.advance() {
                Some(Token::Ident(name)) => Ok(Expr::new(ExprKind::Symbol(name.clone()))),
                other => Err(ParseError::unexpected_token(other, "as symbol name", at)),
            }
        }
        Some(Token::LBracket) => atoms::parse_list_or_range(s),
        Some(Token::LBrace) => atoms::parse_map_literal(s),
        Some(Token::LParen) => {
            s.advance();
            let inner = levels::parse_expression(s)?;
            s.expect(Token::RParen)?;
            Ok(inner)
        }
        Some(Token::Merge) => {
            if call_follows(s) {
                return parse_reference(s);
            }
            atoms::parse_merge_directive(s)
        }
        Some(Token::Auto) => {
            if call_follows(s) {
                return parse_reference(s);
            }
            s.advance();
            Ok(Expr::new(ExprKind::Auto))
        }
        Some(Token::Map) => {
            if bracket_follows(s) {
                atoms::parse_mapping(s)
            } else {
                parse_reference(s)
            }
        }
        Some(Token::Select) => {
            if bracket_follows(s) {
                atoms::parse_selection(s)
            } else {
                parse_reference(s)
            }
        }
        Some(Token::Sum) => {
            if matches!(s.peek_nth(1), Some(Token::LBracket)) && !s.gap_before_nth(1) {
                atoms::parse_fold(s)
            } else {
                parse_reference(s)
            }
        }
        Some(Token::Sync) => {
            if matches!(s.peek_nth(1), Some(Token::LBracket)) && !s.gap_before_nth(1) {
                atoms::parse_sync(s)
            } else {
                parse_reference(s)
            }
        }
        Some(Token::Catch) => {
            if matches!(s.peek_nth(1), Some(Token::LBracket)) && !s.gap_before_nth(1) {
                atoms::parse_catch(s)
            } else {
                parse_reference(s)
            }
        }
        Some(Token::Ident(_)) | Some(Token::Dot) | Some(Token::Lambda) | Some(Token::Prefer) => {
            parse_reference(s)
        }
        other => Err(ParseError::unexpected_token(
            other,
            "in expression",
            s.position(),
        )),
    }
}

/// `keyword(` reads as a function call on a reference named like the
/// keyword — the directive reading needs a gap before `(`.
fn call_follows(s: &TokenStream) -> bool {
    matches!(s.peek_nth(1), Some(Token::LParen)) && !s.gap_before_nth(1)
}

fn bracket_follows(s: &TokenStream) -> bool {
    (matches!(s.peek_nth(1), Some(Token::LBracket))
        || matches!(s.peek_nth(1), Some(Token::LBrace)))
        && !s.gap_before_nth(1)
}

/// Parse a number, reassembling adjacent numeric/dot tokens into an IPv4
/// literal (`10.0.8.1` lexes as float–dot–float).
fn parse_number_or_ip(s: &mut TokenStream) -> Result<Expr, ParseError> {
    let start = s.current_span();

    // Collect the maximal adjacent run of number and dot tokens.
    let mut n = 0usize;
    let mut end = start.clone();
    loop {
        match s.peek_nth(n) {
            Some(Token::Integer(_)) | Some(Token::Float(_)) | Some(Token::Dot)
                if n == 0 || !s.gap_before_nth(n) =>
            {
                if let Some(span) = s.span_nth(n) {
                    end = span;
                }
                n += 1;
            }
            _ => break,
        }
    }

    let slice = s.src_slice(start.start..end.end);
    let groups: Vec<&str> = slice.split('.').collect();
    if groups.len() == 4
        && groups
            .iter()
            .all(|g| !g.is_empty() && g.bytes().all(|b| b.is_ascii_digit()))
    {
        for _ in 0..n {
            s.advance();
        }
        return Ok(Expr::new(ExprKind::Str(slice.to_string())));
    }

    let at = s.position();
    match s.advance() {
        Some(Token::Integer(v)) => Ok(Expr::new(ExprKind::Int(*v))),
        Some(Token::Float(v)) => Ok(Expr::new(ExprKind::Float(*v))),
        other => Err(ParseError::unexpected_token(other, "as number", at)),
    }
}

/// Parse the head of a reference: optional tag/doc qualifier, optional
/// root anchor, first key. Postfix chaining extends the path.
fn parse_reference(s: &mut TokenStream) -> Result<Expr, ParseError> {
    let qualifier = try_parse_qualifier(s);

    let mut path = RefPath {
        qualifier,
        anchored: false,
        segments: Vec::new(),
    };

    if matches!(s.peek(), Some(Token::Dot)) {
        // Leading dot anchors at the document (or tag) root.
        s.advance();
        path.anchored = true;
        if matches!(s.peek(), Some(Token::LBracket)) && !s.gap_before() {
            // `.[expr]` — top-level index; the bracket chain attaches to
            // the bare root reference.
            return Ok(Expr::new(ExprKind::Ref(path)));
        }
        if s.gap_before() {
            return Err(ParseError::invalid_syntax(
                "path component must follow '.' directly",
                s.position(),
            ));
        }
        path.segments.extend(parse_key_component(s)?);
        return Ok(Expr::new(ExprKind::Ref(path)));
    }

    match s.peek() {
        Some(Token::Ident(_)) => {
            let key = parse_key(s)?;
            path.segments.push(PathSeg::Key(key));
            Ok(Expr::new(ExprKind::Ref(path)))
        }
        Some(tok) if keyword_key(tok).is_some() => {
            let key = parse_key(s)?;
            path.segments.push(PathSeg::Key(key));
            Ok(Expr::new(ExprKind::Ref(path)))
        }
        other => {
            if path.qualifier.is_some() {
                // Bare `tag::` refers to the tag's root node.
                return Ok(Expr::new(ExprKind::Ref(path)));
            }
            Err(ParseError::unexpected_token(
                other,
                "as reference",
                s.position(),
            ))
        }
    }
}

/// Speculatively parse `tag::` or `doc.N::` in front of a reference.
fn try_parse_qualifier(s: &mut TokenStream) -> Option<RefQualifier> {
    let mark = s.mark();

    // doc.N:: / doc:N:: / doc:-N::
    if let Some(Token::Ident(name)) = s.peek() {
        if name == "doc"
            && matches!(s.peek_nth(1), Some(Token::Dot) | Some(Token::Colon))
            && !s.gap_before_nth(1)
        {
            if let (Some(Token::Integer(n)), Some(Token::ColonColon)) =
                (s.peek_nth(2), s.peek_nth(3))
            {
                let n = *n;
                if !s.gap_before_nth(2) && !s.gap_before_nth(3) {
                    s.advance();
                    s.advance();
                    s.advance();
                    s.advance();
                    return Some(RefQualifier::Doc(n));
                }
            }
        }
    }

    // name(:name|.name)*::
    let mut components: Vec<String> = Vec::new();
    if let Some(Token::Ident(name)) = s.peek() {
        components.push(name.clone());
        s.advance();
        loop {
            if matches!(s.peek(), Some(Token::Dot) | Some(Token::Colon))
                && !s.gap_before()
                && matches!(s.peek_nth(1), Some(Token::Ident(_)))
                && !s.gap_before_nth(1)
            {
                s.advance();
                if let Some(Token::Ident(name)) = s.advance() {
                    components.push(name.clone());
                }
            } else {
                break;
            }
        }
        if matches!(s.peek(), Some(Token::ColonColon)) && !s.gap_before() {
            s.advance();
            return Some(RefQualifier::Tag(components.join(":")));
        }
    }

    s.reset(mark);
    None
}
