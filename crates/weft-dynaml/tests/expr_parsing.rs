//! Expression parsing tests covering the DynaML surface forms.

use weft_dynaml::ast::{BinaryOp, ExprKind, Marker, PathSeg, RefQualifier};
use weft_dynaml::{parse_expression, scan_scalar, ScalarScan};

fn parse(source: &str) -> weft_dynaml::ast::Expr {
    parse_expression(source).expect("parse failed")
}

#[test]
fn test_literals() {
    assert_eq!(parse("42").kind, ExprKind::Int(42));
    assert_eq!(parse("3.5").kind, ExprKind::Float(3.5));
    assert_eq!(parse("true").kind, ExprKind::Bool(true));
    assert_eq!(parse("\"hi\"").kind, ExprKind::Str("hi".to_string()));
    assert_eq!(parse("~").kind, ExprKind::Nil);
    assert_eq!(parse("nil").kind, ExprKind::Nil);
    assert_eq!(parse("~~").kind, ExprKind::Undefined);
    assert_eq!(parse("$name").kind, ExprKind::Symbol("name".to_string()));
}

#[test]
fn test_ip_literal() {
    assert_eq!(parse("10.0.8.1").kind, ExprKind::Str("10.0.8.1".to_string()));
}

#[test]
fn test_reference_paths() {
    match parse("foo.bar[0].baz").kind {
        ExprKind::Ref(path) => {
            assert!(!path.anchored);
            assert_eq!(
                path.segments,
                vec![
                    PathSeg::Key("foo".to_string()),
                    PathSeg::Key("bar".to_string()),
                    PathSeg::Index(0),
                    PathSeg::Key("baz".to_string()),
                ]
            );
        }
        other => panic!("expected reference, got {:?}", other),
    }
}

#[test]
fn test_anchored_and_negative_index() {
    match parse(".list[-1]").kind {
        ExprKind::Ref(path) => {
            assert!(path.anchored);
            assert_eq!(
                path.segments,
                vec![PathSeg::Key("list".to_string()), PathSeg::Index(-1)]
            );
        }
        other => panic!("expected reference, got {:?}", other),
    }
}

#[test]
fn test_tag_qualified_reference() {
    match parse("net::subnets.first").kind {
        ExprKind::Ref(path) => {
            assert_eq!(path.qualifier, Some(RefQualifier::Tag("net".to_string())));
        }
        other => panic!("expected reference, got {:?}", other),
    }
    match parse("doc.1::meta.name").kind {
        ExprKind::Ref(path) => {
            assert_eq!(path.qualifier, Some(RefQualifier::Doc(1)));
        }
        other => panic!("expected reference, got {:?}", other),
    }
    match parse("doc:-1::value").kind {
        ExprKind::Ref(path) => {
            assert_eq!(path.qualifier, Some(RefQualifier::Doc(-1)));
        }
        other => panic!("expected reference, got {:?}", other),
    }
}

#[test]
fn test_arithmetic_requires_spacing() {
    match parse("a + b").kind {
        ExprKind::Binary { op, .. } => assert_eq!(op, BinaryOp::Add),
        other => panic!("expected binary, got {:?}", other),
    }
    // `a +b` is not an addition; the parser reports trailing input.
    assert!(parse_expression("a +b").is_err());
}

#[test]
fn test_concatenation_by_juxtaposition() {
    match parse("\"a\" b").kind {
        ExprKind::Concat { .. } => {}
        other => panic!("expected concatenation, got {:?}", other),
    }
}

#[test]
fn test_conditional() {
    match parse("a ? 1 : 2").kind {
        ExprKind::Cond { .. } => {}
        other => panic!("expected conditional, got {:?}", other),
    }
}

#[test]
fn test_alternative() {
    match parse("a || 5").kind {
        ExprKind::Alt { .. } => {}
        other => panic!("expected alternative, got {:?}", other),
    }
    match parse("a // 5").kind {
        ExprKind::Alt { .. } => {}
        other => panic!("expected alternative, got {:?}", other),
    }
}

#[test]
fn test_list_and_range() {
    match parse("[1, 2, 3]").kind {
        ExprKind::List(items) => assert_eq!(items.len(), 3),
        other => panic!("expected list, got {:?}", other),
    }
    match parse("[1..4]").kind {
        ExprKind::Range { start, end } => {
            assert!(start.is_some());
            assert!(end.is_some());
        }
        other => panic!("expected range, got {:?}", other),
    }
}

#[test]
fn test_list_expansion() {
    match parse("[head, rest...]").kind {
        ExprKind::List(items) => {
            assert!(matches!(items[1].kind, ExprKind::Expansion(_)));
        }
        other => panic!("expected list, got {:?}", other),
    }
}

#[test]
fn test_lambda_and_currying_forms() {
    match parse("lambda |a,b=2,c...|->a").kind {
        ExprKind::Lambda(ast) => {
            assert_eq!(ast.params.len(), 3);
            assert!(ast.params[1].default.is_some());
            assert!(ast.varargs);
        }
        other => panic!("expected lambda, got {:?}", other),
    }
    match parse("f*(1)").kind {
        ExprKind::Curry { args, .. } => assert_eq!(args.len(), 1),
        other => panic!("expected currying, got {:?}", other),
    }
}

#[test]
fn test_chained_calls() {
    match parse("f(1)(2)").kind {
        ExprKind::Call { callee, .. } => {
            assert!(matches!(callee.kind, ExprKind::Call { .. }));
        }
        other => panic!("expected call, got {:?}", other),
    }
}

#[test]
fn test_named_arguments() {
    match parse("f(1, k = 2)").kind {
        ExprKind::Call { args, .. } => {
            assert_eq!(args[0].name, None);
            assert_eq!(args[1].name.as_deref(), Some("k"));
        }
        other => panic!("expected call, got {:?}", other),
    }
}

#[test]
fn test_merge_is_call_when_adjacent_paren() {
    // `merge(…)` is a function call, `merge (…)` stays a directive
    // followed by nothing parseable, so only the call form parses here.
    match parse("merge(a)").kind {
        ExprKind::Call { callee, .. } => match &callee.kind {
            ExprKind::Ref(path) => assert_eq!(path.as_single_key(), Some("merge")),
            other => panic!("expected reference callee, got {:?}", other),
        },
        other => panic!("expected call, got {:?}", other),
    }
}

#[test]
fn test_merge_directives() {
    match parse("merge").kind {
        ExprKind::Merge(spec) => {
            assert!(!spec.replace && !spec.required);
            assert!(spec.key.is_none() && spec.redirect.is_none());
        }
        other => panic!("expected merge, got {:?}", other),
    }
    match parse("merge on name").kind {
        ExprKind::Merge(spec) => assert_eq!(spec.key.as_deref(), Some("name")),
        other => panic!("expected merge, got {:?}", other),
    }
    match parse("merge replace").kind {
        ExprKind::Merge(spec) => assert!(spec.replace),
        other => panic!("expected merge, got {:?}", other),
    }
    match parse("merge required").kind {
        ExprKind::Merge(spec) => assert!(spec.required),
        other => panic!("expected merge, got {:?}", other),
    }
    match parse("merge other.path").kind {
        ExprKind::Merge(spec) => assert!(spec.redirect.is_some()),
        other => panic!("expected merge, got {:?}", other),
    }
}

#[test]
fn test_merge_with_alternative() {
    match parse("merge || \"fallback\"").kind {
        ExprKind::Alt { left, .. } => {
            assert!(matches!(left.kind, ExprKind::Merge(_)));
        }
        other => panic!("expected alternative, got {:?}", other),
    }
}

#[test]
fn test_projection() {
    match parse("jobs.[*].name").kind {
        ExprKind::Projection { follow, .. } => {
            assert_eq!(follow, vec![PathSeg::Key("name".to_string())]);
        }
        other => panic!("expected projection, got {:?}", other),
    }
}

#[test]
fn test_dynamic_index_and_slice() {
    match parse("foo.[bar]").kind {
        ExprKind::DynRef { .. } => {}
        other => panic!("expected dynamic index, got {:?}", other),
    }
    match parse("list.[1..2]").kind {
        ExprKind::Slice { .. } => {}
        other => panic!("expected slice, got {:?}", other),
    }
}

#[test]
fn test_mapping_selection_fold() {
    match parse("map[[1, 2, 3]|x|x * x]").kind {
        ExprKind::Mapping { to_map, body, .. } => {
            assert!(!to_map);
            assert_eq!(body.params, vec!["x".to_string()]);
        }
        other => panic!("expected mapping, got {:?}", other),
    }
    match parse("map{data|v,k|v}").kind {
        ExprKind::Mapping { to_map, body, .. } => {
            assert!(to_map);
            assert_eq!(body.params.len(), 2);
        }
        other => panic!("expected mapping, got {:?}", other),
    }
    match parse("select[items|x|x > 2]").kind {
        ExprKind::Selection { .. } => {}
        other => panic!("expected selection, got {:?}", other),
    }
    match parse("sum[items|0|acc,x|acc + x]").kind {
        ExprKind::Fold { .. } => {}
        other => panic!("expected fold, got {:?}", other),
    }
}

#[test]
fn test_arrow_bodies_accepted() {
    match parse("map[list|x|->x]").kind {
        ExprKind::Mapping { .. } => {}
        other => panic!("expected mapping, got {:?}", other),
    }
}

#[test]
fn test_sync_and_catch() {
    match parse("sync[state|v|v > 3, 10]").kind {
        ExprKind::Sync { timeout, .. } => assert!(timeout.is_some()),
        other => panic!("expected sync, got {:?}", other),
    }
    match parse("catch[a / b|e|e.error]").kind {
        ExprKind::Catch { handler, .. } => assert!(handler.is_some()),
        other => panic!("expected catch, got {:?}", other),
    }
}

#[test]
fn test_scoped_expression() {
    match parse("(a = 1, b = 2) a + b").kind {
        ExprKind::Scoped { decls, .. } => assert_eq!(decls.len(), 2),
        other => panic!("expected scoped, got {:?}", other),
    }
    // Plain grouping still works.
    match parse("(a)").kind {
        ExprKind::Ref(_) => {}
        other => panic!("expected grouped reference, got {:?}", other),
    }
}

#[test]
fn test_map_literal() {
    match parse("{a = 1, b = 2}").kind {
        ExprKind::MapLit(entries) => assert_eq!(entries.len(), 2),
        other => panic!("expected map literal, got {:?}", other),
    }
}

#[test]
fn test_substitution() {
    match parse("*templates.base").kind {
        ExprKind::Subst(_) => {}
        other => panic!("expected substitution, got {:?}", other),
    }
}

#[test]
fn test_markers() {
    match parse("&temporary &local (5)").kind {
        ExprKind::Marked { markers, expr } => {
            assert_eq!(markers, vec![Marker::Temporary, Marker::Local]);
            assert!(expr.is_some());
        }
        other => panic!("expected marked, got {:?}", other),
    }
    match parse("&template").kind {
        ExprKind::Marked { markers, expr } => {
            assert_eq!(markers, vec![Marker::Template]);
            assert!(expr.is_none());
        }
        other => panic!("expected marked, got {:?}", other),
    }
    match parse("&tag:*net (subnets)").kind {
        ExprKind::Marked { markers, .. } => {
            assert_eq!(
                markers,
                vec![Marker::Tag {
                    name: "net".to_string(),
                    global: true
                }]
            );
        }
        other => panic!("expected marked, got {:?}", other),
    }
}

#[test]
fn test_prefer() {
    match parse("prefer 42").kind {
        ExprKind::Prefer(_) => {}
        other => panic!("expected prefer, got {:?}", other),
    }
}

#[test]
fn test_parse_error_has_location() {
    let err = parse_expression("a +\n  )").expect_err("should fail");
    assert_eq!(err.line, 2);
}

#[test]
fn test_scan_scalar_whole_expression() {
    match scan_scalar("(( a + b ))", false, false).expect("scan failed") {
        ScalarScan::Expression(expr) => {
            assert!(matches!(expr.kind, ExprKind::Binary { .. }));
        }
        other => panic!("expected expression, got {:?}", other),
    }
}

#[test]
fn test_scan_scalar_escape() {
    match scan_scalar("((! a ))", false, false).expect("scan failed") {
        ScalarScan::Literal(text) => assert_eq!(text, "(( a ))"),
        other => panic!("expected literal, got {:?}", other),
    }
    match scan_scalar("((! a ))", false, true).expect("scan failed") {
        ScalarScan::Literal(text) => assert_eq!(text, "((! a ))"),
        other => panic!("expected literal, got {:?}", other),
    }
}

#[test]
fn test_scan_scalar_interpolation() {
    match scan_scalar("host-(( idx ))-suffix", true, false).expect("scan failed") {
        ScalarScan::Expression(expr) => {
            assert!(matches!(expr.kind, ExprKind::Concat { .. }));
        }
        other => panic!("expected expression, got {:?}", other),
    }
    // Without interpolation the same scalar stays literal.
    match scan_scalar("host-(( idx ))-suffix", false, false).expect("scan failed") {
        ScalarScan::Literal(text) => assert_eq!(text, "host-(( idx ))-suffix"),
        other => panic!("expected literal, got {:?}", other),
    }
}

#[test]
fn test_display_roundtrip() {
    for source in [
        "a.b[0]",
        "a + b",
        "map[list|x|x * x]",
        "lambda|a,b|->a + b",
        "merge on name",
        "a ? b : c",
    ] {
        let expr = parse(source);
        let rendered = expr.to_string();
        let reparsed = parse_expression(&rendered)
            .unwrap_or_else(|e| panic!("reparse of '{}' failed: {}", rendered, e));
        assert_eq!(expr, reparsed, "display of '{}' not stable", source);
    }
}
