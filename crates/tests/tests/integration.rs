//! End-to-end tests for the full processing pipeline:
//! bind expressions → prepare stubs → merge → fixed point → cleanup.

use std::sync::atomic::{AtomicUsize, Ordering};

use indexmap::IndexMap;
use weft_engine::builtins::Registry;
use weft_engine::eval::EvalOut;
use weft_engine::{
    determine_state, Binding, IssueKind, Node, Options, State, Value, Weft, WeftError,
};
use weft_tests::{get, int_at, map_of, str_at, TestHarness};

fn s(text: &str) -> Node {
    Node::string(text)
}

// ── arithmetic and references ──

/// Template `{ x: 1, y: 2, z: (( x + y )) }` resolves z to 3.
#[test]
fn test_arithmetic_over_siblings() {
    let harness = TestHarness::new();
    let template = map_of(vec![
        ("x", Node::int(1)),
        ("y", Node::int(2)),
        ("z", s("(( x + y ))")),
    ]);
    let result = harness.process(template, vec![]);
    assert_eq!(int_at(&result, "z"), Some(3));
}

/// Forward references resolve through the fixed point, and stub values
/// override template values at the same path.
#[test]
fn test_forward_reference_with_stub_override() {
    let harness = TestHarness::new();
    let template = map_of(vec![
        ("a", s("(( b ))")),
        ("b", s("(( c ))")),
        ("c", Node::int(0)),
    ]);
    let stub = map_of(vec![("c", Node::int(42))]);
    let result = harness.process(template, vec![stub]);
    assert_eq!(int_at(&result, "a"), Some(42));
    assert_eq!(int_at(&result, "b"), Some(42));
    assert_eq!(int_at(&result, "c"), Some(42));
}

/// Mutually referencing nodes are reported as a cycle, both tagged `@`.
#[test]
fn test_cycle_detection() {
    let harness = TestHarness::new();
    let template = map_of(vec![("a", s("(( b ))")), ("b", s("(( a ))"))]);
    match harness.try_process(template, vec![]) {
        Err(WeftError::Unresolved(set)) => {
            assert_eq!(set.0.len(), 2);
            for issue in &set.0 {
                assert_eq!(issue.kind, IssueKind::Cycle, "issue: {}", issue);
            }
        }
        other => panic!("expected cycle error, got {:?}", other.map(|n| n.stringify())),
    }
}

/// A node referencing a cycle is classified as dependent, not cyclic.
#[test]
fn test_dependent_classification() {
    let harness = TestHarness::new();
    let template = map_of(vec![
        ("a", s("(( b ))")),
        ("b", s("(( a ))")),
        ("c", s("(( a ))")),
    ]);
    match harness.try_process(template, vec![]) {
        Err(WeftError::Unresolved(set)) => {
            let kind_of = |key: &str| {
                set.0
                    .iter()
                    .find(|issue| issue.path == vec![key.to_string()])
                    .map(|issue| issue.kind)
            };
            assert_eq!(kind_of("a"), Some(IssueKind::Cycle));
            assert_eq!(kind_of("b"), Some(IssueKind::Cycle));
            assert_eq!(kind_of("c"), Some(IssueKind::Dependent));
        }
        other => panic!("expected error, got {:?}", other.map(|n| n.stringify())),
    }
}

/// An unresolvable reference is a direct expression error.
#[test]
fn test_missing_reference_is_error() {
    let harness = TestHarness::new();
    let template = map_of(vec![("a", s("(( nothing.here ))"))]);
    match harness.try_process(template, vec![]) {
        Err(WeftError::Unresolved(set)) => {
            assert_eq!(set.0[0].kind, IssueKind::Error);
            assert!(set.0[0].message.contains("not found"), "{}", set.0[0]);
        }
        other => panic!("expected error, got {:?}", other.map(|n| n.stringify())),
    }
}

// ── list merging ──

/// `merge on name` joins template and stub lists by key.
#[test]
fn test_merge_on_key() {
    let harness = TestHarness::new();
    let template = map_of(vec![(
        "jobs",
        Node::list(vec![
            map_of(vec![("<<", s("(( merge on name ))"))]),
            map_of(vec![("name", s("k1")), ("v", Node::int(1))]),
            map_of(vec![("name", s("k2")), ("v", Node::int(2))]),
        ]),
    )]);
    let stub = map_of(vec![(
        "jobs",
        Node::list(vec![
            map_of(vec![("name", s("k2")), ("v", Node::int(99))]),
            map_of(vec![("name", s("k3")), ("v", Node::int(3))]),
        ]),
    )]);
    let result = harness.process(template, vec![stub]);
    assert_eq!(int_at(&result, "jobs.[0].v"), Some(1));
    assert_eq!(int_at(&result, "jobs.[1].v"), Some(99));
    assert_eq!(str_at(&result, "jobs.[2].name"), Some("k3"));
    assert_eq!(int_at(&result, "jobs.[2].v"), Some(3));
}

/// Without a key directive the stub list replaces the template list.
#[test]
fn test_default_list_replacement() {
    let harness = TestHarness::new();
    let template = map_of(vec![("l", Node::list(vec![Node::int(1), Node::int(2)]))]);
    let stub = map_of(vec![("l", Node::list(vec![Node::int(9)]))]);
    let result = harness.process(template, vec![stub]);
    match &get(&result, "l").expect("l").value {
        Value::List(items) => assert_eq!(items, &vec![Node::int(9)]),
        other => panic!("expected list, got {:?}", other),
    }
}

// ── lambdas ──

/// `L(a, b)(c)` equals `L(a, b, c)`.
#[test]
fn test_lambda_currying() {
    let harness = TestHarness::new();
    let template = map_of(vec![
        ("f", s("(( lambda |a,b,c|->a + b + c ))")),
        ("chained", s("(( f(1)(2)(3) ))")),
        ("direct", s("(( f(1, 2, 3) ))")),
    ]);
    let result = harness.process(template, vec![]);
    assert_eq!(int_at(&result, "chained"), Some(6));
    assert_eq!(int_at(&result, "direct"), Some(6));
}

#[test]
fn test_lambda_defaults_varargs_and_named_args() {
    let harness = TestHarness::new();
    let template = map_of(vec![
        ("f", s("(( lambda |a,b=10,rest...|->a + b + length(rest) ))")),
        ("defaults", s("(( f(1) ))")),
        ("varargs", s("(( f(1, 2, 3, 4) ))")),
        ("named", s("(( f(1, b=5) ))")),
    ]);
    let result = harness.process(template, vec![]);
    assert_eq!(int_at(&result, "defaults"), Some(11));
    assert_eq!(int_at(&result, "varargs"), Some(5));
    assert_eq!(int_at(&result, "named"), Some(6));
}

#[test]
fn test_explicit_currying() {
    let harness = TestHarness::new();
    let template = map_of(vec![
        ("add", s("(( lambda |a,b|->a + b ))")),
        ("inc", s("(( add*(1) ))")),
        ("r", s("(( inc(41) ))")),
    ]);
    let result = harness.process(template, vec![]);
    assert_eq!(int_at(&result, "r"), Some(42));
}

// ── comprehensions ──

/// `map[[1,2,3]|x|x * x]` squares each element.
#[test]
fn test_mapping() {
    let harness = TestHarness::new();
    let template = map_of(vec![("squares", s("(( map[[1, 2, 3]|x|x * x] ))"))]);
    let result = harness.process(template, vec![]);
    match &get(&result, "squares").expect("squares").value {
        Value::List(items) => {
            assert_eq!(items, &vec![Node::int(1), Node::int(4), Node::int(9)]);
        }
        other => panic!("expected list, got {:?}", other),
    }
}

#[test]
fn test_mapping_with_index_and_selection() {
    let harness = TestHarness::new();
    let template = map_of(vec![
        ("indexed", s("(( map[[10, 20]|x,i|x + i] ))")),
        ("picked", s("(( select[[1, 2, 3, 4]|x|x > 2] ))")),
        ("total", s("(( sum[[1, 2, 3]|0|acc,x|acc + x] ))")),
    ]);
    let result = harness.process(template, vec![]);
    assert_eq!(int_at(&result, "indexed.[1]"), Some(21));
    assert_eq!(int_at(&result, "picked.[0]"), Some(3));
    assert_eq!(int_at(&result, "total"), Some(6));
}

#[test]
fn test_map_over_mapping_keys() {
    let harness = TestHarness::new();
    let template = map_of(vec![
        ("data", map_of(vec![("a", Node::int(1)), ("b", Node::int(2))])),
        ("doubled", s("(( map{data|v,k|v * 2} ))")),
        ("names", s("(( map[data|v,k|k] ))")),
    ]);
    let result = harness.process(template, vec![]);
    assert_eq!(int_at(&result, "doubled.b"), Some(4));
    assert_eq!(str_at(&result, "names.[0]"), Some("a"));
}

// ── temporary, local, state ──

/// Temporary nodes participate in evaluation but are stripped from the
/// output.
#[test]
fn test_temporary_stripping() {
    let harness = TestHarness::new();
    let template = map_of(vec![
        ("t", s("(( &temporary (5) ))")),
        ("r", s("(( t + 1 ))")),
    ]);
    let result = harness.process(template, vec![]);
    assert_eq!(int_at(&result, "r"), Some(6));
    assert!(get(&result, "t").is_none());
}

#[test]
fn test_preserve_temporary_option() {
    let harness = TestHarness::with_options(Options {
        preserve_temporary: true,
        ..Options::default()
    });
    let template = map_of(vec![
        ("t", s("(( &temporary (5) ))")),
        ("r", s("(( t + 1 ))")),
    ]);
    let result = harness.process(template, vec![]);
    assert_eq!(int_at(&result, "t"), Some(5));
}

/// State nodes carry the stub's (previous) value instead of
/// re-evaluating, and `determine_state` extracts them.
#[test]
fn test_state_carry_and_extraction() {
    let harness = TestHarness::new();
    let template = map_of(vec![
        ("cache", s("(( &state (\"fresh\") ))")),
        ("plain", Node::int(1)),
    ]);
    let stub = map_of(vec![("cache", s("old"))]);
    let result = harness.process(template, vec![stub]);
    assert_eq!(str_at(&result, "cache"), Some("old"));

    let state = determine_state(&result).expect("state subtree");
    assert_eq!(str_at(&state, "cache"), Some("old"));
    assert!(get(&state, "plain").is_none());
}

// ── directives ──

#[test]
fn test_merge_with_fallback() {
    let harness = TestHarness::new();
    let template = map_of(vec![("v", s("(( merge || \"fallback\" ))"))]);
    let result = harness.process(template.clone(), vec![]);
    assert_eq!(str_at(&result, "v"), Some("fallback"));

    let harness = TestHarness::new();
    let stub = map_of(vec![("v", s("from-stub"))]);
    let result = harness.process(template, vec![stub]);
    assert_eq!(str_at(&result, "v"), Some("from-stub"));
}

#[test]
fn test_merge_required_fails_without_stub() {
    let harness = TestHarness::new();
    let template = map_of(vec![("v", s("(( merge required ))"))]);
    match harness.try_process(template, vec![]) {
        Err(WeftError::Unresolved(set)) => {
            assert!(set.0[0].message.contains("required"), "{}", set.0[0]);
        }
        other => panic!("expected error, got {:?}", other.map(|n| n.stringify())),
    }
}

#[test]
fn test_prefer_keeps_template_value() {
    let harness = TestHarness::new();
    let template = map_of(vec![("v", s("(( prefer 5 ))"))]);
    let stub = map_of(vec![("v", Node::int(10))]);
    let result = harness.process(template, vec![stub]);
    assert_eq!(int_at(&result, "v"), Some(5));
}

#[test]
fn test_replace_directive_drops_template_content() {
    let harness = TestHarness::new();
    let template = map_of(vec![(
        "m",
        map_of(vec![("<<", s("(( merge replace ))")), ("a", Node::int(1))]),
    )]);
    let stub = map_of(vec![("m", map_of(vec![("b", Node::int(2))]))]);
    let result = harness.process(template, vec![stub]);
    assert_eq!(int_at(&result, "m.b"), Some(2));
    assert!(get(&result, "m.a").is_none());
}

// ── alternatives, conditionals, scopes ──

#[test]
fn test_alternative_fallback() {
    let harness = TestHarness::new();
    let template = map_of(vec![
        ("a", s("(( missing || 7 ))")),
        ("b", s("(( x || 9 ))")),
        ("x", Node::int(1)),
    ]);
    let result = harness.process(template, vec![]);
    assert_eq!(int_at(&result, "a"), Some(7));
    assert_eq!(int_at(&result, "b"), Some(1));
}

#[test]
fn test_conditional_branches_are_lazy() {
    let harness = TestHarness::new();
    let template = map_of(vec![
        ("flag", Node::bool(true)),
        ("v", s("(( flag ? 1 : 1 / 0 ))")),
    ]);
    let result = harness.process(template, vec![]);
    assert_eq!(int_at(&result, "v"), Some(1));
}

#[test]
fn test_scoped_expression_with_forward_reference() {
    let harness = TestHarness::new();
    let template = map_of(vec![
        ("plain", s("(( (a = 1, b = a + 1) a + b ))")),
        ("forward", s("(( (b = a + 1, a = 1) a + b ))")),
    ]);
    let result = harness.process(template, vec![]);
    assert_eq!(int_at(&result, "plain"), Some(3));
    assert_eq!(int_at(&result, "forward"), Some(3));
}

// ── projections ──

#[test]
fn test_projection_extracts_fields() {
    let harness = TestHarness::new();
    let template = map_of(vec![
        (
            "jobs",
            Node::list(vec![
                map_of(vec![("name", s("a"))]),
                map_of(vec![("name", s("b"))]),
            ]),
        ),
        ("names", s("(( jobs.[*].name ))")),
    ]);
    let result = harness.process(template, vec![]);
    assert_eq!(str_at(&result, "names.[0]"), Some("a"));
    assert_eq!(str_at(&result, "names.[1]"), Some("b"));
}

static PROBE_CALLS: AtomicUsize = AtomicUsize::new(0);

fn probe(args: &[Node], _env: &Binding) -> EvalOut {
    PROBE_CALLS.fetch_add(1, Ordering::SeqCst);
    EvalOut::value(args[0].clone())
}

/// A projection over a list with a deferred element defers wholesale:
/// the effectful element is evaluated exactly once by its own node, not
/// re-triggered by projection retries.
#[test]
fn test_projection_laziness() {
    let mut registry = Registry::standard();
    registry.register("probe", probe, 1, Some(1), false);
    let weft = Weft::with_state(State::new().with_functions(registry));
    let harness = TestHarness::with_weft(weft);

    let template = map_of(vec![
        ("items", Node::list(vec![s("(( probe(1) ))"), s("(( dep ))")])),
        ("dep", s("(( base ))")),
        ("base", Node::int(5)),
        ("projected", s("(( items.[*] ))")),
    ]);
    let result = harness.process(template, vec![]);
    assert_eq!(int_at(&result, "projected.[0]"), Some(1));
    assert_eq!(int_at(&result, "projected.[1]"), Some(5));
    assert_eq!(PROBE_CALLS.load(Ordering::SeqCst), 1);
}

// ── sync and catch ──

#[test]
fn test_sync_satisfied_condition() {
    let harness = TestHarness::new();
    let template = map_of(vec![("v", s("(( sync[4|x|x > 3] ))"))]);
    let result = harness.process(template, vec![]);
    assert_eq!(int_at(&result, "v"), Some(4));
}

#[test]
fn test_sync_unmet_condition_fails() {
    let harness = TestHarness::new();
    let template = map_of(vec![("v", s("(( sync[1|x|x > 3, 5] ))"))]);
    match harness.try_process(template, vec![]) {
        Err(WeftError::Unresolved(set)) => {
            assert!(set.0[0].message.contains("sync"), "{}", set.0[0]);
        }
        other => panic!("expected error, got {:?}", other.map(|n| n.stringify())),
    }
}

#[test]
fn test_catch_handler_receives_error() {
    let harness = TestHarness::new();
    let template = map_of(vec![
        ("handled", s("(( catch[1 / 0|e|e.error] ))")),
        ("bare", s("(( catch[1 / 0] ))")),
        ("ok", s("(( catch[2 + 2] ))")),
    ]);
    let result = harness.process(template, vec![]);
    assert_eq!(str_at(&result, "handled"), Some("division by zero"));
    assert_eq!(
        get(&result, "bare.valid").map(|n| n.clone()),
        Some(Node::bool(false))
    );
    assert_eq!(int_at(&result, "ok"), Some(4));
}

// ── templates and dynamic entries ──

#[test]
fn test_template_substitution() {
    let harness = TestHarness::new();
    let template = map_of(vec![
        ("q", Node::int(5)),
        (
            "templ",
            map_of(vec![
                ("<<", s("(( &temporary &template ))")),
                ("a", s("(( q + 1 ))")),
            ]),
        ),
        ("inst", s("(( *templ ))")),
    ]);
    let result = harness.process(template, vec![]);
    assert_eq!(int_at(&result, "inst.a"), Some(6));
    assert!(get(&result, "templ").is_none());
}

#[test]
fn test_dynamic_entry_splices_into_parent() {
    let harness = TestHarness::new();
    let template = map_of(vec![(
        "m",
        map_of(vec![
            ("fixed", Node::int(1)),
            ("extra", s("(( &dynamic ({k1 = 2, k2 = 3}) ))")),
        ]),
    )]);
    let result = harness.process(template, vec![]);
    assert_eq!(int_at(&result, "m.fixed"), Some(1));
    assert_eq!(int_at(&result, "m.k1"), Some(2));
    assert_eq!(int_at(&result, "m.k2"), Some(3));
    assert!(get(&result, "m.extra").is_none());
}

// ── interpolation and escapes ──

#[test]
fn test_string_interpolation() {
    let weft = Weft::with_state(State::new().with_interpolation(true));
    let harness = TestHarness::with_weft(weft);
    let template = map_of(vec![
        ("idx", Node::int(2)),
        ("host", s("web-(( idx ))-node")),
    ]);
    let result = harness.process(template, vec![]);
    assert_eq!(str_at(&result, "host"), Some("web-2-node"));
}

#[test]
fn test_escaped_expression_stays_literal() {
    let harness = TestHarness::new();
    let template = map_of(vec![("e", s("((! raw ))"))]);
    let result = harness.process(template, vec![]);
    assert_eq!(str_at(&result, "e"), Some("(( raw ))"));

    let harness = TestHarness::with_options(Options {
        preserve_escapes: true,
        ..Options::default()
    });
    let template = map_of(vec![("e", s("((! raw ))"))]);
    let result = harness.process(template, vec![]);
    assert_eq!(str_at(&result, "e"), Some("((! raw ))"));
}

// ── tags and streams ──

#[test]
fn test_tags_within_and_across_documents() {
    let harness = TestHarness::new();

    let doc1 = map_of(vec![
        ("net", s("(( &tag:net (\"10.0.0.0/24\") ))")),
        ("glob", s("(( &tag:*shared (\"kept\") ))")),
        ("local_use", s("(( net:: ))")),
        ("z", Node::int(7)),
    ]);
    let result1 = harness.process(doc1, vec![]);
    assert_eq!(str_at(&result1, "local_use"), Some("10.0.0.0/24"));

    // The local tag is gone in the next document; the global one and
    // the processed document itself remain addressable.
    let doc2 = map_of(vec![
        ("from_glob", s("(( shared:: ))")),
        ("from_doc", s("(( doc.0::z ))")),
    ]);
    let result2 = harness.process(doc2, vec![]);
    assert_eq!(str_at(&result2, "from_glob"), Some("kept"));
    assert_eq!(int_at(&result2, "from_doc"), Some(7));

    let doc3 = map_of(vec![("v", s("(( net:: || \"gone\" ))"))]);
    let result3 = harness.process(doc3, vec![]);
    assert_eq!(str_at(&result3, "v"), Some("gone"));
}

#[test]
fn test_doc_index_out_of_range_is_error() {
    let harness = TestHarness::new();
    let template = map_of(vec![("v", s("(( doc.5::x ))"))]);
    match harness.try_process(template, vec![]) {
        Err(WeftError::Unresolved(set)) => {
            assert!(set.0[0].message.contains("out of range"), "{}", set.0[0]);
        }
        other => panic!("expected error, got {:?}", other.map(|n| n.stringify())),
    }
}

// ── capability gating ──

#[test]
fn test_file_access_denied_by_default() {
    let harness = TestHarness::new();
    let template = map_of(vec![("v", s("(( read(\"/etc/hosts\") ))"))]);
    match harness.try_process(template, vec![]) {
        Err(WeftError::Unresolved(set)) => {
            assert!(
                set.0[0].message.contains("no file access"),
                "{}",
                set.0[0]
            );
        }
        other => panic!("expected error, got {:?}", other.map(|n| n.stringify())),
    }
}

#[test]
fn test_exec_denied_by_default() {
    let harness = TestHarness::new();
    let template = map_of(vec![("v", s("(( exec(\"true\") ))"))]);
    match harness.try_process(template, vec![]) {
        Err(WeftError::Unresolved(set)) => {
            assert!(set.0[0].message.contains("no OS access"), "{}", set.0[0]);
        }
        other => panic!("expected error, got {:?}", other.map(|n| n.stringify())),
    }
}

// ── built-ins end to end ──

#[test]
fn test_builtin_catalog() {
    let harness = TestHarness::new();
    let template = map_of(vec![
        ("joined", s("(( join(\",\", [\"a\", \"b\"]) ))")),
        ("split", s("(( split(\",\", \"x,y\") ))")),
        ("len", s("(( length([1, 2, 3]) ))")),
        ("upper", s("(( uppercase(\"abc\") ))")),
        ("b64", s("(( base64(\"hi\") ))")),
        ("back", s("(( base64_decode(base64(\"hi\")) ))")),
        ("low", s("(( min(3, 1, 2) ))")),
        ("matched", s("(( match(\"^a+$\", \"aaa\") ))")),
        ("formatted", s("(( format(\"%s-%d\", \"n\", 4) ))")),
        ("net", s("(( min_ip(\"10.0.8.0/22\") ))")),
        ("sorted", s("(( sort([3, 1, 2]) ))")),
        ("unique", s("(( uniq([1, 1, 2]) ))")),
        ("evald", s("(( eval(\"2 + 3\") ))")),
    ]);
    let result = harness.process(template, vec![]);
    assert_eq!(str_at(&result, "joined"), Some("a,b"));
    assert_eq!(str_at(&result, "split.[1]"), Some("y"));
    assert_eq!(int_at(&result, "len"), Some(3));
    assert_eq!(str_at(&result, "upper"), Some("ABC"));
    assert_eq!(str_at(&result, "b64"), Some("aGk="));
    assert_eq!(str_at(&result, "back"), Some("hi"));
    assert_eq!(int_at(&result, "low"), Some(1));
    assert_eq!(get(&result, "matched"), Some(&Node::bool(true)));
    assert_eq!(str_at(&result, "formatted"), Some("n-4"));
    assert_eq!(str_at(&result, "net"), Some("10.0.8.0"));
    assert_eq!(int_at(&result, "sorted.[0]"), Some(1));
    match &get(&result, "unique").expect("unique").value {
        Value::List(items) => assert_eq!(items.len(), 2),
        other => panic!("expected list, got {:?}", other),
    }
    assert_eq!(int_at(&result, "evald"), Some(5));
}

#[test]
fn test_unknown_function_is_error() {
    let harness = TestHarness::new();
    let template = map_of(vec![("v", s("(( no_such_fn(1) ))"))]);
    match harness.try_process(template, vec![]) {
        Err(WeftError::Unresolved(set)) => {
            assert!(set.0[0].message.contains("unknown function"), "{}", set.0[0]);
        }
        other => panic!("expected error, got {:?}", other.map(|n| n.stringify())),
    }
}

// ── laws ──

/// Same inputs, same output.
#[test]
fn test_determinism() {
    let template = map_of(vec![
        ("a", s("(( b + 1 ))")),
        ("b", s("(( merge || 1 ))")),
        ("c", s("(( [1..3] ))")),
    ]);
    let stub = map_of(vec![("b", Node::int(5))]);
    let first = TestHarness::new().process(template.clone(), vec![stub.clone()]);
    let second = TestHarness::new().process(template, vec![stub]);
    assert_eq!(first, second);
}

/// A fully resolved tree passes through `apply` unchanged.
#[test]
fn test_fixed_point_idempotence() {
    let tree = map_of(vec![
        ("a", Node::int(1)),
        ("m", map_of(vec![("x", s("plain"))])),
        ("l", Node::list(vec![Node::bool(true)])),
    ]);
    let weft = Weft::new();
    let result = weft_engine::apply(&weft.binding(), &tree, &[], &Options::default())
        .expect("apply failed");
    assert_eq!(result, tree);
}

/// For maps without replace/merge-on directives, applying stubs one at
/// a time equals applying them together.
#[test]
fn test_stub_ordering_law() {
    let template = map_of(vec![
        ("a", Node::int(1)),
        ("m", map_of(vec![("x", Node::int(1)), ("y", Node::int(2))])),
    ]);
    let s1 = map_of(vec![("m", map_of(vec![("x", Node::int(10))]))]);
    let s2 = map_of(vec![("m", map_of(vec![("y", Node::int(20))]))]);

    let opts = Options::default();
    let weft = Weft::new();
    let combined =
        weft_engine::apply(&weft.binding(), &template, &[s1.clone(), s2.clone()], &opts)
            .expect("combined apply failed");

    let weft = Weft::new();
    let intermediate = weft_engine::apply(&weft.binding(), &template, &[s1], &opts)
        .expect("first apply failed");
    let sequential = weft_engine::apply(&weft.binding(), &intermediate, &[s2], &opts)
        .expect("second apply failed");

    assert_eq!(combined, sequential);
}

// ── options ──

#[test]
fn test_partial_keeps_unresolved_nodes() {
    let harness = TestHarness::with_options(Options {
        partial: true,
        ..Options::default()
    });
    let template = map_of(vec![("u", s("(( missing ))")), ("v", Node::int(1))]);
    let result = harness.process(template, vec![]);
    assert_eq!(int_at(&result, "v"), Some(1));
    assert!(matches!(
        get(&result, "u").expect("u").value,
        Value::Expr(_)
    ));
}

// ── concatenation ──

#[test]
fn test_concatenation_forms() {
    let harness = TestHarness::new();
    let template = map_of(vec![
        ("strings", s("(( \"a-\" 1 ))")),
        ("lists", s("(( [1] [2, 3] ))")),
        ("maps", s("(( {a = 1} {a = 2, b = 3} ))")),
    ]);
    let result = harness.process(template, vec![]);
    assert_eq!(str_at(&result, "strings"), Some("a-1"));
    assert_eq!(int_at(&result, "lists.[2]"), Some(3));
    assert_eq!(int_at(&result, "maps.a"), Some(2));
    assert_eq!(int_at(&result, "maps.b"), Some(3));
}

// ── undefined ──

/// The undefined value drops its entry from the output.
#[test]
fn test_undefined_strips_entry() {
    let harness = TestHarness::new();
    let template = map_of(vec![
        ("gone", s("(( ~~ ))")),
        ("kept", s("(( false ? 1 : ~~ || 2 ))")),
        ("v", Node::int(1)),
    ]);
    let result = harness.process(template, vec![]);
    assert!(get(&result, "gone").is_none());
    assert_eq!(int_at(&result, "v"), Some(1));
    assert_eq!(int_at(&result, "kept"), Some(2));
}

// ── predefined values ──

#[test]
fn test_predefined_values_visible_as_scope() {
    let mut values = IndexMap::new();
    values.insert("version".to_string(), Node::string("1.2.3"));
    let weft = Weft::new().with_values(values);
    let harness = TestHarness::with_weft(weft);
    let template = map_of(vec![("v", s("(( version ))"))]);
    let result = harness.process(template, vec![]);
    assert_eq!(str_at(&result, "v"), Some("1.2.3"));
}
