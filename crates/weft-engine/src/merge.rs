//! Merge engine: pair a template with prepared stubs.
//!
//! Stubs are folded in order, each pass walking the paired trees.
//! Mappings merge to the union of their keys, scalars are overridden by
//! the stub side unless the template prefers its own value, lists are
//! replaced wholesale unless a `merge on <key>` directive joins them.
//! `<<`/`<<<` insertion keys carry directives for their containing
//! collection and are consumed here.

use indexmap::IndexMap;
use tracing::debug;

use crate::node::{Node, NodeFlags, Value};
use weft_dynaml::ast::{ExprKind, MergeSpec};

const INSERT_KEYS: [&str; 2] = ["<<", "<<<"];

/// Merge prepared stubs into a template, later stubs overriding the
/// outcome of earlier ones.
pub fn merge_trees(template: &Node, stubs: &[Node]) -> Node {
    let mut result = template.clone();
    for stub in stubs {
        debug!(source = %stub.source, "merging stub");
        result = merge_with(&result, Some(stub), stub);
    }
    result
}

fn is_insert_key(key: &str) -> bool {
    INSERT_KEYS.contains(&key)
}

/// Merge one template node with its co-located stub node.
fn merge_with(template: &Node, stub: Option<&Node>, stub_root: &Node) -> Node {
    // Pure merge directives resolve structurally right here; compound
    // expressions (e.g. `merge || default`) stay for the evaluator.
    if let Value::Expr(expr) = &template.value {
        if let Some(spec) = expr.as_merge_directive() {
            return apply_directive(template, spec, stub, stub_root);
        }
        if let ExprKind::Prefer(inner) = &expr.kind {
            let mut preferred = template.clone();
            preferred.value = Value::Expr(inner.clone());
            preferred.flags.insert(NodeFlags::PREFERRED);
            return preferred;
        }
    }

    // State nodes carry their previous value forward when a stub (the
    // prior state document) provides one.
    if template.flags.contains(NodeFlags::STATE) {
        if let Some(stub) = stub {
            if stub.is_resolved() {
                return merged_clone(stub, template.flags);
            }
        }
    }

    if template.flags.contains(NodeFlags::PREFERRED) {
        return descend_without_stub(template, stub_root);
    }

    match &template.value {
        Value::Template(_) => template.clone(),
        Value::Map(entries) => merge_map(template, entries, stub, stub_root),
        Value::List(items) => merge_list(template, items, stub, stub_root),
        _ => match stub {
            Some(stub) if stub.is_resolved() => merged_clone(stub, NodeFlags::default()),
            _ => template.clone(),
        },
    }
}

fn merged_clone(stub: &Node, extra_flags: NodeFlags) -> Node {
    let mut node = stub.clone();
    node.flags.insert(NodeFlags::MERGED);
    node.flags.insert(extra_flags);
    node
}

/// A pure directive in value position takes the stub value (or the
/// redirect target) outright; with no stub value the expression stays
/// for the evaluator to report or fall back on.
fn apply_directive(
    template: &Node,
    spec: &MergeSpec,
    stub: Option<&Node>,
    stub_root: &Node,
) -> Node {
    let source = match &spec.redirect {
        Some(redirect) => stub_root.find(&redirect.segments),
        None => stub,
    };
    match source {
        Some(value) if value.is_resolved() => {
            let mut node = merged_clone(value, template.flags);
            node.key_name = spec.key.clone().or_else(|| template.key_name.clone());
            node
        }
        _ => template.clone(),
    }
}

/// Recurse into a preferred subtree: stub overrides are suppressed, but
/// insertion keys still need consuming.
fn descend_without_stub(template: &Node, stub_root: &Node) -> Node {
    match &template.value {
        Value::Map(entries) => merge_map(template, entries, None, stub_root),
        Value::List(items) => merge_list(template, items, None, stub_root),
        _ => template.clone(),
    }
}

fn merge_map(
    template: &Node,
    entries: &IndexMap<String, Node>,
    stub: Option<&Node>,
    stub_root: &Node,
) -> Node {
    // Consume an insertion-key directive for this mapping.
    let mut replace = false;
    let mut redirect: Option<Node> = None;
    for key in INSERT_KEYS {
        if let Some(child) = entries.get(key) {
            if let Value::Expr(expr) = &child.value {
                if let Some(spec) = expr.as_merge_directive() {
                    replace = replace || spec.replace;
                    if let Some(target) = &spec.redirect {
                        redirect = stub_root.find(&target.segments).cloned();
                    }
                }
            }
        }
    }

    let effective = if redirect.is_some() {
        redirect.as_ref()
    } else {
        stub
    };

    if replace {
        if let Some(stub) = effective {
            if stub.is_resolved() {
                return merged_clone(stub, template.flags);
            }
        }
    }

    // A resolved non-map stub value overrides the whole mapping.
    let stub_map = match effective {
        Some(stub) => match &stub.value {
            Value::Map(stub_entries) => Some(stub_entries),
            _ if stub.is_resolved() => return merged_clone(stub, NodeFlags::default()),
            _ => None,
        },
        None => None,
    };

    let mut result: IndexMap<String, Node> = IndexMap::new();
    for (key, child) in entries {
        if is_insert_key(key) {
            continue;
        }
        let stub_child = stub_map.and_then(|m| m.get(key));
        result.insert(key.clone(), merge_with(child, stub_child, stub_root));
    }

    // Union: stub-only keys are appended in stub order.
    if let Some(stub_entries) = stub_map {
        for (key, stub_child) in stub_entries {
            if is_insert_key(key) || result.contains_key(key) {
                continue;
            }
            if stub_child.is_resolved() || stub_child.flags.contains(NodeFlags::INJECT) {
                result.insert(key.clone(), merged_clone(stub_child, NodeFlags::default()));
            }
        }
    }

    let mut node = template.clone();
    node.value = Value::Map(result);
    node
}

fn merge_list(
    template: &Node,
    items: &[Node],
    stub: Option<&Node>,
    stub_root: &Node,
) -> Node {
    // A leading `- <<: (( merge on key ))` element turns list merging
    // into a keyed join.
    let mut directive: Option<MergeSpec> = None;
    let mut elements: &[Node] = items;
    if let Some(first) = items.first() {
        if let Value::Map(first_entries) = &first.value {
            for key in INSERT_KEYS {
                if let Some(child) = first_entries.get(key) {
                    if let Value::Expr(expr) = &child.value {
                        if let Some(spec) = expr.as_merge_directive() {
                            directive = Some(spec.clone());
                            elements = &items[1..];
                        }
                    }
                }
            }
        }
    }

    let spec = match directive {
        None => {
            // Default: a resolved stub value replaces the list.
            return match stub {
                Some(stub) if stub.is_resolved() => merged_clone(stub, NodeFlags::default()),
                _ => {
                    let merged: Vec<Node> = items
                        .iter()
                        .map(|item| merge_with(item, None, stub_root))
                        .collect();
                    let mut node = template.clone();
                    node.value = Value::List(merged);
                    node
                }
            };
        }
        Some(spec) => spec,
    };

    let source = match &spec.redirect {
        Some(redirect) => stub_root.find(&redirect.segments),
        None => stub,
    };
    let stub_items: &[Node] = match source {
        Some(node) => match &node.value {
            Value::List(stub_items) if node.is_resolved() => {
                if spec.replace {
                    return merged_clone(node, template.flags);
                }
                stub_items
            }
            _ => &[],
        },
        None => &[],
    };

    let key_name = spec
        .key
        .clone()
        .or_else(|| template.key_name.clone())
        .unwrap_or_else(|| "name".to_string());

    let mut result: Vec<Node> = Vec::new();
    for element in elements {
        let element_key = element.get(&key_name).cloned();
        let matched = element_key.as_ref().and_then(|wanted| {
            stub_items
                .iter()
                .find(|candidate| candidate.get(&key_name) == Some(wanted))
        });
        result.push(merge_with(element, matched, stub_root));
    }
    for stub_element in stub_items {
        let stub_key = match stub_element.get(&key_name) {
            Some(key) => key,
            None => continue,
        };
        let known = elements
            .iter()
            .any(|element| element.get(&key_name) == Some(stub_key));
        if !known {
            result.push(merged_clone(stub_element, NodeFlags::default()));
        }
    }

    let mut node = template.clone();
    node.value = Value::List(result);
    node.key_name = Some(key_name);
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_dynaml::parse_expression;

    fn map_of(pairs: Vec<(&str, Node)>) -> Node {
        let mut entries = IndexMap::new();
        for (k, v) in pairs {
            entries.insert(k.to_string(), v);
        }
        Node::map(entries)
    }

    fn expr_node(source: &str) -> Node {
        Node::expr(parse_expression(source).expect("parse"), "test")
    }

    #[test]
    fn test_scalar_override() {
        let template = map_of(vec![("a", Node::int(1)), ("b", Node::int(2))]);
        let stub = map_of(vec![("a", Node::int(9))]);
        let merged = merge_trees(&template, &[stub]);
        assert_eq!(merged.get("a"), Some(&Node::int(9)));
        assert_eq!(merged.get("b"), Some(&Node::int(2)));
    }

    #[test]
    fn test_union_of_keys() {
        let template = map_of(vec![("a", Node::int(1))]);
        let stub = map_of(vec![("b", Node::int(2))]);
        let merged = merge_trees(&template, &[stub]);
        assert_eq!(merged.get("a"), Some(&Node::int(1)));
        assert_eq!(merged.get("b"), Some(&Node::int(2)));
    }

    #[test]
    fn test_later_stub_wins() {
        let template = map_of(vec![("a", Node::int(1))]);
        let s1 = map_of(vec![("a", Node::int(2))]);
        let s2 = map_of(vec![("a", Node::int(3))]);
        let merged = merge_trees(&template, &[s1, s2]);
        assert_eq!(merged.get("a"), Some(&Node::int(3)));
    }

    #[test]
    fn test_expression_overridden_by_stub() {
        let template = map_of(vec![("z", expr_node("x + y"))]);
        let stub = map_of(vec![("z", Node::int(10))]);
        let merged = merge_trees(&template, &[stub]);
        assert_eq!(merged.get("z"), Some(&Node::int(10)));
    }

    #[test]
    fn test_prefer_resists_override() {
        let template = map_of(vec![("z", expr_node("prefer 5"))]);
        let stub = map_of(vec![("z", Node::int(10))]);
        let merged = merge_trees(&template, &[stub]);
        let z = merged.get("z").expect("z");
        assert!(z.flags.contains(NodeFlags::PREFERRED));
        assert!(matches!(z.value, Value::Expr(_)));
    }

    #[test]
    fn test_list_replaced_by_stub() {
        let template = map_of(vec![("l", Node::list(vec![Node::int(1)]))]);
        let stub = map_of(vec![("l", Node::list(vec![Node::int(2), Node::int(3)]))]);
        let merged = merge_trees(&template, &[stub]);
        match &merged.get("l").expect("l").value {
            Value::List(items) => assert_eq!(items.len(), 2),
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn test_merge_on_key() {
        let directive = map_of(vec![("<<", expr_node("merge on name"))]);
        let template = map_of(vec![(
            "jobs",
            Node::list(vec![
                directive,
                map_of(vec![("name", Node::string("k1")), ("v", Node::int(1))]),
                map_of(vec![("name", Node::string("k2")), ("v", Node::int(2))]),
            ]),
        )]);
        let stub = map_of(vec![(
            "jobs",
            Node::list(vec![
                map_of(vec![("name", Node::string("k2")), ("v", Node::int(99))]),
                map_of(vec![("name", Node::string("k3")), ("v", Node::int(3))]),
            ]),
        )]);

        let merged = merge_trees(&template, &[stub]);
        match &merged.get("jobs").expect("jobs").value {
            Value::List(items) => {
                assert_eq!(items.len(), 3);
                assert_eq!(items[0].get("v"), Some(&Node::int(1)));
                assert_eq!(items[1].get("v"), Some(&Node::int(99)));
                assert_eq!(items[2].get("name"), Some(&Node::string("k3")));
            }
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn test_directive_value_takes_stub() {
        let template = map_of(vec![("cfg", expr_node("merge"))]);
        let stub = map_of(vec![("cfg", map_of(vec![("x", Node::int(1))]))]);
        let merged = merge_trees(&template, &[stub]);
        let cfg = merged.get("cfg").expect("cfg");
        assert!(cfg.flags.contains(NodeFlags::MERGED));
        assert_eq!(cfg.get("x"), Some(&Node::int(1)));
    }

    #[test]
    fn test_directive_without_stub_stays() {
        let template = map_of(vec![("cfg", expr_node("merge"))]);
        let merged = merge_trees(&template, &[map_of(vec![])]);
        assert!(matches!(
            merged.get("cfg").expect("cfg").value,
            Value::Expr(_)
        ));
    }

    #[test]
    fn test_replace_directive() {
        let inner = map_of(vec![
            ("<<", expr_node("merge replace")),
            ("a", Node::int(1)),
        ]);
        let template = map_of(vec![("m", inner)]);
        let stub = map_of(vec![("m", map_of(vec![("b", Node::int(2))]))]);
        let merged = merge_trees(&template, &[stub]);
        let m = merged.get("m").expect("m");
        assert_eq!(m.get("b"), Some(&Node::int(2)));
        assert_eq!(m.get("a"), None);
    }

    #[test]
    fn test_redirect_directive() {
        let inner = map_of(vec![("<<", expr_node("merge other"))]);
        let template = map_of(vec![("m", inner)]);
        let stub = map_of(vec![("other", map_of(vec![("x", Node::int(7))]))]);
        let merged = merge_trees(&template, &[stub]);
        assert_eq!(merged.get("m").expect("m").get("x"), Some(&Node::int(7)));
    }
}
