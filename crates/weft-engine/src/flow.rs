//! Fixed-point flow driver.
//!
//! One pass walks the whole tree in document order, evaluating every
//! expression node. Passes repeat until nothing is unresolved, or until
//! a pass replaces nothing — at which point the remaining nodes are
//! classified (`*` expression error, `@` cycle, `-` dependent) from the
//! reference graph, Kahn-style.

use indexmap::IndexMap;
use std::collections::BTreeSet;
use tracing::{debug, trace};

use crate::api::Options;
use crate::binding::Binding;
use crate::error::{Issue, IssueKind, IssueSet, Result, WeftError};
use crate::eval::{evaluate, marker_flags, Cleanup, Resolution};
use crate::node::{Node, NodeFlags, TemplateValue, Value};
use crate::state::State;
use crate::tags::TagScope;
use weft_dynaml::ast::ExprKind;
use weft_dynaml::{scan_scalar, ScalarScan};

const INSERT_KEYS: [&str; 2] = ["<<", "<<<"];
const MAX_PASSES: usize = 1000;

/// Scan a raw document tree for expressions: string scalars holding
/// `(( … ))` become expression nodes, insertion-key markers attach their
/// flags to the containing collection, `&template` collections become
/// template values.
pub(crate) fn bind_expressions(node: &Node, state: &State, opts: &Options) -> Result<Node> {
    let mut result = node.clone();
    match &node.value {
        Value::String(text) => {
            match scan_scalar(text, state.interpolation_enabled(), opts.preserve_escapes)? {
                ScalarScan::Literal(literal) => result.value = Value::String(literal),
                ScalarScan::Expression(expr) => {
                    // Marker flags become visible to the merge engine
                    // before the expression ever evaluates.
                    if let ExprKind::Marked { markers, .. } = &expr.kind {
                        let (marker_bits, marker_tag) = marker_flags(markers);
                        result.flags.insert(marker_bits);
                        if marker_tag.is_some() {
                            result.tag = marker_tag;
                        }
                    }
                    result.value = Value::Expr(Box::new(expr));
                }
            }
        }
        Value::Map(entries) => {
            let mut bound: IndexMap<String, Node> = IndexMap::new();
            for (key, child) in entries {
                bound.insert(key.clone(), bind_expressions(child, state, opts)?);
            }

            // Marker-only insertion keys flag the mapping itself.
            let mut flags = NodeFlags::default();
            let mut tag = None;
            for key in INSERT_KEYS {
                let markers = match bound.get(key) {
                    Some(child) => match &child.value {
                        Value::Expr(expr) => match &expr.kind {
                            ExprKind::Marked { markers, expr: None } => Some(markers.clone()),
                            _ => None,
                        },
                        _ => None,
                    },
                    None => None,
                };
                if let Some(markers) = markers {
                    let (marker_bits, marker_tag) = marker_flags(&markers);
                    flags.insert(marker_bits);
                    if marker_tag.is_some() {
                        tag = marker_tag;
                    }
                    bound.shift_remove(key);
                }
            }

            result.flags.insert(flags);
            if tag.is_some() {
                result.tag = tag;
            }
            if result.flags.contains(NodeFlags::TEMPLATE) {
                let mut body = result.clone();
                body.value = Value::Map(bound);
                body.flags = NodeFlags::default();
                result.value = Value::Template(TemplateValue {
                    body: Box::new(body),
                });
            } else {
                result.value = Value::Map(bound);
            }
        }
        Value::List(items) => {
            let mut bound: Vec<Node> = Vec::new();
            for item in items {
                bound.push(bind_expressions(item, state, opts)?);
            }

            // A leading marker-only insertion element flags the list.
            let marker_element = bound.first().and_then(|first| match &first.value {
                Value::Map(entries) => {
                    if entries.len() != 1 {
                        return None;
                    }
                    let (key, child) = entries.first()?;
                    if !INSERT_KEYS.contains(&key.as_str()) {
                        return None;
                    }
                    match &child.value {
                        Value::Expr(expr) => match &expr.kind {
                            ExprKind::Marked { markers, expr: None } => Some(markers.clone()),
                            _ => None,
                        },
                        _ => None,
                    }
                }
                _ => None,
            });
            if let Some(markers) = marker_element {
                let (marker_bits, marker_tag) = marker_flags(&markers);
                result.flags.insert(marker_bits);
                if marker_tag.is_some() {
                    result.tag = marker_tag;
                }
                bound.remove(0);
            }

            if result.flags.contains(NodeFlags::TEMPLATE) {
                let mut body = result.clone();
                body.value = Value::List(bound);
                body.flags = NodeFlags::default();
                result.value = Value::Template(TemplateValue {
                    body: Box::new(body),
                });
            } else {
                result.value = Value::List(bound);
            }
        }
        _ => {}
    }
    Ok(result)
}

#[derive(Default)]
struct PassStats {
    replaced: usize,
    cleanups: Vec<Cleanup>,
    hard_issue: Option<Issue>,
}

/// Drive a tree to its fixed point.
pub(crate) fn fixed_point(env: &Binding, tree: Node, opts: &Options) -> Result<Node> {
    let mut tree = tree;
    let mut cleanups: Vec<Cleanup> = Vec::new();
    let mut passes = 0usize;

    loop {
        passes += 1;
        let pass_env = env.with_root(tree.clone());
        let mut stats = PassStats::default();
        tree = flow_node(tree, &pass_env, &mut stats).unwrap_or_else(Node::nil);
        register_tags(&tree, env, &mut stats);
        cleanups.append(&mut stats.cleanups);

        if let Some(issue) = stats.hard_issue {
            run_cleanups(&mut cleanups);
            return Err(WeftError::Unresolved(IssueSet(vec![issue])));
        }

        let unresolved = tree.unresolved_count();
        debug!(pass = passes, unresolved, replaced = stats.replaced, "flow pass");

        if unresolved == 0 {
            break;
        }
        if stats.replaced == 0 {
            if opts.partial {
                break;
            }
            let issues = classify(&tree, env);
            run_cleanups(&mut cleanups);
            return Err(WeftError::Unresolved(IssueSet(issues)));
        }
        if passes >= MAX_PASSES {
            run_cleanups(&mut cleanups);
            return Err(WeftError::Unresolved(IssueSet(vec![Issue::new(format!(
                "no convergence after {} passes",
                passes
            ))])));
        }
    }

    run_cleanups(&mut cleanups);
    Ok(cleanup(tree, opts).unwrap_or_else(Node::nil))
}

fn run_cleanups(cleanups: &mut Vec<Cleanup>) {
    for cleanup in cleanups.drain(..) {
        (cleanup.0)();
    }
}

/// One evaluation step for one node; `None` drops the node (undefined
/// values, stripped entries).
fn flow_node(node: Node, env: &Binding, stats: &mut PassStats) -> Option<Node> {
    let Node {
        value,
        source,
        flags,
        key_name,
        tag,
    } = node;

    match value {
        Value::Expr(expr) => {
            trace!(path = ?env.path(), "evaluating node");
            let out = evaluate(&expr, env, false);
            stats.cleanups.extend(out.info.cleanups.clone());
            match out.res {
                Resolution::Value(mut resolved) => {
                    resolved.flags.insert(flags);
                    resolved.flags.insert(out.info.flags);
                    resolved.source = source;
                    if resolved.key_name.is_none() {
                        resolved.key_name = out.info.key_name.clone().or(key_name);
                    }
                    if resolved.tag.is_none() {
                        resolved.tag = out.info.tag.clone().or(tag);
                    }
                    stats.replaced += 1;
                    Some(resolved)
                }
                Resolution::Deferred(retry) => Some(Node {
                    value: Value::Expr(Box::new(retry)),
                    source,
                    flags,
                    key_name,
                    tag,
                }),
                Resolution::Undefined => {
                    stats.replaced += 1;
                    None
                }
                Resolution::Failed => Some(Node {
                    value: Value::Expr(expr),
                    source,
                    flags,
                    key_name,
                    tag,
                }),
            }
        }
        Value::Map(entries) => {
            let mut result: IndexMap<String, Node> = IndexMap::new();
            for (key, child) in entries {
                let child_env = env.with_path(&key);
                if let Some(flowed) = flow_node(child, &child_env, stats) {
                    // Dynamic entries splice their map value into the
                    // parent, replacing the marked key.
                    if flowed.flags.contains(NodeFlags::DYNAMIC) && flowed.is_resolved() {
                        if let Value::Map(dynamic) = flowed.value {
                            stats.replaced += 1;
                            for (dyn_key, dyn_value) in dynamic {
                                result.insert(dyn_key, dyn_value);
                            }
                            continue;
                        }
                    }
                    result.insert(key, flowed);
                }
            }
            Some(Node {
                value: Value::Map(result),
                source,
                flags,
                key_name,
                tag,
            })
        }
        Value::List(items) => {
            let mut result: Vec<Node> = Vec::new();
            for (index, item) in items.into_iter().enumerate() {
                let child_env = env.with_index(index);
                if let Some(flowed) = flow_node(item, &child_env, stats) {
                    result.push(flowed);
                }
            }
            Some(Node {
                value: Value::List(result),
                source,
                flags,
                key_name,
                tag,
            })
        }
        other => Some(Node {
            value: other,
            source,
            flags,
            key_name,
            tag,
        }),
    }
}

/// Register resolved tagged nodes after each pass, so tag references
/// within the same document can resolve in subsequent passes.
fn register_tags(tree: &Node, env: &Binding, stats: &mut PassStats) {
    fn walk(node: &Node, env: &Binding, stats: &mut PassStats) {
        if let Some(tag) = &node.tag {
            if node.is_resolved() && stats.hard_issue.is_none() {
                let scope = if tag.global {
                    TagScope::Global
                } else {
                    TagScope::Local
                };
                if let Err(message) = env.state().set_tag(&tag.name, node.clone(), scope) {
                    stats.hard_issue = Some(Issue::new(message).at(env.path().to_vec()));
                }
            }
        }
        match &node.value {
            Value::Map(entries) => {
                for (key, child) in entries {
                    walk(child, &env.with_path(key), stats);
                }
            }
            Value::List(items) => {
                for (index, item) in items.iter().enumerate() {
                    walk(item, &env.with_index(index), stats);
                }
            }
            _ => {}
        }
    }
    walk(tree, env, stats);
}

struct PendingNode {
    path: Vec<String>,
    source: String,
    issue: Option<Issue>,
    blocked: Vec<Vec<String>>,
}

/// Classify the nodes left unresolved after a no-progress pass.
fn classify(tree: &Node, env: &Binding) -> Vec<Issue> {
    let pass_env = env.with_root(tree.clone());
    let mut pending: Vec<PendingNode> = Vec::new();
    collect_pending(tree, &pass_env, &mut pending);

    // Dependency edges among the unresolved nodes; an edge exists when
    // a blocked-on path lies in (or contains) another pending node.
    let deps: Vec<Vec<usize>> = pending
        .iter()
        .map(|node| {
            let mut edges = BTreeSet::new();
            for blocked in &node.blocked {
                for (index, other) in pending.iter().enumerate() {
                    if covers(&other.path, blocked) {
                        edges.insert(index);
                    }
                }
            }
            edges.into_iter().collect()
        })
        .collect();

    let mut kinds: Vec<Option<IssueKind>> = vec![None; pending.len()];

    // Peel: no in-set dependencies is a direct error; all dependencies
    // classified is a dependent node.
    loop {
        let mut changed = false;
        for index in 0..pending.len() {
            if kinds[index].is_some() {
                continue;
            }
            if deps[index].is_empty() {
                kinds[index] = Some(IssueKind::Error);
                changed = true;
            } else if deps[index].iter().all(|&dep| kinds[dep].is_some()) {
                kinds[index] = Some(IssueKind::Dependent);
                changed = true;
            }
        }
        if changed {
            continue;
        }

        // Stalled: the remaining subgraph contains cycles. Nodes that
        // can reach themselves are cycle members.
        let mut marked = false;
        for index in 0..pending.len() {
            if kinds[index].is_none() && reaches_self(index, &deps, &kinds) {
                kinds[index] = Some(IssueKind::Cycle);
                marked = true;
            }
        }
        if !marked {
            break;
        }
    }

    pending
        .into_iter()
        .zip(kinds)
        .map(|(node, kind)| {
            let kind = kind.unwrap_or(IssueKind::Cycle);
            let message = match &node.issue {
                Some(issue) => issue.message.clone(),
                None => match kind {
                    IssueKind::Cycle => "cyclic reference".to_string(),
                    IssueKind::Dependent => "dependent on unresolved node".to_string(),
                    IssueKind::Error => "node unresolved".to_string(),
                },
            };
            let mut issue = Issue::new(message)
                .kind(kind)
                .at(node.path)
                .from_source(&node.source);
            if let Some(original) = node.issue {
                issue.nested = original.nested;
            }
            issue
        })
        .collect()
}

fn collect_pending(node: &Node, env: &Binding, pending: &mut Vec<PendingNode>) {
    match &node.value {
        Value::Expr(expr) => {
            let out = evaluate(expr, env, false);
            pending.push(PendingNode {
                path: env.path().to_vec(),
                source: node.source.to_string(),
                issue: out.info.issue,
                blocked: out.info.blocked_on,
            });
        }
        Value::Map(entries) => {
            for (key, child) in entries {
                collect_pending(child, &env.with_path(key), pending);
            }
        }
        Value::List(items) => {
            for (index, item) in items.iter().enumerate() {
                collect_pending(item, &env.with_index(index), pending);
            }
        }
        _ => {}
    }
}

fn covers(a: &[String], b: &[String]) -> bool {
    let shorter = a.len().min(b.len());
    a[..shorter] == b[..shorter]
}

fn reaches_self(start: usize, deps: &[Vec<usize>], kinds: &[Option<IssueKind>]) -> bool {
    let mut visited = BTreeSet::new();
    let mut stack: Vec<usize> = deps[start]
        .iter()
        .copied()
        .filter(|&dep| kinds[dep].is_none())
        .collect();
    while let Some(current) = stack.pop() {
        if current == start {
            return true;
        }
        if !visited.insert(current) {
            continue;
        }
        for &next in &deps[current] {
            if kinds[next].is_none() {
                stack.push(next);
            }
        }
    }
    false
}

/// Strip temporary and local nodes from the final tree.
pub(crate) fn cleanup(node: Node, opts: &Options) -> Option<Node> {
    if node.flags.contains(NodeFlags::TEMPORARY) && !opts.preserve_temporary {
        return None;
    }
    if node.flags.contains(NodeFlags::LOCAL) {
        return None;
    }
    let mut node = node;
    node.value = match node.value {
        Value::Map(entries) => {
            let mut result = IndexMap::new();
            for (key, child) in entries {
                if let Some(cleaned) = cleanup(child, opts) {
                    result.insert(key, cleaned);
                }
            }
            Value::Map(result)
        }
        Value::List(items) => Value::List(
            items
                .into_iter()
                .filter_map(|item| cleanup(item, opts))
                .collect(),
        ),
        other => other,
    };
    Some(node)
}

/// Extract the `&state`-flagged subtree of a processed document.
pub(crate) fn extract_state(node: &Node) -> Option<Node> {
    if node.flags.contains(NodeFlags::STATE) {
        return Some(node.clone());
    }
    match &node.value {
        Value::Map(entries) => {
            let mut result = IndexMap::new();
            for (key, child) in entries {
                if let Some(extracted) = extract_state(child) {
                    result.insert(key.clone(), extracted);
                }
            }
            if result.is_empty() {
                None
            } else {
                let mut state_node = node.clone();
                state_node.value = Value::Map(result);
                Some(state_node)
            }
        }
        Value::List(items) => {
            let extracted: Vec<Node> = items.iter().filter_map(extract_state).collect();
            if extracted.is_empty() {
                None
            } else {
                let mut state_node = node.clone();
                state_node.value = Value::List(extracted);
                Some(state_node)
            }
        }
        _ => None,
    }
}
