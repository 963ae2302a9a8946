//! List and map construction, ranges, and the comprehension forms.

use indexmap::IndexMap;

use super::{evaluate, is_truthy, resolve_operand, EvalOut, EvaluationInfo, Resolution};
use crate::binding::Binding;
use crate::node::{Node, Value};
use weft_dynaml::ast::{Expr, ExprKind, IterBody};

/// `[a..b]` — inclusive integer range, ascending or descending.
pub(super) fn eval_range(
    whole: &Expr,
    start: Option<&Expr>,
    end: Option<&Expr>,
    env: &Binding,
    locally: bool,
) -> EvalOut {
    let mut info = EvaluationInfo::default();
    let (start, end) = match (start, end) {
        (Some(start), Some(end)) => (start, end),
        _ => return EvalOut::fail("range requires both bounds"),
    };
    let start = match int_operand(whole, start, env, locally, &mut info) {
        Ok(v) => v,
        Err(out) => return out,
    };
    let end = match int_operand(whole, end, env, locally, &mut info) {
        Ok(v) => v,
        Err(out) => return out,
    };

    let items: Vec<Node> = if start <= end {
        (start..=end).map(Node::int).collect()
    } else {
        (end..=start).rev().map(Node::int).collect()
    };
    EvalOut {
        res: Resolution::Value(Node::new(Value::List(items), env.source())),
        info,
    }
}

fn int_operand(
    whole: &Expr,
    expr: &Expr,
    env: &Binding,
    locally: bool,
    info: &mut EvaluationInfo,
) -> Result<i64, EvalOut> {
    let node = resolve_operand(whole, expr, env, locally, info)?;
    match node.value {
        Value::Int(v) => Ok(v),
        ref other => Err(EvalOut::fail(format!(
            "integer required, found {}",
            other.type_name()
        ))
        .with_info(info.clone())),
    }
}

/// List literal; `expr...` elements splice their list value.
pub(super) fn eval_list(whole: &Expr, items: &[Expr], env: &Binding, locally: bool) -> EvalOut {
    let mut info = EvaluationInfo::default();
    let mut result = Vec::with_capacity(items.len());
    for item in items {
        match &item.kind {
            ExprKind::Expansion(inner) => {
                let node = match resolve_operand(whole, inner, env, locally, &mut info) {
                    Ok(node) => node,
                    Err(out) => return out,
                };
                match node.value {
                    Value::List(elements) => result.extend(elements),
                    ref other => {
                        return EvalOut::fail(format!(
                            "list expansion requires a list, found {}",
                            other.type_name()
                        ))
                        .with_info(info)
                    }
                }
            }
            _ => {
                let out = evaluate(item, env, locally);
                info = info.join(out.info);
                match out.res {
                    Resolution::Value(node) => result.push(node),
                    Resolution::Undefined => {}
                    Resolution::Deferred(_) => {
                        return EvalOut {
                            res: Resolution::Deferred(whole.clone()),
                            info,
                        }
                    }
                    Resolution::Failed => {
                        return EvalOut {
                            res: Resolution::Failed,
                            info,
                        }
                    }
                }
            }
        }
    }
    EvalOut {
        res: Resolution::Value(Node::new(Value::List(result), env.source())),
        info,
    }
}

/// `{ k = v, … }` map literal. Single-segment reference keys and
/// symbols are literal names; other key expressions must evaluate to
/// strings.
pub(super) fn eval_map_lit(
    whole: &Expr,
    entries: &[(Expr, Expr)],
    env: &Binding,
    locally: bool,
) -> EvalOut {
    let mut info = EvaluationInfo::default();
    let mut result: IndexMap<String, Node> = IndexMap::new();
    for (key_expr, value_expr) in entries {
        let key = match literal_key(key_expr) {
            Some(key) => key,
            None => {
                let node = match resolve_operand(whole, key_expr, env, locally, &mut info) {
                    Ok(node) => node,
                    Err(out) => return out,
                };
                match node.value {
                    Value::String(key) => key,
                    ref other => {
                        return EvalOut::fail(format!(
                            "map key must be a string, found {}",
                            other.type_name()
                        ))
                        .with_info(info)
                    }
                }
            }
        };
        if result.contains_key(&key) {
            return EvalOut::fail(format!("duplicate key '{}'", key)).with_info(info);
        }
        let out = evaluate(value_expr, env, locally);
        info = info.join(out.info);
        match out.res {
            Resolution::Value(node) => {
                result.insert(key, node);
            }
            Resolution::Undefined => {}
            Resolution::Deferred(_) => {
                return EvalOut {
                    res: Resolution::Deferred(whole.clone()),
                    info,
                }
            }
            Resolution::Failed => {
                return EvalOut {
                    res: Resolution::Failed,
                    info,
                }
            }
        }
    }
    EvalOut {
        res: Resolution::Value(Node::new(Value::Map(result), env.source())),
        info,
    }
}

fn literal_key(expr: &Expr) -> Option<String> {
    match &expr.kind {
        ExprKind::Ref(path) => path.as_single_key().map(str::to_string),
        ExprKind::Symbol(name) => Some(name.clone()),
        ExprKind::Str(text) => Some(text.clone()),
        _ => None,
    }
}

/// The iteration source: list elements with indices, or map values with
/// keys.
enum IterSource {
    List(Vec<Node>),
    Map(IndexMap<String, Node>),
}

fn iter_source(
    whole: &Expr,
    source: &Expr,
    env: &Binding,
    locally: bool,
    info: &mut EvaluationInfo,
) -> Result<IterSource, EvalOut> {
    let node = resolve_operand(whole, source, env, locally, info)?;
    match node.value {
        Value::List(items) => Ok(IterSource::List(items)),
        Value::Map(entries) => Ok(IterSource::Map(entries)),
        ref other => Err(EvalOut::fail(format!(
            "iteration requires a list or map, found {}",
            other.type_name()
        ))
        .with_info(info.clone())),
    }
}

/// Bind the iteration parameters: first the element, then the index or
/// key.
fn iteration_scope(body: &IterBody, element: &Node, key: &Node) -> IndexMap<String, Node> {
    let mut scope = IndexMap::new();
    let mut params = body.params.iter();
    if let Some(element_param) = params.next() {
        scope.insert(element_param.clone(), element.clone());
    }
    if let Some(key_param) = params.next() {
        scope.insert(key_param.clone(), key.clone());
    }
    scope
}

enum IterOutcome {
    Value(Node),
    Skip,
    Short(EvalOut),
}

fn iterate_body(
    whole: &Expr,
    body: &IterBody,
    element: &Node,
    key: &Node,
    env: &Binding,
    locally: bool,
    info: &mut EvaluationInfo,
) -> IterOutcome {
    let body_env = env.with_local_scope(iteration_scope(body, element, key));
    let out = evaluate(&body.body, &body_env, locally);
    *info = std::mem::take(info).join(out.info);
    match out.res {
        Resolution::Value(node) => IterOutcome::Value(node),
        Resolution::Undefined => IterOutcome::Skip,
        Resolution::Deferred(_) => IterOutcome::Short(EvalOut {
            res: Resolution::Deferred(whole.clone()),
            info: info.clone(),
        }),
        Resolution::Failed => IterOutcome::Short(EvalOut {
            res: Resolution::Failed,
            info: info.clone(),
        }),
    }
}

/// `map[src|x,y|body]` / `map{src|x,y|body}`.
pub(super) fn eval_mapping(
    whole: &Expr,
    source: &Expr,
    to_map: bool,
    body: &IterBody,
    env: &Binding,
    locally: bool,
) -> EvalOut {
    let mut info = EvaluationInfo::default();
    let source = match iter_source(whole, source, env, locally, &mut info) {
        Ok(source) => source,
        Err(out) => return out,
    };

    match source {
        IterSource::List(items) => {
            if to_map {
                return EvalOut::fail("map{} requires a map source");
            }
            let mut result = Vec::with_capacity(items.len());
            for (index, element) in items.iter().enumerate() {
                let key = Node::int(index as i64);
                match iterate_body(whole, body, element, &key, env, locally, &mut info) {
                    IterOutcome::Value(node) => result.push(node),
                    IterOutcome::Skip => {}
                    IterOutcome::Short(out) => return out,
                }
            }
            EvalOut {
                res: Resolution::Value(Node::new(Value::List(result), env.source())),
                info,
            }
        }
        IterSource::Map(entries) => {
            if to_map {
                let mut result = IndexMap::new();
                for (key, element) in &entries {
                    let key_node = Node::string(key.clone());
                    match iterate_body(whole, body, element, &key_node, env, locally, &mut info) {
                        IterOutcome::Value(node) => {
                            result.insert(key.clone(), node);
                        }
                        IterOutcome::Skip => {}
                        IterOutcome::Short(out) => return out,
                    }
                }
                EvalOut {
                    res: Resolution::Value(Node::new(Value::Map(result), env.source())),
                    info,
                }
            } else {
                let mut result = Vec::with_capacity(entries.len());
                for (key, element) in &entries {
                    let key_node = Node::string(key.clone());
                    match iterate_body(whole, body, element, &key_node, env, locally, &mut info) {
                        IterOutcome::Value(node) => result.push(node),
                        IterOutcome::Skip => {}
                        IterOutcome::Short(out) => return out,
                    }
                }
                EvalOut {
                    res: Resolution::Value(Node::new(Value::List(result), env.source())),
                    info,
                }
            }
        }
    }
}

/// `select[src|x,y|body]` / `select{src|x,y|body}` — keep entries whose
/// body is truthy.
pub(super) fn eval_selection(
    whole: &Expr,
    source: &Expr,
    to_map: bool,
    body: &IterBody,
    env: &Binding,
    locally: bool,
) -> EvalOut {
    let mut info = EvaluationInfo::default();
    let source = match iter_source(whole, source, env, locally, &mut info) {
        Ok(source) => source,
        Err(out) => return out,
    };

    match source {
        IterSource::List(items) => {
            if to_map {
                return EvalOut::fail("select{} requires a map source");
            }
            let mut result = Vec::new();
            for (index, element) in items.iter().enumerate() {
                let key = Node::int(index as i64);
                match iterate_body(whole, body, element, &key, env, locally, &mut info) {
                    IterOutcome::Value(node) => {
                        if is_truthy(&node) {
                            result.push(element.clone());
                        }
                    }
                    IterOutcome::Skip => {}
                    IterOutcome::Short(out) => return out,
                }
            }
            EvalOut {
                res: Resolution::Value(Node::new(Value::List(result), env.source())),
                info,
            }
        }
        IterSource::Map(entries) => {
            let mut list_result = Vec::new();
            let mut map_result = IndexMap::new();
            for (key, element) in &entries {
                let key_node = Node::string(key.clone());
                match iterate_body(whole, body, element, &key_node, env, locally, &mut info) {
                    IterOutcome::Value(node) => {
                        if is_truthy(&node) {
                            if to_map {
                                map_result.insert(key.clone(), element.clone());
                            } else {
                                list_result.push(element.clone());
                            }
                        }
                    }
                    IterOutcome::Skip => {}
                    IterOutcome::Short(out) => return out,
                }
            }
            let value = if to_map {
                Value::Map(map_result)
            } else {
                Value::List(list_result)
            };
            EvalOut {
                res: Resolution::Value(Node::new(value, env.source())),
                info,
            }
        }
    }
}

/// `sum[src|init|acc,x,k|body]` — left fold.
pub(super) fn eval_fold(
    whole: &Expr,
    source: &Expr,
    init: &Expr,
    body: &IterBody,
    env: &Binding,
    locally: bool,
) -> EvalOut {
    let mut info = EvaluationInfo::default();
    let source = match iter_source(whole, source, env, locally, &mut info) {
        Ok(source) => source,
        Err(out) => return out,
    };
    let mut acc = match resolve_operand(whole, init, env, locally, &mut info) {
        Ok(node) => node,
        Err(out) => return out,
    };

    let pairs: Vec<(Node, Node)> = match source {
        IterSource::List(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, element)| (Node::int(i as i64), element))
            .collect(),
        IterSource::Map(entries) => entries
            .into_iter()
            .map(|(k, element)| (Node::string(k), element))
            .collect(),
    };

    for (key, element) in pairs {
        let mut scope = IndexMap::new();
        let mut params = body.params.iter();
        if let Some(acc_param) = params.next() {
            scope.insert(acc_param.clone(), acc.clone());
        }
        if let Some(element_param) = params.next() {
            scope.insert(element_param.clone(), element.clone());
        }
        if let Some(key_param) = params.next() {
            scope.insert(key_param.clone(), key.clone());
        }
        let body_env = env.with_local_scope(scope);
        let out = evaluate(&body.body, &body_env, locally);
        info = info.join(out.info);
        acc = match out.res {
            Resolution::Value(node) => node,
            Resolution::Undefined => acc,
            Resolution::Deferred(_) => {
                return EvalOut {
                    res: Resolution::Deferred(whole.clone()),
                    info,
                }
            }
            Resolution::Failed => {
                return EvalOut {
                    res: Resolution::Failed,
                    info,
                }
            }
        };
    }

    EvalOut {
        res: Resolution::Value(acc),
        info,
    }
}
