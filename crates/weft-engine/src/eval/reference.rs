//! Reference resolution: static paths, dynamic indices, slices and
//! projections.

use super::{resolve_operand, EvalOut, EvaluationInfo, Resolution};
use crate::binding::{Binding, Lookup};
use crate::node::{Node, Value};
use weft_dynaml::ast::{Expr, PathSeg, RefPath};

/// Resolve a reference. An unresolved target defers the whole
/// expression and records the target path for cycle classification; a
/// missing target defers with a diagnostic, since a later pass (or a
/// dynamic splice) may still produce it.
pub(super) fn eval_ref(whole: &Expr, path: &RefPath, env: &Binding) -> EvalOut {
    match env.find_reference(path) {
        Lookup::Found { node, abs_path } => {
            if node.is_resolved() {
                let mut found = node;
                found.source = std::rc::Rc::from(env.source());
                EvalOut::value(found)
            } else {
                let mut info = EvaluationInfo::default();
                if let Some(abs) = abs_path {
                    info.blocked_on.push(abs);
                }
                EvalOut::deferred(whole.clone()).with_info(info)
            }
        }
        Lookup::NotFound => {
            let mut out = EvalOut::deferred(whole.clone());
            out.info.issue = Some(crate::error::Issue::new(format!(
                "'{}' not found",
                path
            )));
            out
        }
        Lookup::Invalid(message) => EvalOut::fail(message),
    }
}

/// `base.[index]` — index may be a string key, an integer, or a list of
/// successive index steps.
pub(super) fn eval_dynref(
    whole: &Expr,
    base: &Expr,
    index: &Expr,
    env: &Binding,
    locally: bool,
) -> EvalOut {
    let mut info = EvaluationInfo::default();
    let base_node = match resolve_operand(whole, base, env, locally, &mut info) {
        Ok(node) => node,
        Err(out) => return out,
    };
    let index_node = match resolve_operand(whole, index, env, locally, &mut info) {
        Ok(node) => node,
        Err(out) => return out,
    };

    let steps = match index_steps(&index_node) {
        Ok(steps) => steps,
        Err(message) => return EvalOut::fail(message).with_info(info),
    };

    let mut current = base_node;
    for step in steps {
        let next = match (&step, &current.value) {
            (PathSeg::Key(key), Value::Map(_)) => current.get(key).cloned(),
            (PathSeg::Index(idx), Value::List(_)) => current.at(*idx).cloned(),
            (PathSeg::Index(idx), Value::Map(_)) => current.get(&idx.to_string()).cloned(),
            _ => {
                return EvalOut::fail(format!(
                    "cannot index {} with {}",
                    current.value.type_name(),
                    step
                ))
                .with_info(info)
            }
        };
        current = match next {
            Some(node) => node,
            None => {
                return EvalOut::fail(format!("index '{}' not found", step)).with_info(info);
            }
        };
    }

    if !current.is_resolved() {
        return EvalOut::deferred(whole.clone()).with_info(info);
    }
    EvalOut {
        res: Resolution::Value(current),
        info,
    }
}

fn index_steps(index: &Node) -> Result<Vec<PathSeg>, String> {
    match &index.value {
        Value::String(key) => Ok(vec![PathSeg::Key(key.clone())]),
        Value::Int(idx) => Ok(vec![PathSeg::Index(*idx)]),
        Value::List(items) => {
            let mut steps = Vec::new();
            for item in items {
                match &item.value {
                    Value::String(key) => steps.push(PathSeg::Key(key.clone())),
                    Value::Int(idx) => steps.push(PathSeg::Index(*idx)),
                    other => {
                        return Err(format!(
                            "dynamic index elements must be strings or integers, found {}",
                            other.type_name()
                        ))
                    }
                }
            }
            Ok(steps)
        }
        other => Err(format!(
            "dynamic index must be a string, integer or list, found {}",
            other.type_name()
        )),
    }
}

/// `base.[start..end]` — inclusive sublist; negative bounds count from
/// the end.
pub(super) fn eval_slice(
    whole: &Expr,
    base: &Expr,
    start: Option<&Expr>,
    end: Option<&Expr>,
    env: &Binding,
    locally: bool,
) -> EvalOut {
    let mut info = EvaluationInfo::default();
    let base_node = match resolve_operand(whole, base, env, locally, &mut info) {
        Ok(node) => node,
        Err(out) => return out,
    };
    let items = match &base_node.value {
        Value::List(items) => items,
        other => {
            return EvalOut::fail(format!("slice requires a list, found {}", other.type_name()))
                .with_info(info)
        }
    };

    let mut bound = |expr: Option<&Expr>, default: i64| -> Result<i64, EvalOut> {
        match expr {
            None => Ok(default),
            Some(e) => {
                let node = resolve_operand(whole, e, env, locally, &mut info)?;
                match node.value {
                    Value::Int(v) => Ok(v),
                    ref other => Err(EvalOut::fail(format!(
                        "slice bound must be an integer, found {}",
                        other.type_name()
                    ))),
                }
            }
        }
    };

    let len = items.len() as i64;
    let lo = match bound(start, 0) {
        Ok(v) => v,
        Err(out) => return out,
    };
    let hi = match bound(end, len - 1) {
        Ok(v) => v,
        Err(out) => return out,
    };
    let lo = if lo < 0 { len + lo } else { lo };
    let hi = if hi < 0 { len + hi } else { hi };
    if lo < 0 || hi >= len || lo > hi + 1 {
        return EvalOut::fail(format!("slice [{}..{}] out of range for {} elements", lo, hi, len))
            .with_info(info);
    }
    let slice: Vec<Node> = if lo > hi {
        Vec::new()
    } else {
        items[lo as usize..=hi as usize].to_vec()
    };
    EvalOut {
        res: Resolution::Value(Node::new(Value::List(slice), env.source())),
        info,
    }
}

/// `base.[*].follow…` — apply the follow path to every element. If any
/// element defers, the whole projection defers; later elements are not
/// touched.
pub(super) fn eval_projection(
    whole: &Expr,
    base: &Expr,
    follow: &[PathSeg],
    env: &Binding,
    locally: bool,
) -> EvalOut {
    let mut info = EvaluationInfo::default();
    let base_node = match resolve_operand(whole, base, env, locally, &mut info) {
        Ok(node) => node,
        Err(out) => return out,
    };

    let elements: Vec<Node> = match &base_node.value {
        Value::List(items) => items.clone(),
        Value::Map(entries) => entries.values().cloned().collect(),
        other => {
            return EvalOut::fail(format!(
                "projection requires a list or map, found {}",
                other.type_name()
            ))
            .with_info(info)
        }
    };

    let mut result = Vec::with_capacity(elements.len());
    for element in &elements {
        if !element.is_resolved() {
            return EvalOut::deferred(whole.clone()).with_info(info);
        }
        let projected = if follow.is_empty() {
            element.clone()
        } else {
            match element.find(follow) {
                Some(node) => node.clone(),
                None => {
                    let follow_text: Vec<String> =
                        follow.iter().map(|s| s.to_string()).collect();
                    return EvalOut::fail(format!(
                        "'{}' not found in projected element",
                        follow_text.join(".")
                    ))
                    .with_info(info);
                }
            }
        };
        if !projected.is_resolved() {
            return EvalOut::deferred(whole.clone()).with_info(info);
        }
        result.push(projected);
    }

    EvalOut {
        res: Resolution::Value(Node::new(Value::List(result), env.source())),
        info,
    }
}
