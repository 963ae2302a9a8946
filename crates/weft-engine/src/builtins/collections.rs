//! Collection built-ins.

use super::{list_arg, string_arg};
use crate::binding::Binding;
use crate::eval::EvalOut;
use crate::node::{Node, Value};

pub(super) fn length(args: &[Node], _env: &Binding) -> EvalOut {
    let len = match &args[0].value {
        Value::String(s) => s.chars().count(),
        Value::List(items) => items.len(),
        Value::Map(entries) => entries.len(),
        other => {
            return EvalOut::fail(format!(
                "length: string, list or map required, found {}",
                other.type_name()
            ))
        }
    };
    EvalOut::value(Node::int(len as i64))
}

pub(super) fn keys(args: &[Node], _env: &Binding) -> EvalOut {
    match &args[0].value {
        Value::Map(entries) => EvalOut::value(Node::list(
            entries.keys().map(|k| Node::string(k.clone())).collect(),
        )),
        other => EvalOut::fail(format!("keys: map required, found {}", other.type_name())),
    }
}

pub(super) fn values(args: &[Node], _env: &Binding) -> EvalOut {
    match &args[0].value {
        Value::Map(entries) => EvalOut::value(Node::list(entries.values().cloned().collect())),
        Value::List(items) => EvalOut::value(Node::list(items.clone())),
        other => EvalOut::fail(format!(
            "values: map or list required, found {}",
            other.type_name()
        )),
    }
}

/// `contains(list, element)` or `contains(string, substring)`.
pub(super) fn contains(args: &[Node], _env: &Binding) -> EvalOut {
    match &args[0].value {
        Value::List(items) => EvalOut::value(Node::bool(items.contains(&args[1]))),
        Value::String(text) => match string_arg(args, 1, "contains") {
            Ok(needle) => EvalOut::value(Node::bool(text.contains(needle))),
            Err(out) => out,
        },
        other => EvalOut::fail(format!(
            "contains: list or string required, found {}",
            other.type_name()
        )),
    }
}

pub(super) fn uniq(args: &[Node], _env: &Binding) -> EvalOut {
    let items = match list_arg(args, 0, "uniq") {
        Ok(items) => items,
        Err(out) => return out,
    };
    let mut result: Vec<Node> = Vec::new();
    for item in items {
        if !result.contains(item) {
            result.push(item.clone());
        }
    }
    EvalOut::value(Node::list(result))
}

/// Sort a list of same-category scalars.
pub(super) fn sort(args: &[Node], _env: &Binding) -> EvalOut {
    let items = match list_arg(args, 0, "sort") {
        Ok(items) => items,
        Err(out) => return out,
    };
    let mut result = items.to_vec();

    let all_strings = result
        .iter()
        .all(|n| matches!(n.value, Value::String(_)));
    let all_numbers = result
        .iter()
        .all(|n| matches!(n.value, Value::Int(_) | Value::Float(_)));

    if all_strings {
        result.sort_by(|a, b| a.stringify().cmp(&b.stringify()));
    } else if all_numbers {
        result.sort_by(|a, b| {
            let a = match a.value {
                Value::Int(v) => v as f64,
                Value::Float(v) => v,
                _ => unreachable!("checked numeric"),
            };
            let b = match b.value {
                Value::Int(v) => v as f64,
                Value::Float(v) => v,
                _ => unreachable!("checked numeric"),
            };
            a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
        });
    } else {
        return EvalOut::fail("sort: list elements must be all strings or all numbers");
    }
    EvalOut::value(Node::list(result))
}
