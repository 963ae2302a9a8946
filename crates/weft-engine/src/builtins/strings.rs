//! String built-ins.

use regex::Regex;

use super::{int_arg, string_arg};
use crate::binding::Binding;
use crate::eval::EvalOut;
use crate::node::{Node, Value};

pub(super) fn trim(args: &[Node], _env: &Binding) -> EvalOut {
    match string_arg(args, 0, "trim") {
        Ok(s) => EvalOut::value(Node::string(s.trim())),
        Err(out) => out,
    }
}

/// `split(separator, string)`.
pub(super) fn split(args: &[Node], _env: &Binding) -> EvalOut {
    let sep = match string_arg(args, 0, "split") {
        Ok(s) => s,
        Err(out) => return out,
    };
    let text = match string_arg(args, 1, "split") {
        Ok(s) => s,
        Err(out) => return out,
    };
    let parts: Vec<Node> = if sep.is_empty() {
        text.chars().map(|c| Node::string(c.to_string())).collect()
    } else {
        text.split(sep).map(Node::string).collect()
    };
    EvalOut::value(Node::list(parts))
}

/// `join(separator, items…)` — list arguments are flattened.
pub(super) fn join(args: &[Node], _env: &Binding) -> EvalOut {
    let sep = match string_arg(args, 0, "join") {
        Ok(s) => s.to_string(),
        Err(out) => return out,
    };
    let mut parts = Vec::new();
    for arg in &args[1..] {
        match &arg.value {
            Value::List(items) => {
                for item in items {
                    parts.push(item.stringify());
                }
            }
            _ => parts.push(arg.stringify()),
        }
    }
    EvalOut::value(Node::string(parts.join(&sep)))
}

/// `replace(string, from, to [, count])`.
pub(super) fn replace(args: &[Node], _env: &Binding) -> EvalOut {
    let text = match string_arg(args, 0, "replace") {
        Ok(s) => s,
        Err(out) => return out,
    };
    let from = match string_arg(args, 1, "replace") {
        Ok(s) => s,
        Err(out) => return out,
    };
    let to = match string_arg(args, 2, "replace") {
        Ok(s) => s,
        Err(out) => return out,
    };
    let result = if args.len() > 3 {
        let count = match int_arg(args, 3, "replace") {
            Ok(v) => v,
            Err(out) => return out,
        };
        if count < 0 {
            text.replace(from, to)
        } else {
            text.replacen(from, to, count as usize)
        }
    } else {
        text.replace(from, to)
    };
    EvalOut::value(Node::string(result))
}

pub(super) fn uppercase(args: &[Node], _env: &Binding) -> EvalOut {
    match string_arg(args, 0, "uppercase") {
        Ok(s) => EvalOut::value(Node::string(s.to_uppercase())),
        Err(out) => out,
    }
}

pub(super) fn lowercase(args: &[Node], _env: &Binding) -> EvalOut {
    match string_arg(args, 0, "lowercase") {
        Ok(s) => EvalOut::value(Node::string(s.to_lowercase())),
        Err(out) => out,
    }
}

/// `match(pattern, string)` — whether the regular expression matches.
pub(super) fn match_(args: &[Node], _env: &Binding) -> EvalOut {
    let pattern = match string_arg(args, 0, "match") {
        Ok(s) => s,
        Err(out) => return out,
    };
    let text = match string_arg(args, 1, "match") {
        Ok(s) => s,
        Err(out) => return out,
    };
    match Regex::new(pattern) {
        Ok(re) => EvalOut::value(Node::bool(re.is_match(text))),
        Err(err) => EvalOut::fail(format!("match: invalid pattern: {}", err)),
    }
}

/// `format(fmt, args…)` with `%s`, `%d`, `%f` and `%%` verbs.
pub(super) fn format(args: &[Node], _env: &Binding) -> EvalOut {
    let fmt = match string_arg(args, 0, "format") {
        Ok(s) => s,
        Err(out) => return out,
    };
    let mut values = args[1..].iter();
    let mut result = String::with_capacity(fmt.len());
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => result.push('%'),
            Some('s') => match values.next() {
                Some(node) => result.push_str(&node.stringify()),
                None => return EvalOut::fail("format: too few arguments"),
            },
            Some('d') => match values.next() {
                Some(node) => match node.value {
                    Value::Int(v) => result.push_str(&v.to_string()),
                    Value::Float(v) => result.push_str(&(v as i64).to_string()),
                    ref other => {
                        return EvalOut::fail(format!(
                            "format: %d requires a number, found {}",
                            other.type_name()
                        ))
                    }
                },
                None => return EvalOut::fail("format: too few arguments"),
            },
            Some('f') => match values.next() {
                Some(node) => match node.value {
                    Value::Int(v) => result.push_str(&format!("{:.6}", v as f64)),
                    Value::Float(v) => result.push_str(&format!("{:.6}", v)),
                    ref other => {
                        return EvalOut::fail(format!(
                            "format: %f requires a number, found {}",
                            other.type_name()
                        ))
                    }
                },
                None => return EvalOut::fail("format: too few arguments"),
            },
            Some(other) => {
                return EvalOut::fail(format!("format: unsupported verb '%{}'", other))
            }
            None => return EvalOut::fail("format: dangling '%'"),
        }
    }
    EvalOut::value(Node::string(result))
}
