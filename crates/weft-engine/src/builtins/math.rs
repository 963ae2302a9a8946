//! Arithmetic built-ins.

use crate::binding::Binding;
use crate::eval::EvalOut;
use crate::node::{Node, Value};

enum Num {
    Int(i64),
    Float(f64),
}

fn numeric(node: &Node, name: &str) -> Result<Num, EvalOut> {
    match &node.value {
        Value::Int(v) => Ok(Num::Int(*v)),
        Value::Float(v) => Ok(Num::Float(*v)),
        other => Err(EvalOut::fail(format!(
            "{}: number required, found {}",
            name,
            other.type_name()
        ))),
    }
}

fn fold_extreme(args: &[Node], name: &str, pick_left: fn(f64, f64) -> bool) -> EvalOut {
    let mut best: Option<Num> = None;
    for arg in args {
        let candidate = match numeric(arg, name) {
            Ok(n) => n,
            Err(out) => return out,
        };
        best = Some(match best {
            None => candidate,
            Some(current) => {
                let (cur_f, cand_f) = (as_f64(&current), as_f64(&candidate));
                if pick_left(cur_f, cand_f) {
                    current
                } else {
                    candidate
                }
            }
        });
    }
    match best {
        Some(Num::Int(v)) => EvalOut::value(Node::int(v)),
        Some(Num::Float(v)) => EvalOut::value(Node::float(v)),
        None => EvalOut::fail(format!("{}: at least one argument required", name)),
    }
}

fn as_f64(n: &Num) -> f64 {
    match n {
        Num::Int(v) => *v as f64,
        Num::Float(v) => *v,
    }
}

pub(super) fn min(args: &[Node], _env: &Binding) -> EvalOut {
    fold_extreme(args, "min", |current, candidate| current <= candidate)
}

pub(super) fn max(args: &[Node], _env: &Binding) -> EvalOut {
    fold_extreme(args, "max", |current, candidate| current >= candidate)
}

pub(super) fn modulo(args: &[Node], _env: &Binding) -> EvalOut {
    let a = match numeric(&args[0], "mod") {
        Ok(n) => n,
        Err(out) => return out,
    };
    let b = match numeric(&args[1], "mod") {
        Ok(n) => n,
        Err(out) => return out,
    };
    match (a, b) {
        (Num::Int(_), Num::Int(0)) => EvalOut::fail("division by zero"),
        (Num::Int(a), Num::Int(b)) => EvalOut::value(Node::int(a % b)),
        (a, b) => {
            let b = as_f64(&b);
            if b == 0.0 {
                return EvalOut::fail("division by zero");
            }
            EvalOut::value(Node::float(as_f64(&a) % b))
        }
    }
}

pub(super) fn abs(args: &[Node], _env: &Binding) -> EvalOut {
    match numeric(&args[0], "abs") {
        Ok(Num::Int(v)) => EvalOut::value(Node::int(v.abs())),
        Ok(Num::Float(v)) => EvalOut::value(Node::float(v.abs())),
        Err(out) => out,
    }
}
