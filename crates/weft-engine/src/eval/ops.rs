//! Arithmetic, comparison, logical and concatenation operators.

use indexmap::IndexMap;

use super::{is_truthy, resolve_operand, EvalOut, EvaluationInfo, Resolution};
use crate::binding::Binding;
use crate::node::{Node, Value};
use weft_dynaml::ast::{BinaryOp, Expr};

pub(super) fn eval_binary(
    whole: &Expr,
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
    env: &Binding,
    locally: bool,
) -> EvalOut {
    let mut info = EvaluationInfo::default();

    // Logical operators are strict in both operands but tolerate any
    // truthy type.
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        let lhs = match resolve_operand(whole, left, env, locally, &mut info) {
            Ok(node) => node,
            Err(out) => return out,
        };
        let rhs = match resolve_operand(whole, right, env, locally, &mut info) {
            Ok(node) => node,
            Err(out) => return out,
        };
        let result = match op {
            BinaryOp::And => is_truthy(&lhs) && is_truthy(&rhs),
            _ => is_truthy(&lhs) || is_truthy(&rhs),
        };
        return EvalOut {
            res: Resolution::Value(Node::new(Value::Bool(result), env.source())),
            info,
        };
    }

    let lhs = match resolve_operand(whole, left, env, locally, &mut info) {
        Ok(node) => node,
        Err(out) => return out,
    };
    let rhs = match resolve_operand(whole, right, env, locally, &mut info) {
        Ok(node) => node,
        Err(out) => return out,
    };

    let result = match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            arithmetic(op, &lhs, &rhs, env)
        }
        BinaryOp::Eq => Ok(Node::new(Value::Bool(lhs == rhs), env.source())),
        BinaryOp::Ne => Ok(Node::new(Value::Bool(lhs != rhs), env.source())),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, &lhs, &rhs, env),
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    };

    match result {
        Ok(node) => EvalOut {
            res: Resolution::Value(node),
            info,
        },
        Err(message) => EvalOut::fail(message).with_info(info),
    }
}

/// Numeric category of an operand.
enum Num {
    Int(i64),
    Float(f64),
}

fn numeric(node: &Node) -> Result<Num, String> {
    match &node.value {
        Value::Int(v) => Ok(Num::Int(*v)),
        Value::Float(v) => Ok(Num::Float(*v)),
        other => Err(format!("number required, found {}", other.type_name())),
    }
}

fn arithmetic(op: BinaryOp, lhs: &Node, rhs: &Node, env: &Binding) -> Result<Node, String> {
    let a = numeric(lhs)?;
    let b = numeric(rhs)?;

    // Integer stays integer; mixing promotes to float.
    let value = match (a, b) {
        (Num::Int(a), Num::Int(b)) => match op {
            BinaryOp::Add => Value::Int(a + b),
            BinaryOp::Sub => Value::Int(a - b),
            BinaryOp::Mul => Value::Int(a * b),
            BinaryOp::Div => {
                if b == 0 {
                    return Err("division by zero".to_string());
                }
                Value::Int(a / b)
            }
            BinaryOp::Mod => {
                if b == 0 {
                    return Err("division by zero".to_string());
                }
                Value::Int(a % b)
            }
            _ => unreachable!("arithmetic op"),
        },
        (a, b) => {
            let a = match a {
                Num::Int(v) => v as f64,
                Num::Float(v) => v,
            };
            let b = match b {
                Num::Int(v) => v as f64,
                Num::Float(v) => v,
            };
            match op {
                BinaryOp::Add => Value::Float(a + b),
                BinaryOp::Sub => Value::Float(a - b),
                BinaryOp::Mul => Value::Float(a * b),
                BinaryOp::Div => {
                    if b == 0.0 {
                        return Err("division by zero".to_string());
                    }
                    Value::Float(a / b)
                }
                BinaryOp::Mod => {
                    if b == 0.0 {
                        return Err("division by zero".to_string());
                    }
                    Value::Float(a % b)
                }
                _ => unreachable!("arithmetic op"),
            }
        }
    };
    Ok(Node::new(value, env.source()))
}

fn compare(op: BinaryOp, lhs: &Node, rhs: &Node, env: &Binding) -> Result<Node, String> {
    let ordering = match (&lhs.value, &rhs.value) {
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (a, b) => {
            let a = match a {
                Value::Int(v) => *v as f64,
                Value::Float(v) => *v,
                other => return Err(format!("cannot compare {}", other.type_name())),
            };
            let b = match b {
                Value::Int(v) => *v as f64,
                Value::Float(v) => *v,
                other => return Err(format!("cannot compare {}", other.type_name())),
            };
            a.partial_cmp(&b)
                .ok_or_else(|| "cannot compare NaN".to_string())?
        }
    };
    let result = match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        BinaryOp::Ge => ordering.is_ge(),
        _ => unreachable!("comparison op"),
    };
    Ok(Node::new(Value::Bool(result), env.source()))
}

pub(super) fn eval_not(whole: &Expr, operand: &Expr, env: &Binding, locally: bool) -> EvalOut {
    let mut info = EvaluationInfo::default();
    let node = match resolve_operand(whole, operand, env, locally, &mut info) {
        Ok(node) => node,
        Err(out) => return out,
    };
    EvalOut {
        res: Resolution::Value(Node::new(Value::Bool(!is_truthy(&node)), env.source())),
        info,
    }
}

/// Concatenation `a b`: list concatenation when either side is a list,
/// shallow map merge when both are maps (right side wins), string
/// concatenation otherwise.
pub(super) fn eval_concat(
    whole: &Expr,
    left: &Expr,
    right: &Expr,
    env: &Binding,
    locally: bool,
) -> EvalOut {
    let mut info = EvaluationInfo::default();
    let lhs = match resolve_operand(whole, left, env, locally, &mut info) {
        Ok(node) => node,
        Err(out) => return out,
    };
    let rhs = match resolve_operand(whole, right, env, locally, &mut info) {
        Ok(node) => node,
        Err(out) => return out,
    };

    let value = match (&lhs.value, &rhs.value) {
        (Value::List(a), Value::List(b)) => {
            let mut items = a.clone();
            items.extend(b.iter().cloned());
            Value::List(items)
        }
        (Value::List(a), _) => {
            let mut items = a.clone();
            items.push(rhs.clone());
            Value::List(items)
        }
        (_, Value::List(b)) => {
            let mut items = vec![lhs.clone()];
            items.extend(b.iter().cloned());
            Value::List(items)
        }
        (Value::Map(a), Value::Map(b)) => {
            let mut entries: IndexMap<String, Node> = a.clone();
            for (k, v) in b {
                entries.insert(k.clone(), v.clone());
            }
            Value::Map(entries)
        }
        (Value::Map(_), other) | (other, Value::Map(_)) => {
            return EvalOut::fail(format!(
                "cannot concatenate map with {}",
                other.type_name()
            ))
            .with_info(info);
        }
        _ => Value::String(format!("{}{}", lhs.stringify(), rhs.stringify())),
    };

    EvalOut {
        res: Resolution::Value(Node::new(value, env.source())),
        info,
    }
}

#[cfg(test)]
mod tests {
    use super::super::evaluate;
    use crate::binding::Binding;
    use crate::node::{Node, Value};
    use crate::state::State;
    use std::rc::Rc;
    use weft_dynaml::parse_expression;

    fn eval(source: &str) -> Node {
        let env = Binding::new("test", Rc::new(State::new()));
        let expr = parse_expression(source).expect("parse");
        match evaluate(&expr, &env, false).res {
            super::Resolution::Value(node) => node,
            other => panic!("expected value for '{}', got {:?}", source, other),
        }
    }

    fn eval_fails(source: &str) {
        let env = Binding::new("test", Rc::new(State::new()));
        let expr = parse_expression(source).expect("parse");
        assert!(
            matches!(evaluate(&expr, &env, false).res, super::Resolution::Failed),
            "expected failure for '{}'",
            source
        );
    }

    #[test]
    fn test_integer_arithmetic() {
        assert_eq!(eval("1 + 2"), Node::int(3));
        assert_eq!(eval("7 / 2"), Node::int(3));
        assert_eq!(eval("7 % 2"), Node::int(1));
    }

    #[test]
    fn test_float_promotion() {
        assert_eq!(eval("1 + 2.5"), Node::float(3.5));
    }

    #[test]
    fn test_division_by_zero() {
        eval_fails("1 / 0");
        eval_fails("1 % 0");
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval("1 < 2"), Node::bool(true));
        assert_eq!(eval("\"a\" == \"a\""), Node::bool(true));
        assert_eq!(eval("2.5 >= 2"), Node::bool(true));
    }

    #[test]
    fn test_logical() {
        assert_eq!(eval("true -and false"), Node::bool(false));
        assert_eq!(eval("true -or false"), Node::bool(true));
        assert_eq!(eval("!true"), Node::bool(false));
    }

    #[test]
    fn test_string_concat() {
        assert_eq!(eval("\"a\" \"b\""), Node::string("ab"));
        assert_eq!(eval("\"n-\" 1"), Node::string("n-1"));
    }

    #[test]
    fn test_list_concat() {
        match eval("[1] [2, 3]").value {
            Value::List(items) => assert_eq!(items.len(), 3),
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn test_map_concat_right_wins() {
        let node = eval("{a = 1} {a = 2, b = 3}");
        assert_eq!(node.get("a"), Some(&Node::int(2)));
        assert_eq!(node.get("b"), Some(&Node::int(3)));
    }
}
