//! Lambda values, calls, implicit and explicit currying, and built-in
//! dispatch.

use indexmap::IndexMap;

use super::{evaluate, resolve_operand, EvalOut, EvaluationInfo, Resolution};
use crate::binding::{Binding, Lookup};
use crate::node::{LambdaValue, Node, Value};
use weft_dynaml::ast::{Arg, Expr, ExprKind, LambdaAst};

pub(super) fn eval_lambda_def(ast: &LambdaAst, env: &Binding) -> EvalOut {
    EvalOut::value(Node::new(
        Value::Lambda(LambdaValue::Closure {
            ast: ast.clone(),
            bound: Vec::new(),
            env: env.clone(),
        }),
        env.source(),
    ))
}

/// `lambda expr`: the operand yields a lambda value, or the textual form
/// of one (`|x|->x + 1`), re-parsed and closed over the current binding.
pub(super) fn eval_lambda_ref(
    whole: &Expr,
    inner: &Expr,
    env: &Binding,
    locally: bool,
) -> EvalOut {
    let mut info = EvaluationInfo::default();
    let node = match resolve_operand(whole, inner, env, locally, &mut info) {
        Ok(node) => node,
        Err(out) => return out,
    };
    match &node.value {
        Value::Lambda(_) => EvalOut {
            res: Resolution::Value(node.clone()),
            info,
        },
        Value::String(text) => {
            let text = text.trim();
            let text = text.strip_prefix("lambda").unwrap_or(text);
            let parsed = match weft_dynaml::parse_expression(text) {
                Ok(parsed) => parsed,
                Err(err) => {
                    return EvalOut::fail(format!("invalid lambda expression: {}", err))
                        .with_info(info)
                }
            };
            match parsed.kind {
                ExprKind::Lambda(ast) => eval_lambda_def(&ast, env).with_info(info),
                _ => EvalOut::fail("lambda expression required").with_info(info),
            }
        }
        other => {
            EvalOut::fail(format!("lambda required, found {}", other.type_name())).with_info(info)
        }
    }
}

/// Resolve the callee of a call or curry expression.
///
/// A single-key reference that names nothing in scope or document falls
/// back to the built-in registry.
enum Callee {
    Lambda(LambdaValue),
    Builtin(String),
}

fn resolve_callee(
    whole: &Expr,
    callee: &Expr,
    env: &Binding,
    locally: bool,
    info: &mut EvaluationInfo,
) -> Result<Callee, EvalOut> {
    if let ExprKind::Ref(path) = &callee.kind {
        if let Some(name) = path.as_single_key() {
            return match env.find_reference(path) {
                Lookup::Found { node, .. } => {
                    if !node.is_resolved() {
                        return Err(EvalOut {
                            res: Resolution::Deferred(whole.clone()),
                            info: info.clone(),
                        });
                    }
                    match node.value {
                        Value::Lambda(lambda) => Ok(Callee::Lambda(lambda)),
                        other => Err(EvalOut::fail(format!(
                            "'{}' is not callable ({})",
                            name,
                            other.type_name()
                        ))
                        .with_info(info.clone())),
                    }
                }
                Lookup::NotFound => {
                    if env.state().functions().get(name).is_some() {
                        Ok(Callee::Builtin(name.to_string()))
                    } else {
                        Err(EvalOut::fail(format!("unknown function '{}'", name))
                            .with_info(info.clone()))
                    }
                }
                Lookup::Invalid(message) => {
                    Err(EvalOut::fail(message).with_info(info.clone()))
                }
            };
        }
    }

    let node = resolve_operand(whole, callee, env, locally, info)?;
    match node.value {
        Value::Lambda(lambda) => Ok(Callee::Lambda(lambda)),
        other => Err(
            EvalOut::fail(format!("expression is not callable ({})", other.type_name()))
                .with_info(info.clone()),
        ),
    }
}

/// Evaluate call arguments into positional values and named values.
/// `expr...` arguments splice their list elements into the positionals.
fn resolve_args(
    whole: &Expr,
    args: &[Arg],
    env: &Binding,
    locally: bool,
    info: &mut EvaluationInfo,
) -> Result<(Vec<Node>, IndexMap<String, Node>), EvalOut> {
    let mut positionals = Vec::new();
    let mut named = IndexMap::new();
    for arg in args {
        let node = resolve_operand(whole, &arg.expr, env, locally, info)?;
        match (&arg.name, arg.expand) {
            (Some(name), _) => {
                named.insert(name.clone(), node);
            }
            (None, true) => match node.value {
                Value::List(items) => positionals.extend(items),
                other => {
                    return Err(EvalOut::fail(format!(
                        "argument expansion requires a list, found {}",
                        other.type_name()
                    ))
                    .with_info(info.clone()))
                }
            },
            (None, false) => positionals.push(node),
        }
    }
    Ok((positionals, named))
}

pub(super) fn eval_call(
    whole: &Expr,
    callee: &Expr,
    args: &[Arg],
    env: &Binding,
    locally: bool,
) -> EvalOut {
    let mut info = EvaluationInfo::default();
    let target = match resolve_callee(whole, callee, env, locally, &mut info) {
        Ok(target) => target,
        Err(out) => return out,
    };
    let (positionals, named) = match resolve_args(whole, args, env, locally, &mut info) {
        Ok(resolved) => resolved,
        Err(out) => return out,
    };
    match target {
        Callee::Lambda(lambda) => {
            apply_lambda(whole, &lambda, positionals, named, env, locally).with_joined(info)
        }
        Callee::Builtin(name) => {
            if !named.is_empty() {
                return EvalOut::fail(format!("'{}' takes no named arguments", name))
                    .with_info(info);
            }
            call_builtin(&name, positionals, env).with_joined(info)
        }
    }
}

/// Explicit currying `callee*(args)`: always returns a partially applied
/// lambda, never invokes.
pub(super) fn eval_curry(
    whole: &Expr,
    callee: &Expr,
    args: &[Arg],
    env: &Binding,
    locally: bool,
) -> EvalOut {
    let mut info = EvaluationInfo::default();
    let target = match resolve_callee(whole, callee, env, locally, &mut info) {
        Ok(target) => target,
        Err(out) => return out,
    };
    let (positionals, named) = match resolve_args(whole, args, env, locally, &mut info) {
        Ok(resolved) => resolved,
        Err(out) => return out,
    };
    if !named.is_empty() {
        return EvalOut::fail("named arguments cannot be curried").with_info(info);
    }
    let lambda = match target {
        Callee::Lambda(LambdaValue::Closure { ast, mut bound, env }) => {
            bound.extend(positionals);
            LambdaValue::Closure { ast, bound, env }
        }
        Callee::Lambda(LambdaValue::Builtin { name, mut bound }) => {
            bound.extend(positionals);
            LambdaValue::Builtin { name, bound }
        }
        Callee::Builtin(name) => LambdaValue::Builtin {
            name,
            bound: positionals,
        },
    };
    EvalOut {
        res: Resolution::Value(Node::new(Value::Lambda(lambda), env.source())),
        info,
    }
}

impl EvalOut {
    fn with_joined(mut self, earlier: EvaluationInfo) -> EvalOut {
        self.info = earlier.join(std::mem::take(&mut self.info));
        self
    }
}

/// Apply a lambda value to arguments.
///
/// Calls with fewer positional arguments than required parameters (and
/// no named arguments) produce a curried lambda.
pub(crate) fn apply_lambda(
    whole: &Expr,
    lambda: &LambdaValue,
    positionals: Vec<Node>,
    named: IndexMap<String, Node>,
    env: &Binding,
    locally: bool,
) -> EvalOut {
    match lambda {
        LambdaValue::Builtin { name, bound } => {
            if !named.is_empty() {
                return EvalOut::fail(format!("'{}' takes no named arguments", name));
            }
            let mut args = bound.clone();
            args.extend(positionals);
            call_builtin(name, args, env)
        }
        LambdaValue::Closure {
            ast,
            bound,
            env: closure_env,
        } => {
            let mut args = bound.clone();
            args.extend(positionals);

            let param_count = ast.params.len();
            let fixed = if ast.varargs {
                param_count.saturating_sub(1)
            } else {
                param_count
            };
            let required = ast
                .params
                .iter()
                .take(fixed)
                .filter(|p| p.default.is_none())
                .count();

            if args.len() < required && named.is_empty() {
                return EvalOut::value(Node::new(
                    Value::Lambda(LambdaValue::Closure {
                        ast: ast.clone(),
                        bound: args,
                        env: closure_env.clone(),
                    }),
                    env.source(),
                ));
            }
            if !ast.varargs && args.len() > param_count {
                return EvalOut::fail(format!(
                    "too many arguments: {} given, {} expected",
                    args.len(),
                    param_count
                ));
            }

            let mut slots: Vec<Option<Node>> = vec![None; param_count];
            let mut rest = Vec::new();
            for (i, arg) in args.into_iter().enumerate() {
                if i < fixed {
                    slots[i] = Some(arg);
                } else if ast.varargs {
                    rest.push(arg);
                } else {
                    slots[i] = Some(arg);
                }
            }
            for (name, value) in named {
                match ast.params.iter().position(|p| p.name == name) {
                    Some(idx) => {
                        if slots[idx].is_some() {
                            return EvalOut::fail(format!("argument '{}' given twice", name));
                        }
                        slots[idx] = Some(value);
                    }
                    None => return EvalOut::fail(format!("unknown parameter '{}'", name)),
                }
            }
            if ast.varargs && slots[param_count - 1].is_none() {
                slots[param_count - 1] = Some(Node::new(Value::List(rest), env.source()));
            }

            // Defaults may reference parameters bound to their left.
            let mut scope: IndexMap<String, Node> = IndexMap::new();
            let mut info = EvaluationInfo::default();
            for (i, param) in ast.params.iter().enumerate() {
                let value = match slots[i].take() {
                    Some(value) => value,
                    None => match &param.default {
                        Some(default) => {
                            let default_env = closure_env.with_local_scope(scope.clone());
                            match resolve_operand(whole, default, &default_env, locally, &mut info)
                            {
                                Ok(value) => value,
                                Err(out) => return out,
                            }
                        }
                        None => {
                            return EvalOut::fail(format!(
                                "missing argument for parameter '{}'",
                                param.name
                            ))
                        }
                    },
                };
                scope.insert(param.name.clone(), value);
            }

            // The closure keeps its lexical scopes, but references into
            // the document resolve against the caller's current root —
            // the captured snapshot goes stale between passes.
            let mut body_env = closure_env
                .with_local_scope(scope)
                .with_source(env.source());
            if let Some(root) = env.root() {
                body_env = body_env.with_root(root.clone());
            }
            let out = evaluate(&ast.body, &body_env, locally);
            match out.res {
                Resolution::Value(node) => EvalOut {
                    res: Resolution::Value(node),
                    info: info.join(out.info),
                },
                Resolution::Deferred(_) => EvalOut {
                    res: Resolution::Deferred(whole.clone()),
                    info: info.join(out.info),
                },
                Resolution::Undefined => EvalOut {
                    res: Resolution::Undefined,
                    info: info.join(out.info),
                },
                Resolution::Failed => EvalOut {
                    res: Resolution::Failed,
                    info: info.join(out.info),
                },
            }
        }
    }
}

fn call_builtin(name: &str, args: Vec<Node>, env: &Binding) -> EvalOut {
    let builtin = match env.state().functions().get(name) {
        Some(builtin) => builtin,
        None => return EvalOut::fail(format!("unknown function '{}'", name)),
    };
    if args.len() < builtin.min_args {
        if builtin.curryable {
            return EvalOut::value(Node::new(
                Value::Lambda(LambdaValue::Builtin {
                    name: name.to_string(),
                    bound: args,
                }),
                env.source(),
            ));
        }
        return EvalOut::fail(format!(
            "'{}' requires at least {} arguments, {} given",
            name,
            builtin.min_args,
            args.len()
        ));
    }
    if let Some(max) = builtin.max_args {
        if args.len() > max {
            return EvalOut::fail(format!(
                "'{}' takes at most {} arguments, {} given",
                name,
                max,
                args.len()
            ));
        }
    }
    (builtin.func)(&args, env)
}
