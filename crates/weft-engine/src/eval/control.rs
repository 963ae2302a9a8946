//! Control forms: alternatives, conditionals, scoped expressions,
//! sync/catch, template substitution, merge directives and markers.

use indexmap::IndexMap;

use super::{evaluate, is_truthy, resolve_operand, EvalOut, EvaluationInfo, Resolution};
use crate::binding::{segments_to_strings, Binding};
use crate::error::Issue;
use crate::node::{Node, NodeFlags, TagBinding, TemplateValue, Value};
use weft_dynaml::ast::{Expr, ExprKind, IterBody, Marker, MergeSpec};

/// `a || b`: `b` when `a` fails, is undefined, or waits on a reference
/// that does not exist. A left side that merely waits for an unresolved
/// node defers the whole alternative.
pub(super) fn eval_alt(
    whole: &Expr,
    left: &Expr,
    right: &Expr,
    env: &Binding,
    locally: bool,
) -> EvalOut {
    let out = evaluate(left, env, locally);
    match out.res {
        Resolution::Value(node) => EvalOut {
            res: Resolution::Value(node),
            info: out.info,
        },
        Resolution::Deferred(_) if out.info.issue.is_none() => EvalOut {
            res: Resolution::Deferred(whole.clone()),
            info: out.info,
        },
        _ => {
            let mut fallback = evaluate(right, env, locally);
            if matches!(fallback.res, Resolution::Deferred(_)) {
                fallback.res = Resolution::Deferred(whole.clone());
            }
            fallback.info.cleanups =
                [out.info.cleanups, std::mem::take(&mut fallback.info.cleanups)].concat();
            fallback
        }
    }
}

/// `c ? t : f`: strict in the condition, lazy in the branches.
pub(super) fn eval_cond(
    whole: &Expr,
    cond: &Expr,
    then: &Expr,
    otherwise: &Expr,
    env: &Binding,
    locally: bool,
) -> EvalOut {
    let mut info = EvaluationInfo::default();
    let cond_node = match resolve_operand(whole, cond, env, locally, &mut info) {
        Ok(node) => node,
        Err(out) => return out,
    };
    let branch = if is_truthy(&cond_node) { then } else { otherwise };
    let mut out = evaluate(branch, env, locally);
    if matches!(out.res, Resolution::Deferred(_)) {
        out.res = Resolution::Deferred(whole.clone());
    }
    out.info = info.join(std::mem::take(&mut out.info));
    out
}

/// `( a=1, b=2 ) body`: resolve the declarations to a fixed point
/// (forward references within the scope are allowed), then evaluate the
/// body in the extended binding.
pub(super) fn eval_scoped(
    whole: &Expr,
    decls: &[(Expr, Expr)],
    body: &Expr,
    env: &Binding,
    locally: bool,
) -> EvalOut {
    let mut info = EvaluationInfo::default();
    let mut scope: IndexMap<String, Node> = IndexMap::new();
    let mut pending: Vec<(&Expr, &Expr)> = decls.iter().map(|(k, v)| (k, v)).collect();

    loop {
        let mut progress = false;
        let mut still_pending = Vec::new();
        for (key_expr, value_expr) in pending {
            let scope_env = env.with_local_scope(scope.clone());
            let key = match decl_key(key_expr, &scope_env, locally, &mut info) {
                Ok(Some(key)) => key,
                Ok(None) => {
                    still_pending.push((key_expr, value_expr));
                    continue;
                }
                Err(out) => return out,
            };
            let out = evaluate(value_expr, &scope_env, locally);
            info = info.join(out.info);
            match out.res {
                Resolution::Value(node) => {
                    scope.insert(key, node);
                    progress = true;
                }
                Resolution::Deferred(_) => still_pending.push((key_expr, value_expr)),
                Resolution::Undefined => {
                    return EvalOut::fail(format!("scope value '{}' is undefined", key))
                        .with_info(info)
                }
                Resolution::Failed => {
                    return EvalOut {
                        res: Resolution::Failed,
                        info,
                    }
                }
            }
        }
        if still_pending.is_empty() {
            break;
        }
        if !progress {
            return EvalOut {
                res: Resolution::Deferred(whole.clone()),
                info,
            };
        }
        pending = still_pending;
    }

    let body_env = env.with_local_scope(scope);
    let mut out = evaluate(body, &body_env, locally);
    if matches!(out.res, Resolution::Deferred(_)) {
        out.res = Resolution::Deferred(whole.clone());
    }
    out.info = info.join(std::mem::take(&mut out.info));
    out
}

/// A declaration key: a single-segment reference or symbol is literal,
/// anything else must evaluate to a string.
fn decl_key(
    key_expr: &Expr,
    env: &Binding,
    locally: bool,
    info: &mut EvaluationInfo,
) -> Result<Option<String>, EvalOut> {
    match &key_expr.kind {
        ExprKind::Ref(path) => {
            if let Some(name) = path.as_single_key() {
                return Ok(Some(name.to_string()));
            }
        }
        ExprKind::Symbol(name) => return Ok(Some(name.clone())),
        _ => {}
    }
    let out = evaluate(key_expr, env, locally);
    *info = std::mem::take(info).join(out.info);
    match out.res {
        Resolution::Value(node) => match node.value {
            Value::String(key) => Ok(Some(key)),
            ref other => Err(EvalOut::fail(format!(
                "key must evaluate to a string, found {}",
                other.type_name()
            ))
            .with_info(info.clone())),
        },
        Resolution::Deferred(_) => Ok(None),
        Resolution::Undefined => {
            Err(EvalOut::fail("key must not be undefined").with_info(info.clone()))
        }
        Resolution::Failed => Err(EvalOut {
            res: Resolution::Failed,
            info: info.clone(),
        }),
    }
}

/// `sync[expr|v|cond(|value)(,timeout)]`: re-evaluate `expr` every pass
/// until the condition holds. The timeout counts driver passes; each
/// retry stores the decremented budget back into the deferred AST.
#[allow(clippy::too_many_arguments)]
pub(super) fn eval_sync(
    whole: &Expr,
    inner: &Expr,
    cond: &IterBody,
    value: Option<&IterBody>,
    timeout: Option<&Expr>,
    env: &Binding,
    locally: bool,
) -> EvalOut {
    let mut info = EvaluationInfo::default();

    let out = evaluate(inner, env, locally);
    info = info.join(out.info);
    let node = match out.res {
        Resolution::Value(node) if node.is_resolved() => node,
        Resolution::Undefined => return EvalOut::undefined().with_info(info),
        _ => return retry_sync(whole, inner, cond, value, timeout, env, locally, info),
    };

    let mut scope = IndexMap::new();
    if let Some(param) = cond.params.first() {
        scope.insert(param.clone(), node.clone());
    }
    let cond_env = env.with_local_scope(scope.clone());
    let cond_node = match resolve_operand(whole, &cond.body, &cond_env, locally, &mut info) {
        Ok(node) => node,
        Err(out) => return out,
    };

    if !is_truthy(&cond_node) {
        return retry_sync(whole, inner, cond, value, timeout, env, locally, info);
    }

    match value {
        None => EvalOut {
            res: Resolution::Value(node),
            info,
        },
        Some(value_body) => {
            let value_env = env.with_local_scope(scope);
            let mut out = evaluate(&value_body.body, &value_env, locally);
            if matches!(out.res, Resolution::Deferred(_)) {
                out.res = Resolution::Deferred(whole.clone());
            }
            out.info = info.join(std::mem::take(&mut out.info));
            out
        }
    }
}

/// Defer a sync for another pass, decrementing its pass budget; a spent
/// budget is a hard error.
#[allow(clippy::too_many_arguments)]
fn retry_sync(
    whole: &Expr,
    inner: &Expr,
    cond: &IterBody,
    value: Option<&IterBody>,
    timeout: Option<&Expr>,
    env: &Binding,
    locally: bool,
    mut info: EvaluationInfo,
) -> EvalOut {
    let remaining = match timeout {
        None => None,
        Some(expr) => {
            let node = match resolve_operand(whole, expr, env, locally, &mut info) {
                Ok(node) => node,
                Err(out) => return out,
            };
            match node.value {
                Value::Int(n) => Some(n),
                ref other => {
                    return EvalOut::fail(format!(
                        "sync timeout must be an integer, found {}",
                        other.type_name()
                    ))
                    .with_info(info)
                }
            }
        }
    };

    if let Some(n) = remaining {
        if n <= 0 {
            return EvalOut::fail("sync condition not met before timeout").with_info(info);
        }
    }

    let retry = Expr::new(ExprKind::Sync {
        expr: Box::new(inner.clone()),
        cond: cond.clone(),
        value: value.cloned(),
        timeout: remaining.map(|n| Box::new(Expr::new(ExprKind::Int(n - 1)))),
    });
    info.issue = Some(Issue::new("sync condition not met"));
    EvalOut {
        res: Resolution::Deferred(retry),
        info,
    }
}

/// `catch[expr|e|handler]`: the handler runs with a map describing the
/// failure; without a handler the map itself is the result.
pub(super) fn eval_catch(
    whole: &Expr,
    inner: &Expr,
    handler: Option<&IterBody>,
    env: &Binding,
    locally: bool,
) -> EvalOut {
    let out = evaluate(inner, env, locally);
    match out.res {
        Resolution::Value(node) => EvalOut {
            res: Resolution::Value(node),
            info: out.info,
        },
        Resolution::Undefined => EvalOut::undefined().with_info(out.info),
        Resolution::Deferred(_) if out.info.issue.is_none() => EvalOut {
            res: Resolution::Deferred(whole.clone()),
            info: out.info,
        },
        _ => {
            let message = out
                .info
                .issue
                .as_ref()
                .map(|issue| issue.message.clone())
                .unwrap_or_else(|| "evaluation failed".to_string());
            let mut entries = IndexMap::new();
            entries.insert("valid".to_string(), Node::bool(false));
            entries.insert("error".to_string(), Node::string(message));
            let error_map = Node::map(entries);

            match handler {
                None => EvalOut::value(error_map),
                Some(body) => {
                    let mut scope = IndexMap::new();
                    if let Some(param) = body.params.first() {
                        scope.insert(param.clone(), error_map);
                    }
                    let handler_env = env.with_local_scope(scope);
                    let mut out = evaluate(&body.body, &handler_env, locally);
                    if matches!(out.res, Resolution::Deferred(_)) {
                        out.res = Resolution::Deferred(whole.clone());
                    }
                    out
                }
            }
        }
    }
}

/// `*expr`: instantiate a `&template` subtree at the point of use. The
/// returned subtree may still contain expressions; the driver resolves
/// them in place over the following passes.
pub(super) fn eval_subst(whole: &Expr, inner: &Expr, env: &Binding, locally: bool) -> EvalOut {
    let mut info = EvaluationInfo::default();
    let out = evaluate(inner, env, locally);
    info = info.join(out.info);
    let node = match out.res {
        Resolution::Value(node) => node,
        Resolution::Deferred(_) => {
            return EvalOut {
                res: Resolution::Deferred(whole.clone()),
                info,
            }
        }
        Resolution::Undefined => return EvalOut::undefined().with_info(info),
        Resolution::Failed => {
            return EvalOut {
                res: Resolution::Failed,
                info,
            }
        }
    };

    match node.value {
        Value::Template(template) => {
            if contains_merge(&template.body) {
                return EvalOut::fail("merge not allowed inside a template").with_info(info);
            }
            let mut body = *template.body;
            body.flags.remove(NodeFlags::TEMPLATE);
            EvalOut {
                res: Resolution::Value(body),
                info,
            }
        }
        ref other => EvalOut::fail(format!(
            "substitution requires a template, found {}",
            other.type_name()
        ))
        .with_info(info),
    }
}

fn contains_merge(node: &Node) -> bool {
    match &node.value {
        Value::Expr(expr) => expr.as_merge_directive().is_some(),
        Value::Map(entries) => entries.values().any(contains_merge),
        Value::List(items) => items.iter().any(contains_merge),
        _ => false,
    }
}

/// Merge directive in expression position: look the current (or
/// redirected) path up in the stubs.
pub(super) fn eval_merge(whole: &Expr, spec: &MergeSpec, env: &Binding, locally: bool) -> EvalOut {
    if locally {
        return EvalOut::deferred(whole.clone());
    }
    let mut info = EvaluationInfo::default();
    let path: Vec<String> = match &spec.redirect {
        Some(redirect) => {
            if redirect.qualifier.is_some() {
                return EvalOut::fail("merge redirect must be a plain document path");
            }
            segments_to_strings(&redirect.segments)
        }
        None => env.stub_path().to_vec(),
    };

    info.replace = spec.replace;
    info.key_name = spec.key.clone();
    if spec.redirect.is_some() {
        info.redirect_path = Some(path.clone());
    }

    match env.find_in_stubs(&path) {
        Some(mut node) => {
            node.flags.insert(NodeFlags::MERGED);
            info.merged = true;
            EvalOut {
                res: Resolution::Value(node),
                info,
            }
        }
        None => {
            if spec.required {
                EvalOut::fail(format!(
                    "'{}' required, but no stub provides it",
                    path.join(".")
                ))
                .with_info(info)
            } else {
                EvalOut::fail(format!("no stub value for '{}'", path.join("."))).with_info(info)
            }
        }
    }
}

/// `auto`: merge from the stubs, falling back to an error when no stub
/// provides a value for the automatic source.
pub(super) fn eval_auto(whole: &Expr, env: &Binding, locally: bool) -> EvalOut {
    if locally {
        return EvalOut::deferred(whole.clone());
    }
    match env.find_in_stubs(env.stub_path()) {
        Some(mut node) => {
            node.flags.insert(NodeFlags::MERGED);
            let mut out = EvalOut::value(node);
            out.info.merged = true;
            out
        }
        None => EvalOut::fail(format!(
            "no automatic source for '{}'",
            env.stub_path().join(".")
        )),
    }
}

/// `prefer expr`: evaluate the operand, marking the result as preferred
/// over stub values.
pub(super) fn eval_prefer(inner: &Expr, env: &Binding, locally: bool) -> EvalOut {
    let mut out = evaluate(inner, env, locally);
    out.info.preferred = true;
    out.info.flags.insert(NodeFlags::PREFERRED);
    out
}

/// Marked expression: accumulate node flags (and tag definitions); the
/// optional operand supplies the value. `&template (expr)` wraps the
/// unevaluated operand.
/// Map markers to node flags and an optional tag definition.
pub(crate) fn marker_flags(markers: &[Marker]) -> (NodeFlags, Option<TagBinding>) {
    let mut flags = NodeFlags::default();
    let mut tag = None;
    for marker in markers {
        match marker {
            Marker::Temporary => flags.insert(NodeFlags::TEMPORARY),
            Marker::Local => flags.insert(NodeFlags::LOCAL),
            Marker::State => flags.insert(NodeFlags::STATE),
            Marker::Inject => flags.insert(NodeFlags::INJECT),
            Marker::Default => flags.insert(NodeFlags::DEFAULT),
            Marker::Dynamic => flags.insert(NodeFlags::DYNAMIC),
            Marker::Template => flags.insert(NodeFlags::TEMPLATE),
            Marker::Tag { name, global } => {
                tag = Some(TagBinding {
                    name: name.clone(),
                    global: *global,
                })
            }
        }
    }
    (flags, tag)
}

pub(super) fn eval_marked(
    markers: &[Marker],
    inner: Option<&Expr>,
    env: &Binding,
    locally: bool,
) -> EvalOut {
    let (flags, tag) = marker_flags(markers);

    if flags.contains(NodeFlags::TEMPLATE) {
        let body = match inner {
            Some(expr) => Node::expr(expr.clone(), env.source()),
            None => Node::new(Value::Nil, env.source()),
        };
        let mut node = Node::new(
            Value::Template(TemplateValue {
                body: Box::new(body),
            }),
            env.source(),
        );
        node.flags.insert(flags);
        let mut out = EvalOut::value(node);
        out.info.flags = flags;
        out.info.tag = tag;
        return out;
    }

    let mut out = match inner {
        Some(expr) => evaluate(expr, env, locally),
        None => EvalOut::value(Node::new(Value::Nil, env.source())),
    };
    out.info.flags.insert(flags);
    if tag.is_some() {
        out.info.tag = tag;
    }
    if let Resolution::Value(node) = &mut out.res {
        node.flags.insert(flags);
    }
    out
}
