//! Tree-walking evaluator.
//!
//! `evaluate` turns one AST against a binding into a [`Resolution`]:
//! a resolved node, a deferred expression (retry next pass), the
//! first-class undefined value, or a failure. [`EvaluationInfo`] rides
//! along with merge hints, accumulated node flags, diagnostics and the
//! paths the evaluation is blocked on (used for cycle classification).

mod call;
mod control;
mod listops;
mod ops;
mod reference;

use std::fmt;
use std::rc::Rc;

use crate::binding::Binding;
use crate::error::Issue;
use crate::node::{Node, NodeFlags, TagBinding, Value};
use weft_dynaml::ast::{Expr, ExprKind};

pub(crate) use control::marker_flags;

/// A cleanup action registered during evaluation; run exactly once at
/// the end of the enclosing flow. Must be idempotent.
#[derive(Clone)]
pub struct Cleanup(pub Rc<dyn Fn()>);

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

/// Side-band information produced by one evaluation.
#[derive(Debug, Clone, Default)]
pub struct EvaluationInfo {
    /// Stub lookup redirection requested by a merge directive.
    pub redirect_path: Option<Vec<String>>,
    pub replace: bool,
    pub merged: bool,
    pub preferred: bool,
    /// List-merge key requested by `merge on <key>`.
    pub key_name: Option<String>,
    pub issue: Option<Issue>,
    /// Node flags accumulated from markers.
    pub flags: NodeFlags,
    /// Tag definition accumulated from `&tag:` markers.
    pub tag: Option<TagBinding>,
    pub cleanups: Vec<Cleanup>,
    /// Absolute document paths this evaluation is waiting for.
    pub blocked_on: Vec<Vec<String>>,
}

impl EvaluationInfo {
    /// Merge another info record into this one; the newer record wins
    /// for scalar hints.
    pub fn join(mut self, other: EvaluationInfo) -> EvaluationInfo {
        if other.redirect_path.is_some() {
            self.redirect_path = other.redirect_path;
        }
        self.replace = other.replace;
        self.merged = self.merged || other.merged;
        self.preferred = self.preferred || other.preferred;
        if other.key_name.is_some() {
            self.key_name = other.key_name;
        }
        if other.issue.is_some() {
            self.issue = other.issue;
        }
        if other.tag.is_some() {
            self.tag = other.tag;
        }
        self.flags.insert(other.flags);
        self.cleanups.extend(other.cleanups);
        self.blocked_on.extend(other.blocked_on);
        self
    }
}

/// Outcome of one evaluation.
#[derive(Debug, Clone)]
pub enum Resolution {
    Value(Node),
    /// Not resolvable yet; the driver stores this expression and retries
    /// in the next pass.
    Deferred(Expr),
    /// The first-class `~~` value; stripped from output.
    Undefined,
    Failed,
}

/// Evaluation result: outcome plus side-band info.
#[derive(Debug, Clone)]
pub struct EvalOut {
    pub res: Resolution,
    pub info: EvaluationInfo,
}

impl EvalOut {
    pub fn value(node: Node) -> Self {
        EvalOut {
            res: Resolution::Value(node),
            info: EvaluationInfo::default(),
        }
    }

    pub fn deferred(expr: Expr) -> Self {
        EvalOut {
            res: Resolution::Deferred(expr),
            info: EvaluationInfo::default(),
        }
    }

    pub fn undefined() -> Self {
        EvalOut {
            res: Resolution::Undefined,
            info: EvaluationInfo::default(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        let mut info = EvaluationInfo::default();
        info.issue = Some(Issue::new(message));
        EvalOut {
            res: Resolution::Failed,
            info,
        }
    }

    pub fn with_info(mut self, info: EvaluationInfo) -> Self {
        self.info = info;
        self
    }
}

/// Evaluate an expression against a binding.
///
/// With `locally` set, evaluation avoids consulting the stubs (used
/// while flowing subexpressions whose stub context is not yet settled);
/// merge directives defer instead.
pub fn evaluate(expr: &Expr, env: &Binding, locally: bool) -> EvalOut {
    match &expr.kind {
        ExprKind::Int(v) => EvalOut::value(Node::new(Value::Int(*v), env.source())),
        ExprKind::Float(v) => EvalOut::value(Node::new(Value::Float(*v), env.source())),
        ExprKind::Bool(v) => EvalOut::value(Node::new(Value::Bool(*v), env.source())),
        ExprKind::Str(v) => EvalOut::value(Node::new(Value::String(v.clone()), env.source())),
        ExprKind::Nil => EvalOut::value(Node::new(Value::Nil, env.source())),
        ExprKind::Undefined => EvalOut::undefined(),
        ExprKind::Symbol(name) => {
            EvalOut::value(Node::new(Value::String(name.clone()), env.source()))
        }

        ExprKind::Ref(path) => reference::eval_ref(expr, path, env),
        ExprKind::DynRef { base, index } => reference::eval_dynref(expr, base, index, env, locally),
        ExprKind::Slice { base, start, end } => {
            reference::eval_slice(expr, base, start.as_deref(), end.as_deref(), env, locally)
        }
        ExprKind::Projection { base, follow } => {
            reference::eval_projection(expr, base, follow, env, locally)
        }

        ExprKind::Binary { op, left, right } => {
            ops::eval_binary(expr, *op, left, right, env, locally)
        }
        ExprKind::Not(operand) => ops::eval_not(expr, operand, env, locally),
        ExprKind::Concat { left, right } => ops::eval_concat(expr, left, right, env, locally),

        ExprKind::Alt { left, right } => control::eval_alt(expr, left, right, env, locally),
        ExprKind::Cond {
            cond,
            then,
            otherwise,
        } => control::eval_cond(expr, cond, then, otherwise, env, locally),
        ExprKind::Scoped { decls, body } => control::eval_scoped(expr, decls, body, env, locally),
        ExprKind::Sync {
            expr: inner,
            cond,
            value,
            timeout,
        } => control::eval_sync(expr, inner, cond, value.as_ref(), timeout.as_deref(), env, locally),
        ExprKind::Catch {
            expr: inner,
            handler,
        } => control::eval_catch(expr, inner, handler.as_ref(), env, locally),
        ExprKind::Subst(inner) => control::eval_subst(expr, inner, env, locally),
        ExprKind::Merge(spec) => control::eval_merge(expr, spec, env, locally),
        ExprKind::Auto => control::eval_auto(expr, env, locally),
        ExprKind::Prefer(inner) => control::eval_prefer(inner, env, locally),
        ExprKind::Marked { markers, expr: inner } => {
            control::eval_marked(markers, inner.as_deref(), env, locally)
        }

        ExprKind::Range { start, end } => {
            listops::eval_range(expr, start.as_deref(), end.as_deref(), env, locally)
        }
        ExprKind::List(items) => listops::eval_list(expr, items, env, locally),
        ExprKind::Expansion(_) => EvalOut::fail("list expansion not allowed in this position"),
        ExprKind::MapLit(entries) => listops::eval_map_lit(expr, entries, env, locally),
        ExprKind::Mapping {
            source,
            to_map,
            body,
        } => listops::eval_mapping(expr, source, *to_map, body, env, locally),
        ExprKind::Selection {
            source,
            to_map,
            body,
        } => listops::eval_selection(expr, source, *to_map, body, env, locally),
        ExprKind::Fold { source, init, body } => {
            listops::eval_fold(expr, source, init, body, env, locally)
        }

        ExprKind::Lambda(ast) => call::eval_lambda_def(ast, env),
        ExprKind::LambdaRef(inner) => call::eval_lambda_ref(expr, inner, env, locally),
        ExprKind::Call { callee, args } => call::eval_call(expr, callee, args, env, locally),
        ExprKind::Curry { callee, args } => call::eval_curry(expr, callee, args, env, locally),
    }
}

/// Evaluate an operand to a fully resolved node, short-circuiting the
/// enclosing evaluation on deferral, undefinedness or failure.
pub(crate) fn resolve_operand(
    whole: &Expr,
    operand: &Expr,
    env: &Binding,
    locally: bool,
    info: &mut EvaluationInfo,
) -> Result<Node, EvalOut> {
    let out = evaluate(operand, env, locally);
    *info = std::mem::take(info).join(out.info);
    match out.res {
        Resolution::Value(node) => {
            if node.is_resolved() {
                Ok(node)
            } else {
                Err(EvalOut {
                    res: Resolution::Deferred(whole.clone()),
                    info: info.clone(),
                })
            }
        }
        Resolution::Deferred(_) => Err(EvalOut {
            res: Resolution::Deferred(whole.clone()),
            info: info.clone(),
        }),
        Resolution::Undefined => Err(EvalOut {
            res: Resolution::Undefined,
            info: info.clone(),
        }),
        Resolution::Failed => Err(EvalOut {
            res: Resolution::Failed,
            info: info.clone(),
        }),
    }
}

/// Truthiness for conditions and selections.
pub(crate) fn is_truthy(node: &Node) -> bool {
    match &node.value {
        Value::Nil => false,
        Value::Bool(v) => *v,
        Value::Int(v) => *v != 0,
        Value::Float(v) => *v != 0.0,
        Value::String(v) => !v.is_empty(),
        Value::List(items) => !items.is_empty(),
        Value::Map(entries) => !entries.is_empty(),
        Value::Lambda(_) | Value::Template(_) | Value::Expr(_) => true,
    }
}
