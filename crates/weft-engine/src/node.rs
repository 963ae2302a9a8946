//! Document node model.
//!
//! A [`Node`] wraps a [`Value`] together with a source label, lifecycle
//! flags, an optional key name for keyed list merges and an optional tag
//! binding. A tree is *resolved* when no [`Value::Expr`] remains anywhere
//! in it.

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::fmt;
use std::rc::Rc;

use crate::binding::Binding;
use weft_dynaml::ast::{Expr, LambdaAst, PathSeg};

/// Node lifecycle flags, set by markers and merge processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeFlags(u16);

impl NodeFlags {
    pub const TEMPORARY: NodeFlags = NodeFlags(1 << 0);
    pub const LOCAL: NodeFlags = NodeFlags(1 << 1);
    pub const STATE: NodeFlags = NodeFlags(1 << 2);
    pub const INJECT: NodeFlags = NodeFlags(1 << 3);
    pub const DEFAULT: NodeFlags = NodeFlags(1 << 4);
    pub const TEMPLATE: NodeFlags = NodeFlags(1 << 5);
    pub const MERGED: NodeFlags = NodeFlags(1 << 6);
    pub const PREFERRED: NodeFlags = NodeFlags(1 << 7);
    pub const DYNAMIC: NodeFlags = NodeFlags(1 << 8);

    pub fn contains(&self, other: NodeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: NodeFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: NodeFlags) {
        self.0 &= !other.0;
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for NodeFlags {
    type Output = NodeFlags;
    fn bitor(self, rhs: NodeFlags) -> NodeFlags {
        NodeFlags(self.0 | rhs.0)
    }
}

/// A lambda value: a closure over its defining binding, or a curried
/// built-in function.
#[derive(Debug, Clone)]
pub enum LambdaValue {
    Closure {
        ast: LambdaAst,
        bound: Vec<Node>,
        env: Binding,
    },
    Builtin {
        name: String,
        bound: Vec<Node>,
    },
}

impl PartialEq for LambdaValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                LambdaValue::Closure { ast: a, bound: b, .. },
                LambdaValue::Closure { ast: c, bound: d, .. },
            ) => a == c && b == d,
            (
                LambdaValue::Builtin { name: a, bound: b },
                LambdaValue::Builtin { name: c, bound: d },
            ) => a == c && b == d,
            _ => false,
        }
    }
}

impl fmt::Display for LambdaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LambdaValue::Closure { ast, .. } => write!(f, "{}", ast),
            LambdaValue::Builtin { name, bound } => {
                write!(f, "builtin {}/{}", name, bound.len())
            }
        }
    }
}

/// An unevaluated `&template` subtree, instantiated by `*ref`.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateValue {
    pub body: Box<Node>,
}

/// The payload of a node.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Node>),
    Map(IndexMap<String, Node>),
    Lambda(LambdaValue),
    Template(TemplateValue),
    /// Still-unresolved expression; replaced by the flow driver.
    Expr(Box<Expr>),
}

/// Structural equality; mapping entries must match in order as well as
/// content.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
            }
            (Value::Lambda(a), Value::Lambda(b)) => a == b,
            (Value::Template(a), Value::Template(b)) => a == b,
            (Value::Expr(a), Value::Expr(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Lambda(_) => "lambda",
            Value::Template(_) => "template",
            Value::Expr(_) => "expression",
        }
    }
}

/// A document tree node.
#[derive(Debug, Clone)]
pub struct Node {
    pub value: Value,
    pub source: Rc<str>,
    pub flags: NodeFlags,
    /// Key used to match elements in `merge on <key>` list merges.
    pub key_name: Option<String>,
    /// Tag name bound to this node's resolved value.
    pub tag: Option<TagBinding>,
}

/// A pending tag definition on a node.
#[derive(Debug, Clone, PartialEq)]
pub struct TagBinding {
    pub name: String,
    pub global: bool,
}

/// Node equality is structural on the value; source labels, flags and
/// tag bindings do not participate.
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Node {
    pub fn new(value: Value, source: &str) -> Self {
        Node {
            value,
            source: Rc::from(source),
            flags: NodeFlags::default(),
            key_name: None,
            tag: None,
        }
    }

    pub fn nil() -> Self {
        Node::new(Value::Nil, "")
    }

    pub fn int(v: i64) -> Self {
        Node::new(Value::Int(v), "")
    }

    pub fn float(v: f64) -> Self {
        Node::new(Value::Float(v), "")
    }

    pub fn bool(v: bool) -> Self {
        Node::new(Value::Bool(v), "")
    }

    pub fn string(v: impl Into<String>) -> Self {
        Node::new(Value::String(v.into()), "")
    }

    pub fn list(items: Vec<Node>) -> Self {
        Node::new(Value::List(items), "")
    }

    pub fn map(entries: IndexMap<String, Node>) -> Self {
        Node::new(Value::Map(entries), "")
    }

    pub fn expr(expr: Expr, source: &str) -> Self {
        Node::new(Value::Expr(Box::new(expr)), source)
    }

    pub fn with_flags(mut self, flags: NodeFlags) -> Self {
        self.flags.insert(flags);
        self
    }

    /// True when no unresolved expression remains in the subtree.
    pub fn is_resolved(&self) -> bool {
        match &self.value {
            Value::Expr(_) => false,
            Value::List(items) => items.iter().all(Node::is_resolved),
            Value::Map(entries) => entries.values().all(Node::is_resolved),
            _ => true,
        }
    }

    /// Count unresolved expression nodes in the subtree.
    pub fn unresolved_count(&self) -> usize {
        match &self.value {
            Value::Expr(_) => 1,
            Value::List(items) => items.iter().map(Node::unresolved_count).sum(),
            Value::Map(entries) => entries.values().map(Node::unresolved_count).sum(),
            _ => 0,
        }
    }

    /// Mapping entry by key.
    pub fn get(&self, key: &str) -> Option<&Node> {
        match &self.value {
            Value::Map(entries) => entries.get(key),
            _ => None,
        }
    }

    /// List element by (possibly negative) index.
    pub fn at(&self, index: i64) -> Option<&Node> {
        match &self.value {
            Value::List(items) => {
                let idx = if index < 0 {
                    items.len().checked_sub(index.unsigned_abs() as usize)?
                } else {
                    index as usize
                };
                items.get(idx)
            }
            _ => None,
        }
    }

    /// Traverse a static path of keys and indices.
    ///
    /// A numeric step addresses list elements by position and mapping
    /// entries by their decimal key.
    pub fn find(&self, path: &[PathSeg]) -> Option<&Node> {
        let mut current = self;
        for seg in path {
            current = match seg {
                PathSeg::Key(key) => current.get(key)?,
                PathSeg::Index(idx) => match &current.value {
                    Value::List(_) => current.at(*idx)?,
                    Value::Map(_) => current.get(&idx.to_string())?,
                    _ => return None,
                },
            };
        }
        Some(current)
    }

    /// Traverse a path of strings as tracked by bindings, where list
    /// steps are written `[i]`.
    pub fn find_str(&self, path: &[String]) -> Option<&Node> {
        let mut current = self;
        for step in path {
            current = if let Some(idx) = parse_index_step(step) {
                current.at(idx)?
            } else {
                match current.get(step) {
                    Some(node) => node,
                    None => match step.parse::<i64>() {
                        Ok(idx) => current.at(idx)?,
                        Err(_) => return None,
                    },
                }
            };
        }
        Some(current)
    }

    /// Render a scalar for string concatenation and diagnostics.
    pub fn stringify(&self) -> String {
        match &self.value {
            Value::Nil => String::new(),
            Value::Bool(v) => v.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::String(v) => v.clone(),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(Node::stringify).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Map(entries) => {
                let parts: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v.stringify()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Lambda(l) => l.to_string(),
            Value::Template(_) => "<template>".to_string(),
            Value::Expr(e) => format!("(( {} ))", e),
        }
    }
}

/// Traverse a string path from `root` with `..` parent steps enabled.
pub fn find_with_parents<'a>(root: &'a Node, path: &[String]) -> Option<&'a Node> {
    let mut stack: Vec<&'a Node> = vec![root];
    for step in path {
        if step == ".." {
            if stack.len() > 1 {
                stack.pop();
            }
            continue;
        }
        let current = *stack.last()?;
        let next = if let Some(idx) = parse_index_step(step) {
            current.at(idx)?
        } else {
            match current.get(step) {
                Some(node) => node,
                None => current.at(step.parse::<i64>().ok()?)?,
            }
        };
        stack.push(next);
    }
    stack.last().copied()
}

/// Parse a `[i]` path step.
pub fn parse_index_step(step: &str) -> Option<i64> {
    step.strip_prefix('[')?.strip_suffix(']')?.parse().ok()
}

/// Format a list index as a `[i]` path step.
pub fn index_step(index: usize) -> String {
    format!("[{}]", index)
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match &self.value {
            Value::Nil => serializer.serialize_unit(),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::String(v) => serializer.serialize_str(v),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Value::Lambda(l) => serializer.serialize_str(&l.to_string()),
            Value::Template(t) => t.body.serialize(serializer),
            Value::Expr(e) => serializer.serialize_str(&format!("(( {} ))", e)),
        }
    }
}
