//! Abstract syntax tree for DynaML expressions.
//!
//! Reference paths are owned key/index sequences — the AST never holds
//! pointers into a document tree. `Display` renders an expression back to
//! DynaML text; the engine uses this for diagnostics and for serializing
//! still-unresolved nodes.

use std::fmt;

/// A step in a reference path: a mapping key or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSeg {
    Key(String),
    Index(i64),
}

impl fmt::Display for PathSeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSeg::Key(k) => write!(f, "{}", k),
            PathSeg::Index(i) => write!(f, "[{}]", i),
        }
    }
}

/// Qualifier in front of a reference: `TAG::` or `doc.N::`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RefQualifier {
    /// `name::` — lookup through the tag registry.
    Tag(String),
    /// `doc.N::` / `doc:-N::` — document index in a multi-document stream.
    Doc(i64),
}

/// A reference path, optionally tag-qualified and/or root-anchored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RefPath {
    pub qualifier: Option<RefQualifier>,
    /// Leading-dot reference: resolve from the document root only.
    pub anchored: bool,
    pub segments: Vec<PathSeg>,
}

impl RefPath {
    pub fn new(segments: Vec<PathSeg>) -> Self {
        RefPath {
            qualifier: None,
            anchored: false,
            segments,
        }
    }

    pub fn key(name: &str) -> Self {
        RefPath::new(vec![PathSeg::Key(name.to_string())])
    }

    /// The single key of a one-segment unqualified reference, if that is
    /// what this path is.
    pub fn as_single_key(&self) -> Option<&str> {
        if self.qualifier.is_none() && !self.anchored && self.segments.len() == 1 {
            match &self.segments[0] {
                PathSeg::Key(k) => Some(k),
                PathSeg::Index(_) => None,
            }
        } else {
            None
        }
    }
}

impl fmt::Display for RefPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(RefQualifier::Tag(name)) => write!(f, "{}::", name)?,
            Some(RefQualifier::Doc(n)) => write!(f, "doc.{}::", n)?,
            None => {}
        }
        if self.anchored {
            write!(f, ".")?;
        }
        for (i, seg) in self.segments.iter().enumerate() {
            match seg {
                PathSeg::Key(k) => {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{}", k)?;
                }
                PathSeg::Index(idx) => write!(f, "[{}]", idx)?,
            }
        }
        Ok(())
    }
}

/// Binary operators. `And`/`Or` are the logical `-and`/`-or`; the `||`
/// alternative operator is its own AST variant because it is not strict
/// in its left operand's failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "-and",
            BinaryOp::Or => "-or",
        }
    }
}

/// Lifecycle markers attached with `&name` in front of an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Temporary,
    Local,
    State,
    Inject,
    Default,
    Dynamic,
    Template,
    /// `&tag:name` (local scope) or `&tag:*name` (global scope).
    Tag { name: String, global: bool },
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::Temporary => write!(f, "&temporary"),
            Marker::Local => write!(f, "&local"),
            Marker::State => write!(f, "&state"),
            Marker::Inject => write!(f, "&inject"),
            Marker::Default => write!(f, "&default"),
            Marker::Dynamic => write!(f, "&dynamic"),
            Marker::Template => write!(f, "&template"),
            Marker::Tag { name, global } => {
                write!(f, "&tag:{}{}", if *global { "*" } else { "" }, name)
            }
        }
    }
}

/// Merge directive forms.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeSpec {
    /// Replace the whole subtree with the stub value.
    pub replace: bool,
    /// Fail if no stub provides a value.
    pub required: bool,
    /// List-merge key (`merge on NAME`).
    pub key: Option<String>,
    /// Redirect: take the stub value from this path instead of the
    /// current one (`merge other.path`).
    pub redirect: Option<RefPath>,
}

impl MergeSpec {
    pub fn plain() -> Self {
        MergeSpec {
            replace: false,
            required: false,
            key: None,
            redirect: None,
        }
    }
}

impl fmt::Display for MergeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "merge")?;
        if self.replace {
            write!(f, " replace")?;
        }
        if self.required {
            write!(f, " required")?;
        }
        if let Some(key) = &self.key {
            write!(f, " on {}", key)?;
        }
        if let Some(redirect) = &self.redirect {
            write!(f, " {}", redirect)?;
        }
        Ok(())
    }
}

/// A lambda parameter with optional default.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

/// Lambda definition: parameter list, optional varargs tail, body.
#[derive(Debug, Clone, PartialEq)]
pub struct LambdaAst {
    pub params: Vec<Param>,
    pub varargs: bool,
    pub body: Box<Expr>,
}

impl fmt::Display for LambdaAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lambda|")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", p.name)?;
            if let Some(d) = &p.default {
                write!(f, "={}", d)?;
            }
        }
        if self.varargs {
            write!(f, "...")?;
        }
        write!(f, "|->{}", self.body)
    }
}

/// A call argument: optionally named, optionally expanded (`expr...`).
#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub name: Option<String>,
    pub expr: Expr,
    pub expand: bool,
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            write!(f, "{}=", name)?;
        }
        write!(f, "{}", self.expr)?;
        if self.expand {
            write!(f, "...")?;
        }
        Ok(())
    }
}

/// The iteration body of `map`/`select`/`sum`: named parameters plus a
/// body expression (`x, y | body`).
#[derive(Debug, Clone, PartialEq)]
pub struct IterBody {
    pub params: Vec<String>,
    pub body: Box<Expr>,
}

impl fmt::Display for IterBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.params.join(","), self.body)
    }
}

/// A projection step applied to every element (`.key` or `[idx]`).
pub type ProjStep = PathSeg;

/// DynaML expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Expr { kind }
    }

    /// The reference path if this expression is a plain reference.
    pub fn as_ref_path(&self) -> Option<&RefPath> {
        match &self.kind {
            ExprKind::Ref(path) => Some(path),
            _ => None,
        }
    }

    /// True if the expression is exactly a merge directive, optionally
    /// behind markers (the shape the merge engine handles structurally).
    pub fn as_merge_directive(&self) -> Option<&MergeSpec> {
        match &self.kind {
            ExprKind::Merge(spec) => Some(spec),
            ExprKind::Marked { expr: Some(inner), .. } => inner.as_merge_directive(),
            _ => None,
        }
    }
}

/// One variant per DynaML construct.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    // Literals
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Nil,
    Undefined,
    /// `$name` — a quoted name literal.
    Symbol(String),

    /// Reference path, possibly tag-qualified.
    Ref(RefPath),
    /// Dynamic index: `base.[expr]` / `base[expr]`.
    DynRef { base: Box<Expr>, index: Box<Expr> },
    /// Slice: `base.[start..end]`.
    Slice {
        base: Box<Expr>,
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
    },
    /// Projection `base.[*].follow…` — apply `follow` to every element.
    Projection {
        base: Box<Expr>,
        follow: Vec<ProjStep>,
    },

    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    /// Alternative `a || b`: `b` when `a` fails or is undefined.
    Alt { left: Box<Expr>, right: Box<Expr> },
    /// Juxtaposition `a b`: string/list/map concatenation.
    Concat { left: Box<Expr>, right: Box<Expr> },
    /// `c ? t : f` — strict in `c`, lazy in the branches.
    Cond {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// `[start..end]` — inclusive integer range.
    Range {
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
    },
    List(Vec<Expr>),
    /// `expr...` in list position — splice the list value.
    Expansion(Box<Expr>),
    /// `{ k = v, … }` map literal; keys are expressions (single-key
    /// references and symbols become literal keys).
    MapLit(Vec<(Expr, Expr)>),
    /// `( a=1, b=2 ) expr` — scoped expression with local bindings.
    Scoped {
        decls: Vec<(Expr, Expr)>,
        body: Box<Expr>,
    },

    Lambda(LambdaAst),
    /// `lambda expr` — the operand evaluates to a lambda (value or its
    /// textual form).
    LambdaRef(Box<Expr>),
    Call {
        callee: Box<Expr>,
        args: Vec<Arg>,
    },
    /// Explicit currying `callee*(args)` — always partial application.
    Curry {
        callee: Box<Expr>,
        args: Vec<Arg>,
    },

    /// `map[src|x,y|body]` (`to_map` for `map{…}`).
    Mapping {
        source: Box<Expr>,
        to_map: bool,
        body: IterBody,
    },
    /// `select[src|x,y|body]` (`to_map` for `select{…}`).
    Selection {
        source: Box<Expr>,
        to_map: bool,
        body: IterBody,
    },
    /// `sum[src|init|acc,x|body]`.
    Fold {
        source: Box<Expr>,
        init: Box<Expr>,
        body: IterBody,
    },
    /// `sync[expr|v|cond(,value)(,timeout)]` — feedback loop against the
    /// fixed-point driver.
    Sync {
        expr: Box<Expr>,
        cond: IterBody,
        value: Option<IterBody>,
        timeout: Option<Box<Expr>>,
    },
    /// `catch[expr|e|handler]`.
    Catch {
        expr: Box<Expr>,
        handler: Option<IterBody>,
    },

    /// `*expr` — template substitution.
    Subst(Box<Expr>),
    /// Merge directive (`merge`, `merge on k`, `merge replace` …).
    Merge(MergeSpec),
    /// `auto` — automatic source selection.
    Auto,
    /// `prefer expr` — template value wins over stub values.
    Prefer(Box<Expr>),
    /// `&marker… ( expr )` — marked expression; flags without value when
    /// `expr` is `None`.
    Marked {
        markers: Vec<Marker>,
        expr: Option<Box<Expr>>,
    },
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Int(v) => write!(f, "{}", v),
            ExprKind::Float(v) => write!(f, "{}", v),
            ExprKind::Bool(v) => write!(f, "{}", v),
            ExprKind::Str(s) => write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
            ExprKind::Nil => write!(f, "nil"),
            ExprKind::Undefined => write!(f, "~~"),
            ExprKind::Symbol(name) => write!(f, "${}", name),
            ExprKind::Ref(path) => write!(f, "{}", path),
            ExprKind::DynRef { base, index } => write!(f, "{}.[{}]", base, index),
            ExprKind::Slice { base, start, end } => {
                write!(f, "{}.[", base)?;
                if let Some(s) = start {
                    write!(f, "{}", s)?;
                }
                write!(f, "..")?;
                if let Some(e) = end {
                    write!(f, "{}", e)?;
                }
                write!(f, "]")
            }
            ExprKind::Projection { base, follow } => {
                write!(f, "{}.[*]", base)?;
                for step in follow {
                    match step {
                        PathSeg::Key(k) => write!(f, ".{}", k)?,
                        PathSeg::Index(i) => write!(f, "[{}]", i)?,
                    }
                }
                Ok(())
            }
            ExprKind::Binary { op, left, right } => {
                write!(f, "{} {} {}", left, op.symbol(), right)
            }
            ExprKind::Not(e) => write!(f, "!{}", e),
            ExprKind::Alt { left, right } => write!(f, "{} || {}", left, right),
            ExprKind::Concat { left, right } => write!(f, "{} {}", left, right),
            ExprKind::Cond {
                cond,
                then,
                otherwise,
            } => write!(f, "{} ? {} : {}", cond, then, otherwise),
            ExprKind::Range { start, end } => {
                write!(f, "[")?;
                if let Some(s) = start {
                    write!(f, "{}", s)?;
                }
                write!(f, "..")?;
                if let Some(e) = end {
                    write!(f, "{}", e)?;
                }
                write!(f, "]")
            }
            ExprKind::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            ExprKind::Expansion(e) => write!(f, "{}...", e),
            ExprKind::MapLit(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = {}", k, v)?;
                }
                write!(f, "}}")
            }
            ExprKind::Scoped { decls, body } => {
                write!(f, "(")?;
                for (i, (k, v)) in decls.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = {}", k, v)?;
                }
                write!(f, ") {}", body)
            }
            ExprKind::Lambda(ast) => write!(f, "{}", ast),
            ExprKind::LambdaRef(e) => write!(f, "lambda {}", e),
            ExprKind::Call { callee, args } => {
                write!(f, "{}(", callee)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            ExprKind::Curry { callee, args } => {
                write!(f, "{}*(", callee)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            ExprKind::Mapping {
                source,
                to_map,
                body,
            } => {
                let (open, close) = if *to_map { ("{", "}") } else { ("[", "]") };
                write!(f, "map{}{}|{}{}", open, source, body, close)
            }
            ExprKind::Selection {
                source,
                to_map,
                body,
            } => {
                let (open, close) = if *to_map { ("{", "}") } else { ("[", "]") };
                write!(f, "select{}{}|{}{}", open, source, body, close)
            }
            ExprKind::Fold { source, init, body } => {
                write!(f, "sum[{}|{}|{}]", source, init, body)
            }
            ExprKind::Sync {
                expr,
                cond,
                value,
                timeout,
            } => {
                write!(f, "sync[{}|{}", expr, cond)?;
                if let Some(v) = value {
                    write!(f, "|{}", v)?;
                }
                if let Some(t) = timeout {
                    write!(f, ",{}", t)?;
                }
                write!(f, "]")
            }
            ExprKind::Catch { expr, handler } => {
                write!(f, "catch[{}", expr)?;
                if let Some(h) = handler {
                    write!(f, "|{}", h)?;
                }
                write!(f, "]")
            }
            ExprKind::Subst(e) => write!(f, "*{}", e),
            ExprKind::Merge(spec) => write!(f, "{}", spec),
            ExprKind::Auto => write!(f, "auto"),
            ExprKind::Prefer(e) => write!(f, "prefer {}", e),
            ExprKind::Marked { markers, expr } => {
                for (i, m) in markers.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", m)?;
                }
                if let Some(e) = expr {
                    write!(f, " ({})", e)?;
                }
                Ok(())
            }
        }
    }
}
