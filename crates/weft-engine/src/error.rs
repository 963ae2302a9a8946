//! Engine errors and the issue tree reported for failed documents.

use std::fmt;
use thiserror::Error;
use weft_dynaml::ParseError;

/// Classification of an unresolved node, rendered with the legend
/// `*` expression error, `@` cyclic reference, `-` dependent node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    /// Direct expression error.
    Error,
    /// Member of a reference cycle.
    Cycle,
    /// Depends on an errored or cyclic node.
    Dependent,
}

impl IssueKind {
    pub fn symbol(&self) -> char {
        match self {
            IssueKind::Error => '*',
            IssueKind::Cycle => '@',
            IssueKind::Dependent => '-',
        }
    }
}

/// A single diagnostic: message, source label, document path and nested
/// causes.
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub kind: IssueKind,
    pub message: String,
    pub source: String,
    pub path: Vec<String>,
    pub nested: Vec<Issue>,
}

impl Issue {
    pub fn new(message: impl Into<String>) -> Self {
        Issue {
            kind: IssueKind::Error,
            message: message.into(),
            source: String::new(),
            path: Vec::new(),
            nested: Vec::new(),
        }
    }

    pub fn at(mut self, path: Vec<String>) -> Self {
        self.path = path;
        self
    }

    pub fn from_source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    pub fn kind(mut self, kind: IssueKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn nest(mut self, nested: Issue) -> Self {
        self.nested.push(nested);
        self
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        write!(f, "{:indent$}{} ", "", self.kind.symbol(), indent = indent)?;
        if !self.path.is_empty() {
            write!(f, "{}: ", self.path.join("."))?;
        }
        write!(f, "{}", self.message)?;
        if !self.source.is_empty() {
            write!(f, " (in {})", self.source)?;
        }
        for nested in &self.nested {
            writeln!(f)?;
            nested.render(f, indent + 4)?;
        }
        Ok(())
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, 0)
    }
}

/// The full set of issues from a failed `apply`, rendered with the
/// classification legend.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueSet(pub Vec<Issue>);

impl fmt::Display for IssueSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "error classifying unresolved nodes:")?;
        writeln!(f, "    (@ cyclic reference, * expression error, - dependent node)")?;
        for issue in &self.0 {
            writeln!(f, "{}", issue)?;
        }
        Ok(())
    }
}

/// Engine error. The semantic kinds of a failed run (evaluation, cycle,
/// dependency) are carried as [`IssueKind`]s inside `Unresolved`.
#[derive(Debug, Error)]
pub enum WeftError {
    /// Malformed expression text.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The fixed point was reached with unresolved or errored nodes.
    #[error("{0}")]
    Unresolved(IssueSet),

    /// An operation was denied by the State's capability flags.
    #[error("{0}: operation not permitted in this execution environment")]
    Policy(String),
}

/// Engine result type.
pub type Result<T> = std::result::Result<T, WeftError>;
