//! weft — declarative document-template processor.
//!
//! A template document plus an ordered list of stub documents are merged
//! and evaluated to a fully resolved output document. Expressions
//! embedded in the documents are written in DynaML (see `weft-dynaml`);
//! this crate provides the node model, the merge engine, the
//! tree-walking evaluator with fixed-point iteration, the built-in
//! function catalog and the library surface.
//!
//! Serialization is not performed here: documents enter as [`Node`]
//! trees (built by the embedding application from YAML, JSON or
//! anything else) and leave the same way; [`Node`] implements
//! `serde::Serialize` for the way out.

pub mod api;
pub mod binding;
pub mod builtins;
pub mod error;
pub mod eval;
mod flow;
pub mod merge;
pub mod node;
pub mod state;
pub mod tags;

pub use api::{apply, cascade, determine_state, prepare_stubs, Options, Weft};
pub use binding::Binding;
pub use error::{Issue, IssueKind, IssueSet, Result, WeftError};
pub use node::{Node, NodeFlags, Value};
pub use state::{Cipher, FileAccess, State};
pub use tags::{Tag, TagScope};

pub use weft_dynaml::{parse_expression, ParseError};
