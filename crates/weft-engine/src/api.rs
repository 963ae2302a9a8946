//! Library surface: stub preparation, apply/cascade, state extraction
//! and the `Weft` processing facade.

use indexmap::IndexMap;
use std::rc::Rc;
use tracing::{debug, info};

use crate::binding::{strip_local, Binding};
use crate::error::Result;
use crate::flow;
use crate::merge;
use crate::node::Node;
use crate::state::State;

/// Processing options.
#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    /// Return the partial tree instead of failing on unresolved nodes.
    pub partial: bool,
    /// Keep `((! … ))` escapes untouched instead of unquoting one level.
    pub preserve_escapes: bool,
    /// Keep nodes flagged temporary in the output.
    pub preserve_temporary: bool,
}

/// Prepare stubs for merging: each stub is flowed against its successor
/// stubs (leaves first), then stripped of its local nodes.
pub fn prepare_stubs(binding: &Binding, partial: bool, stubs: &[Node]) -> Result<Vec<Node>> {
    let opts = Options {
        partial,
        ..Options::default()
    };
    let mut prepared: Vec<Node> = Vec::new();
    for stub in stubs.iter().rev() {
        debug!(source = %stub.source, "preparing stub");
        let bound = flow::bind_expressions(stub, binding.state(), &opts)?;
        let later = Rc::new(prepared.clone());
        let env = binding.with_stubs(later).with_source(&stub.source);
        let merged = merge::merge_trees(&bound, &[]);
        let flowed = flow::fixed_point(&env, merged, &opts)?;
        prepared.insert(0, strip_local(&flowed));
    }
    Ok(prepared)
}

/// Merge prepared stubs into a template and drive the result to its
/// fixed point.
pub fn apply(binding: &Binding, template: &Node, stubs: &[Node], opts: &Options) -> Result<Node> {
    info!(source = %template.source, stubs = stubs.len(), "applying template");
    let bound = flow::bind_expressions(template, binding.state(), opts)?;
    let merged = merge::merge_trees(&bound, stubs);
    let env = binding
        .with_stubs(Rc::new(stubs.to_vec()))
        .with_source(&template.source);
    flow::fixed_point(&env, merged, opts)
}

/// Prepare raw stubs and apply them to the template in one step.
pub fn cascade(binding: &Binding, template: &Node, opts: &Options, stubs: &[Node]) -> Result<Node> {
    let prepared = prepare_stubs(binding, true, stubs)?;
    apply(binding, template, &prepared, opts)
}

/// The `&state`-flagged subtree of a processed document, if any.
pub fn determine_state(node: &Node) -> Option<Node> {
    flow::extract_state(node)
}

/// Document processor facade: owns the State for a stream of documents
/// and drives cascades against it.
pub struct Weft {
    state: Rc<State>,
    values: IndexMap<String, Node>,
    opts: Options,
}

impl Default for Weft {
    fn default() -> Self {
        Weft::new()
    }
}

impl Weft {
    pub fn new() -> Self {
        Weft::with_state(State::new())
    }

    pub fn with_state(state: State) -> Self {
        Weft {
            state: Rc::new(state),
            values: IndexMap::new(),
            opts: Options::default(),
        }
    }

    /// Predefined named values, visible to all processed documents as
    /// an outer scope.
    pub fn with_values(mut self, values: IndexMap<String, Node>) -> Self {
        self.values = values;
        self
    }

    pub fn with_options(mut self, opts: Options) -> Self {
        self.opts = opts;
        self
    }

    pub fn state(&self) -> &Rc<State> {
        &self.state
    }

    /// The root binding documents are processed under.
    pub fn binding(&self) -> Binding {
        let binding = Binding::new("context", self.state.clone());
        if self.values.is_empty() {
            binding
        } else {
            binding.with_local_scope(self.values.clone())
        }
    }

    /// Process one document of the stream: prepare the stubs, apply the
    /// template, register the result for `doc.N::` references, and drop
    /// document-local tags.
    pub fn cascade(&self, template: &Node, stubs: &[Node]) -> Result<Node> {
        let binding = self.binding();
        let result = cascade(&binding, template, &self.opts, stubs)?;
        self.state.register_doc(result.clone());
        self.state.reset_local_tags();
        Ok(result)
    }

    /// End the current stream: Stream-scoped tags and the document
    /// registry are dropped; Global tags survive.
    pub fn reset_stream(&self) {
        self.state.reset_stream();
    }
}
