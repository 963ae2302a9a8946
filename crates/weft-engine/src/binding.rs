//! Evaluation scope: the immutable binding spine.
//!
//! A [`Binding`] records where evaluation currently is (path from the
//! document root), what it can see (local scopes, the document root, the
//! stubs) and the shared [`State`]. Bindings are cheap persistent values:
//! every `with_*` operation returns a new binding sharing its tail.

use indexmap::IndexMap;
use std::rc::Rc;

use crate::node::{index_step, Node, Value};
use crate::state::State;
use weft_dynaml::ast::{PathSeg, RefPath, RefQualifier};

/// Outcome of a reference lookup.
#[derive(Debug, Clone)]
pub enum Lookup {
    /// Node found; `abs_path` is set when it lives in the document root.
    Found {
        node: Node,
        abs_path: Option<Vec<String>>,
    },
    NotFound,
    /// Lookup that can never succeed (bad document index).
    Invalid(String),
}

struct Inner {
    outer: Option<Binding>,
    source: Rc<str>,
    path: Vec<String>,
    stub_path: Vec<String>,
    root: Option<Node>,
    stubs: Rc<Vec<Node>>,
    scope: IndexMap<String, Node>,
    state: Rc<State>,
}

/// Immutable evaluation scope.
#[derive(Clone)]
pub struct Binding {
    inner: Rc<Inner>,
}

impl Binding {
    pub fn new(source: &str, state: Rc<State>) -> Self {
        Binding {
            inner: Rc::new(Inner {
                outer: None,
                source: Rc::from(source),
                path: Vec::new(),
                stub_path: Vec::new(),
                root: None,
                stubs: Rc::new(Vec::new()),
                scope: IndexMap::new(),
                state,
            }),
        }
    }

    fn derive(&self, f: impl FnOnce(&mut Inner)) -> Self {
        let mut inner = Inner {
            outer: self.inner.outer.clone(),
            source: self.inner.source.clone(),
            path: self.inner.path.clone(),
            stub_path: self.inner.stub_path.clone(),
            root: self.inner.root.clone(),
            stubs: self.inner.stubs.clone(),
            scope: self.inner.scope.clone(),
            state: self.inner.state.clone(),
        };
        f(&mut inner);
        Binding {
            inner: Rc::new(inner),
        }
    }

    /// Push a lexical scope; the current binding becomes the outer one.
    pub fn with_local_scope(&self, scope: IndexMap<String, Node>) -> Self {
        Binding {
            inner: Rc::new(Inner {
                outer: Some(self.clone()),
                source: self.inner.source.clone(),
                path: self.inner.path.clone(),
                stub_path: self.inner.stub_path.clone(),
                root: self.inner.root.clone(),
                stubs: self.inner.stubs.clone(),
                scope,
                state: self.inner.state.clone(),
            }),
        }
    }

    /// Descend one document step (a map key, or `[i]` for list elements).
    pub fn with_path(&self, step: &str) -> Self {
        self.derive(|inner| {
            inner.path.push(step.to_string());
            inner.stub_path.push(step.to_string());
        })
    }

    /// Descend into a list element.
    pub fn with_index(&self, index: usize) -> Self {
        self.with_path(&index_step(index))
    }

    pub fn with_source(&self, source: &str) -> Self {
        self.derive(|inner| inner.source = Rc::from(source))
    }

    pub fn with_root(&self, root: Node) -> Self {
        self.derive(|inner| inner.root = Some(root))
    }

    /// Shadow the document root (scoped evaluation of templates).
    pub fn with_new_root(&self, root: Node) -> Self {
        self.derive(|inner| {
            inner.root = Some(root);
            inner.path.clear();
            inner.stub_path.clear();
        })
    }

    pub fn with_stubs(&self, stubs: Rc<Vec<Node>>) -> Self {
        self.derive(|inner| inner.stubs = stubs)
    }

    /// Redirect the stub lookup path for this subtree (`merge other`).
    pub fn redirect(&self, stub_path: Vec<String>) -> Self {
        self.derive(|inner| inner.stub_path = stub_path)
    }

    pub fn outer(&self) -> Option<&Binding> {
        self.inner.outer.as_ref()
    }

    pub fn source(&self) -> &str {
        &self.inner.source
    }

    pub fn path(&self) -> &[String] {
        &self.inner.path
    }

    pub fn stub_path(&self) -> &[String] {
        &self.inner.stub_path
    }

    pub fn root(&self) -> Option<&Node> {
        self.inner.root.as_ref()
    }

    pub fn stubs(&self) -> &[Node] {
        &self.inner.stubs
    }

    pub fn state(&self) -> &Rc<State> {
        &self.inner.state
    }

    /// Resolve a reference per the scoping rules: root-anchored paths go
    /// straight to the document root, qualified paths through the tag or
    /// stream registries, and plain paths search local scopes outward,
    /// then the root, then the stubs in order.
    pub fn find_reference(&self, path: &RefPath) -> Lookup {
        match &path.qualifier {
            Some(RefQualifier::Tag(name)) => {
                let tag = match self.inner.state.get_tag(name) {
                    Some(tag) => tag,
                    None => return Lookup::NotFound,
                };
                match tag.node.find(&path.segments) {
                    Some(node) => Lookup::Found {
                        node: node.clone(),
                        abs_path: None,
                    },
                    None => Lookup::NotFound,
                }
            }
            Some(RefQualifier::Doc(index)) => {
                let doc = match self.inner.state.doc(*index) {
                    Some(doc) => doc,
                    None => {
                        return Lookup::Invalid(format!(
                            "document index {} out of range (stream has {} documents)",
                            index,
                            self.inner.state.doc_count()
                        ))
                    }
                };
                match doc.find(&path.segments) {
                    Some(node) => Lookup::Found {
                        node: node.clone(),
                        abs_path: None,
                    },
                    None => Lookup::NotFound,
                }
            }
            None => {
                if path.anchored {
                    return self.find_from_root(&path.segments);
                }

                if let Some(PathSeg::Key(first)) = path.segments.first() {
                    let mut binding = Some(self);
                    while let Some(current) = binding {
                        if let Some(node) = current.inner.scope.get(first) {
                            match node.find(&path.segments[1..]) {
                                Some(found) => {
                                    return Lookup::Found {
                                        node: found.clone(),
                                        abs_path: None,
                                    }
                                }
                                None => return Lookup::NotFound,
                            }
                        }
                        binding = current.inner.outer.as_ref();
                    }
                }

                if let Lookup::Found { node, abs_path } = self.find_from_root(&path.segments) {
                    return Lookup::Found { node, abs_path };
                }

                for stub in self.inner.stubs.iter() {
                    if let Some(node) = stub.find(&path.segments) {
                        return Lookup::Found {
                            node: node.clone(),
                            abs_path: None,
                        };
                    }
                }

                Lookup::NotFound
            }
        }
    }

    fn find_from_root(&self, segments: &[PathSeg]) -> Lookup {
        let root = match &self.inner.root {
            Some(root) => root,
            None => return Lookup::NotFound,
        };
        match root.find(segments) {
            Some(node) => Lookup::Found {
                node: node.clone(),
                abs_path: Some(segments_to_strings(segments)),
            },
            None => Lookup::NotFound,
        }
    }

    /// Look up the current (or redirected) path in the stubs, first hit
    /// wins. Used by `merge` expressions.
    pub fn find_in_stubs(&self, path: &[String]) -> Option<Node> {
        for stub in self.inner.stubs.iter() {
            if let Some(node) = stub.find_str(path) {
                return Some(node.clone());
            }
        }
        None
    }

    /// The value the current path points at in the document root.
    pub fn current_target(&self) -> Option<Node> {
        self.inner
            .root
            .as_ref()
            .and_then(|root| root.find_str(&self.inner.path))
            .cloned()
    }
}

/// Render reference segments as binding path steps.
pub fn segments_to_strings(segments: &[PathSeg]) -> Vec<String> {
    segments
        .iter()
        .map(|seg| match seg {
            PathSeg::Key(k) => k.clone(),
            PathSeg::Index(i) => format!("[{}]", i),
        })
        .collect()
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("source", &self.source())
            .field("path", &self.path())
            .field("scope", &self.inner.scope.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Nodes flagged Local are visible while their own document evaluates
/// but never through stub lookups; strip them from a prepared stub.
pub fn strip_local(node: &Node) -> Node {
    let mut result = node.clone();
    result.value = match &node.value {
        Value::Map(entries) => {
            let mut stripped = IndexMap::new();
            for (k, v) in entries {
                if v.flags.contains(crate::node::NodeFlags::LOCAL) {
                    continue;
                }
                stripped.insert(k.clone(), strip_local(v));
            }
            Value::Map(stripped)
        }
        Value::List(items) => Value::List(
            items
                .iter()
                .filter(|item| !item.flags.contains(crate::node::NodeFlags::LOCAL))
                .map(strip_local)
                .collect(),
        ),
        other => other.clone(),
    };
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_with(key: &str, value: Node) -> Node {
        let mut entries = IndexMap::new();
        entries.insert(key.to_string(), value);
        Node::map(entries)
    }

    fn binding_with_root(root: Node) -> Binding {
        Binding::new("test", Rc::new(State::new())).with_root(root)
    }

    #[test]
    fn test_scope_shadows_root() {
        let env = binding_with_root(root_with("x", Node::int(1)));
        let mut scope = IndexMap::new();
        scope.insert("x".to_string(), Node::int(2));
        let inner = env.with_local_scope(scope);

        match inner.find_reference(&RefPath::key("x")) {
            Lookup::Found { node, .. } => assert_eq!(node, Node::int(2)),
            other => panic!("expected found, got {:?}", other),
        }
        // Anchored references bypass the scopes.
        let mut anchored = RefPath::key("x");
        anchored.anchored = true;
        match inner.find_reference(&anchored) {
            Lookup::Found { node, .. } => assert_eq!(node, Node::int(1)),
            other => panic!("expected found, got {:?}", other),
        }
    }

    #[test]
    fn test_outer_scope_lookup() {
        let env = binding_with_root(Node::map(IndexMap::new()));
        let mut outer_scope = IndexMap::new();
        outer_scope.insert("a".to_string(), Node::int(1));
        let outer = env.with_local_scope(outer_scope);
        let inner = outer.with_local_scope(IndexMap::new());

        match inner.find_reference(&RefPath::key("a")) {
            Lookup::Found { node, .. } => assert_eq!(node, Node::int(1)),
            other => panic!("expected found, got {:?}", other),
        }
    }

    #[test]
    fn test_stub_fallback() {
        let env = binding_with_root(Node::map(IndexMap::new()))
            .with_stubs(Rc::new(vec![root_with("s", Node::int(7))]));
        match env.find_reference(&RefPath::key("s")) {
            Lookup::Found { node, abs_path } => {
                assert_eq!(node, Node::int(7));
                assert!(abs_path.is_none());
            }
            other => panic!("expected found, got {:?}", other),
        }
    }

    #[test]
    fn test_doc_index_out_of_range() {
        let env = binding_with_root(Node::map(IndexMap::new()));
        let mut path = RefPath::key("x");
        path.qualifier = Some(RefQualifier::Doc(3));
        assert!(matches!(env.find_reference(&path), Lookup::Invalid(_)));
    }
}
