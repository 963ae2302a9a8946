//! Test harness for end-to-end weft processing.

use indexmap::IndexMap;

use weft_engine::{Node, Options, Weft, WeftError};

/// Drives a template plus stubs through the full pipeline (bind, stub
/// preparation, merge, fixed point) and offers path access into the
/// result.
pub struct TestHarness {
    weft: Weft,
}

impl Default for TestHarness {
    fn default() -> Self {
        TestHarness::new()
    }
}

impl TestHarness {
    pub fn new() -> Self {
        TestHarness { weft: Weft::new() }
    }

    pub fn with_weft(weft: Weft) -> Self {
        TestHarness { weft }
    }

    pub fn with_options(opts: Options) -> Self {
        TestHarness {
            weft: Weft::new().with_options(opts),
        }
    }

    pub fn weft(&self) -> &Weft {
        &self.weft
    }

    /// Process a template with stubs, panicking on failure.
    pub fn process(&self, template: Node, stubs: Vec<Node>) -> Node {
        self.try_process(template, stubs)
            .unwrap_or_else(|err| panic!("processing failed:\n{}", err))
    }

    pub fn try_process(&self, template: Node, stubs: Vec<Node>) -> Result<Node, WeftError> {
        self.weft.cascade(&template, &stubs)
    }
}

/// Build a mapping node from key/value pairs.
pub fn map_of(pairs: Vec<(&str, Node)>) -> Node {
    let mut entries = IndexMap::new();
    for (key, value) in pairs {
        entries.insert(key.to_string(), value);
    }
    Node::map(entries)
}

/// Navigate a dotted path (`a.b.[0].c`) into a node.
pub fn get<'a>(node: &'a Node, path: &str) -> Option<&'a Node> {
    let steps: Vec<String> = path.split('.').map(str::to_string).collect();
    node.find_str(&steps)
}

/// Shorthand for the resolved integer at a path.
pub fn int_at(node: &Node, path: &str) -> Option<i64> {
    match get(node, path)?.value {
        weft_engine::Value::Int(v) => Some(v),
        _ => None,
    }
}

/// Shorthand for the resolved string at a path.
pub fn str_at<'a>(node: &'a Node, path: &str) -> Option<&'a str> {
    match &get(node, path)?.value {
        weft_engine::Value::String(s) => Some(s),
        _ => None,
    }
}
