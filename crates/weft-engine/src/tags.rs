//! Named tags: `name::path` references with Local / Stream / Global
//! scope.

use indexmap::IndexMap;

use crate::node::Node;

/// Tag lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagScope {
    /// Valid for the current document only.
    Local,
    /// Valid for all documents of the current stream.
    Stream,
    /// Valid for the whole processing run.
    Global,
}

/// A named node binding.
#[derive(Debug, Clone)]
pub struct Tag {
    pub name: String,
    pub node: Node,
    pub scope: TagScope,
}

/// Validate a tag name: `:`-separated components, each starting with a
/// letter or underscore.
pub fn check_tag_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("empty tag name".to_string());
    }
    for component in name.split(':') {
        if component.is_empty() {
            return Err("empty tag component not allowed".to_string());
        }
        let mut chars = component.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            Some(c) => {
                return Err(format!("tag component must start with a letter, found {:?}", c));
            }
            None => unreachable!("component checked non-empty"),
        }
        for c in chars {
            if !c.is_ascii_alphanumeric() && c != '_' {
                return Err(format!("invalid character {:?} in tag component", c));
            }
        }
    }
    Ok(())
}

/// Registry of tags, reset per document / per stream according to scope.
#[derive(Debug, Default, Clone)]
pub struct TagRegistry {
    tags: IndexMap<String, Tag>,
}

impl TagRegistry {
    pub fn set(&mut self, name: &str, node: Node, scope: TagScope) -> Result<(), String> {
        check_tag_name(name)?;
        if let Some(existing) = self.tags.get(name) {
            if existing.node != node {
                return Err(format!("tag '{}' already set to a different value", name));
            }
        }
        self.tags.insert(
            name.to_string(),
            Tag {
                name: name.to_string(),
                node,
                scope,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Tag> {
        self.tags.get(name)
    }

    /// Drop Local tags (end of document).
    pub fn reset_local(&mut self) {
        self.tags.retain(|_, tag| tag.scope != TagScope::Local);
    }

    /// Drop Local and Stream tags (end of stream).
    pub fn reset_stream(&mut self) {
        self.tags.retain(|_, tag| tag.scope == TagScope::Global);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_name_validation() {
        assert!(check_tag_name("net").is_ok());
        assert!(check_tag_name("net:sub1").is_ok());
        assert!(check_tag_name("_x").is_ok());
        assert!(check_tag_name("1net").is_err());
        assert!(check_tag_name("net:").is_err());
        assert!(check_tag_name("a-b").is_err());
        assert!(check_tag_name("").is_err());
    }

    #[test]
    fn test_scope_reset() {
        let mut registry = TagRegistry::default();
        registry
            .set("local", Node::int(1), TagScope::Local)
            .expect("set");
        registry
            .set("stream", Node::int(2), TagScope::Stream)
            .expect("set");
        registry
            .set("global", Node::int(3), TagScope::Global)
            .expect("set");

        registry.reset_local();
        assert!(registry.get("local").is_none());
        assert!(registry.get("stream").is_some());

        registry.reset_stream();
        assert!(registry.get("stream").is_none());
        assert!(registry.get("global").is_some());
    }

    #[test]
    fn test_conflicting_redefinition() {
        let mut registry = TagRegistry::default();
        registry.set("t", Node::int(1), TagScope::Local).expect("set");
        assert!(registry.set("t", Node::int(2), TagScope::Local).is_err());
        assert!(registry.set("t", Node::int(1), TagScope::Local).is_ok());
    }
}
