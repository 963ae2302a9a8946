//! Per-invocation processing state: capability flags, external-collaborator
//! hooks (filesystem, document decoder, cipher), the function registry,
//! the tag registry and the stream document registry.
//!
//! The engine never performs YAML/JSON parsing or cryptography itself;
//! both enter through the hooks configured here.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use crate::builtins::Registry;
use crate::node::Node;
use crate::tags::{Tag, TagRegistry, TagScope};

/// Virtual filesystem used by the `read` built-in.
pub trait FileAccess {
    fn read(&self, path: &str) -> io::Result<Vec<u8>>;
}

/// Real-OS filesystem, used when OS access is allowed and no virtual
/// filesystem is installed.
pub struct OsFileAccess;

impl FileAccess for OsFileAccess {
    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

/// Cipher hook used by the `encrypt`/`decrypt` built-ins.
pub trait Cipher {
    fn encrypt(&self, plain: &[u8], key: &str) -> Result<String, String>;
    fn decrypt(&self, data: &str, key: &str) -> Result<Vec<u8>, String>;
}

/// Document decoder hook used by `read(…, "yaml")` / `read(…, "json")`.
pub type DocDecoder = Rc<dyn Fn(&str) -> Result<Node, String>>;

/// Process-wide capabilities and registries for one processing
/// invocation. Each concurrent invocation must own its own `State`.
pub struct State {
    encryption_key: Option<String>,
    os_access: bool,
    file_access: bool,
    fs: Option<Rc<dyn FileAccess>>,
    decoder: Option<DocDecoder>,
    cipher: Option<Rc<dyn Cipher>>,
    functions: Registry,
    interpolation: bool,
    tags: RefCell<TagRegistry>,
    /// Documents of the current stream, addressable via `doc.N::`.
    docs: RefCell<Vec<Node>>,
}

impl Default for State {
    fn default() -> Self {
        State::new()
    }
}

impl State {
    pub fn new() -> Self {
        State {
            encryption_key: None,
            os_access: false,
            file_access: false,
            fs: None,
            decoder: None,
            cipher: None,
            functions: Registry::standard(),
            interpolation: false,
            tags: RefCell::new(TagRegistry::default()),
            docs: RefCell::new(Vec::new()),
        }
    }

    pub fn with_encryption_key(mut self, key: impl Into<String>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }

    pub fn with_os_access(mut self, allowed: bool) -> Self {
        self.os_access = allowed;
        self
    }

    pub fn with_file_access(mut self, allowed: bool) -> Self {
        self.file_access = allowed;
        self
    }

    pub fn with_file_system(mut self, fs: Rc<dyn FileAccess>) -> Self {
        self.fs = Some(fs);
        self
    }

    pub fn with_decoder(mut self, decoder: DocDecoder) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn with_cipher(mut self, cipher: Rc<dyn Cipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    pub fn with_functions(mut self, functions: Registry) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_interpolation(mut self, enabled: bool) -> Self {
        self.interpolation = enabled;
        self
    }

    pub fn encryption_key(&self) -> Option<&str> {
        self.encryption_key.as_deref()
    }

    pub fn os_access_allowed(&self) -> bool {
        self.os_access
    }

    pub fn file_access_allowed(&self) -> bool {
        self.file_access
    }

    /// Filesystem for `read`: the configured virtual one, or the real OS
    /// when OS access is allowed.
    pub fn file_system(&self) -> Option<Rc<dyn FileAccess>> {
        match &self.fs {
            Some(fs) => Some(fs.clone()),
            None if self.os_access => Some(Rc::new(OsFileAccess)),
            None => None,
        }
    }

    pub fn decoder(&self) -> Option<DocDecoder> {
        self.decoder.clone()
    }

    pub fn cipher(&self) -> Option<Rc<dyn Cipher>> {
        self.cipher.clone()
    }

    pub fn functions(&self) -> &Registry {
        &self.functions
    }

    pub fn interpolation_enabled(&self) -> bool {
        self.interpolation
    }

    pub fn set_tag(&self, name: &str, node: Node, scope: TagScope) -> Result<(), String> {
        self.tags.borrow_mut().set(name, node, scope)
    }

    pub fn get_tag(&self, name: &str) -> Option<Tag> {
        self.tags.borrow().get(name).cloned()
    }

    pub fn reset_local_tags(&self) {
        self.tags.borrow_mut().reset_local();
    }

    /// End of stream: drop Stream tags and registered documents.
    pub fn reset_stream(&self) {
        self.tags.borrow_mut().reset_stream();
        self.docs.borrow_mut().clear();
    }

    /// Register a document of the current stream for `doc.N::` lookups.
    pub fn register_doc(&self, node: Node) {
        self.docs.borrow_mut().push(node);
    }

    /// Document by stream index; negative indices address from the end.
    pub fn doc(&self, index: i64) -> Option<Node> {
        let docs = self.docs.borrow();
        let idx = if index < 0 {
            docs.len().checked_sub(index.unsigned_abs() as usize)?
        } else {
            index as usize
        };
        docs.get(idx).cloned()
    }

    pub fn doc_count(&self) -> usize {
        self.docs.borrow().len()
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("os_access", &self.os_access)
            .field("file_access", &self.file_access)
            .field("interpolation", &self.interpolation)
            .field("docs", &self.docs.borrow().len())
            .finish()
    }
}
