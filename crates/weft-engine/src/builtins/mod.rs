//! Built-in function registry.
//!
//! Functions are registered by name with their arity bounds and whether
//! under-application curries. They receive fully resolved argument
//! nodes; deferral of unresolved arguments happens in the call layer.

mod collections;
mod encoding;
mod ipmath;
mod math;
mod strings;
mod system;

use indexmap::IndexMap;

use crate::binding::Binding;
use crate::eval::EvalOut;
use crate::node::{Node, Value};

/// A built-in implementation.
pub type BuiltinFn = fn(&[Node], &Binding) -> EvalOut;

/// Registry entry: implementation plus call contract.
#[derive(Clone, Copy)]
pub struct Builtin {
    pub func: BuiltinFn,
    pub min_args: usize,
    pub max_args: Option<usize>,
    /// Whether calls with fewer than `min_args` arguments produce a
    /// curried lambda instead of an arity error.
    pub curryable: bool,
}

/// Named function catalog, extensible with user functions.
#[derive(Clone, Default)]
pub struct Registry {
    functions: IndexMap<String, Builtin>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn register(
        &mut self,
        name: &str,
        func: BuiltinFn,
        min_args: usize,
        max_args: Option<usize>,
        curryable: bool,
    ) {
        self.functions.insert(
            name.to_string(),
            Builtin {
                func,
                min_args,
                max_args,
                curryable,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&Builtin> {
        self.functions.get(name)
    }

    /// The standard catalog.
    pub fn standard() -> Self {
        let mut r = Registry::new();

        // strings
        r.register("trim", strings::trim, 1, Some(1), false);
        r.register("split", strings::split, 2, Some(2), true);
        r.register("join", strings::join, 1, None, true);
        r.register("replace", strings::replace, 3, Some(4), true);
        r.register("uppercase", strings::uppercase, 1, Some(1), false);
        r.register("lowercase", strings::lowercase, 1, Some(1), false);
        r.register("match", strings::match_, 2, Some(2), true);
        r.register("format", strings::format, 1, None, true);

        // arithmetic
        r.register("min", math::min, 2, None, true);
        r.register("max", math::max, 2, None, true);
        r.register("mod", math::modulo, 2, Some(2), true);
        r.register("abs", math::abs, 1, Some(1), false);

        // collections
        r.register("length", collections::length, 1, Some(1), false);
        r.register("keys", collections::keys, 1, Some(1), false);
        r.register("values", collections::values, 1, Some(1), false);
        r.register("contains", collections::contains, 2, Some(2), true);
        r.register("uniq", collections::uniq, 1, Some(1), false);
        r.register("sort", collections::sort, 1, Some(1), false);

        // encoding and hashing
        r.register("base64", encoding::base64_encode, 1, Some(1), false);
        r.register("base64_decode", encoding::base64_decode, 1, Some(1), false);
        r.register("hex", encoding::hex_encode, 1, Some(1), false);
        r.register("md5", encoding::md5_digest, 1, Some(1), false);
        r.register("sha1", encoding::sha1_digest, 1, Some(1), false);
        r.register("sha256", encoding::sha256_digest, 1, Some(1), false);
        r.register("sha512", encoding::sha512_digest, 1, Some(1), false);

        // IPv4 math
        r.register("min_ip", ipmath::min_ip, 1, Some(1), false);
        r.register("max_ip", ipmath::max_ip, 1, Some(1), false);
        r.register("cidr", ipmath::cidr, 2, Some(2), true);
        r.register("contains_ip", ipmath::contains_ip, 2, Some(2), true);
        r.register("ipset", ipmath::ipset, 3, None, false);

        // system (capability gated)
        r.register("read", system::read, 1, Some(2), false);
        r.register("env", system::env, 0, None, false);
        r.register("exec", system::exec, 1, None, false);
        r.register("encrypt", system::encrypt, 1, Some(1), false);
        r.register("decrypt", system::decrypt, 1, Some(1), false);
        r.register("eval", system::eval_str, 1, Some(1), false);

        r
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ── shared argument accessors ──

pub(crate) fn string_arg<'a>(args: &'a [Node], index: usize, name: &str) -> Result<&'a str, EvalOut> {
    match &args[index].value {
        Value::String(s) => Ok(s),
        other => Err(EvalOut::fail(format!(
            "{}: argument {} must be a string, found {}",
            name,
            index + 1,
            other.type_name()
        ))),
    }
}

pub(crate) fn int_arg(args: &[Node], index: usize, name: &str) -> Result<i64, EvalOut> {
    match &args[index].value {
        Value::Int(v) => Ok(*v),
        other => Err(EvalOut::fail(format!(
            "{}: argument {} must be an integer, found {}",
            name,
            index + 1,
            other.type_name()
        ))),
    }
}

pub(crate) fn list_arg<'a>(
    args: &'a [Node],
    index: usize,
    name: &str,
) -> Result<&'a [Node], EvalOut> {
    match &args[index].value {
        Value::List(items) => Ok(items),
        other => Err(EvalOut::fail(format!(
            "{}: argument {} must be a list, found {}",
            name,
            index + 1,
            other.type_name()
        ))),
    }
}
