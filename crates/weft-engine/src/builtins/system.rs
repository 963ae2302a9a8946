//! Capability-gated built-ins: file reading, environment access,
//! command execution, encryption, and DynaML re-evaluation.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use indexmap::IndexMap;

use super::string_arg;
use crate::binding::Binding;
use crate::eval::{evaluate, EvalOut};
use crate::node::Node;

fn denied(name: &str, capability: &str) -> EvalOut {
    EvalOut::fail(format!(
        "{}: no {} allowed in this execution environment",
        name, capability
    ))
}

/// `read(path [, type])` with type `text` (default), `binary` (base64
/// of the content), or `yaml`/`json` through the State's decoder hook.
pub(super) fn read(args: &[Node], env: &Binding) -> EvalOut {
    let state = env.state();
    if !state.file_access_allowed() {
        return denied("read", "file access");
    }
    let path = match string_arg(args, 0, "read") {
        Ok(s) => s,
        Err(out) => return out,
    };
    let kind = if args.len() > 1 {
        match string_arg(args, 1, "read") {
            Ok(s) => s.to_string(),
            Err(out) => return out,
        }
    } else {
        "text".to_string()
    };

    let fs = match state.file_system() {
        Some(fs) => fs,
        None => return denied("read", "filesystem access"),
    };
    let data = match fs.read(path) {
        Ok(data) => data,
        Err(err) => return EvalOut::fail(format!("read: {}: {}", path, err)),
    };

    match kind.as_str() {
        "binary" => EvalOut::value(Node::string(BASE64_STANDARD.encode(&data))),
        "text" => match String::from_utf8(data) {
            Ok(text) => EvalOut::value(Node::string(text)),
            Err(_) => EvalOut::fail(format!("read: {}: not valid UTF-8", path)),
        },
        "yaml" | "json" => {
            let text = match String::from_utf8(data) {
                Ok(text) => text,
                Err(_) => return EvalOut::fail(format!("read: {}: not valid UTF-8", path)),
            };
            match state.decoder() {
                Some(decode) => match decode(&text) {
                    Ok(node) => EvalOut::value(node),
                    Err(err) => EvalOut::fail(format!("read: {}: {}", path, err)),
                },
                None => EvalOut::fail("read: no document decoder configured"),
            }
        }
        other => EvalOut::fail(format!("read: unknown type '{}'", other)),
    }
}

/// `env(name)` — one variable; `env()` — all of them as a map.
pub(super) fn env(args: &[Node], binding: &Binding) -> EvalOut {
    if !binding.state().os_access_allowed() {
        return denied("env", "OS access");
    }
    if args.is_empty() {
        let mut entries = IndexMap::new();
        for (key, value) in std::env::vars() {
            entries.insert(key, Node::string(value));
        }
        return EvalOut::value(Node::map(entries));
    }
    let name = match string_arg(args, 0, "env") {
        Ok(s) => s,
        Err(out) => return out,
    };
    match std::env::var(name) {
        Ok(value) => EvalOut::value(Node::string(value)),
        Err(_) => EvalOut::fail(format!("env: '{}' not set", name)),
    }
}

/// `exec(cmd, args…)` — run a command, yielding its trimmed stdout.
pub(super) fn exec(args: &[Node], binding: &Binding) -> EvalOut {
    if !binding.state().os_access_allowed() {
        return denied("exec", "OS access");
    }
    let program = match string_arg(args, 0, "exec") {
        Ok(s) => s,
        Err(out) => return out,
    };
    let mut command = std::process::Command::new(program);
    for arg in &args[1..] {
        command.arg(arg.stringify());
    }
    match command.output() {
        Ok(output) => {
            if !output.status.success() {
                return EvalOut::fail(format!(
                    "exec: '{}' failed: {}",
                    program,
                    String::from_utf8_lossy(&output.stderr).trim()
                ));
            }
            let stdout = String::from_utf8_lossy(&output.stdout);
            EvalOut::value(Node::string(stdout.trim_end().to_string()))
        }
        Err(err) => EvalOut::fail(format!("exec: '{}': {}", program, err)),
    }
}

pub(super) fn encrypt(args: &[Node], binding: &Binding) -> EvalOut {
    let state = binding.state();
    let plain = match string_arg(args, 0, "encrypt") {
        Ok(s) => s,
        Err(out) => return out,
    };
    let key = match state.encryption_key() {
        Some(key) => key.to_string(),
        None => return EvalOut::fail("encrypt: no encryption key configured"),
    };
    match state.cipher() {
        Some(cipher) => match cipher.encrypt(plain.as_bytes(), &key) {
            Ok(data) => EvalOut::value(Node::string(data)),
            Err(err) => EvalOut::fail(format!("encrypt: {}", err)),
        },
        None => EvalOut::fail("encrypt: no cipher configured"),
    }
}

pub(super) fn decrypt(args: &[Node], binding: &Binding) -> EvalOut {
    let state = binding.state();
    let data = match string_arg(args, 0, "decrypt") {
        Ok(s) => s,
        Err(out) => return out,
    };
    let key = match state.encryption_key() {
        Some(key) => key.to_string(),
        None => return EvalOut::fail("decrypt: no encryption key configured"),
    };
    match state.cipher() {
        Some(cipher) => match cipher.decrypt(data, &key) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => EvalOut::value(Node::string(text)),
                Err(_) => EvalOut::fail("decrypt: result is not valid UTF-8"),
            },
            Err(err) => EvalOut::fail(format!("decrypt: {}", err)),
        },
        None => EvalOut::fail("decrypt: no cipher configured"),
    }
}

/// `eval(text)` — parse and evaluate a DynaML expression in the current
/// binding.
pub(super) fn eval_str(args: &[Node], binding: &Binding) -> EvalOut {
    let text = match string_arg(args, 0, "eval") {
        Ok(s) => s,
        Err(out) => return out,
    };
    match weft_dynaml::parse_expression(text) {
        Ok(expr) => evaluate(&expr, binding, false),
        Err(err) => EvalOut::fail(format!("eval: {}", err)),
    }
}
