//! Encoding and hashing built-ins.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use md5::{Digest as _, Md5};
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use super::string_arg;
use crate::binding::Binding;
use crate::eval::EvalOut;
use crate::node::Node;

pub(super) fn base64_encode(args: &[Node], _env: &Binding) -> EvalOut {
    match string_arg(args, 0, "base64") {
        Ok(s) => EvalOut::value(Node::string(BASE64_STANDARD.encode(s.as_bytes()))),
        Err(out) => out,
    }
}

pub(super) fn base64_decode(args: &[Node], _env: &Binding) -> EvalOut {
    let encoded = match string_arg(args, 0, "base64_decode") {
        Ok(s) => s,
        Err(out) => return out,
    };
    let bytes = match BASE64_STANDARD.decode(encoded.trim()) {
        Ok(bytes) => bytes,
        Err(err) => return EvalOut::fail(format!("base64_decode: {}", err)),
    };
    match String::from_utf8(bytes) {
        Ok(text) => EvalOut::value(Node::string(text)),
        Err(_) => EvalOut::fail("base64_decode: result is not valid UTF-8"),
    }
}

pub(super) fn hex_encode(args: &[Node], _env: &Binding) -> EvalOut {
    match string_arg(args, 0, "hex") {
        Ok(s) => EvalOut::value(Node::string(hex::encode(s.as_bytes()))),
        Err(out) => out,
    }
}

pub(super) fn md5_digest(args: &[Node], _env: &Binding) -> EvalOut {
    match string_arg(args, 0, "md5") {
        Ok(s) => {
            let mut hasher = Md5::new();
            hasher.update(s.as_bytes());
            EvalOut::value(Node::string(hex::encode(hasher.finalize())))
        }
        Err(out) => out,
    }
}

pub(super) fn sha1_digest(args: &[Node], _env: &Binding) -> EvalOut {
    match string_arg(args, 0, "sha1") {
        Ok(s) => {
            let mut hasher = Sha1::new();
            hasher.update(s.as_bytes());
            EvalOut::value(Node::string(hex::encode(hasher.finalize())))
        }
        Err(out) => out,
    }
}

pub(super) fn sha256_digest(args: &[Node], _env: &Binding) -> EvalOut {
    match string_arg(args, 0, "sha256") {
        Ok(s) => {
            let mut hasher = Sha256::new();
            hasher.update(s.as_bytes());
            EvalOut::value(Node::string(hex::encode(hasher.finalize())))
        }
        Err(out) => out,
    }
}

pub(super) fn sha512_digest(args: &[Node], _env: &Binding) -> EvalOut {
    match string_arg(args, 0, "sha512") {
        Ok(s) => {
            let mut hasher = Sha512::new();
            hasher.update(s.as_bytes());
            EvalOut::value(Node::string(hex::encode(hasher.finalize())))
        }
        Err(out) => out,
    }
}
