//! IPv4 address math.

use std::net::Ipv4Addr;

use super::{int_arg, string_arg};
use crate::binding::Binding;
use crate::eval::EvalOut;
use crate::node::Node;

/// A parsed IPv4 network: base address and prefix length.
struct Net {
    base: u32,
    prefix: u32,
}

impl Net {
    fn mask(&self) -> u32 {
        if self.prefix == 0 {
            0
        } else {
            u32::MAX << (32 - self.prefix)
        }
    }

    fn first(&self) -> u32 {
        self.base & self.mask()
    }

    fn last(&self) -> u32 {
        self.first() | !self.mask()
    }
}

fn parse_ip(text: &str) -> Result<u32, String> {
    text.parse::<Ipv4Addr>()
        .map(u32::from)
        .map_err(|_| format!("invalid IPv4 address '{}'", text))
}

fn parse_net(text: &str, name: &str) -> Result<Net, EvalOut> {
    let result = match text.split_once('/') {
        Some((addr, prefix)) => {
            let base = parse_ip(addr);
            let prefix = prefix
                .parse::<u32>()
                .map_err(|_| format!("invalid prefix length '{}'", prefix))
                .and_then(|p| {
                    if p <= 32 {
                        Ok(p)
                    } else {
                        Err(format!("prefix length {} out of range", p))
                    }
                });
            base.and_then(|base| prefix.map(|prefix| Net { base, prefix }))
        }
        None => parse_ip(text).map(|base| Net { base, prefix: 32 }),
    };
    result.map_err(|message| EvalOut::fail(format!("{}: {}", name, message)))
}

fn ip_string(addr: u32) -> String {
    Ipv4Addr::from(addr).to_string()
}

/// `min_ip(cidr)` — first address of the network.
pub(super) fn min_ip(args: &[Node], _env: &Binding) -> EvalOut {
    let text = match string_arg(args, 0, "min_ip") {
        Ok(s) => s,
        Err(out) => return out,
    };
    match parse_net(text, "min_ip") {
        Ok(net) => EvalOut::value(Node::string(ip_string(net.first()))),
        Err(out) => out,
    }
}

/// `max_ip(cidr)` — last address of the network.
pub(super) fn max_ip(args: &[Node], _env: &Binding) -> EvalOut {
    let text = match string_arg(args, 0, "max_ip") {
        Ok(s) => s,
        Err(out) => return out,
    };
    match parse_net(text, "max_ip") {
        Ok(net) => EvalOut::value(Node::string(ip_string(net.last()))),
        Err(out) => out,
    }
}

/// `cidr(ip, prefix)` — the canonical network containing the address.
pub(super) fn cidr(args: &[Node], _env: &Binding) -> EvalOut {
    let text = match string_arg(args, 0, "cidr") {
        Ok(s) => s,
        Err(out) => return out,
    };
    let prefix = match int_arg(args, 1, "cidr") {
        Ok(v) => v,
        Err(out) => return out,
    };
    if !(0..=32).contains(&prefix) {
        return EvalOut::fail(format!("cidr: prefix length {} out of range", prefix));
    }
    let addr = match parse_net(text, "cidr") {
        Ok(net) => net.base,
        Err(out) => return out,
    };
    let net = Net {
        base: addr,
        prefix: prefix as u32,
    };
    EvalOut::value(Node::string(format!("{}/{}", ip_string(net.first()), prefix)))
}

/// `contains_ip(cidr, ip)`.
pub(super) fn contains_ip(args: &[Node], _env: &Binding) -> EvalOut {
    let net_text = match string_arg(args, 0, "contains_ip") {
        Ok(s) => s,
        Err(out) => return out,
    };
    let ip_text = match string_arg(args, 1, "contains_ip") {
        Ok(s) => s,
        Err(out) => return out,
    };
    let net = match parse_net(net_text, "contains_ip") {
        Ok(net) => net,
        Err(out) => return out,
    };
    let addr = match parse_ip(ip_text) {
        Ok(addr) => addr,
        Err(message) => return EvalOut::fail(format!("contains_ip: {}", message)),
    };
    EvalOut::value(Node::bool(addr >= net.first() && addr <= net.last()))
}

/// `ipset(cidr, prefix, index…)` — the selected sub-networks of the
/// given prefix length inside the range.
pub(super) fn ipset(args: &[Node], _env: &Binding) -> EvalOut {
    let text = match string_arg(args, 0, "ipset") {
        Ok(s) => s,
        Err(out) => return out,
    };
    let prefix = match int_arg(args, 1, "ipset") {
        Ok(v) => v,
        Err(out) => return out,
    };
    let net = match parse_net(text, "ipset") {
        Ok(net) => net,
        Err(out) => return out,
    };
    if !(0..=32).contains(&prefix) || (prefix as u32) < net.prefix {
        return EvalOut::fail(format!(
            "ipset: sub-network prefix {} does not fit in /{}",
            prefix, net.prefix
        ));
    }
    let sub_bits = 32 - prefix as u32;
    let count = 1u64 << (prefix as u32 - net.prefix);

    let mut result = Vec::new();
    for arg_index in 2..args.len() {
        let index = match int_arg(args, arg_index, "ipset") {
            Ok(v) => v,
            Err(out) => return out,
        };
        if index < 0 || index as u64 >= count {
            return EvalOut::fail(format!(
                "ipset: sub-network index {} out of range (0..{})",
                index,
                count - 1
            ));
        }
        let base = net.first() + ((index as u32) << sub_bits);
        result.push(Node::string(format!("{}/{}", ip_string(base), prefix)));
    }
    EvalOut::value(Node::list(result))
}
