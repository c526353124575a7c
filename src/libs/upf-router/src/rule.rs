//! Matching rules and the first-match rule list
//!
//! A rule matches on protocol, destination CIDR and destination port, with
//! `*` wildcards for protocol and port. The textual form is
//! `<protocol|*>-<address>/<prefix>-<port|*>`, e.g. `6-192.168.1.0/24-80`.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use upf_net::ipv4::Ipv4Decoder;
use upf_net::sctp::SctpDecoder;
use upf_net::tcp::TcpDecoder;
use upf_net::types::{ipv4_protocol, Ipv4Cidr, PORT_INVALID};
use upf_net::udp::UdpDecoder;

use crate::error::{RouterError, RouterResult};

/// One matching rule. Protocol 0 and port 0 mean "any".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchingRule {
    pub protocol: u8,
    pub dst_cidr: Ipv4Cidr,
    pub dst_port: u16,
}

impl Default for MatchingRule {
    /// A rule matching any IPv4 packet.
    fn default() -> Self {
        MatchingRule {
            protocol: ipv4_protocol::NONE,
            dst_cidr: Ipv4Cidr::default(),
            dst_port: PORT_INVALID,
        }
    }
}

impl FromStr for MatchingRule {
    type Err = RouterError;

    fn from_str(s: &str) -> RouterResult<Self> {
        let invalid = |reason: &str| RouterError::InvalidRule(format!("{reason} in {s:?}"));

        let mut groups = s.trim().split('-');
        let proto_str = groups.next().ok_or_else(|| invalid("missing protocol"))?;
        let cidr_str = groups.next().ok_or_else(|| invalid("missing CIDR"))?;
        let port_str = groups.next().ok_or_else(|| invalid("missing port"))?;
        if groups.next().is_some() {
            return Err(invalid("trailing groups"));
        }

        let protocol = if proto_str == "*" {
            ipv4_protocol::NONE
        } else {
            proto_str
                .parse::<u8>()
                .map_err(|_| invalid("invalid protocol number"))?
        };

        let (addr_str, prefix_str) = cidr_str
            .split_once('/')
            .ok_or_else(|| invalid("CIDR without prefix"))?;
        let addr = addr_str
            .parse::<Ipv4Addr>()
            .map_err(|_| invalid("invalid address"))?;
        let prefix = prefix_str
            .parse::<u8>()
            .map_err(|_| invalid("invalid prefix"))?;
        let dst_cidr = Ipv4Cidr::new(addr, prefix).ok_or_else(|| invalid("prefix above 32"))?;

        let dst_port = if port_str == "*" {
            PORT_INVALID
        } else {
            let port = port_str
                .parse::<u16>()
                .map_err(|_| invalid("invalid port number"))?;
            // An explicit 0 also means "any".
            port
        };

        Ok(MatchingRule {
            protocol,
            dst_cidr,
            dst_port,
        })
    }
}

impl fmt::Display for MatchingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.protocol == ipv4_protocol::NONE {
            write!(f, "*-")?;
        } else {
            write!(f, "{}-", self.protocol)?;
        }
        write!(f, "{}-", self.dst_cidr)?;
        if self.dst_port == PORT_INVALID {
            write!(f, "*")
        } else {
            write!(f, "{}", self.dst_port)
        }
    }
}

/// Ordered list of rules with first-match semantics.
#[derive(Debug, Default)]
pub struct RuleMatcher {
    rules: Vec<MatchingRule>,
}

impl RuleMatcher {
    /// Position constant meaning "at the end of the list".
    pub const END_POSITION: usize = usize::MAX;

    pub fn new() -> Self {
        Self::default()
    }

    /// True when any rule matches the packet behind `ipv4`.
    pub fn matches(&self, ipv4: &Ipv4Decoder) -> bool {
        self.rules.iter().any(|rule| rule_matches(rule, ipv4))
    }

    /// Insert at the 0-based position; positions past the end append.
    pub fn add_rule(&mut self, rule: MatchingRule, position: usize) {
        if position >= self.rules.len() {
            self.rules.push(rule);
        } else {
            self.rules.insert(position, rule);
        }
    }

    /// Delete the rule at the 0-based position; positions past the end
    /// delete the last rule.
    pub fn del_rule(&mut self, position: usize) {
        if self.rules.is_empty() {
            return;
        }
        if position >= self.rules.len() {
            self.rules.pop();
        } else {
            self.rules.remove(position);
        }
    }

    pub fn clear_rules(&mut self) {
        self.rules.clear();
    }

    pub fn rules(&self) -> &[MatchingRule] {
        &self.rules
    }
}

fn rule_matches(rule: &MatchingRule, ipv4: &Ipv4Decoder) -> bool {
    if rule.protocol != ipv4_protocol::NONE && rule.protocol != ipv4.protocol() {
        return false;
    }

    if !rule.dst_cidr.matches(ipv4.dst_addr()) {
        return false;
    }

    // A port requirement only ever matches TCP/UDP/SCTP packets.
    if rule.dst_port != PORT_INVALID {
        let packet_port = transport_dst_port(ipv4);
        if packet_port != Some(rule.dst_port) {
            return false;
        }
    }

    true
}

fn transport_dst_port(ipv4: &Ipv4Decoder) -> Option<u16> {
    let payload = ipv4.data().ok()?;
    if ipv4.is_tcp() {
        TcpDecoder::new(payload).ok().map(|d| d.dst_port())
    } else if ipv4.is_udp() {
        UdpDecoder::new(payload).ok().map(|d| d.dst_port())
    } else if ipv4.is_sctp() {
        SctpDecoder::new(payload).ok().map(|d| d.dst_port())
    } else {
        None
    }
}
