//! Inbound request classification
//!
//! The recorder sits in the path as an outbound proxy. A request whose
//! Request-URI points at this node itself is refused; INVITEs are
//! recorded, REGISTER and SUBSCRIBE are passed through.

use std::fmt;

use nom::{
    IResult,
    character::complete::{alpha1, char},
    combinator::{all_consuming, map},
    sequence::tuple,
};
use tracing::{debug, info};

use crate::config::IngressConfig;
use crate::signaling::uri::{host, port};
use crate::signaling::{reason_phrase, SipUri, DEFAULT_SIP_PORT};

/// What to do with an inbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressDecision {
    /// Run the recording orchestrator
    Record,
    /// Forward unchanged
    Proxy,
    /// Answer with a final failure response
    Reject { status: u16, reason: &'static str },
}

impl IngressDecision {
    fn reject(status: u16) -> Self {
        IngressDecision::Reject {
            status,
            reason: reason_phrase(status),
        }
    }
}

/// A host/port the signaling server listens on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalHostPort {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for LocalHostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// transport "/" host ":" port, e.g. `udp/10.0.0.1:5060` or `tcp/[::1]:5060`
fn listening_address(input: &str) -> IResult<&str, LocalHostPort> {
    map(
        tuple((alpha1, char('/'), host, char(':'), port)),
        |(_, _, host, _, port)| LocalHostPort {
            host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
            port,
        },
    )(input)
}

/// Parse a listening announcement such as
/// `udp/10.0.0.1:5060,tcp/10.0.0.1:5060`. Malformed entries are skipped.
pub fn parse_local_hostports(announcement: &str) -> Vec<LocalHostPort> {
    announcement
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match all_consuming(listening_address)(entry) {
            Ok((_, hostport)) => Some(hostport),
            Err(_) => {
                debug!("ignoring malformed listening address: {}", entry);
                None
            }
        })
        .collect()
}

/// Decides how inbound requests are handled
#[derive(Debug, Clone, Default)]
pub struct IngressFilter {
    local_dns_names: Vec<String>,
    local_hostports: Vec<LocalHostPort>,
}

impl IngressFilter {
    pub fn new(local_dns_names: Vec<String>) -> Self {
        Self {
            local_dns_names,
            local_hostports: Vec::new(),
        }
    }

    pub fn from_config(config: &IngressConfig) -> Self {
        Self::new(config.local_dns_names.clone())
    }

    pub fn add_local_hostports(&mut self, hostports: impl IntoIterator<Item = LocalHostPort>) {
        for hostport in hostports {
            if !self.local_hostports.contains(&hostport) {
                self.local_hostports.push(hostport);
            }
        }
    }

    pub fn local_hostports(&self) -> &[LocalHostPort] {
        &self.local_hostports
    }

    /// Whether the Request-URI names this node
    pub fn is_addressed_to_us(&self, uri: &SipUri) -> bool {
        if self
            .local_dns_names
            .iter()
            .any(|name| name.eq_ignore_ascii_case(&uri.host))
        {
            return true;
        }
        let host = uri.host.trim_start_matches('[').trim_end_matches(']');
        let port = uri.port.unwrap_or(DEFAULT_SIP_PORT);
        self.local_hostports
            .iter()
            .any(|hp| hp.host.eq_ignore_ascii_case(host) && hp.port == port)
    }

    pub fn decide(&self, method: &str, uri: &SipUri) -> IngressDecision {
        if self.is_addressed_to_us(uri) {
            info!("discarding {} addressed to us: {}", method, uri);
            return IngressDecision::reject(503);
        }
        match method.to_ascii_uppercase().as_str() {
            "INVITE" => IngressDecision::Record,
            "REGISTER" | "SUBSCRIBE" => IngressDecision::Proxy,
            _ => IngressDecision::reject(405),
        }
    }
}
