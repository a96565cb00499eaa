//! Real server definitions

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

pub const DEFAULT_PORT: u16 = 80;
pub const DEFAULT_WEIGHT: u32 = 10;

/// One backend of a virtual service.
///
/// Identity is `(host, ip, port)`. Weight is left out so a server whose
/// weight changed is still recognised as installed and gets an edit.
#[derive(Debug, Clone, Serialize)]
pub struct Server {
    pub host: String,
    /// Bound address; when absent the host name is handed to ipvsadm
    pub ip: Option<String>,
    pub ip4_addresses: BTreeSet<String>,
    pub ip6_addresses: BTreeSet<String>,
    pub port: u16,
    /// A weight of `None` or zero is left to the ipvsadm default
    pub weight: Option<u32>,
    pub enabled: bool,
    pooled: bool,
    /// Name of the owning service, once attached
    service: Option<String>,
}

/// Per-server options from a server list entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServerOptions {
    pub weight: Option<u32>,
    pub enabled: Option<bool>,
}

/// Status dump of one server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerState {
    pub pooled: bool,
    pub weight: Option<u32>,
    pub enabled: bool,
}

impl Server {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ip: None,
            ip4_addresses: BTreeSet::new(),
            ip6_addresses: BTreeSet::new(),
            port: DEFAULT_PORT,
            weight: None,
            enabled: true,
            pooled: false,
            service: None,
        }
    }

    /// A server from a server list entry, weighted 10 unless overridden
    pub fn build(host: impl Into<String>, options: &ServerOptions) -> Self {
        let mut server = Self::new(host).with_weight(DEFAULT_WEIGHT);
        server.merge(options);
        server
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Apply the options present in `options`, leaving the rest untouched
    pub fn merge(&mut self, options: &ServerOptions) {
        if let Some(weight) = options.weight {
            self.weight = Some(weight);
        }
        if let Some(enabled) = options.enabled {
            self.enabled = enabled;
        }
    }

    /// Record resolved addresses. The first address of the service's family
    /// becomes the bound ip if none is set yet.
    pub fn record_addresses<I>(&mut self, addresses: I, ipv6: bool)
    where
        I: IntoIterator<Item = String>,
    {
        let set = if ipv6 {
            &mut self.ip6_addresses
        } else {
            &mut self.ip4_addresses
        };
        set.extend(addresses);
        if self.ip.is_none() {
            self.ip = set.iter().next().cloned();
        }
    }

    /// What the forwarding table is told to send traffic to
    pub fn target(&self) -> &str {
        self.ip.as_deref().unwrap_or(&self.host)
    }

    /// Only changed by the pool engine after a table mutation
    pub fn is_pooled(&self) -> bool {
        self.pooled
    }

    pub(crate) fn set_pooled(&mut self, pooled: bool) {
        self.pooled = pooled;
    }

    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    pub(crate) fn attach(&mut self, service: &str) {
        self.service = Some(service.to_string());
    }

    /// Weight as written into a command, if any
    pub(crate) fn command_weight(&self) -> Option<u32> {
        self.weight.filter(|w| *w > 0)
    }

    pub fn dump_state(&self) -> ServerState {
        ServerState {
            pooled: self.pooled,
            weight: self.weight,
            enabled: self.enabled,
        }
    }

    fn key(&self) -> (&str, Option<&str>, u16) {
        (&self.host, self.ip.as_deref(), self.port)
    }
}

impl PartialEq for Server {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Server {}

impl Hash for Server {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl Ord for Server {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl PartialOrd for Server {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ip {
            Some(ip) => write!(f, "{} ({}:{})", self.host, ip, self.port),
            None => write!(f, "{}:{}", self.host, self.port),
        }
    }
}
