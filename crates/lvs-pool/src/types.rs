//! Virtual service definition types

use lvs_core::{ConfigSection, LvsError, Result};
use lvs_prefix::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }

    /// ipvsadm service flag
    pub fn flag(&self) -> &'static str {
        match self {
            Self::Tcp => "-t",
            Self::Udp => "-u",
        }
    }
}

impl FromStr for Protocol {
    type Err = LvsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            other => Err(LvsError::Constraint(format!("invalid protocol {:?}", other))),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// IPVS scheduling algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheduler {
    /// Round robin
    Rr,
    /// Weighted round robin
    Wrr,
    /// Least connection
    Lc,
    /// Weighted least connection
    Wlc,
    /// Locality-based least connection
    Lblc,
    /// Locality-based least connection with replication
    Lblcr,
    /// Destination hashing
    Dh,
    /// Source hashing
    Sh,
    /// Shortest expected delay
    Sed,
    /// Never queue
    Nq,
}

impl Scheduler {
    pub const ALL: [Scheduler; 10] = [
        Self::Rr,
        Self::Wrr,
        Self::Lc,
        Self::Wlc,
        Self::Lblc,
        Self::Lblcr,
        Self::Dh,
        Self::Sh,
        Self::Sed,
        Self::Nq,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rr => "rr",
            Self::Wrr => "wrr",
            Self::Lc => "lc",
            Self::Wlc => "wlc",
            Self::Lblc => "lblc",
            Self::Lblcr => "lblcr",
            Self::Dh => "dh",
            Self::Sh => "sh",
            Self::Sed => "sed",
            Self::Nq => "nq",
        }
    }
}

impl FromStr for Scheduler {
    type Err = LvsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|scheduler| scheduler.as_str() == s)
            .ok_or_else(|| LvsError::Constraint(format!("invalid scheduler {:?}", s)))
    }
}

impl fmt::Display for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `(protocol, address, port, scheduler, ops)` tuple of one IPVS service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct VirtualService {
    protocol: Protocol,
    address: String,
    #[serde(skip)]
    ip: Address,
    port: u16,
    scheduler: Scheduler,
    one_packet_scheduling: bool,
}

impl VirtualService {
    /// One-packet scheduling is only valid for UDP services
    pub fn new(
        protocol: Protocol,
        address: &str,
        port: u16,
        scheduler: Scheduler,
        one_packet_scheduling: bool,
    ) -> Result<Self> {
        if one_packet_scheduling && protocol != Protocol::Udp {
            return Err(LvsError::Constraint(
                "one-packet scheduling can only be used with UDP virtual services".to_string(),
            ));
        }
        let ip: Address = address.parse()?;

        Ok(Self {
            protocol,
            address: address.to_string(),
            ip,
            port,
            scheduler,
            one_packet_scheduling,
        })
    }

    /// Build from the textual tuple, as found in configuration
    pub fn parse(
        protocol: &str,
        address: &str,
        port: u16,
        scheduler: &str,
        one_packet_scheduling: bool,
    ) -> Result<Self> {
        Self::new(
            protocol.parse()?,
            address,
            port,
            scheduler.parse()?,
            one_packet_scheduling,
        )
    }

    /// Keys `protocol`, `ip`, `port`, `scheduler` and optional `ops`
    pub fn from_section(section: &ConfigSection) -> Result<Self> {
        let port = section.get_int("port", None)?;
        let port = u16::try_from(port)
            .map_err(|_| LvsError::format(format!("port {} is out of range", port)))?;

        Self::parse(
            &section.get_string("protocol")?,
            &section.get_string("ip")?,
            port,
            &section.get_string("scheduler")?,
            section.get_bool("ops", Some(false))?,
        )
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// The address as configured, used verbatim in commands
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn ip(&self) -> Address {
        self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn scheduler(&self) -> Scheduler {
        self.scheduler
    }

    pub fn one_packet_scheduling(&self) -> bool {
        self.one_packet_scheduling
    }

    pub fn is_ipv6(&self) -> bool {
        self.address.contains(':')
    }
}

impl fmt::Display for VirtualService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ipv6() {
            write!(f, "{} [{}]:{}", self.protocol.flag(), self.address, self.port)
        } else {
            write!(f, "{} {}:{}", self.protocol.flag(), self.address, self.port)
        }
    }
}
