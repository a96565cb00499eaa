//! Health monitoring types

use chrono::{DateTime, Utc};
use lvs_telemetry::MetricLabels;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A monitor's classification of its server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// No check has completed yet
    #[default]
    Unknown,
    Up,
    Down,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown"),
            Self::Up => f.write_str("up"),
            Self::Down => f.write_str("down"),
        }
    }
}

/// Identifies one (service, server, monitor type) instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonitorLabels {
    pub service: String,
    pub host: String,
    pub monitor: String,
}

impl MonitorLabels {
    pub fn new(
        service: impl Into<String>,
        host: impl Into<String>,
        monitor: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            host: host.into(),
            monitor: monitor.into(),
        }
    }

    pub fn metric_labels(&self) -> MetricLabels {
        MetricLabels::new(&self.service, &self.host, &self.monitor)
    }
}

impl fmt::Display for MonitorLabels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.service, self.monitor, self.host)
    }
}

/// How a single probe attempt ended.
///
/// Faults (probe bugs, resources that cannot be set up) are not outcomes;
/// probes return them as `Err(LvsError::ProbeFault)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Up,
    /// A failure the configuration says still counts as up
    AcceptableFailure(String),
    Down(String),
    /// The attempt was cancelled by `stop()`; never reported
    Cancelled,
}

/// Point-in-time view of a monitor for status dumps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    pub labels: MonitorLabels,
    pub verdict: Verdict,
    pub active: bool,
    pub first_check_done: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub last_reason: Option<String>,
    pub up_results: u64,
    pub down_results: u64,
}
