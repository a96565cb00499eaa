//! LVS Health Monitoring Library
//!
//! Per-server health monitors: a shared edge-triggered state machine, the
//! interval-driven check loop, and the probes that feed it.

pub mod coordinator;
pub mod monitor;
pub mod probes;
pub mod state;
pub mod types;

pub use coordinator::{Coordinator, Notification, RecordingCoordinator};
pub use monitor::{LoopingMonitor, Monitor, Probe};
pub use probes::{RunCommandProbe, TcpConnectProbe};
pub use state::{HealthState, METRICS_NAMESPACE};
pub use types::*;
