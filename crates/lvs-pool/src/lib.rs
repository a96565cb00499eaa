//! LVS Pool Reconciliation
//!
//! Keeps one IPVS virtual service's real-server table in line with the set
//! of servers the orchestrator wants pooled:
//! - Virtual service and real server definitions
//! - ipvsadm command construction
//! - The reconciliation engine and its installed-server bookkeeping
//! - Executors that apply command batches to the kernel table

pub mod command;
pub mod executor;
pub mod server;
pub mod service;
pub mod types;

pub use command::IpvsCommand;
pub use executor::{IpvsadmExecutor, RecordingExecutor, TableExecutor};
pub use lvs_core::{LvsError, Result};
pub use server::{Server, ServerOptions, ServerState};
pub use service::{LvsService, RouteAnnouncement};
pub use types::{Protocol, Scheduler, VirtualService};
