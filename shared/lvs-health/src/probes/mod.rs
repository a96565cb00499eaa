//! Concrete probes driven by [`LoopingMonitor`](crate::LoopingMonitor)

mod runcommand;
mod tcp;

pub use runcommand::RunCommandProbe;
pub use tcp::TcpConnectProbe;
