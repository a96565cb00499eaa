//! TCP connect probe

use async_trait::async_trait;
use lvs_core::Result;
use std::io::ErrorKind;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tracing::debug;

use crate::monitor::Probe;
use crate::types::ProbeOutcome;

/// Up when a TCP connection to the server can be established
#[derive(Debug, Clone)]
pub struct TcpConnectProbe {
    addr: SocketAddr,
}

impl TcpConnectProbe {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

#[async_trait]
impl Probe for TcpConnectProbe {
    fn name(&self) -> &str {
        "TcpConnect"
    }

    async fn probe(&self) -> Result<ProbeOutcome> {
        match TcpStream::connect(self.addr).await {
            Ok(_stream) => {
                debug!(addr = %self.addr, "TCP connection established");
                Ok(ProbeOutcome::Up)
            }
            Err(e) => {
                let reason = match e.kind() {
                    ErrorKind::ConnectionRefused => "Connection refused".to_string(),
                    ErrorKind::TimedOut => "Connection timed out".to_string(),
                    ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
                        "Connection lost".to_string()
                    }
                    _ => format!("Connection failed: {}", e),
                };
                Ok(ProbeOutcome::Down(reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_to_listener_is_up() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let probe = TcpConnectProbe::new(listener.local_addr().unwrap());
        assert_eq!(probe.probe().await.unwrap(), ProbeOutcome::Up);
    }

    #[tokio::test]
    async fn test_refused_connection_is_down() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let probe = TcpConnectProbe::new(addr);
        assert!(matches!(probe.probe().await.unwrap(), ProbeOutcome::Down(_)));
    }
}
