//! ipvsadm command construction
//!
//! Each command renders as one line of `ipvsadm -R` input. Construction is
//! pure; applying commands is the executor's job.

use std::fmt;

use crate::server::Server;
use crate::types::VirtualService;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpvsCommand {
    /// `-C`
    ClearServiceTable,
    /// `-A <service> -s <scheduler> [-o]`
    AddService(VirtualService),
    /// `-D <service>`
    RemoveService(VirtualService),
    /// `-a <service> -r <target> [-w <weight>]`
    AddServer {
        service: VirtualService,
        target: String,
        weight: Option<u32>,
    },
    /// `-e <service> -r <target> [-w <weight>]`
    EditServer {
        service: VirtualService,
        target: String,
        weight: Option<u32>,
    },
    /// `-d <service> -r <target>`
    RemoveServer {
        service: VirtualService,
        target: String,
    },
}

impl IpvsCommand {
    pub fn add_server(service: &VirtualService, server: &Server) -> Self {
        Self::AddServer {
            service: service.clone(),
            target: server.target().to_string(),
            weight: server.command_weight(),
        }
    }

    pub fn edit_server(service: &VirtualService, server: &Server) -> Self {
        Self::EditServer {
            service: service.clone(),
            target: server.target().to_string(),
            weight: server.command_weight(),
        }
    }

    pub fn remove_server(service: &VirtualService, server: &Server) -> Self {
        Self::RemoveServer {
            service: service.clone(),
            target: server.target().to_string(),
        }
    }
}

fn write_weight(f: &mut fmt::Formatter<'_>, weight: Option<u32>) -> fmt::Result {
    match weight {
        Some(weight) => write!(f, " -w {}", weight),
        None => Ok(()),
    }
}

impl fmt::Display for IpvsCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClearServiceTable => f.write_str("-C"),
            Self::AddService(service) => {
                write!(f, "-A {} -s {}", service, service.scheduler())?;
                if service.one_packet_scheduling() {
                    f.write_str(" -o")?;
                }
                Ok(())
            }
            Self::RemoveService(service) => write!(f, "-D {}", service),
            Self::AddServer {
                service,
                target,
                weight,
            } => {
                write!(f, "-a {} -r {}", service, target)?;
                write_weight(f, *weight)
            }
            Self::EditServer {
                service,
                target,
                weight,
            } => {
                write!(f, "-e {} -r {}", service, target)?;
                write_weight(f, *weight)
            }
            Self::RemoveServer { service, target } => write!(f, "-d {} -r {}", service, target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v6() -> VirtualService {
        VirtualService::parse("tcp", "2620::123", 443, "rr", false).unwrap()
    }

    fn v4() -> VirtualService {
        VirtualService::parse("udp", "208.0.0.1", 123, "rr", false).unwrap()
    }

    fn server() -> Server {
        Server::new("localhost")
    }

    #[test]
    fn test_clear_service_table() {
        assert_eq!(IpvsCommand::ClearServiceTable.to_string(), "-C");
    }

    #[test]
    fn test_service_commands() {
        assert_eq!(IpvsCommand::RemoveService(v6()).to_string(), "-D -t [2620::123]:443");
        assert_eq!(IpvsCommand::AddService(v6()).to_string(), "-A -t [2620::123]:443 -s rr");

        let ops = VirtualService::parse("udp", "2620::123", 443, "rr", true).unwrap();
        assert_eq!(
            IpvsCommand::AddService(ops).to_string(),
            "-A -u [2620::123]:443 -s rr -o"
        );
    }

    #[test]
    fn test_server_commands() {
        assert_eq!(
            IpvsCommand::remove_server(&v6(), &server()).to_string(),
            "-d -t [2620::123]:443 -r localhost"
        );
        assert_eq!(
            IpvsCommand::add_server(&v6(), &server()).to_string(),
            "-a -t [2620::123]:443 -r localhost"
        );
        assert_eq!(
            IpvsCommand::add_server(&v6(), &server().with_weight(25)).to_string(),
            "-a -t [2620::123]:443 -r localhost -w 25"
        );
        assert_eq!(
            IpvsCommand::edit_server(&v6(), &server()).to_string(),
            "-e -t [2620::123]:443 -r localhost"
        );
        assert_eq!(
            IpvsCommand::edit_server(&v6(), &server().with_weight(25)).to_string(),
            "-e -t [2620::123]:443 -r localhost -w 25"
        );
    }

    #[test]
    fn test_server_subcommand_prefers_ip() {
        let bound = Server::new("localhost").with_ip("127.0.0.1");
        assert_eq!(
            IpvsCommand::remove_server(&v4(), &bound).to_string(),
            "-d -u 208.0.0.1:123 -r 127.0.0.1"
        );
    }
}
