//! Reconciliation of one virtual service's real-server table
//!
//! [`LvsService`] owns the set of servers it believes are installed in the
//! kernel table and turns pool changes into ordered command batches:
//!
//! - `reconcile` adds new servers first, then edits the ones that stay, then
//!   removes the ones that left, so capacity is added before it is withdrawn
//! - `pool_one` on a server that is already installed logs a warning and
//!   edits instead of adding twice
//! - `depool_one` on a server that was never installed is a caller error
//!
//! Bookkeeping always follows the request, even when the executor then
//! reports [`LvsError::TableApply`]. The caller decides whether to retry or
//! resynchronise.
//!
//! Operations take `&mut self`; one writer per service.

use lvs_core::{ConfigSection, LvsError, Result};
use lvs_prefix::Prefix;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::command::IpvsCommand;
use crate::executor::TableExecutor;
use crate::server::Server;
use crate::types::VirtualService;

pub const DEFAULT_DEPOOL_THRESHOLD: f64 = 0.5;

/// What the route layer announces for a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouteAnnouncement {
    pub prefix: Prefix,
    pub med: Option<u32>,
}

pub struct LvsService {
    name: String,
    service: VirtualService,
    installed: BTreeSet<Server>,
    depool_threshold: f64,
    bgp: bool,
    bgp_med: Option<u32>,
    executor: Arc<dyn TableExecutor>,
}

impl LvsService {
    pub fn new(
        name: impl Into<String>,
        service: VirtualService,
        executor: Arc<dyn TableExecutor>,
    ) -> Self {
        Self {
            name: name.into(),
            service,
            installed: BTreeSet::new(),
            depool_threshold: DEFAULT_DEPOOL_THRESHOLD,
            bgp: true,
            bgp_med: None,
            executor,
        }
    }

    /// Build from a service section. The section name is the service name;
    /// besides the service tuple it may set `depool-threshold`, `bgp` and
    /// `bgp-med`.
    ///
    /// The table entry is not touched until [`LvsService::create_or_replace`].
    pub fn from_config(section: &ConfigSection, executor: Arc<dyn TableExecutor>) -> Result<Self> {
        let service = VirtualService::from_section(section)?;

        let depool_threshold =
            section.get_float("depool-threshold", Some(DEFAULT_DEPOOL_THRESHOLD))?;
        if !(0.0..=1.0).contains(&depool_threshold) {
            return Err(LvsError::format(format!(
                "depool-threshold {} is not a fraction",
                depool_threshold
            )));
        }

        let bgp_med = section
            .get_opt_int("bgp-med")?
            .map(|med| {
                u32::try_from(med)
                    .map_err(|_| LvsError::format(format!("bgp-med {} is out of range", med)))
            })
            .transpose()?;

        Ok(Self {
            name: section.name().to_string(),
            service,
            installed: BTreeSet::new(),
            depool_threshold,
            bgp: section.get_bool("bgp", Some(true))?,
            bgp_med,
            executor,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn service(&self) -> &VirtualService {
        &self.service
    }

    /// Servers currently believed to be in the table
    pub fn installed(&self) -> &BTreeSet<Server> {
        &self.installed
    }

    pub fn is_installed(&self, server: &Server) -> bool {
        self.installed.contains(server)
    }

    /// Fraction of the pool below which the orchestrator stops depooling.
    /// Not enforced here.
    pub fn depool_threshold(&self) -> f64 {
        self.depool_threshold
    }

    /// The service address as a host prefix, unless BGP is disabled for it
    pub fn route_announcement(&self) -> Option<RouteAnnouncement> {
        self.bgp.then(|| RouteAnnouncement {
            prefix: Prefix::from(self.service.ip()),
            med: self.bgp_med,
        })
    }

    /// Reset the table entry: remove the service, then add it back
    #[instrument(skip(self), fields(service = %self.name))]
    pub async fn create_or_replace(&self) -> Result<()> {
        info!(definition = %self.service, "Creating virtual service");
        self.executor
            .apply(&[
                IpvsCommand::RemoveService(self.service.clone()),
                IpvsCommand::AddService(self.service.clone()),
            ])
            .await
    }

    /// Commands that move the table from the installed set to `desired`.
    /// Empty when `desired` matches the installed set, weights included.
    pub fn plan_reconcile(&self, desired: &BTreeSet<Server>) -> Vec<IpvsCommand> {
        if self.is_converged(desired) {
            return Vec::new();
        }

        let adds = desired
            .difference(&self.installed)
            .map(|server| IpvsCommand::add_server(&self.service, server));
        // Yields the desired copy, so weight changes reach the table
        let edits = desired
            .intersection(&self.installed)
            .map(|server| IpvsCommand::edit_server(&self.service, server));
        let removes = self
            .installed
            .difference(desired)
            .map(|server| IpvsCommand::remove_server(&self.service, server));

        adds.chain(edits).chain(removes).collect()
    }

    fn is_converged(&self, desired: &BTreeSet<Server>) -> bool {
        desired.len() == self.installed.len()
            && desired
                .iter()
                .zip(&self.installed)
                .all(|(want, have)| want == have && want.weight == have.weight)
    }

    /// Make `desired` the installed set
    #[instrument(skip(self, desired), fields(service = %self.name, desired = desired.len()))]
    pub async fn reconcile(&mut self, desired: BTreeSet<Server>) -> Result<()> {
        let commands = self.plan_reconcile(&desired);

        self.installed = desired
            .into_iter()
            .map(|mut server| {
                server.set_pooled(true);
                server
            })
            .collect();

        if commands.is_empty() {
            debug!("Pool already converged");
            return Ok(());
        }
        self.executor.apply(&commands).await
    }

    /// Pool a single server
    #[instrument(skip(self, server), fields(service = %self.name, server = %server))]
    pub async fn pool_one(&mut self, server: &mut Server) -> Result<()> {
        let command = if self.installed.contains(server) {
            warn!("Pooling a server that is already installed, editing instead");
            IpvsCommand::edit_server(&self.service, server)
        } else {
            IpvsCommand::add_server(&self.service, server)
        };

        server.set_pooled(true);
        self.installed.replace(server.clone());

        self.executor.apply(&[command]).await
    }

    /// Depool a single server. Fails with [`LvsError::NotMember`] if it is
    /// not installed.
    #[instrument(skip(self, server), fields(service = %self.name, server = %server))]
    pub async fn depool_one(&mut self, server: &mut Server) -> Result<()> {
        if !self.installed.remove(server) {
            return Err(LvsError::NotMember {
                server: server.to_string(),
                service: self.name.clone(),
            });
        }
        server.set_pooled(false);

        self.executor
            .apply(&[IpvsCommand::remove_server(&self.service, server)])
            .await
    }

    /// Apply service defaults to a server before it is first pooled
    pub fn init_server(&self, server: &mut Server) {
        server.port = self.service.port();
        server.attach(&self.name);
    }
}

impl std::fmt::Debug for LvsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LvsService")
            .field("name", &self.name)
            .field("service", &self.service)
            .field("installed", &self.installed)
            .field("depool_threshold", &self.depool_threshold)
            .field("bgp", &self.bgp)
            .field("bgp_med", &self.bgp_med)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::RecordingExecutor;

    fn http() -> VirtualService {
        VirtualService::parse("tcp", "127.0.0.1", 80, "rr", false).unwrap()
    }

    fn setup() -> (LvsService, Arc<RecordingExecutor>) {
        let executor = Arc::new(RecordingExecutor::new());
        (LvsService::new("http", http(), executor.clone()), executor)
    }

    fn localhost() -> Server {
        Server::new("localhost").with_ip("127.0.0.1")
    }

    #[tokio::test]
    async fn test_create_or_replace() {
        let (service, executor) = setup();
        service.create_or_replace().await.unwrap();
        assert_eq!(
            executor.last_batch().unwrap(),
            vec!["-D -t 127.0.0.1:80", "-A -t 127.0.0.1:80 -s rr"]
        );

        let executor = Arc::new(RecordingExecutor::new());
        let dns = VirtualService::parse("udp", "127.0.0.1", 53, "rr", true).unwrap();
        LvsService::new("dns", dns, executor.clone())
            .create_or_replace()
            .await
            .unwrap();
        assert_eq!(
            executor.last_batch().unwrap(),
            vec!["-D -u 127.0.0.1:53", "-A -u 127.0.0.1:53 -s rr -o"]
        );
    }

    #[tokio::test]
    async fn test_pool_one_then_duplicate() {
        let (mut service, executor) = setup();
        let mut server = localhost();

        service.pool_one(&mut server).await.unwrap();
        assert_eq!(executor.last_batch().unwrap(), vec!["-a -t 127.0.0.1:80 -r 127.0.0.1"]);
        assert!(server.is_pooled());

        service.pool_one(&mut server).await.unwrap();
        assert_eq!(executor.last_batch().unwrap(), vec!["-e -t 127.0.0.1:80 -r 127.0.0.1"]);
        assert!(server.is_pooled());
        assert_eq!(service.installed().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_pool_keeps_latest_weight() {
        let (mut service, executor) = setup();
        let mut server = localhost().with_weight(10);
        service.pool_one(&mut server).await.unwrap();

        let mut reweighted = localhost().with_weight(30);
        service.pool_one(&mut reweighted).await.unwrap();

        assert_eq!(
            executor.last_batch().unwrap(),
            vec!["-e -t 127.0.0.1:80 -r 127.0.0.1 -w 30"]
        );
        let installed = service.installed().iter().next().unwrap();
        assert_eq!(installed.weight, Some(30));
    }

    #[tokio::test]
    async fn test_depool_one() {
        let (mut service, executor) = setup();
        let mut server = localhost();
        service.pool_one(&mut server).await.unwrap();

        service.depool_one(&mut server).await.unwrap();
        assert_eq!(executor.last_batch().unwrap(), vec!["-d -t 127.0.0.1:80 -r 127.0.0.1"]);
        assert!(!server.is_pooled());
        assert!(service.installed().is_empty());
    }

    #[tokio::test]
    async fn test_depool_non_member() {
        let (mut service, executor) = setup();
        let mut server = localhost();

        let err = tokio_test::assert_err!(service.depool_one(&mut server).await);
        assert_eq!(err.error_code(), "NOT_MEMBER");
        assert!(executor.batches().is_empty());
    }

    #[test]
    fn test_init_server() {
        let (service, _) = setup();
        let mut server = Server::new("cp1001").with_port(8080);
        service.init_server(&mut server);
        assert_eq!(server.port, 80);
        assert_eq!(server.service(), Some("http"));
    }

    #[test]
    fn test_depool_threshold() {
        let executor = Arc::new(RecordingExecutor::new());
        let section = ConfigSection::new("test")
            .with("protocol", "tcp")
            .with("ip", "127.0.0.1")
            .with("port", 80)
            .with("scheduler", "rr");

        let service = LvsService::from_config(&section, executor.clone()).unwrap();
        assert_eq!(service.depool_threshold(), 0.5);

        let section = section.with("depool-threshold", 0.25);
        let service = LvsService::from_config(&section, executor.clone()).unwrap();
        assert_eq!(service.depool_threshold(), 0.25);

        let section = section.with("depool-threshold", 1.5);
        assert!(LvsService::from_config(&section, executor).is_err());
    }

    #[test]
    fn test_invalid_service_definitions() {
        let executor = Arc::new(RecordingExecutor::new());
        let base = ConfigSection::new("bad")
            .with("protocol", "tcp")
            .with("ip", "127.0.0.1")
            .with("port", 80)
            .with("scheduler", "rr");

        for section in [
            base.clone().with("protocol", "invalid-protocol"),
            base.clone().with("scheduler", "invalid-scheduler"),
            base.clone().with("ops", true),
        ] {
            let err = LvsService::from_config(&section, executor.clone()).unwrap_err();
            assert_eq!(err.error_code(), "CONSTRAINT_ERROR");
        }
    }

    #[test]
    fn test_route_announcement() {
        let executor = Arc::new(RecordingExecutor::new());
        let section = ConfigSection::new("per-service-med")
            .with("protocol", "tcp")
            .with("ip", "::1")
            .with("port", 443)
            .with("scheduler", "rr")
            .with("bgp-med", "50");
        let service = LvsService::from_config(&section, executor.clone()).unwrap();

        let announcement = service.route_announcement().unwrap();
        assert_eq!(announcement.prefix.to_string(), "0:0:0:0:0:0:0:1/128");
        assert_eq!(announcement.med, Some(50));

        let (default, _) = setup();
        let announcement = default.route_announcement().unwrap();
        assert_eq!(announcement.prefix.to_string(), "127.0.0.1/32");
        assert_eq!(announcement.med, None);

        let section = section.with("bgp", "false");
        let service = LvsService::from_config(&section, executor).unwrap();
        assert!(service.route_announcement().is_none());
    }
}
