//! Monitor lifecycle and the interval-driven check loop

use async_trait::async_trait;
use lvs_core::{ConfigSection, LvsError, Result};
use lvs_telemetry::MetricsSink;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::coordinator::Coordinator;
use crate::state::HealthState;
use crate::types::{MonitorLabels, MonitorSnapshot, ProbeOutcome, Verdict};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// One kind of health check against one server.
///
/// Recognized failures are reported as [`ProbeOutcome::Down`]; anything the
/// probe cannot classify is returned as `Err` and surfaces as a fault.
#[async_trait]
pub trait Probe: Send + Sync + 'static {
    /// Monitor type name, used in labels and as the configuration prefix
    fn name(&self) -> &str;

    async fn probe(&self) -> Result<ProbeOutcome>;

    fn default_interval(&self) -> Duration {
        DEFAULT_INTERVAL
    }

    fn default_timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }
}

/// Lifecycle every monitor variant exposes to the orchestrator
#[async_trait]
pub trait Monitor: Send + Sync {
    fn labels(&self) -> &MonitorLabels;

    /// Start monitoring. Allowed once per instance; `stop()` is called when
    /// `shutdown` is cancelled.
    fn run(&self, shutdown: &CancellationToken) -> Result<()>;

    /// Idempotent. No result reaches the coordinator after this returns.
    fn stop(&self);

    /// Run a single check and feed its result into the state machine. Waits
    /// for any check already in flight on this instance.
    async fn check(&self) -> Result<()>;

    fn verdict(&self) -> Verdict;

    fn snapshot(&self) -> MonitorSnapshot;
}

struct Shared<P> {
    probe: P,
    state: HealthState,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
    in_flight: AsyncMutex<()>,
}

#[derive(Default)]
struct Tasks {
    started: bool,
    check_loop: Option<JoinHandle<()>>,
    shutdown_hook: Option<JoinHandle<()>>,
}

/// Runs its probe every interval, one attempt at a time
pub struct LoopingMonitor<P: Probe> {
    shared: Arc<Shared<P>>,
    tasks: Mutex<Tasks>,
}

impl<P: Probe> LoopingMonitor<P> {
    pub fn new(
        probe: P,
        service: &str,
        host: &str,
        coordinator: Arc<dyn Coordinator>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let interval = probe.default_interval();
        let timeout = probe.default_timeout();
        Self::build(probe, service, host, coordinator, metrics, interval, timeout)
    }

    /// Read `<monitor>.interval` and `<monitor>.timeout` (seconds) from the
    /// service section, falling back to the probe's defaults
    pub fn from_config(
        probe: P,
        host: &str,
        section: &ConfigSection,
        coordinator: Arc<dyn Coordinator>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self> {
        let config = section.monitor(probe.name());
        let interval =
            seconds(config.get_float("interval", Some(probe.default_interval().as_secs_f64()))?)?;
        let timeout =
            seconds(config.get_float("timeout", Some(probe.default_timeout().as_secs_f64()))?)?;

        Ok(Self::build(
            probe,
            section.name(),
            host,
            coordinator,
            metrics,
            interval,
            timeout,
        ))
    }

    fn build(
        probe: P,
        service: &str,
        host: &str,
        coordinator: Arc<dyn Coordinator>,
        metrics: Arc<dyn MetricsSink>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        let labels = MonitorLabels::new(service, host, probe.name());
        Self {
            shared: Arc::new(Shared {
                probe,
                state: HealthState::new(labels, coordinator, metrics),
                interval,
                timeout,
                cancel: CancellationToken::new(),
                in_flight: AsyncMutex::new(()),
            }),
            tasks: Mutex::new(Tasks::default()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.shared.interval
    }

    pub fn timeout(&self) -> Duration {
        self.shared.timeout
    }

    pub fn state(&self) -> &HealthState {
        &self.shared.state
    }
}

fn seconds(value: f64) -> Result<Duration> {
    if !value.is_finite() || value <= 0.0 {
        return Err(LvsError::format(format!(
            "{} is not a positive number of seconds",
            value
        )));
    }
    Ok(Duration::from_secs_f64(value))
}

impl<P: Probe> Shared<P> {
    fn halt(&self) {
        self.cancel.cancel();
        self.state.set_active(false);
    }

    #[instrument(
        skip(self),
        fields(
            service = %self.state.labels().service,
            host = %self.state.labels().host,
            monitor = %self.state.labels().monitor
        )
    )]
    async fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        // One probe at a time, whether started by the loop or by a caller
        let _in_flight = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(()),
            guard = self.in_flight.lock() => guard,
        };

        let started = Instant::now();
        let attempt = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(()),
            attempt = tokio::time::timeout(self.timeout, self.probe.probe()) => attempt,
        };
        let elapsed = started.elapsed();

        let outcome = match attempt {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(fault)) => {
                self.state.record_duration(elapsed, false);
                return Err(match fault {
                    LvsError::ProbeFault(msg) => LvsError::ProbeFault(msg),
                    other => LvsError::ProbeFault(other.to_string()),
                });
            }
            Err(_) => ProbeOutcome::Down(format!(
                "check timed out after {:.3} s",
                self.timeout.as_secs_f64()
            )),
        };

        match outcome {
            ProbeOutcome::Cancelled => {}
            ProbeOutcome::Up => {
                self.state.record_duration(elapsed, true);
                self.state.result_up();
            }
            ProbeOutcome::AcceptableFailure(reason) => {
                info!(reason = %reason, "Check failed in an accepted way, counting as up");
                self.state.record_duration(elapsed, true);
                self.state.result_up();
            }
            ProbeOutcome::Down(reason) => {
                error!(
                    reason = %reason,
                    duration = elapsed.as_secs_f64(),
                    "Check failed"
                );
                self.state.record_duration(elapsed, false);
                self.state.result_down(&reason);
            }
        }
        Ok(())
    }

    async fn check_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);
        // A slow check pushes the schedule back instead of bunching checks up
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if let Err(e) = self.check().await {
                error!(
                    service = %self.state.labels().service,
                    host = %self.state.labels().host,
                    monitor = %self.state.labels().monitor,
                    error = %e,
                    "Probe fault"
                );
            }
        }
    }
}

#[async_trait]
impl<P: Probe> Monitor for LoopingMonitor<P> {
    fn labels(&self) -> &MonitorLabels {
        self.shared.state.labels()
    }

    fn run(&self, shutdown: &CancellationToken) -> Result<()> {
        let mut tasks = self.tasks.lock();
        if tasks.started {
            return Err(LvsError::AlreadyRunning(self.labels().to_string()));
        }
        tasks.started = true;
        self.shared.state.set_active(true);

        tasks.check_loop = Some(tokio::spawn(self.shared.clone().check_loop()));

        let shared = self.shared.clone();
        let shutdown = shutdown.clone();
        tasks.shutdown_hook = Some(tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    warn!(monitor = %shared.state.labels(), "Stopping monitor for shutdown");
                    shared.halt();
                }
                _ = shared.cancel.cancelled() => {}
            }
        }));

        info!(
            service = %self.labels().service,
            host = %self.labels().host,
            monitor = %self.labels().monitor,
            interval = self.shared.interval.as_secs_f64(),
            "Monitor started"
        );
        Ok(())
    }

    fn stop(&self) {
        self.shared.halt();

        let mut tasks = self.tasks.lock();
        if let Some(hook) = tasks.shutdown_hook.take() {
            hook.abort();
        }
        if let Some(check_loop) = tasks.check_loop.take() {
            check_loop.abort();
        }
    }

    async fn check(&self) -> Result<()> {
        self.shared.check().await
    }

    fn verdict(&self) -> Verdict {
        self.shared.state.verdict()
    }

    fn snapshot(&self) -> MonitorSnapshot {
        self.shared.state.snapshot()
    }
}

impl<P: Probe> Drop for LoopingMonitor<P> {
    fn drop(&mut self) {
        self.stop();
    }
}
