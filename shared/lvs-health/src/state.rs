//! Edge-triggered verdict state shared by every monitor type

use chrono::{DateTime, Utc};
use lvs_telemetry::{MetricLabels, MetricsSink};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::coordinator::Coordinator;
use crate::types::{MonitorLabels, MonitorSnapshot, Verdict};

/// Namespace for the metric names below when exported
pub const METRICS_NAMESPACE: &str = "lvs_monitor";

pub const UP_RESULTS: &str = "up_results_total";
pub const DOWN_RESULTS: &str = "down_results_total";
pub const UP_TRANSITIONS: &str = "up_transitions_total";
pub const DOWN_TRANSITIONS: &str = "down_transitions_total";
pub const STATUS: &str = "status";
pub const CHECK_DURATION: &str = "check_duration_seconds";

#[derive(Debug, Default)]
struct Inner {
    verdict: Verdict,
    active: bool,
    first_check_done: bool,
    last_check: Option<DateTime<Utc>>,
    last_reason: Option<String>,
    up_results: u64,
    down_results: u64,
}

/// Verdict, activity flag and counters of one monitor instance.
///
/// A result moves the verdict and notifies the coordinator only while the
/// monitor is active, and only when it is the first completed check or
/// differs from the current verdict. Every result is counted.
///
/// This holds for the first result too: an inactive monitor never notifies,
/// even if it has not reported yet, so nothing can follow `stop()`.
pub struct HealthState {
    labels: MonitorLabels,
    metric_labels: MetricLabels,
    coordinator: Arc<dyn Coordinator>,
    metrics: Arc<dyn MetricsSink>,
    inner: Mutex<Inner>,
}

impl HealthState {
    pub fn new(
        labels: MonitorLabels,
        coordinator: Arc<dyn Coordinator>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            metric_labels: labels.metric_labels(),
            labels,
            coordinator,
            metrics,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn labels(&self) -> &MonitorLabels {
        &self.labels
    }

    pub fn verdict(&self) -> Verdict {
        self.inner.lock().verdict
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().active
    }

    pub fn first_check_done(&self) -> bool {
        self.inner.lock().first_check_done
    }

    /// After `set_active(false)` returns no later result can notify
    pub fn set_active(&self, active: bool) {
        self.inner.lock().active = active;
    }

    pub fn result_up(&self) {
        self.ingest(Verdict::Up, None);
    }

    pub fn result_down(&self, reason: &str) {
        self.ingest(Verdict::Down, Some(reason));
    }

    fn ingest(&self, verdict: Verdict, reason: Option<&str>) {
        let mut inner = self.inner.lock();

        inner.last_check = Some(Utc::now());
        inner.last_reason = reason.map(str::to_string);
        match verdict {
            Verdict::Down => {
                inner.down_results += 1;
                self.metrics.inc_counter(DOWN_RESULTS, &self.metric_labels);
            }
            _ => {
                inner.up_results += 1;
                self.metrics.inc_counter(UP_RESULTS, &self.metric_labels);
            }
        }

        let transition = inner.active && (!inner.first_check_done || inner.verdict != verdict);
        if !transition {
            return;
        }

        debug!(
            service = %self.labels.service,
            host = %self.labels.host,
            monitor = %self.labels.monitor,
            from = %inner.verdict,
            to = %verdict,
            "Monitor verdict changed"
        );
        inner.verdict = verdict;
        inner.first_check_done = true;

        // Notify under the lock so a concurrent stop() cannot return first
        match verdict {
            Verdict::Down => {
                self.coordinator.result_down(&self.labels, reason);
                self.metrics.inc_counter(DOWN_TRANSITIONS, &self.metric_labels);
                self.metrics.set_gauge(STATUS, &self.metric_labels, 0);
            }
            _ => {
                self.coordinator.result_up(&self.labels);
                self.metrics.inc_counter(UP_TRANSITIONS, &self.metric_labels);
                self.metrics.set_gauge(STATUS, &self.metric_labels, 1);
            }
        }
    }

    pub fn record_duration(&self, elapsed: Duration, successful: bool) {
        let result = if successful { "successful" } else { "failed" };
        self.metrics.observe(
            CHECK_DURATION,
            &self.metric_labels.with_result(result),
            elapsed.as_secs_f64(),
        );
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let inner = self.inner.lock();
        MonitorSnapshot {
            labels: self.labels.clone(),
            verdict: inner.verdict,
            active: inner.active,
            first_check_done: inner.first_check_done,
            last_check: inner.last_check,
            last_reason: inner.last_reason.clone(),
            up_results: inner.up_results,
            down_results: inner.down_results,
        }
    }
}

impl std::fmt::Debug for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthState")
            .field("labels", &self.labels)
            .field("inner", &*self.inner.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{Notification, RecordingCoordinator};
    use lvs_telemetry::MetricsRegistry;

    fn setup() -> (HealthState, Arc<RecordingCoordinator>, Arc<MetricsRegistry>) {
        let coordinator = Arc::new(RecordingCoordinator::new());
        let metrics = Arc::new(MetricsRegistry::new(METRICS_NAMESPACE));
        let state = HealthState::new(
            MonitorLabels::new("text_80", "cp1001.example.net", "ProxyFetch"),
            coordinator.clone(),
            metrics.clone(),
        );
        (state, coordinator, metrics)
    }

    #[test]
    fn test_first_result_always_notifies() {
        let (state, coordinator, metrics) = setup();
        state.set_active(true);
        assert_eq!(state.verdict(), Verdict::Unknown);

        state.result_up();

        assert_eq!(state.verdict(), Verdict::Up);
        assert!(state.first_check_done());
        assert_eq!(
            coordinator.notifications(),
            vec![Notification::Up(state.labels().clone())]
        );
        let labels = state.labels().metric_labels();
        assert_eq!(metrics.counter_value(UP_TRANSITIONS, &labels), 1);
        assert_eq!(metrics.gauge_value(STATUS, &labels), Some(1));
    }

    #[test]
    fn test_first_down_result_notifies() {
        let (state, coordinator, _) = setup();
        state.set_active(true);

        state.result_down("Connection refused");

        assert_eq!(state.verdict(), Verdict::Down);
        assert_eq!(
            coordinator.notifications(),
            vec![Notification::Down(
                state.labels().clone(),
                Some("Connection refused".to_string())
            )]
        );
    }

    #[test]
    fn test_repeated_results_are_edge_triggered() {
        let (state, coordinator, metrics) = setup();
        state.set_active(true);
        state.result_up();
        coordinator.clear();

        for _ in 0..10 {
            state.result_down("timeout");
        }

        assert_eq!(coordinator.len(), 1);
        let labels = state.labels().metric_labels();
        assert_eq!(metrics.counter_value(DOWN_RESULTS, &labels), 10);
        assert_eq!(metrics.counter_value(DOWN_TRANSITIONS, &labels), 1);
        assert_eq!(metrics.gauge_value(STATUS, &labels), Some(0));

        state.result_up();
        state.result_up();
        assert_eq!(coordinator.len(), 2);
        assert_eq!(metrics.counter_value(UP_TRANSITIONS, &labels), 2);
    }

    #[test]
    fn test_inactive_results_only_count() {
        let (state, coordinator, metrics) = setup();

        state.result_up();
        state.result_down("refused");

        assert!(coordinator.is_empty());
        assert_eq!(state.verdict(), Verdict::Unknown);
        assert!(!state.first_check_done());
        let labels = state.labels().metric_labels();
        assert_eq!(metrics.counter_value(UP_RESULTS, &labels), 1);
        assert_eq!(metrics.counter_value(DOWN_RESULTS, &labels), 1);
        assert_eq!(metrics.gauge_value(STATUS, &labels), None);
    }

    #[test]
    fn test_deactivation_freezes_verdict() {
        let (state, coordinator, _) = setup();
        state.set_active(true);
        state.result_up();
        state.set_active(false);

        state.result_down("refused");

        assert_eq!(state.verdict(), Verdict::Up);
        assert_eq!(coordinator.len(), 1);
        let snapshot = state.snapshot();
        assert_eq!(snapshot.down_results, 1);
        assert_eq!(snapshot.last_reason.as_deref(), Some("refused"));
        assert!(!snapshot.active);
    }

    #[test]
    fn test_duration_tagged_by_outcome() {
        let (state, _, metrics) = setup();
        state.record_duration(Duration::from_millis(250), false);

        let labels = state.labels().metric_labels();
        let failed = metrics
            .histogram(CHECK_DURATION, &labels.with_result("failed"))
            .unwrap();
        assert!((failed.mean() - 0.25).abs() < 1e-9);
        assert!(metrics
            .histogram(CHECK_DURATION, &labels.with_result("successful"))
            .is_none());
    }
}
