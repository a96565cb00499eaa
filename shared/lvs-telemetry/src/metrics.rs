//! Metrics primitives and the labelled sink monitors report into

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic count of one series; the registry key carries its name
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Last value written to one series
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn set(&self, value: u64) {
        self.0.store(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Most recent check durations of one series, oldest dropped first.
/// Clones share the same samples.
#[derive(Debug, Clone, Default)]
pub struct Histogram {
    samples: Arc<Mutex<VecDeque<f64>>>,
}

impl Histogram {
    pub const CAPACITY: usize = 1024;

    pub fn record(&self, seconds: f64) {
        let mut samples = self.samples.lock();
        if samples.len() == Self::CAPACITY {
            samples.pop_front();
        }
        samples.push_back(seconds);
    }

    pub fn count(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn last(&self) -> Option<f64> {
        self.samples.lock().back().copied()
    }

    /// Zero when nothing was recorded
    pub fn mean(&self) -> f64 {
        let samples = self.samples.lock();
        match samples.len() {
            0 => 0.0,
            n => samples.iter().sum::<f64>() / n as f64,
        }
    }
}

/// The `{service, host, monitor}` triple, plus `result` on duration metrics
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricLabels {
    pub service: String,
    pub host: String,
    pub monitor: String,
    pub result: Option<String>,
}

impl MetricLabels {
    pub fn new(
        service: impl Into<String>,
        host: impl Into<String>,
        monitor: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            host: host.into(),
            monitor: monitor.into(),
            result: None,
        }
    }

    pub fn with_result(&self, result: &str) -> Self {
        Self {
            result: Some(result.to_string()),
            ..self.clone()
        }
    }

    fn render(&self) -> String {
        let mut out = format!(
            "service=\"{}\",host=\"{}\",monitor=\"{}\"",
            self.service, self.host, self.monitor
        );
        if let Some(result) = &self.result {
            let _ = write!(out, ",result=\"{}\"", result);
        }
        out
    }
}

/// Where monitors send their counters, gauges and durations
pub trait MetricsSink: Send + Sync {
    fn inc_counter(&self, name: &str, labels: &MetricLabels);
    fn set_gauge(&self, name: &str, labels: &MetricLabels, value: u64);
    fn observe(&self, name: &str, labels: &MetricLabels, seconds: f64);
}

/// Sink used when no metrics backend is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn inc_counter(&self, _name: &str, _labels: &MetricLabels) {}
    fn set_gauge(&self, _name: &str, _labels: &MetricLabels, _value: u64) {}
    fn observe(&self, _name: &str, _labels: &MetricLabels, _seconds: f64) {}
}

type SeriesKey = (String, MetricLabels);

/// In-process registry, readable by tests and by an exporter
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    namespace: String,
    counters: DashMap<SeriesKey, Counter>,
    gauges: DashMap<SeriesKey, Gauge>,
    histograms: DashMap<SeriesKey, Histogram>,
}

impl MetricsRegistry {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            ..Default::default()
        }
    }

    fn full_name(&self, name: &str) -> String {
        if self.namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}_{}", self.namespace, name)
        }
    }

    fn key(&self, name: &str, labels: &MetricLabels) -> SeriesKey {
        (self.full_name(name), labels.clone())
    }

    pub fn counter_value(&self, name: &str, labels: &MetricLabels) -> u64 {
        self.counters
            .get(&self.key(name, labels))
            .map(|c| c.get())
            .unwrap_or(0)
    }

    pub fn gauge_value(&self, name: &str, labels: &MetricLabels) -> Option<u64> {
        self.gauges.get(&self.key(name, labels)).map(|g| g.get())
    }

    pub fn histogram(&self, name: &str, labels: &MetricLabels) -> Option<Histogram> {
        self.histograms
            .get(&self.key(name, labels))
            .map(|h| h.value().clone())
    }

    /// Prometheus text exposition of counters and gauges, sorted for stable output
    pub fn render(&self) -> String {
        let mut lines: Vec<String> = self
            .counters
            .iter()
            .map(|e| format!("{}{{{}}} {}", e.key().0, e.key().1.render(), e.get()))
            .chain(
                self.gauges
                    .iter()
                    .map(|e| format!("{}{{{}}} {}", e.key().0, e.key().1.render(), e.get())),
            )
            .collect();
        lines.sort();
        lines.join("\n")
    }
}

impl MetricsSink for MetricsRegistry {
    fn inc_counter(&self, name: &str, labels: &MetricLabels) {
        let key = self.key(name, labels);
        self.counters
            .entry(key)
            .or_insert_with(Counter::default)
            .inc();
    }

    fn set_gauge(&self, name: &str, labels: &MetricLabels, value: u64) {
        let key = self.key(name, labels);
        self.gauges
            .entry(key)
            .or_insert_with(Gauge::default)
            .set(value);
    }

    fn observe(&self, name: &str, labels: &MetricLabels, seconds: f64) {
        let key = self.key(name, labels);
        self.histograms
            .entry(key)
            .or_insert_with(Histogram::default)
            .record(seconds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> MetricLabels {
        MetricLabels::new("text_80", "cp1001.example.net", "ProxyFetch")
    }

    #[test]
    fn test_counter() {
        let counter = Counter::default();
        assert_eq!(counter.get(), 0);
        counter.inc();
        counter.inc();
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn test_histogram() {
        let hist = Histogram::default();
        assert_eq!(hist.mean(), 0.0);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            hist.record(v);
        }
        assert_eq!(hist.count(), 5);
        assert_eq!(hist.last(), Some(5.0));
        assert!((hist.mean() - 3.0).abs() < 0.001);
    }

    #[test]
    fn test_histogram_drops_oldest_at_capacity() {
        let hist = Histogram::default();
        for i in 0..=Histogram::CAPACITY {
            hist.record(i as f64);
        }
        assert_eq!(hist.count(), Histogram::CAPACITY);
        assert_eq!(hist.last(), Some(Histogram::CAPACITY as f64));
    }

    #[test]
    fn test_sink_creates_series_on_first_use() {
        let registry = MetricsRegistry::new("lvs_monitor");
        let failed = labels().with_result("failed");

        registry.inc_counter("down_results_total", &labels());
        registry.set_gauge("status", &labels(), 0);
        registry.observe("check_duration_seconds", &failed, 0.5);
        registry.observe("check_duration_seconds", &failed, 1.5);

        assert_eq!(registry.counter_value("down_results_total", &labels()), 1);
        assert_eq!(registry.gauge_value("status", &labels()), Some(0));
        let hist = registry.histogram("check_duration_seconds", &failed).unwrap();
        assert_eq!(hist.count(), 2);
        assert!((hist.mean() - 1.0).abs() < 1e-9);
        assert!(registry
            .render()
            .contains("lvs_monitor_down_results_total{service=\"text_80\""));
    }

    #[test]
    fn test_registry_series_are_per_label_set() {
        let registry = MetricsRegistry::new("lvs_monitor");
        let a = labels();
        let b = MetricLabels::new("text_80", "cp1002.example.net", "ProxyFetch");

        registry.inc_counter("up_results_total", &a);
        registry.inc_counter("up_results_total", &a);
        registry.inc_counter("up_results_total", &b);
        registry.set_gauge("status", &a, 1);

        assert_eq!(registry.counter_value("up_results_total", &a), 2);
        assert_eq!(registry.counter_value("up_results_total", &b), 1);
        assert_eq!(registry.counter_value("down_results_total", &a), 0);
        assert_eq!(registry.gauge_value("status", &a), Some(1));
        assert_eq!(registry.gauge_value("status", &b), None);
    }

    #[test]
    fn test_registry_render() {
        let registry = MetricsRegistry::new("lvs_monitor");
        registry.set_gauge("status", &labels(), 0);
        registry.observe("check_duration_seconds", &labels().with_result("failed"), 0.2);

        assert_eq!(
            registry.render(),
            "lvs_monitor_status{service=\"text_80\",host=\"cp1001.example.net\",monitor=\"ProxyFetch\"} 0"
        );
        let hist = registry
            .histogram("check_duration_seconds", &labels().with_result("failed"))
            .unwrap();
        assert_eq!(hist.count(), 1);
    }

    #[test]
    fn test_noop_sink_accepts_everything() {
        let sink: Arc<dyn MetricsSink> = Arc::new(NoopMetrics);
        sink.inc_counter("up_results_total", &labels());
        sink.set_gauge("status", &labels(), 1);
        sink.observe("check_duration_seconds", &labels(), 0.1);
    }
}
