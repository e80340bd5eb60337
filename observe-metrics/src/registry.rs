//! Concurrent metrics registry keyed by `(name, label-set)`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::warn;

use observe_primitives::LabelSet;

use crate::reservoir::{HistogramStats, Reservoir};

/// Kind of a metric series.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Monotonically increasing total.
    Counter,
    /// Distribution with percentile estimation.
    Histogram,
    /// Last-write-wins point-in-time value.
    Gauge,
}

impl MetricKind {
    /// Returns the lowercase label used in export formats.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Histogram => "histogram",
            Self::Gauge => "gauge",
        }
    }
}

/// Configuration for a metrics registry.
#[derive(Debug, Clone, Copy)]
pub struct MetricsConfig {
    reservoir_capacity: usize,
}

impl MetricsConfig {
    /// Creates a configuration with the supplied histogram reservoir capacity.
    #[must_use]
    pub fn new(reservoir_capacity: usize) -> Self {
        Self {
            reservoir_capacity: reservoir_capacity.max(1),
        }
    }

    /// Returns the configured reservoir capacity.
    #[must_use]
    pub const fn reservoir_capacity(self) -> usize {
        self.reservoir_capacity
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            reservoir_capacity: 1024,
        }
    }
}

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
struct SeriesKey {
    name: String,
    labels: LabelSet,
}

#[derive(Debug)]
enum SeriesValue {
    Counter(f64),
    Gauge(f64),
    Histogram(Reservoir),
}

impl SeriesValue {
    const fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Gauge(_) => MetricKind::Gauge,
            Self::Histogram(_) => MetricKind::Histogram,
        }
    }
}

#[derive(Debug)]
struct Series {
    value: SeriesValue,
    updated_at: f64,
}

/// Point-in-time value of one series.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetricSnapshot {
    /// Counter total.
    Counter {
        /// Accumulated total.
        value: f64,
    },
    /// Gauge value.
    Gauge {
        /// Last written value.
        value: f64,
    },
    /// Histogram summary.
    Histogram(HistogramStats),
}

impl MetricSnapshot {
    /// Returns the scalar value for counters and gauges.
    #[must_use]
    pub const fn scalar(&self) -> Option<f64> {
        match self {
            Self::Counter { value } | Self::Gauge { value } => Some(*value),
            Self::Histogram(_) => None,
        }
    }

    /// Returns the histogram summary, if this is a histogram.
    #[must_use]
    pub const fn histogram(&self) -> Option<&HistogramStats> {
        match self {
            Self::Histogram(stats) => Some(stats),
            _ => None,
        }
    }

    /// Returns the kind of the snapshotted series.
    #[must_use]
    pub const fn kind(&self) -> MetricKind {
        match self {
            Self::Counter { .. } => MetricKind::Counter,
            Self::Gauge { .. } => MetricKind::Gauge,
            Self::Histogram(_) => MetricKind::Histogram,
        }
    }
}

/// Snapshot of one series together with its identity, as used by exporters.
#[derive(Clone, Debug)]
pub struct SeriesSnapshot {
    /// Metric name.
    pub name: String,
    /// Label set identifying the series within the name.
    pub labels: LabelSet,
    /// Current value.
    pub value: MetricSnapshot,
    /// Unix timestamp of the last write.
    pub updated_at: f64,
}

impl SeriesSnapshot {
    /// Renders the export key, e.g. `tool.calls.total{tool="search"}`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}{}", self.name, self.labels.render())
    }
}

/// Thread-safe registry of counters, histograms, and gauges.
///
/// The series map sits behind a read-write lock while each series carries
/// its own mutex, so writers touching distinct series do not contend and
/// per-series updates are linearizable.
#[derive(Debug)]
pub struct MetricsRegistry {
    config: MetricsConfig,
    series: RwLock<BTreeMap<SeriesKey, Arc<Mutex<Series>>>>,
    enabled: AtomicBool,
}

impl MetricsRegistry {
    /// Creates a registry using the supplied configuration.
    #[must_use]
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            config,
            series: RwLock::new(BTreeMap::new()),
            enabled: AtomicBool::new(true),
        }
    }

    /// Returns the registry configuration.
    #[must_use]
    pub const fn config(&self) -> MetricsConfig {
        self.config
    }

    /// Returns `true` while the registry accepts writes.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Re-enables a disabled registry.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    /// Turns every mutating call into a no-op. Never fails.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    /// Drops every series. Intended for tests and controlled restarts.
    pub fn reset(&self) {
        self.series.write().expect("metrics map poisoned").clear();
    }

    /// Increments a counter by `delta`, creating the series on first use.
    ///
    /// Writing to an existing series of a different kind is tolerated as a
    /// warn-level no-op so instrumentation can never take the host down.
    pub fn increment(&self, name: &str, delta: f64, labels: &LabelSet) {
        if !self.is_enabled() {
            return;
        }
        let cell = self.cell(name, labels, MetricKind::Counter);
        let mut series = cell.lock().expect("series poisoned");
        match &mut series.value {
            SeriesValue::Counter(total) => {
                *total += delta;
                series.updated_at = now_epoch();
            }
            other => warn_kind_mismatch(name, MetricKind::Counter, other.kind()),
        }
    }

    /// Records a histogram sample, creating the series on first use.
    pub fn record(&self, name: &str, value: f64, labels: &LabelSet) {
        if !self.is_enabled() {
            return;
        }
        let cell = self.cell(name, labels, MetricKind::Histogram);
        let mut series = cell.lock().expect("series poisoned");
        match &mut series.value {
            SeriesValue::Histogram(reservoir) => {
                reservoir.push(value);
                series.updated_at = now_epoch();
            }
            other => warn_kind_mismatch(name, MetricKind::Histogram, other.kind()),
        }
    }

    /// Sets a gauge to `value`, creating the series on first use.
    pub fn set_gauge(&self, name: &str, value: f64, labels: &LabelSet) {
        if !self.is_enabled() {
            return;
        }
        let cell = self.cell(name, labels, MetricKind::Gauge);
        let mut series = cell.lock().expect("series poisoned");
        match &mut series.value {
            SeriesValue::Gauge(current) => {
                *current = value;
                series.updated_at = now_epoch();
            }
            other => warn_kind_mismatch(name, MetricKind::Gauge, other.kind()),
        }
    }

    /// Returns the current value of the series identified by name and labels.
    ///
    /// Absent series yield `None`; lookups never fail.
    #[must_use]
    pub fn get_metric(&self, name: &str, labels: &LabelSet) -> Option<MetricSnapshot> {
        let key = SeriesKey {
            name: name.to_owned(),
            labels: labels.clone(),
        };
        let map = self.series.read().expect("metrics map poisoned");
        let cell = map.get(&key)?;
        Some(snapshot_value(&cell.lock().expect("series poisoned").value))
    }

    /// Returns a representative series for `name` regardless of labels.
    ///
    /// Prefers the unlabelled series; otherwise takes the first matching
    /// series in sorted key order. Used by alert evaluation.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<MetricSnapshot> {
        if let Some(found) = self.get_metric(name, &LabelSet::new()) {
            return Some(found);
        }
        let map = self.series.read().expect("metrics map poisoned");
        map.iter()
            .find(|(key, _)| key.name == name)
            .map(|(_, cell)| snapshot_value(&cell.lock().expect("series poisoned").value))
    }

    /// Captures a consistent-enough snapshot of every series, sorted by key.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SeriesSnapshot> {
        let map = self.series.read().expect("metrics map poisoned");
        map.iter()
            .map(|(key, cell)| {
                let series = cell.lock().expect("series poisoned");
                SeriesSnapshot {
                    name: key.name.clone(),
                    labels: key.labels.clone(),
                    value: snapshot_value(&series.value),
                    updated_at: series.updated_at,
                }
            })
            .collect()
    }

    fn cell(&self, name: &str, labels: &LabelSet, kind: MetricKind) -> Arc<Mutex<Series>> {
        let key = SeriesKey {
            name: name.to_owned(),
            labels: labels.clone(),
        };
        {
            let map = self.series.read().expect("metrics map poisoned");
            if let Some(cell) = map.get(&key) {
                return Arc::clone(cell);
            }
        }
        let mut map = self.series.write().expect("metrics map poisoned");
        let cell = map.entry(key).or_insert_with(|| {
            Arc::new(Mutex::new(Series {
                value: match kind {
                    MetricKind::Counter => SeriesValue::Counter(0.0),
                    MetricKind::Gauge => SeriesValue::Gauge(0.0),
                    MetricKind::Histogram => {
                        SeriesValue::Histogram(Reservoir::new(self.config.reservoir_capacity()))
                    }
                },
                updated_at: now_epoch(),
            }))
        });
        Arc::clone(cell)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new(MetricsConfig::default())
    }
}

fn snapshot_value(value: &SeriesValue) -> MetricSnapshot {
    match value {
        SeriesValue::Counter(total) => MetricSnapshot::Counter { value: *total },
        SeriesValue::Gauge(current) => MetricSnapshot::Gauge { value: *current },
        SeriesValue::Histogram(reservoir) => MetricSnapshot::Histogram(reservoir.stats()),
    }
}

fn warn_kind_mismatch(name: &str, expected: MetricKind, found: MetricKind) {
    warn!(
        metric = name,
        expected = expected.as_str(),
        found = found.as_str(),
        "metric kind mismatch, write ignored"
    );
}

pub(crate) fn now_epoch() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn concurrent_increments_sum_exactly() {
        let registry = Arc::new(MetricsRegistry::default());
        let labels = LabelSet::new().with("tool", "search");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let labels = labels.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        registry.increment("tool.calls.total", 1.0, &labels);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = registry
            .get_metric("tool.calls.total", &labels)
            .expect("series exists");
        assert_eq!(snapshot.scalar(), Some(8000.0));
    }

    #[test]
    fn three_labelled_increments_read_back_as_three() {
        let registry = Arc::new(MetricsRegistry::default());
        let labels = LabelSet::new().with("tool", "search");
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let labels = labels.clone();
                thread::spawn(move || registry.increment("tool.calls.total", 1.0, &labels))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let snapshot = registry.get_metric("tool.calls.total", &labels).unwrap();
        assert_eq!(snapshot.scalar(), Some(3.0));
    }

    #[test]
    fn disabled_registry_ignores_writes_without_error() {
        let registry = MetricsRegistry::default();
        registry.disable();
        for _ in 0..100 {
            registry.increment("ignored.counter", 1.0, &LabelSet::new());
        }
        assert!(registry.get_metric("ignored.counter", &LabelSet::new()).is_none());

        registry.enable();
        registry.increment("ignored.counter", 1.0, &LabelSet::new());
        assert_eq!(
            registry
                .get_metric("ignored.counter", &LabelSet::new())
                .and_then(|s| s.scalar()),
            Some(1.0)
        );
    }

    #[test]
    fn kind_mismatch_is_a_no_op() {
        let registry = MetricsRegistry::default();
        let labels = LabelSet::new();
        registry.set_gauge("queue.depth", 7.0, &labels);
        registry.increment("queue.depth", 1.0, &labels);
        assert_eq!(
            registry.get_metric("queue.depth", &labels).and_then(|s| s.scalar()),
            Some(7.0)
        );
    }

    #[test]
    fn series_are_distinct_per_label_set() {
        let registry = MetricsRegistry::default();
        registry.increment("calls", 1.0, &LabelSet::new().with("tool", "a"));
        registry.increment("calls", 2.0, &LabelSet::new().with("tool", "b"));

        assert_eq!(
            registry
                .get_metric("calls", &LabelSet::new().with("tool", "a"))
                .and_then(|s| s.scalar()),
            Some(1.0)
        );
        assert_eq!(
            registry
                .get_metric("calls", &LabelSet::new().with("tool", "b"))
                .and_then(|s| s.scalar()),
            Some(2.0)
        );
        assert!(registry.get_metric("calls", &LabelSet::new()).is_none());
        // Name-only lookup falls back to the first labelled series.
        assert!(registry.get_by_name("calls").is_some());
    }

    #[test]
    fn reset_clears_all_series() {
        let registry = MetricsRegistry::default();
        registry.increment("a", 1.0, &LabelSet::new());
        registry.record("b", 2.0, &LabelSet::new());
        registry.reset();
        assert!(registry.snapshot().is_empty());
    }
}
