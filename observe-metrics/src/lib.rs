//! In-memory metrics registry for instrumenting agent runtimes.
//!
//! Counters, histograms, and gauges keyed by `(name, label-set)`, with
//! Prometheus-text and JSON export surfaces and an optional host system
//! probe. Everything is bounded and ephemeral; nothing here performs I/O
//! apart from the probe reading `/proc`.

#![warn(missing_docs, clippy::pedantic)]

mod export;
mod registry;
mod reservoir;
mod system;

pub use registry::{
    MetricKind, MetricSnapshot, MetricsConfig, MetricsRegistry, SeriesSnapshot,
};
pub use reservoir::{HistogramStats, Reservoir};
pub use system::{HostProbe, SystemProbe, SystemSample};
