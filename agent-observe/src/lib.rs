//! In-process observability toolkit for autonomous agent runtimes.
//!
//! Depend on this crate via `cargo add agent-observe`. It bundles the
//! metrics, tracing, and alerting crates behind feature flags and ships the
//! [`Hub`] wiring the three together for runtimes that want one handle.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use observe_primitives as primitives;

/// Metrics registry and exporters (enabled by `metrics` feature).
#[cfg(feature = "metrics")]
pub use observe_metrics as metrics;

/// Span tracing (enabled by `tracing` feature).
#[cfg(feature = "tracing")]
pub use observe_tracing as tracing;

/// Rule-based alerting (enabled by `alerts` feature).
#[cfg(feature = "alerts")]
pub use observe_alerts as alerts;

#[cfg(all(feature = "metrics", feature = "tracing", feature = "alerts"))]
mod hub;

#[cfg(all(feature = "metrics", feature = "tracing", feature = "alerts"))]
pub use hub::{Hub, HubConfig};
