//! Fired alert record.

use serde::Serialize;

use observe_primitives::Severity;

/// A single fired alert; write-once history entry.
#[derive(Clone, Debug, Serialize)]
pub struct Alert {
    /// Name of the rule (or anomaly watch) that fired.
    pub rule_name: String,
    /// Metric that breached.
    pub metric_name: String,
    /// Severity inherited from the rule.
    pub severity: Severity,
    /// Observed value at evaluation time.
    pub value: f64,
    /// Threshold the value was compared against.
    pub threshold: f64,
    /// Rendered alert message.
    pub message: String,
    /// Unix timestamp at which the alert fired.
    pub timestamp: f64,
}
