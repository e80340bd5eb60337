//! Threshold alert rules.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use observe_primitives::Severity;

use crate::error::AlertError;

/// Comparison operator of a threshold rule.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum AlertOperator {
    /// Fire when the value exceeds the threshold.
    #[serde(rename = ">")]
    GreaterThan,
    /// Fire when the value is below the threshold.
    #[serde(rename = "<")]
    LessThan,
    /// Fire when the value is at least the threshold.
    #[serde(rename = ">=")]
    GreaterEqual,
    /// Fire when the value is at most the threshold.
    #[serde(rename = "<=")]
    LessEqual,
    /// Fire when the value equals the threshold.
    #[serde(rename = "==")]
    Equals,
    /// Fire when the value differs from the threshold.
    #[serde(rename = "!=")]
    NotEquals,
}

impl AlertOperator {
    /// Returns the operator symbol.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GreaterThan => ">",
            Self::LessThan => "<",
            Self::GreaterEqual => ">=",
            Self::LessEqual => "<=",
            Self::Equals => "==",
            Self::NotEquals => "!=",
        }
    }

    /// Evaluates `value <op> threshold`.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn evaluate(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => value > threshold,
            Self::LessThan => value < threshold,
            Self::GreaterEqual => value >= threshold,
            Self::LessEqual => value <= threshold,
            Self::Equals => value == threshold,
            Self::NotEquals => value != threshold,
        }
    }
}

impl FromStr for AlertOperator {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">" => Ok(Self::GreaterThan),
            "<" => Ok(Self::LessThan),
            ">=" => Ok(Self::GreaterEqual),
            "<=" => Ok(Self::LessEqual),
            "==" => Ok(Self::Equals),
            "!=" => Ok(Self::NotEquals),
            other => Err(AlertError::UnknownOperator(other.to_owned())),
        }
    }
}

/// Statistic a rule compares against when its target is a histogram.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistogramStat {
    /// Median of the retained samples.
    P50,
    /// 95th percentile (default).
    #[default]
    P95,
    /// 99th percentile.
    P99,
    /// Mean over all recorded values.
    Mean,
}

/// Threshold rule evaluated against a metric snapshot.
///
/// Rules deserialize from configuration files:
///
/// ```json
/// {"name": "high_cpu", "metric_name": "system.cpu_percent",
///  "threshold": 90.0, "operator": ">", "severity": "warning",
///  "cooldown_seconds": 60, "enabled": true}
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AlertRule {
    name: String,
    metric_name: String,
    threshold: f64,
    #[serde(default = "default_operator")]
    operator: AlertOperator,
    #[serde(default = "default_severity")]
    severity: Severity,
    #[serde(default)]
    message_template: Option<String>,
    #[serde(default = "default_cooldown")]
    cooldown_seconds: f64,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    histogram_stat: HistogramStat,
}

const fn default_operator() -> AlertOperator {
    AlertOperator::GreaterThan
}

const fn default_severity() -> Severity {
    Severity::Warning
}

const fn default_cooldown() -> f64 {
    300.0
}

const fn default_enabled() -> bool {
    true
}

impl AlertRule {
    /// Creates a rule firing when the metric exceeds `threshold`, with
    /// warning severity and a five-minute cooldown.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        metric_name: impl Into<String>,
        threshold: f64,
    ) -> Self {
        Self {
            name: name.into(),
            metric_name: metric_name.into(),
            threshold,
            operator: default_operator(),
            severity: default_severity(),
            message_template: None,
            cooldown_seconds: default_cooldown(),
            enabled: true,
            histogram_stat: HistogramStat::default(),
        }
    }

    /// Overrides the comparison operator.
    #[must_use]
    pub const fn with_operator(mut self, operator: AlertOperator) -> Self {
        self.operator = operator;
        self
    }

    /// Overrides the severity.
    #[must_use]
    pub const fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Sets a message template; `{metric}`, `{value}`, and `{threshold}`
    /// placeholders are substituted when the rule fires.
    #[must_use]
    pub fn with_message_template(mut self, template: impl Into<String>) -> Self {
        self.message_template = Some(template.into());
        self
    }

    /// Overrides the cooldown window.
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown_seconds = cooldown.as_secs_f64();
        self
    }

    /// Overrides the histogram statistic compared against the threshold.
    #[must_use]
    pub const fn with_histogram_stat(mut self, stat: HistogramStat) -> Self {
        self.histogram_stat = stat;
        self
    }

    /// Creates the rule disabled; it is skipped until enabled.
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Returns the rule name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the monitored metric name.
    #[must_use]
    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    /// Returns the threshold value.
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Returns the comparison operator.
    #[must_use]
    pub const fn operator(&self) -> AlertOperator {
        self.operator
    }

    /// Returns the severity attached to fired alerts.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.severity
    }

    /// Returns the message template, if configured.
    #[must_use]
    pub fn message_template(&self) -> Option<&str> {
        self.message_template.as_deref()
    }

    /// Returns the cooldown window.
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.cooldown_seconds)
    }

    /// Returns `true` while the rule participates in evaluation.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Returns the statistic used for histogram targets.
    #[must_use]
    pub const fn histogram_stat(&self) -> HistogramStat {
        self.histogram_stat
    }

    /// Renders the alert message for a breaching value.
    #[must_use]
    pub fn render_message(&self, value: f64) -> String {
        match &self.message_template {
            Some(template) => template
                .replace("{metric}", &self.metric_name)
                .replace("{value}", &value.to_string())
                .replace("{threshold}", &self.threshold.to_string()),
            None => format!(
                "{} is {} (threshold: {} {})",
                self.metric_name,
                value,
                self.operator.as_str(),
                self.threshold
            ),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), AlertError> {
        if self.name.trim().is_empty() {
            return Err(AlertError::InvalidRule {
                name: self.name.clone(),
                reason: "rule name cannot be empty",
            });
        }
        if self.metric_name.trim().is_empty() {
            return Err(AlertError::InvalidRule {
                name: self.name.clone(),
                reason: "metric name cannot be empty",
            });
        }
        if !self.threshold.is_finite() {
            return Err(AlertError::InvalidRule {
                name: self.name.clone(),
                reason: "threshold must be finite",
            });
        }
        if !self.cooldown_seconds.is_finite() || self.cooldown_seconds < 0.0 {
            return Err(AlertError::InvalidRule {
                name: self.name.clone(),
                reason: "cooldown must be a non-negative number of seconds",
            });
        }
        Ok(())
    }
}

/// Observable evaluation state of one rule.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RuleState {
    /// The rule is switched off and skipped entirely.
    Disabled,
    /// The rule is armed and its condition did not hold last check.
    Idle,
    /// The condition held on the most recent check.
    Breached,
    /// The rule fired recently and is suppressed until the cooldown ends.
    CoolingDown,
}
