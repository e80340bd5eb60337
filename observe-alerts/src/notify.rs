//! Notification handler contract and the console implementation.

use async_trait::async_trait;
use tracing::{error, info, warn};

use observe_primitives::Severity;

use crate::alert::Alert;
use crate::error::DeliveryError;

/// Delivers one alert to one channel.
///
/// Implementations are independent concrete types behind this single
/// method; the engine treats them uniformly and isolates their failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short channel name used in delivery-failure logs.
    fn name(&self) -> &'static str;

    /// Delivers the alert.
    ///
    /// # Errors
    ///
    /// Returns a [`DeliveryError`] when the channel rejects or cannot be
    /// reached. The engine logs and skips the failure; it never propagates.
    async fn notify(&self, alert: &Alert) -> Result<(), DeliveryError>;
}

/// Emits alerts as structured tracing events at a level matching the
/// alert severity. Useful for development and as a last-resort channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl ConsoleNotifier {
    /// Creates a console notifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn notify(&self, alert: &Alert) -> Result<(), DeliveryError> {
        match alert.severity {
            Severity::Info => info!(
                rule = %alert.rule_name,
                metric = %alert.metric_name,
                value = alert.value,
                threshold = alert.threshold,
                "{}", alert.message
            ),
            Severity::Warning => warn!(
                rule = %alert.rule_name,
                metric = %alert.metric_name,
                value = alert.value,
                threshold = alert.threshold,
                "{}", alert.message
            ),
            Severity::Error | Severity::Critical => error!(
                rule = %alert.rule_name,
                metric = %alert.metric_name,
                value = alert.value,
                threshold = alert.threshold,
                severity = %alert.severity,
                "{}", alert.message
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn console_notifier_always_succeeds() {
        let alert = Alert {
            rule_name: "high_cpu".into(),
            metric_name: "system.cpu_percent".into(),
            severity: Severity::Critical,
            value: 97.0,
            threshold: 90.0,
            message: "cpu is hot".into(),
            timestamp: 0.0,
        };
        assert!(ConsoleNotifier::new().notify(&alert).await.is_ok());
    }
}
