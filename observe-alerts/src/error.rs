//! Alerting error definitions.

use thiserror::Error;

/// Result alias for alerting operations.
pub type AlertResult<T> = Result<T, AlertError>;

/// Errors surfaced by the alert engine and notifier construction.
#[derive(Debug, Error)]
pub enum AlertError {
    /// A rule failed validation at registration time.
    #[error("invalid alert rule `{name}`: {reason}")]
    InvalidRule {
        /// The offending rule name.
        name: String,
        /// Human-readable reason for rejection.
        reason: &'static str,
    },

    /// The named rule does not exist.
    #[error("unknown alert rule `{0}`")]
    UnknownRule(String),

    /// An operator string could not be parsed.
    #[error("unknown comparison operator `{0}`")]
    UnknownOperator(String),

    /// A notifier was misconfigured.
    #[error("notifier configuration error: {reason}")]
    NotifierConfiguration {
        /// Human-readable explanation.
        reason: String,
    },
}

/// Failure to deliver one alert through one notifier.
///
/// Delivery errors are recorded and logged by the engine; they never
/// propagate to instrumentation callers.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The transport could not be reached or broke mid-conversation.
    #[error("transport failure: {reason}")]
    Transport {
        /// Human-readable explanation.
        reason: String,
    },

    /// The remote endpoint rejected the notification.
    #[error("endpoint rejected notification: {detail}")]
    Rejected {
        /// Status line or response code returned by the endpoint.
        detail: String,
    },

    /// Delivery did not complete within the configured timeout.
    #[error("delivery timed out")]
    Timeout,
}

impl DeliveryError {
    /// Builds a transport error from any displayable cause.
    #[must_use]
    pub fn transport(reason: impl ToString) -> Self {
        Self::Transport {
            reason: reason.to_string(),
        }
    }
}
