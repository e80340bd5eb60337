//! Rule-based alerting over the metrics registry.
//!
//! The [`AlertEngine`] evaluates threshold rules and anomaly watches against
//! metric snapshots and dispatches fired alerts to registered notifiers on
//! detached tasks, so a slow channel can never stall instrumentation.

#![warn(missing_docs, clippy::pedantic)]

mod alert;
mod anomaly;
mod email;
mod engine;
mod error;
mod notify;
mod rule;
mod webhook;

pub use alert::Alert;
pub use anomaly::AnomalyDetector;
pub use email::{EmailConfig, EmailNotifier};
pub use engine::{AlertEngine, AlertEngineConfig, AnomalyWatch};
pub use error::{AlertError, AlertResult, DeliveryError};
pub use notify::{ConsoleNotifier, Notifier};
pub use rule::{AlertOperator, AlertRule, HistogramStat, RuleState};
pub use webhook::{WebhookConfig, WebhookNotifier};

pub use observe_primitives::Severity;
