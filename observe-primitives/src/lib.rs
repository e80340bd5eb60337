//! Shared primitives for the agent observability toolkit.
//!
//! Identifier newtypes, the ordered label mapping that keys metric series,
//! and the severity scale shared by alerting and notification code.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod ids;
mod labels;
mod severity;

pub use error::{Error, Result};
pub use ids::{SpanId, TraceId};
pub use labels::LabelSet;
pub use severity::Severity;
