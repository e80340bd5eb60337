//! Span data model.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use observe_primitives::{SpanId, TraceId};

/// Outcome of a span.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    /// No status was recorded; resolves to `Ok` on close.
    #[default]
    Unset,
    /// The operation completed successfully.
    Ok,
    /// The operation failed.
    Error,
}

impl SpanStatus {
    /// Returns the glyph used in the ASCII tree export.
    #[must_use]
    pub const fn glyph(self) -> char {
        match self {
            Self::Ok => '✓',
            Self::Error => '✗',
            Self::Unset => '○',
        }
    }
}

/// Timestamped event attached to a span.
#[derive(Clone, Debug, Serialize)]
pub struct SpanEvent {
    /// Event name.
    pub name: String,
    /// Unix timestamp of the event.
    pub timestamp: f64,
    /// Event attributes, ordered by key.
    pub attributes: BTreeMap<String, Value>,
}

/// A finished span as held in the tracer's bounded buffer and exported.
#[derive(Clone, Debug, Serialize)]
pub struct SpanRecord {
    /// Span identifier.
    pub id: SpanId,
    /// Trace this span belongs to.
    pub trace_id: TraceId,
    /// Parent span within the same trace, if any. Non-owning; used only
    /// for tree reconstruction.
    pub parent_id: Option<SpanId>,
    /// Operation name.
    pub name: String,
    /// Unix timestamp at which the span opened.
    pub start_time: f64,
    /// Unix timestamp at which the span closed.
    pub end_time: f64,
    /// Wall-clock duration in milliseconds; never negative.
    pub duration_ms: f64,
    /// Span attributes, ordered by key.
    pub attributes: BTreeMap<String, Value>,
    /// Events recorded during the span, in order.
    pub events: Vec<SpanEvent>,
    /// Final status.
    pub status: SpanStatus,
    /// Error detail captured when the status is `Error`.
    pub error: Option<String>,
}

/// Copyable token identifying a live span.
///
/// Carried explicitly through the logical call chain (across `.await`
/// points and task spawns) so concurrent operations each see their own
/// nesting.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct SpanContext {
    /// Trace the span belongs to.
    pub trace_id: TraceId,
    /// The span itself.
    pub span_id: SpanId,
}
