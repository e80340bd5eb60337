//! Span tracing for agent runtimes.
//!
//! Spans are opened through a [`Tracer`] and closed by dropping the returned
//! [`SpanGuard`], so every exit path, including error propagation and task
//! cancellation, finalizes the span exactly once. The "current span" is
//! never implicit global state: nesting is expressed by holding a guard or
//! by passing its [`SpanContext`] across task and suspension boundaries.

#![warn(missing_docs, clippy::pedantic)]

mod export;
mod span;
mod tracer;

pub use span::{SpanContext, SpanEvent, SpanRecord, SpanStatus};
pub use tracer::{SpanGuard, Tracer, TracerConfig};
