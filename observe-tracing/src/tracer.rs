//! Tracer and scoped span guards.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tracing::debug;

use observe_primitives::{SpanId, TraceId};

use crate::span::{SpanContext, SpanEvent, SpanRecord, SpanStatus};

/// Retention limits for the tracer.
#[derive(Debug, Clone, Copy)]
pub struct TracerConfig {
    max_finished: usize,
    max_active: usize,
    max_span_age: Duration,
}

impl TracerConfig {
    /// Creates a configuration with explicit retention limits.
    #[must_use]
    pub fn new(max_finished: usize, max_active: usize, max_span_age: Duration) -> Self {
        Self {
            max_finished: max_finished.max(1),
            max_active: max_active.max(1),
            max_span_age,
        }
    }

    /// Returns the finished-span buffer capacity.
    #[must_use]
    pub const fn max_finished(self) -> usize {
        self.max_finished
    }

    /// Returns the active-span table capacity.
    #[must_use]
    pub const fn max_active(self) -> usize {
        self.max_active
    }

    /// Returns the age beyond which unclosed spans are evicted.
    #[must_use]
    pub const fn max_span_age(self) -> Duration {
        self.max_span_age
    }
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            max_finished: 2048,
            max_active: 4096,
            max_span_age: Duration::from_secs(300),
        }
    }
}

#[derive(Debug)]
struct ActiveSpan {
    trace_id: TraceId,
    parent_id: Option<SpanId>,
    name: String,
    start_time: f64,
    started: Instant,
    attributes: BTreeMap<String, Value>,
    events: Vec<SpanEvent>,
    status: SpanStatus,
    error: Option<String>,
}

#[derive(Debug, Default)]
struct TracerInner {
    active: HashMap<SpanId, ActiveSpan>,
    // Insertion order of active spans, for capacity eviction.
    order: VecDeque<SpanId>,
    finished: VecDeque<SpanRecord>,
}

#[derive(Debug)]
pub(crate) struct TracerShared {
    config: TracerConfig,
    enabled: AtomicBool,
    inner: RwLock<TracerInner>,
}

/// Creates and finalizes spans; owns the bounded span buffers.
///
/// Cloning is cheap and clones share state, so one tracer can be handed to
/// every instrumented component.
#[derive(Clone, Debug)]
pub struct Tracer {
    shared: Arc<TracerShared>,
}

impl Tracer {
    /// Creates a tracer with the supplied retention configuration.
    #[must_use]
    pub fn new(config: TracerConfig) -> Self {
        Self {
            shared: Arc::new(TracerShared {
                config,
                enabled: AtomicBool::new(true),
                inner: RwLock::new(TracerInner::default()),
            }),
        }
    }

    /// Returns the tracer configuration.
    #[must_use]
    pub fn config(&self) -> TracerConfig {
        self.shared.config
    }

    /// Returns `true` while the tracer records spans.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }

    /// Re-enables a disabled tracer.
    pub fn enable(&self) {
        self.shared.enabled.store(true, Ordering::Release);
    }

    /// Makes every span operation an inert no-op. Never fails.
    pub fn disable(&self) {
        self.shared.enabled.store(false, Ordering::Release);
    }

    /// Clears all finished and active spans. Intended for tests.
    pub fn reset(&self) {
        let mut inner = self.shared.inner.write().expect("tracer poisoned");
        inner.active.clear();
        inner.order.clear();
        inner.finished.clear();
    }

    /// Opens a root span of a new trace.
    #[must_use]
    pub fn start_span(&self, name: impl Into<String>) -> SpanGuard {
        self.open(name.into(), None, None, BTreeMap::new())
    }

    /// Opens a root span carrying initial attributes.
    #[must_use]
    pub fn start_span_with(
        &self,
        name: impl Into<String>,
        attributes: BTreeMap<String, Value>,
    ) -> SpanGuard {
        self.open(name.into(), None, None, attributes)
    }

    /// Opens a child span under an explicitly supplied parent context.
    ///
    /// This is the cross-task form of [`SpanGuard::child`]: pass the parent's
    /// [`SpanContext`] into the spawned task or resumed continuation.
    #[must_use]
    pub fn start_child(&self, name: impl Into<String>, parent: SpanContext) -> SpanGuard {
        self.open(
            name.into(),
            Some(parent.trace_id),
            Some(parent.span_id),
            BTreeMap::new(),
        )
    }

    /// Returns finished spans ordered by start time, most recent first.
    #[must_use]
    pub fn get_traces(&self, limit: Option<usize>) -> Vec<SpanRecord> {
        let inner = self.shared.inner.read().expect("tracer poisoned");
        let mut spans: Vec<SpanRecord> = inner.finished.iter().cloned().collect();
        spans.sort_by(|a, b| b.start_time.total_cmp(&a.start_time));
        if let Some(limit) = limit {
            spans.truncate(limit);
        }
        spans
    }

    /// Finalizes active spans older than the configured maximum age with an
    /// `Error` status. Call periodically to bound memory when instrumented
    /// code leaks guards.
    pub fn evict_expired(&self) {
        let max_age = self.shared.config.max_span_age();
        let mut inner = self.shared.inner.write().expect("tracer poisoned");
        let expired: Vec<SpanId> = inner
            .active
            .iter()
            .filter(|(_, span)| span.started.elapsed() > max_age)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            finish_locked(&mut inner, &self.shared.config, id, None, Some("span evicted".into()));
        }
    }

    fn open(
        &self,
        name: String,
        trace_id: Option<TraceId>,
        parent_id: Option<SpanId>,
        attributes: BTreeMap<String, Value>,
    ) -> SpanGuard {
        let context = SpanContext {
            trace_id: trace_id.unwrap_or_else(TraceId::random),
            span_id: SpanId::random(),
        };
        if !self.is_enabled() {
            return SpanGuard {
                shared: None,
                context,
                closed: true,
            };
        }

        let span = ActiveSpan {
            trace_id: context.trace_id,
            parent_id,
            name,
            start_time: now_epoch(),
            started: Instant::now(),
            attributes,
            events: Vec::new(),
            status: SpanStatus::Unset,
            error: None,
        };

        let mut inner = self.shared.inner.write().expect("tracer poisoned");
        inner.active.insert(context.span_id, span);
        inner.order.push_back(context.span_id);
        while inner.active.len() > self.shared.config.max_active() {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            if inner.active.contains_key(&oldest) {
                finish_locked(
                    &mut inner,
                    &self.shared.config,
                    oldest,
                    None,
                    Some("span evicted".into()),
                );
            }
        }

        SpanGuard {
            shared: Some(Arc::clone(&self.shared)),
            context,
            closed: false,
        }
    }

    pub(crate) fn from_shared(shared: Arc<TracerShared>) -> Self {
        Self { shared }
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new(TracerConfig::default())
    }
}

/// Scoped handle to a live span.
///
/// The guard is an owned value: hold it across `.await` points, move it into
/// the operation that owns the span, and drop it (or call [`end`]) to
/// finalize. Dropping on an error path closes the span just the same, so no
/// exit path leaves a span open.
///
/// [`end`]: SpanGuard::end
#[derive(Debug)]
pub struct SpanGuard {
    shared: Option<Arc<TracerShared>>,
    context: SpanContext,
    closed: bool,
}

impl SpanGuard {
    /// Returns the copyable context token for this span.
    #[must_use]
    pub const fn context(&self) -> SpanContext {
        self.context
    }

    /// Opens a child span nested under this one.
    #[must_use]
    pub fn child(&self, name: impl Into<String>) -> SpanGuard {
        match &self.shared {
            Some(shared) => {
                Tracer::from_shared(Arc::clone(shared)).start_child(name, self.context)
            }
            None => SpanGuard {
                shared: None,
                context: SpanContext {
                    trace_id: self.context.trace_id,
                    span_id: SpanId::random(),
                },
                closed: true,
            },
        }
    }

    /// Sets an attribute on the span.
    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        self.with_active(move |span| {
            span.attributes.insert(key, value);
        });
    }

    /// Records a named event at the current time.
    pub fn add_event(&self, name: impl Into<String>) {
        self.add_event_with(name, BTreeMap::new());
    }

    /// Records a named event carrying attributes.
    pub fn add_event_with(&self, name: impl Into<String>, attributes: BTreeMap<String, Value>) {
        let event = SpanEvent {
            name: name.into(),
            timestamp: now_epoch(),
            attributes,
        };
        self.with_active(move |span| span.events.push(event));
    }

    /// Sets the span status explicitly.
    pub fn set_status(&self, status: SpanStatus) {
        self.with_active(move |span| span.status = status);
    }

    /// Marks the span failed, capturing the error detail.
    pub fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        self.with_active(move |span| {
            span.status = SpanStatus::Error;
            span.error = Some(message);
        });
    }

    /// Captures a failure from a result without consuming it, leaving
    /// control flow untouched. `Ok` results leave the span unchanged.
    pub fn fail_on_err<T, E: Display>(&self, result: &Result<T, E>) {
        if let Err(err) = result {
            self.fail(err.to_string());
        }
    }

    /// Finalizes the span now instead of at scope exit.
    pub fn end(mut self) {
        self.finalize();
    }

    fn with_active(&self, apply: impl FnOnce(&mut ActiveSpan)) {
        let Some(shared) = &self.shared else {
            return;
        };
        let mut inner = shared.inner.write().expect("tracer poisoned");
        match inner.active.get_mut(&self.context.span_id) {
            Some(span) => apply(span),
            // Already evicted by the watchdog; tolerate quietly.
            None => debug!(span = %self.context.span_id, "span no longer active"),
        }
    }

    fn finalize(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let Some(shared) = self.shared.take() else {
            return;
        };
        let mut inner = shared.inner.write().expect("tracer poisoned");
        finish_locked(&mut inner, &shared.config, self.context.span_id, None, None);
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        // A panic unwinding through the scope closes the span as failed,
        // like any other error exit. An explicit earlier failure wins.
        if !self.closed && std::thread::panicking() {
            self.with_active(|span| {
                if span.status != SpanStatus::Error {
                    span.status = SpanStatus::Error;
                    if span.error.is_none() {
                        span.error = Some("panic".to_owned());
                    }
                }
            });
        }
        self.finalize();
    }
}

/// Removes a span from the active table and appends its finished record.
///
/// Finishing a span that is no longer active (double close, already
/// evicted) is a tolerated no-op.
fn finish_locked(
    inner: &mut TracerInner,
    config: &TracerConfig,
    span_id: SpanId,
    status_override: Option<SpanStatus>,
    error_override: Option<String>,
) {
    let Some(span) = inner.active.remove(&span_id) else {
        debug!(span = %span_id, "span already closed");
        return;
    };
    inner.order.retain(|id| *id != span_id);

    let error = error_override.or(span.error);
    let status = status_override.unwrap_or(match span.status {
        SpanStatus::Unset => {
            if error.is_some() {
                SpanStatus::Error
            } else {
                SpanStatus::Ok
            }
        }
        explicit => explicit,
    });

    let elapsed = span.started.elapsed();
    let record = SpanRecord {
        id: span_id,
        trace_id: span.trace_id,
        parent_id: span.parent_id,
        name: span.name,
        start_time: span.start_time,
        end_time: span.start_time + elapsed.as_secs_f64(),
        duration_ms: elapsed.as_secs_f64() * 1000.0,
        attributes: span.attributes,
        events: span.events,
        status,
        error,
    };

    inner.finished.push_back(record);
    while inner.finished.len() > config.max_finished() {
        inner.finished.pop_front();
    }
}

fn now_epoch() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
