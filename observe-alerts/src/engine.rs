//! Rule evaluation engine and asynchronous alert dispatch.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::time::timeout;
use tracing::{debug, warn};

use observe_metrics::{HistogramStats, MetricSnapshot, MetricsRegistry};
use observe_primitives::Severity;

use crate::alert::Alert;
use crate::anomaly::AnomalyDetector;
use crate::error::{AlertError, AlertResult};
use crate::notify::Notifier;
use crate::rule::{AlertRule, HistogramStat, RuleState};

/// Tunables for the alert engine.
#[derive(Debug, Clone, Copy)]
pub struct AlertEngineConfig {
    history_capacity: usize,
    notify_timeout: Duration,
    anomaly_window: usize,
    anomaly_stddevs: f64,
}

impl AlertEngineConfig {
    /// Returns the alert-history capacity.
    #[must_use]
    pub const fn history_capacity(self) -> usize {
        self.history_capacity
    }

    /// Overrides the alert-history capacity.
    #[must_use]
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity.max(1);
        self
    }

    /// Overrides the per-notifier delivery timeout.
    #[must_use]
    pub const fn with_notify_timeout(mut self, notify_timeout: Duration) -> Self {
        self.notify_timeout = notify_timeout;
        self
    }

    /// Overrides the anomaly-detection window size.
    #[must_use]
    pub fn with_anomaly_window(mut self, window: usize) -> Self {
        self.anomaly_window = window.max(2);
        self
    }

    /// Overrides the anomaly stddev factor.
    #[must_use]
    pub const fn with_anomaly_stddevs(mut self, stddevs: f64) -> Self {
        self.anomaly_stddevs = stddevs;
        self
    }
}

impl Default for AlertEngineConfig {
    fn default() -> Self {
        Self {
            history_capacity: 1000,
            notify_timeout: Duration::from_secs(10),
            anomaly_window: 20,
            anomaly_stddevs: 3.0,
        }
    }
}

/// Baseline watch flagging statistical anomalies on one metric.
#[derive(Clone, Debug)]
pub struct AnomalyWatch {
    metric_name: String,
    severity: Severity,
    cooldown: Duration,
}

impl AnomalyWatch {
    /// Watches `metric_name` with warning severity and a one-minute
    /// cooldown.
    #[must_use]
    pub fn new(metric_name: impl Into<String>) -> Self {
        Self {
            metric_name: metric_name.into(),
            severity: Severity::Warning,
            cooldown: Duration::from_secs(60),
        }
    }

    /// Overrides the severity of fired anomaly alerts.
    #[must_use]
    pub const fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Overrides the cooldown between anomaly alerts for this metric.
    #[must_use]
    pub const fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

#[derive(Debug)]
struct RuleRuntime {
    rule: AlertRule,
    last_fired: Option<Instant>,
    breached: bool,
}

#[derive(Debug)]
struct WatchRuntime {
    watch: AnomalyWatch,
    last_fired: Option<Instant>,
}

/// Evaluates alert rules against the metrics registry and dispatches
/// fired alerts to registered notifiers.
///
/// Evaluation is cheap and lock-scoped; notification delivery runs on
/// detached tasks with its own timeout so a slow channel never stalls the
/// caller. `check_metrics` is safe to call concurrently with itself and
/// with ongoing metric writes.
pub struct AlertEngine {
    config: AlertEngineConfig,
    registry: Arc<MetricsRegistry>,
    rules: RwLock<BTreeMap<String, RuleRuntime>>,
    watches: RwLock<Vec<WatchRuntime>>,
    notifiers: RwLock<Vec<Arc<dyn Notifier>>>,
    history: Mutex<VecDeque<Alert>>,
    anomaly: Mutex<AnomalyDetector>,
    enabled: AtomicBool,
}

impl std::fmt::Debug for AlertEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AlertEngine {
    /// Creates an engine reading from the supplied registry.
    #[must_use]
    pub fn new(registry: Arc<MetricsRegistry>, config: AlertEngineConfig) -> Self {
        Self {
            config,
            registry,
            rules: RwLock::new(BTreeMap::new()),
            watches: RwLock::new(Vec::new()),
            notifiers: RwLock::new(Vec::new()),
            history: Mutex::new(VecDeque::new()),
            anomaly: Mutex::new(AnomalyDetector::new(
                config.anomaly_window,
                config.anomaly_stddevs,
            )),
            enabled: AtomicBool::new(true),
        }
    }

    /// Returns the engine configuration.
    #[must_use]
    pub const fn config(&self) -> AlertEngineConfig {
        self.config
    }

    /// Returns `true` while the engine evaluates rules.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Re-enables a disabled engine.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    /// Makes `check_metrics` a no-op. Never fails.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    /// Registers a rule, replacing any rule of the same name.
    ///
    /// # Errors
    ///
    /// Returns [`AlertError::InvalidRule`] when the rule fails validation.
    /// Registration does not require the target metric to exist yet:
    /// series are created lazily by instrumentation.
    pub fn add_rule(&self, rule: AlertRule) -> AlertResult<()> {
        rule.validate()?;
        let mut rules = self.rules.write().expect("rules poisoned");
        rules.insert(
            rule.name().to_owned(),
            RuleRuntime {
                rule,
                last_fired: None,
                breached: false,
            },
        );
        Ok(())
    }

    /// Removes a rule by name.
    ///
    /// # Errors
    ///
    /// Returns [`AlertError::UnknownRule`] when no such rule exists.
    pub fn remove_rule(&self, name: &str) -> AlertResult<()> {
        let mut rules = self.rules.write().expect("rules poisoned");
        rules
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| AlertError::UnknownRule(name.to_owned()))
    }

    /// Enables a rule at runtime.
    ///
    /// # Errors
    ///
    /// Returns [`AlertError::UnknownRule`] when no such rule exists.
    pub fn enable_rule(&self, name: &str) -> AlertResult<()> {
        self.set_rule_enabled(name, true)
    }

    /// Disables a rule at runtime; disabled rules are skipped entirely.
    ///
    /// # Errors
    ///
    /// Returns [`AlertError::UnknownRule`] when no such rule exists.
    pub fn disable_rule(&self, name: &str) -> AlertResult<()> {
        self.set_rule_enabled(name, false)
    }

    fn set_rule_enabled(&self, name: &str, enabled: bool) -> AlertResult<()> {
        let mut rules = self.rules.write().expect("rules poisoned");
        match rules.get_mut(name) {
            Some(runtime) => {
                runtime.rule.set_enabled(enabled);
                Ok(())
            }
            None => Err(AlertError::UnknownRule(name.to_owned())),
        }
    }

    /// Returns the observable state of a rule.
    #[must_use]
    pub fn rule_state(&self, name: &str) -> Option<RuleState> {
        let rules = self.rules.read().expect("rules poisoned");
        rules.get(name).map(|runtime| {
            if !runtime.rule.is_enabled() {
                RuleState::Disabled
            } else if runtime
                .last_fired
                .is_some_and(|at| at.elapsed() < runtime.rule.cooldown())
            {
                RuleState::CoolingDown
            } else if runtime.breached {
                RuleState::Breached
            } else {
                RuleState::Idle
            }
        })
    }

    /// Registers a notification handler.
    pub fn add_notifier(&self, notifier: Arc<dyn Notifier>) {
        self.notifiers.write().expect("notifiers poisoned").push(notifier);
    }

    /// Adds an anomaly watch on a metric.
    pub fn watch_anomaly(&self, watch: AnomalyWatch) {
        self.watches.write().expect("watches poisoned").push(WatchRuntime {
            watch,
            last_fired: None,
        });
    }

    /// Evaluates every enabled rule and anomaly watch against the current
    /// metric snapshot, returning the alerts fired by this call.
    ///
    /// Fired alerts are appended to the capped history and dispatched to
    /// every notifier on detached tasks; a handler failure is logged and
    /// skipped. Each rule fires at most once per cooldown window no matter
    /// how often this is called.
    pub fn check_metrics(&self) -> Vec<Alert> {
        if !self.is_enabled() {
            return Vec::new();
        }

        let mut fired = Vec::new();

        {
            let mut rules = self.rules.write().expect("rules poisoned");
            for runtime in rules.values_mut() {
                if !runtime.rule.is_enabled() {
                    continue;
                }
                let Some(value) =
                    representative_value(&self.registry, runtime.rule.metric_name(), runtime.rule.histogram_stat())
                else {
                    continue;
                };
                runtime.breached = runtime.rule.operator().evaluate(value, runtime.rule.threshold());
                if !runtime.breached {
                    continue;
                }
                let cooling = runtime
                    .last_fired
                    .is_some_and(|at| at.elapsed() < runtime.rule.cooldown());
                if cooling {
                    continue;
                }
                runtime.last_fired = Some(Instant::now());
                fired.push(Alert {
                    rule_name: runtime.rule.name().to_owned(),
                    metric_name: runtime.rule.metric_name().to_owned(),
                    severity: runtime.rule.severity(),
                    value,
                    threshold: runtime.rule.threshold(),
                    message: runtime.rule.render_message(value),
                    timestamp: now_epoch(),
                });
            }
        }

        fired.extend(self.check_anomalies());

        if !fired.is_empty() {
            let mut history = self.history.lock().expect("history poisoned");
            for alert in &fired {
                history.push_back(alert.clone());
            }
            while history.len() > self.config.history_capacity() {
                history.pop_front();
            }
            drop(history);
            self.dispatch(&fired);
        }

        fired
    }

    fn check_anomalies(&self) -> Vec<Alert> {
        let mut fired = Vec::new();
        let mut watches = self.watches.write().expect("watches poisoned");
        let mut detector = self.anomaly.lock().expect("anomaly poisoned");
        for runtime in watches.iter_mut() {
            let Some(value) =
                representative_value(&self.registry, &runtime.watch.metric_name, HistogramStat::Mean)
            else {
                continue;
            };
            let anomalous = detector.observe(&runtime.watch.metric_name, value);
            if !anomalous {
                continue;
            }
            let cooling = runtime
                .last_fired
                .is_some_and(|at| at.elapsed() < runtime.watch.cooldown);
            if cooling {
                continue;
            }
            runtime.last_fired = Some(Instant::now());
            fired.push(Alert {
                rule_name: format!("anomaly:{}", runtime.watch.metric_name),
                metric_name: runtime.watch.metric_name.clone(),
                severity: runtime.watch.severity,
                value,
                threshold: f64::NAN,
                message: format!(
                    "{} deviates from its rolling baseline (value: {value})",
                    runtime.watch.metric_name
                ),
                timestamp: now_epoch(),
            });
        }
        fired
    }

    /// Hands fired alerts to every notifier on detached tasks.
    ///
    /// Requires a tokio runtime when notifiers are registered; without one
    /// the delivery is skipped with a warning, never an error.
    fn dispatch(&self, alerts: &[Alert]) {
        let notifiers = self.notifiers.read().expect("notifiers poisoned");
        if notifiers.is_empty() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime available, skipping alert notification");
            return;
        };
        for alert in alerts {
            for notifier in notifiers.iter() {
                let notifier = Arc::clone(notifier);
                let alert = alert.clone();
                let notify_timeout = self.config.notify_timeout;
                handle.spawn(async move {
                    match timeout(notify_timeout, notifier.notify(&alert)).await {
                        Ok(Ok(())) => {
                            debug!(channel = notifier.name(), rule = %alert.rule_name, "alert delivered");
                        }
                        Ok(Err(err)) => {
                            warn!(channel = notifier.name(), rule = %alert.rule_name, error = %err, "alert delivery failed");
                        }
                        Err(_) => {
                            warn!(channel = notifier.name(), rule = %alert.rule_name, "alert delivery timed out");
                        }
                    }
                });
            }
        }
    }

    /// Returns alert history, most recent first, optionally filtered by
    /// severity and capped at `limit`.
    #[must_use]
    pub fn get_alerts(&self, severity: Option<Severity>, limit: Option<usize>) -> Vec<Alert> {
        let history = self.history.lock().expect("history poisoned");
        let mut alerts: Vec<Alert> = history
            .iter()
            .filter(|alert| severity.is_none_or(|s| alert.severity == s))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.timestamp.total_cmp(&a.timestamp));
        if let Some(limit) = limit {
            alerts.truncate(limit);
        }
        alerts
    }

    /// Clears the alert history. Rules and watches are untouched.
    pub fn clear_alerts(&self) {
        self.history.lock().expect("history poisoned").clear();
    }

    /// Drops all rules, watches, history, and baselines. For tests.
    pub fn reset(&self) {
        self.rules.write().expect("rules poisoned").clear();
        self.watches.write().expect("watches poisoned").clear();
        self.history.lock().expect("history poisoned").clear();
        self.anomaly.lock().expect("anomaly poisoned").reset();
    }
}

/// Reads the representative value of a metric for rule evaluation:
/// counter total, gauge value, or the configured histogram statistic.
fn representative_value(
    registry: &MetricsRegistry,
    metric_name: &str,
    stat: HistogramStat,
) -> Option<f64> {
    match registry.get_by_name(metric_name)? {
        MetricSnapshot::Counter { value } | MetricSnapshot::Gauge { value } => Some(value),
        MetricSnapshot::Histogram(stats) => Some(histogram_stat(&stats, stat)),
    }
}

fn histogram_stat(stats: &HistogramStats, stat: HistogramStat) -> f64 {
    match stat {
        HistogramStat::P50 => stats.p50,
        HistogramStat::P95 => stats.p95,
        HistogramStat::P99 => stats.p99,
        HistogramStat::Mean => stats.mean,
    }
}

fn now_epoch() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
