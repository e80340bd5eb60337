//! One handle bundling the registry, tracer, and alert engine.

use std::sync::{Arc, OnceLock};

use observe_alerts::{AlertEngine, AlertEngineConfig};
use observe_metrics::{HostProbe, MetricsConfig, MetricsRegistry};
use observe_tracing::{Tracer, TracerConfig};

/// Configuration for a [`Hub`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HubConfig {
    /// Metrics registry tunables.
    pub metrics: MetricsConfig,
    /// Tracer tunables.
    pub tracer: TracerConfig,
    /// Alert engine tunables.
    pub alerts: AlertEngineConfig,
}

/// Wires the metrics registry, tracer, and alert engine together.
///
/// The hub is cheap to clone; all clones share the same components. Most
/// runtimes construct one hub at startup and hand clones to subsystems, or
/// install it once via [`Hub::install`] and reach it through
/// [`Hub::global`].
#[derive(Clone, Debug)]
pub struct Hub {
    registry: Arc<MetricsRegistry>,
    tracer: Tracer,
    alerts: Arc<AlertEngine>,
    probe: Arc<HostProbe>,
}

static GLOBAL: OnceLock<Hub> = OnceLock::new();

impl Hub {
    /// Creates a hub with the supplied configuration.
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        let registry = Arc::new(MetricsRegistry::new(config.metrics));
        let alerts = Arc::new(AlertEngine::new(Arc::clone(&registry), config.alerts));
        Self {
            registry,
            tracer: Tracer::new(config.tracer),
            alerts,
            probe: Arc::new(HostProbe::new()),
        }
    }

    /// Installs this hub as the process-wide instance.
    ///
    /// Installation is explicit and happens at most once; later calls are
    /// ignored and return `false`. Nothing in the toolkit requires a
    /// global hub.
    pub fn install(self) -> bool {
        GLOBAL.set(self).is_ok()
    }

    /// Returns the installed process-wide hub, if any.
    #[must_use]
    pub fn global() -> Option<&'static Self> {
        GLOBAL.get()
    }

    /// Returns the shared metrics registry.
    #[must_use]
    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }

    /// Returns the tracer.
    #[must_use]
    pub const fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    /// Returns the alert engine.
    #[must_use]
    pub fn alerts(&self) -> &Arc<AlertEngine> {
        &self.alerts
    }

    /// Runs one maintenance beat: evicts abandoned spans, samples host
    /// system metrics, and evaluates alert rules. Call this from a
    /// periodic task.
    pub fn tick(&self) {
        self.tracer.evict_expired();
        self.registry.collect_system_metrics(self.probe.as_ref());
        self.alerts.check_metrics();
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use observe_primitives::LabelSet;

    #[test]
    fn clones_share_components() {
        let hub = Hub::new(HubConfig::default());
        let clone = hub.clone();
        hub.metrics().increment("shared.counter", 1.0, &LabelSet::new());
        assert!(clone.metrics().get_by_name("shared.counter").is_some());
    }

    #[test]
    fn tick_runs_without_rules_or_spans() {
        let hub = Hub::default();
        hub.tick();
        assert!(hub.tracer().get_traces(None).is_empty());
    }
}
