//! Prometheus-text and JSON export surfaces.

use serde_json::{Map, Value, json};

use crate::registry::{MetricSnapshot, MetricsRegistry, SeriesSnapshot};

impl MetricsRegistry {
    /// Renders every series in the Prometheus exposition format.
    ///
    /// Counters and gauges emit `# HELP`, `# TYPE`, and one value line per
    /// series; histograms emit `_count`, `_sum`, and `_p50`/`_p95`/`_p99`
    /// suffixed lines. Metric-name dots become underscores and groups are
    /// separated by blank lines.
    #[must_use]
    pub fn export_prometheus(&self) -> String {
        let mut lines = Vec::new();
        for group in group_by_name(self.snapshot()) {
            let name = &group[0].name;
            let prom_name = name.replace('.', "_");
            let kind = group[0].value.kind();
            lines.push(format!("# HELP {prom_name} {name}"));
            lines.push(format!("# TYPE {prom_name} {}", kind.as_str()));
            for series in &group {
                let labels = series.labels.render();
                match &series.value {
                    MetricSnapshot::Counter { value } | MetricSnapshot::Gauge { value } => {
                        lines.push(format!("{prom_name}{labels} {value}"));
                    }
                    MetricSnapshot::Histogram(stats) => {
                        if stats.count == 0 {
                            continue;
                        }
                        lines.push(format!("{prom_name}_count{labels} {}", stats.count));
                        lines.push(format!("{prom_name}_sum{labels} {}", stats.sum));
                        lines.push(format!("{prom_name}_p50{labels} {}", stats.p50));
                        lines.push(format!("{prom_name}_p95{labels} {}", stats.p95));
                        lines.push(format!("{prom_name}_p99{labels} {}", stats.p99));
                    }
                }
            }
            lines.push(String::new());
        }
        lines.join("\n")
    }

    /// Exports every series as a JSON object keyed by series key.
    ///
    /// Counters and gauges map to `{type, value}`; histograms to
    /// `{type, count, sum, p50, p95, p99}`.
    #[must_use]
    pub fn export_json(&self) -> Value {
        let mut out = Map::new();
        for series in self.snapshot() {
            let entry = match &series.value {
                MetricSnapshot::Counter { value } => json!({
                    "type": "counter",
                    "value": value,
                    "labels": series.labels,
                    "timestamp": series.updated_at,
                }),
                MetricSnapshot::Gauge { value } => json!({
                    "type": "gauge",
                    "value": value,
                    "labels": series.labels,
                    "timestamp": series.updated_at,
                }),
                MetricSnapshot::Histogram(stats) => json!({
                    "type": "histogram",
                    "count": stats.count,
                    "sum": stats.sum,
                    "p50": stats.p50,
                    "p95": stats.p95,
                    "p99": stats.p99,
                    "labels": series.labels,
                    "timestamp": series.updated_at,
                }),
            };
            out.insert(series.key(), entry);
        }
        Value::Object(out)
    }
}

/// Splits the sorted snapshot into runs sharing a metric name.
fn group_by_name(snapshot: Vec<SeriesSnapshot>) -> Vec<Vec<SeriesSnapshot>> {
    let mut groups: Vec<Vec<SeriesSnapshot>> = Vec::new();
    for series in snapshot {
        match groups.last_mut() {
            Some(group) if group[0].name == series.name => group.push(series),
            _ => groups.push(vec![series]),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use observe_primitives::LabelSet;

    use crate::MetricsRegistry;

    #[test]
    fn prometheus_format_for_counter_and_gauge() {
        let registry = MetricsRegistry::default();
        registry.increment("requests.total", 42.0, &LabelSet::new().with("method", "GET"));
        registry.set_gauge("active.connections", 7.0, &LabelSet::new());

        let text = registry.export_prometheus();
        assert!(text.contains("# HELP active_connections active.connections"));
        assert!(text.contains("# TYPE active_connections gauge"));
        assert!(text.contains("active_connections 7"));
        assert!(text.contains("# TYPE requests_total counter"));
        assert!(text.contains("requests_total{method=\"GET\"} 42"));
    }

    #[test]
    fn prometheus_format_for_histogram() {
        let registry = MetricsRegistry::default();
        for v in [10.0, 20.0, 30.0, 40.0] {
            registry.record("latency.ms", v, &LabelSet::new());
        }

        let text = registry.export_prometheus();
        assert!(text.contains("# TYPE latency_ms histogram"));
        assert!(text.contains("latency_ms_count 4"));
        assert!(text.contains("latency_ms_sum 100"));
        assert!(text.contains("latency_ms_p50 "));
        assert!(text.contains("latency_ms_p95 "));
        assert!(text.contains("latency_ms_p99 "));
    }

    #[test]
    fn json_histogram_reaggregates_count_and_sum() {
        let registry = MetricsRegistry::default();
        for v in [1.5, 2.5, 6.0] {
            registry.record("latency.ms", v, &LabelSet::new());
        }

        let exported = registry.export_json();
        let entry = &exported["latency.ms"];
        assert_eq!(entry["type"], "histogram");
        assert_eq!(entry["count"], 3);
        assert!((entry["sum"].as_f64().unwrap() - 10.0).abs() < f64::EPSILON);
        let p50 = entry["p50"].as_f64().unwrap();
        let p95 = entry["p95"].as_f64().unwrap();
        let p99 = entry["p99"].as_f64().unwrap();
        assert!(p50 <= p95 && p95 <= p99);
    }

    #[test]
    fn json_keys_include_labels() {
        let registry = MetricsRegistry::default();
        registry.increment("calls", 1.0, &LabelSet::new().with("tool", "search"));
        let exported = registry.export_json();
        assert!(exported.get("calls{tool=\"search\"}").is_some());
    }
}
