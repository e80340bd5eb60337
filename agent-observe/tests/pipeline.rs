use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use agent_observe::{Hub, HubConfig};
use agent_observe::alerts::{
    Alert, AlertRule, DeliveryError, Notifier, Severity,
};
use agent_observe::primitives::LabelSet;
use agent_observe::tracing::SpanStatus;
use async_trait::async_trait;
use serde_json::Value;

struct RecordingNotifier {
    delivered: Arc<AtomicUsize>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn notify(&self, _alert: &Alert) -> Result<(), DeliveryError> {
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn step_labels(agent: &str) -> LabelSet {
    LabelSet::new().with("agent", agent)
}

#[tokio::test(flavor = "multi_thread")]
async fn instrumented_run_flows_into_metrics_traces_and_alerts() {
    let hub = Hub::new(HubConfig::default());
    let metrics = Arc::clone(hub.metrics());
    let tracer = hub.tracer().clone();

    // Simulate a short agent run: a root span with two instrumented steps.
    let root = tracer.start_span("agent.run");
    for step in 0..2 {
        let span = root.child("agent.step");
        span.set_attribute("step", step);
        metrics.increment("agent.steps", 1.0, &step_labels("planner"));
        metrics.record("agent.step_duration_ms", 12.5, &LabelSet::new());
        span.end();
    }
    root.end();

    let traces = tracer.get_traces(None);
    assert_eq!(traces.len(), 3);
    let root_record = traces
        .iter()
        .find(|record| record.name == "agent.run")
        .unwrap();
    assert_eq!(root_record.status, SpanStatus::Ok);
    let children = traces
        .iter()
        .filter(|record| record.parent_id == Some(root_record.id))
        .count();
    assert_eq!(children, 2);
    for record in &traces {
        assert!(record.duration_ms >= 0.0);
        assert_eq!(record.trace_id, root_record.trace_id);
    }

    let exported = metrics.export_prometheus();
    assert!(exported.contains("# TYPE agent_steps counter"));
    assert!(exported.contains("agent_steps{agent=\"planner\"} 2"));
    assert!(exported.contains("agent_step_duration_ms_count 2"));
}

#[tokio::test(flavor = "multi_thread")]
async fn threshold_breach_reaches_registered_notifiers_once() {
    let hub = Hub::new(HubConfig::default());
    hub.alerts()
        .add_rule(
            AlertRule::new("queue_backlog", "agent.queue_depth", 100.0)
                .with_severity(Severity::Error)
                .with_cooldown(Duration::from_secs(300)),
        )
        .unwrap();

    let delivered = Arc::new(AtomicUsize::new(0));
    hub.alerts().add_notifier(Arc::new(RecordingNotifier {
        delivered: Arc::clone(&delivered),
    }));

    hub.metrics()
        .set_gauge("agent.queue_depth", 250.0, &LabelSet::new());
    for _ in 0..5 {
        hub.tick();
    }

    let alerts = hub.alerts().get_alerts(None, None);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].rule_name, "queue_backlog");
    assert_eq!(alerts[0].severity, Severity::Error);

    // Dispatch runs on detached tasks; give it a beat.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(delivered.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_step_is_visible_in_exported_traces() {
    let hub = Hub::default();
    let tracer = hub.tracer().clone();

    let root = tracer.start_span("agent.run");
    let result: Result<(), String> = Err("tool exploded".into());
    let step = root.child("tool.call");
    step.fail_on_err(&result);
    step.end();
    root.end();

    let json = hub.tracer().export_traces();
    let records = json.as_array().unwrap();
    let failed = records
        .iter()
        .find(|record| record["name"] == "tool.call")
        .unwrap();
    assert_eq!(failed["status"], Value::String("error".into()));
    assert_eq!(failed["error"], Value::String("tool exploded".into()));

    let tree = hub.tracer().export_trace_tree();
    assert!(tree.contains("agent.run"));
    assert!(tree.contains("tool.call"));
    assert!(tree.contains('\u{2717}'));
}

#[test]
fn disabling_subsystems_makes_instrumentation_free() {
    let hub = Hub::new(HubConfig::default());
    hub.metrics().disable();
    hub.tracer().disable();
    hub.alerts().disable();

    for _ in 0..100 {
        hub.metrics().increment("quiet.counter", 1.0, &LabelSet::new());
    }
    let span = hub.tracer().start_span("quiet.span");
    span.set_attribute("ignored", true);
    span.end();

    assert!(hub.metrics().get_by_name("quiet.counter").is_none());
    assert!(hub.tracer().get_traces(None).is_empty());
    assert!(hub.alerts().check_metrics().is_empty());
}

#[test]
fn global_hub_installs_once() {
    let first = Hub::default();
    first.metrics().increment("installs", 1.0, &LabelSet::new());
    assert!(first.clone().install());
    assert!(!Hub::default().install());

    let global = Hub::global().unwrap();
    assert!(global.metrics().get_by_name("installs").is_some());
}
