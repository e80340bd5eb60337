//! Instrumented agent-run example: metrics, spans, and an alert rule end
//! to end, with both exports printed at the end.

use std::time::Duration;

use agent_observe::alerts::{AlertRule, ConsoleNotifier, Severity};
use agent_observe::primitives::LabelSet;
use agent_observe::{Hub, HubConfig};
use anyhow::Result;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let hub = Hub::new(HubConfig::default());
    hub.alerts().add_rule(
        AlertRule::new("slow_steps", "agent.step_duration_ms", 150.0)
            .with_severity(Severity::Warning)
            .with_message_template("{metric} p95 hit {value}ms (limit {threshold}ms)"),
    )?;
    hub.alerts().add_notifier(std::sync::Arc::new(ConsoleNotifier::new()));

    info!("=== agent-observe: instrumented run ===");

    let root = hub.tracer().start_span("agent.run");
    for step in 0..5_u32 {
        let span = root.child("agent.step");
        span.set_attribute("step", step);

        // Simulated work; the last step is slow and fails.
        let elapsed_ms = if step == 4 { 480.0 } else { 40.0 + f64::from(step) };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let labels = LabelSet::new().with("agent", "planner");
        hub.metrics().increment("agent.steps", 1.0, &labels);
        hub.metrics()
            .record("agent.step_duration_ms", elapsed_ms, &LabelSet::new());

        let outcome: Result<(), String> = if step == 4 {
            Err("tool budget exhausted".into())
        } else {
            Ok(())
        };
        span.fail_on_err(&outcome);
        span.end();
    }
    root.end();

    // One maintenance beat: host gauges, span eviction, rule evaluation.
    hub.tick();

    println!("\n{}", hub.tracer().export_trace_tree());
    println!("\n{}", hub.metrics().export_prometheus());

    // Let the console notifier finish before the runtime shuts down.
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
