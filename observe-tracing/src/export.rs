//! Trace export surfaces: JSON array and ASCII tree.

use std::collections::HashMap;

use serde_json::Value;

use observe_primitives::{SpanId, TraceId};

use crate::span::SpanRecord;
use crate::tracer::Tracer;

impl Tracer {
    /// Exports every finished span as a JSON array, most recent trace
    /// first, with parent/child linkage expressed through `id`,
    /// `trace_id`, and `parent_id`.
    #[must_use]
    pub fn export_traces(&self) -> Value {
        serde_json::to_value(self.get_traces(None)).unwrap_or(Value::Array(Vec::new()))
    }

    /// Renders finished spans as an ASCII hierarchy grouped by trace.
    ///
    /// Traces appear most recent first; within a trace, children are
    /// ordered by start time and annotated with a status glyph and
    /// duration.
    #[must_use]
    pub fn export_trace_tree(&self) -> String {
        let spans = self.get_traces(None);
        if spans.is_empty() {
            return "No traces recorded".to_owned();
        }

        // get_traces is most-recent-first; group spans per trace in the
        // order each trace first appears.
        let mut trace_order: Vec<TraceId> = Vec::new();
        let mut by_trace: HashMap<TraceId, Vec<&SpanRecord>> = HashMap::new();
        for span in &spans {
            let entry = by_trace.entry(span.trace_id).or_default();
            if entry.is_empty() {
                trace_order.push(span.trace_id);
            }
            entry.push(span);
        }

        let mut lines = Vec::new();
        for trace_id in trace_order {
            let mut members = by_trace.remove(&trace_id).unwrap_or_default();
            members.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

            let ids: Vec<SpanId> = members.iter().map(|s| s.id).collect();
            let mut children: HashMap<Option<SpanId>, Vec<&SpanRecord>> = HashMap::new();
            for span in &members {
                // Parents outside the buffer degrade to roots.
                let parent = span
                    .parent_id
                    .filter(|p| ids.contains(p));
                children.entry(parent).or_default().push(span);
            }

            lines.push(format!("Trace {trace_id}"));
            let roots = children.get(&None).cloned().unwrap_or_default();
            for (idx, root) in roots.iter().enumerate() {
                render(root, &children, "", idx + 1 == roots.len(), &mut lines);
            }
        }
        lines.join("\n")
    }
}

fn render(
    span: &SpanRecord,
    children: &HashMap<Option<SpanId>, Vec<&SpanRecord>>,
    prefix: &str,
    last: bool,
    lines: &mut Vec<String>,
) {
    let branch = if last { "└── " } else { "├── " };
    lines.push(format!(
        "{prefix}{branch}{} ({:.1}ms) {}",
        span.name,
        span.duration_ms,
        span.status.glyph()
    ));

    let child_prefix = format!("{prefix}{}", if last { "    " } else { "│   " });
    let nested = children.get(&Some(span.id)).cloned().unwrap_or_default();
    for (idx, child) in nested.iter().enumerate() {
        render(child, children, &child_prefix, idx + 1 == nested.len(), lines);
    }
}

#[cfg(test)]
mod tests {
    use crate::{SpanStatus, Tracer};

    #[test]
    fn tree_marks_only_the_failed_child() {
        let tracer = Tracer::default();
        let parent = tracer.start_span("agent.run");
        let child = parent.child("tool.read_file");
        child.fail("permission denied");
        child.end();
        parent.end();

        let tree = tracer.export_trace_tree();
        let parent_line = tree.lines().find(|l| l.contains("agent.run")).unwrap();
        let child_line = tree.lines().find(|l| l.contains("tool.read_file")).unwrap();
        assert!(parent_line.contains('✓'));
        assert!(child_line.contains('✗'));
        // The child renders nested one level below its parent.
        assert!(child_line.starts_with("    "));
    }

    #[test]
    fn empty_tracer_reports_no_traces() {
        let tracer = Tracer::default();
        assert_eq!(tracer.export_trace_tree(), "No traces recorded");
    }

    #[test]
    fn json_export_links_parent_and_child() {
        let tracer = Tracer::default();
        let parent = tracer.start_span("agent.run");
        let parent_ctx = parent.context();
        let child = parent.child("model.call");
        child.end();
        parent.end();

        let exported = tracer.export_traces();
        let spans = exported.as_array().unwrap();
        assert_eq!(spans.len(), 2);
        let child_json = spans
            .iter()
            .find(|s| s["name"] == "model.call")
            .unwrap();
        assert_eq!(
            child_json["parent_id"],
            serde_json::to_value(parent_ctx.span_id).unwrap()
        );
        assert_eq!(
            child_json["trace_id"],
            serde_json::to_value(parent_ctx.trace_id).unwrap()
        );
    }

    #[test]
    fn explicit_ok_status_is_preserved() {
        let tracer = Tracer::default();
        let span = tracer.start_span("quiet");
        span.set_status(SpanStatus::Ok);
        span.end();
        let tree = tracer.export_trace_tree();
        assert!(tree.contains('✓'));
    }
}
