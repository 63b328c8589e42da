//! Gateway metrics
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! binary installs a recorder.

use std::time::Duration;

/// Methods the dispatcher knows about. Anything else is recorded as `other`
/// so client-supplied method names can't blow up label cardinality.
const KNOWN_METHODS: &[&str] = &[
    "initialize",
    "notifications/initialized",
    "tools/list",
    "tools/call",
];

fn method_label(method: &str) -> &'static str {
    KNOWN_METHODS
        .iter()
        .find(|m| **m == method)
        .copied()
        .unwrap_or("other")
}

/// Record one dispatched JSON-RPC request
pub fn record_rpc_request(method: &str, outcome: &'static str) {
    metrics::counter!(
        "clevermcp_rpc_requests_total",
        "method" => method_label(method),
        "outcome" => outcome,
    )
    .increment(1);
}

/// Record a tool execution
pub fn record_tool_call(tool: &str, duration: Duration, ok: bool) {
    metrics::histogram!(
        "clevermcp_tool_call_duration_seconds",
        "tool" => tool.to_string(),
        "status" => if ok { "ok" } else { "error" },
    )
    .record(duration.as_secs_f64());
}

/// Update the number of open SSE streams
pub fn set_sse_sessions(active: usize) {
    metrics::gauge!("clevermcp_sse_sessions_active").set(active as f64);
}

pub fn record_heartbeat() {
    metrics::counter!("clevermcp_sse_heartbeats_total").increment(1);
}
