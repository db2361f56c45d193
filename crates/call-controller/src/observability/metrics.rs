//! Prometheus metrics for the call controller.
//!
//! Conventions:
//! - counters end in `_total`
//! - durations are histograms in seconds
//! - low-cardinality labels only (operation names, outcomes, event types)

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the global Prometheus recorder and return its render handle.
///
/// # Errors
///
/// Returns `BuildError` if a recorder is already installed.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Record a database query with its outcome and duration.
pub fn record_db_query(operation: &'static str, outcome: &'static str, duration: Duration) {
    counter!(
        "cc_db_queries_total",
        "operation" => operation,
        "outcome" => outcome,
    )
    .increment(1);
    histogram!(
        "cc_db_query_duration_seconds",
        "operation" => operation,
    )
    .record(duration.as_secs_f64());
}

/// Record an inbound SFU webhook event.
pub fn record_sfu_event(event: &str, outcome: &'static str) {
    counter!(
        "cc_sfu_webhook_events_total",
        "event" => event.to_string(),
        "outcome" => outcome,
    )
    .increment(1);
}

/// Record an outbound business event delivery attempt.
pub fn record_business_event(event_type: &str, outcome: &'static str) {
    counter!(
        "cc_business_events_total",
        "event_type" => event_type.to_string(),
        "outcome" => outcome,
    )
    .increment(1);
}

/// Record an invite timeout firing (precise timer or sweep).
pub fn record_invite_timeout(source: &'static str) {
    counter!("cc_invite_timeouts_total", "source" => source).increment(1);
}
