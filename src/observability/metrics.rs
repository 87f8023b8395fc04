//! Metrics collection and exposition.
//!
//! # Metrics
//! - `inbox_requests_total` (counter): operation outcomes by origin
//! - `inbox_retries_total` (counter): retries scheduled per operation
//! - `inbox_circuit_transitions_total` (counter): breaker state changes
//! - `inbox_cache_fallbacks_total` (counter): degraded answers by freshness
//! - `inbox_reconnect_attempts_total` (counter): scheduled reconnects
//! - `inbox_connection_status` (gauge): 0=disconnected .. 4=exhausted
//! - `inbox_push_events_total` (counter): inbound push events by kind
//!
//! # Design Decisions
//! - Labels carry the operation class only, never usernames
//! - Without an installed recorder every call is a no-op

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::CircuitStatus;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(operation: &'static str, outcome: &'static str) {
    metrics::counter!("inbox_requests_total", "operation" => operation, "outcome" => outcome)
        .increment(1);
}

pub fn record_retry(operation: &'static str) {
    metrics::counter!("inbox_retries_total", "operation" => operation).increment(1);
}

pub fn record_circuit_transition(operation: &str, state: CircuitStatus) {
    metrics::counter!(
        "inbox_circuit_transitions_total",
        "operation" => operation.to_string(),
        "state" => state.as_str()
    )
    .increment(1);
}

pub fn record_cache_fallback(operation: &'static str, fresh: bool) {
    let freshness = if fresh { "fresh" } else { "stale" };
    metrics::counter!("inbox_cache_fallbacks_total", "operation" => operation, "freshness" => freshness)
        .increment(1);
}

pub fn record_reconnect_attempt() {
    metrics::counter!("inbox_reconnect_attempts_total").increment(1);
}

pub fn record_connection_status(code: u8) {
    metrics::gauge!("inbox_connection_status").set(f64::from(code));
}

pub fn record_push_event(kind: &'static str) {
    metrics::counter!("inbox_push_events_total", "kind" => kind).increment(1);
}
