//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define API metrics (requests, latency, admission outcomes)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `portal_requests_total` (counter): requests by method, status
//! - `portal_request_duration_seconds` (histogram): latency distribution
//! - `portal_rate_limited_total` (counter): requests rejected by the limiter
//! - `portal_auth_outcomes_total` (counter): authenticator outcomes
//! - `portal_recovered_panics_total` (counter): panics turned into 500s
//! - `portal_rate_limit_clients` (gauge): tracked client buckets
//! - `portal_rate_limit_evictions_total` (counter): buckets dropped by the sweep
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from within the tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start_time: Instant) {
    ::metrics::counter!(
        "portal_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!("portal_request_duration_seconds")
        .record(start_time.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    ::metrics::counter!("portal_rate_limited_total").increment(1);
}

pub fn record_auth_outcome(outcome: &'static str) {
    ::metrics::counter!("portal_auth_outcomes_total", "outcome" => outcome).increment(1);
}

pub fn record_recovered_panic() {
    ::metrics::counter!("portal_recovered_panics_total").increment(1);
}

pub fn record_rate_limit_clients(count: usize) {
    ::metrics::gauge!("portal_rate_limit_clients").set(count as f64);
}

pub fn record_rate_limit_evictions(evicted: usize) {
    ::metrics::counter!("portal_rate_limit_evictions_total").increment(evicted as u64);
}
