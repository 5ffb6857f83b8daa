//! Metrics collection and exposition.
//!
//! # Metrics
//! - `transport_requests_total` (counter): requests by method, status
//! - `transport_request_duration_seconds` (histogram): dispatch latency
//! - `transport_listen_total` (counter): listen attempts by outcome
//!
//! Recording is cheap and safe before [`init_metrics`]; without an installed
//! recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(error) => tracing::error!(address = %addr, error = %error, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start_time: Instant) {
    let method = method.to_string();
    let status = status.to_string();
    metrics::counter!("transport_requests_total", "method" => method.clone(), "status" => status.clone())
        .increment(1);
    metrics::histogram!("transport_request_duration_seconds", "method" => method, "status" => status)
        .record(start_time.elapsed().as_secs_f64());
}

/// `outcome` is one of `listening`, `init_failed`, `bind_failed`.
pub fn record_listen(outcome: &'static str) {
    metrics::counter!("transport_listen_total", "outcome" => outcome).increment(1);
}
