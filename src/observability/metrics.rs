//! Metrics collection and exposition.
//!
//! # Metrics
//! - `httptun_connections_accepted_total` (counter): tunnel connections accepted
//! - `httptun_active_connections` (gauge): current tunnel connection count
//! - `httptun_accept_errors_total` (counter): failed accepts, by kind
//! - `httptun_requests_total` (counter): requests by method, status
//! - `httptun_request_duration_seconds` (histogram): handler latency
//! - `httptun_ports_allocated` (gauge): public ports currently handed out
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connection_opened() {
    counter!("httptun_connections_accepted_total").increment(1);
    gauge!("httptun_active_connections").increment(1.0);
}

pub fn record_connection_closed() {
    gauge!("httptun_active_connections").decrement(1.0);
}

pub fn record_accept_error(kind: &'static str) {
    counter!("httptun_accept_errors_total", "kind" => kind).increment(1);
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "httptun_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("httptun_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn set_ports_allocated(count: usize) {
    gauge!("httptun_ports_allocated").set(count as f64);
}
