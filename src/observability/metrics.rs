//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (requests, latency, tunnels, bytes, errors)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by kind (http/connect), status
//! - `proxy_request_duration_seconds` (histogram): time to response head
//! - `proxy_auth_failures_total` (counter): rejected credentials
//! - `proxy_tunnels_active` (gauge): CONNECT sessions, dial to teardown
//! - `proxy_tunnel_bytes_total` (counter): tunnel bytes by direction
//! - `proxy_stream_errors_total` (counter): mid-flight copy failures
//! - `proxy_active_connections` (gauge): accepted client connections
//!
//! # Design Decisions
//! - Recording without an installed exporter is a no-op
//! - Labels are low-cardinality; targets are never used as labels

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished request (relay or tunnel handshake).
pub fn record_request(kind: &'static str, status: u16, start: Instant) {
    counter!("proxy_requests_total", "kind" => kind, "status" => status.to_string()).increment(1);
    histogram!("proxy_request_duration_seconds", "kind" => kind)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_auth_failure() {
    counter!("proxy_auth_failures_total").increment(1);
}

pub fn record_stream_error(kind: &'static str) {
    counter!("proxy_stream_errors_total", "kind" => kind).increment(1);
}

pub fn tunnel_closed(to_target: u64, to_client: u64) {
    counter!("proxy_tunnel_bytes_total", "direction" => "upstream").increment(to_target);
    counter!("proxy_tunnel_bytes_total", "direction" => "downstream").increment(to_client);
}

pub fn set_active_connections(count: u64) {
    gauge!("proxy_active_connections").set(count as f64);
}

pub fn set_active_tunnels(count: u64) {
    gauge!("proxy_tunnels_active").set(count as f64);
}
