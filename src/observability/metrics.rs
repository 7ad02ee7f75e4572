//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_rate_limited_total` (counter): rejections by bucket
//! - `gateway_daemon_spawns_total` / `gateway_daemon_crashes_total` (counters)

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on the given address.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one completed request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

/// Record one rate-limit rejection.
pub fn record_rate_limited(bucket: &'static str) {
    counter!("gateway_rate_limited_total", "bucket" => bucket).increment(1);
}

/// Record a daemon spawn.
pub fn record_daemon_spawn() {
    counter!("gateway_daemon_spawns_total").increment(1);
}

/// Record a daemon crash detected outside an explicit kill.
pub fn record_daemon_crash() {
    counter!("gateway_daemon_crashes_total").increment(1);
}
