//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, downstream calls, reloads)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track per-route and per-target metrics
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route, status
//! - `gateway_request_duration_seconds` (histogram): inbound latency by route
//! - `gateway_downstream_calls_total` (counter): attempts by target, outcome
//! - `gateway_downstream_duration_seconds` (histogram): attempt latency by target
//! - `gateway_circuit_open_total` (counter): circuit openings by target
//! - `gateway_route_reloads_total` (counter): reloads by outcome
//! - `gateway_route_snapshot_version` (gauge): version of the active route set
//! - `gateway_partial_aggregations_total` (counter): fan-outs with failed targets
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Labels for route, target, status code
//! - Histogram buckets tuned for typical web latencies

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Install the Prometheus recorder and its HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            LATENCY_BUCKETS,
        );

    let result = builder.and_then(|b| b.install());
    match result {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install Prometheus exporter"),
    }
}

pub fn record_request(route: &str, status: u16, start: Instant) {
    counter!(
        "gateway_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_downstream_call(target: &str, outcome: &'static str, latency: Duration) {
    counter!(
        "gateway_downstream_calls_total",
        "target" => target.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("gateway_downstream_duration_seconds", "target" => target.to_string())
        .record(latency.as_secs_f64());
}

pub fn record_circuit_open(target: &str) {
    counter!("gateway_circuit_open_total", "target" => target.to_string()).increment(1);
}

pub fn record_reload(outcome: &'static str, version: u64) {
    counter!("gateway_route_reloads_total", "outcome" => outcome).increment(1);
    gauge!("gateway_route_snapshot_version").set(version as f64);
}

pub fn record_partial_aggregation(route: &str) {
    counter!("gateway_partial_aggregations_total", "route" => route.to_string()).increment(1);
}
