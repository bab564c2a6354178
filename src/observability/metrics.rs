//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define edge router metrics (requests, invocations, reloads)
//! - Expose a Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `edge_requests_total` (counter): requests by method, status
//! - `edge_request_duration_seconds` (histogram): end-to-end latency
//! - `edge_function_invocations_total` (counter): by function, outcome
//! - `edge_function_duration_seconds` (histogram): per function
//! - `edge_function_failures_total` (counter): failures answered with 500
//! - `edge_registry_reloads_total` (counter): by outcome
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Labels stay low-cardinality: no paths, no request ids

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe();
            tracing::info!(address = %addr, "Metrics endpoint listening");
        }
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

fn describe() {
    describe_counter!("edge_requests_total", "Requests routed");
    describe_histogram!("edge_request_duration_seconds", "End-to-end routing latency");
    describe_counter!("edge_function_invocations_total", "Edge function invocations");
    describe_histogram!("edge_function_duration_seconds", "Edge function invocation latency");
    describe_counter!("edge_function_failures_total", "Edge function failures served as errors");
    describe_counter!("edge_registry_reloads_total", "Registry rebuilds");
}

fn outcome(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "error"
    }
}

pub fn record_request(method: &str, status: u16, started: Instant) {
    let method = method.to_string();
    counter!("edge_requests_total", "method" => method.clone(), "status" => status.to_string()).increment(1);
    histogram!("edge_request_duration_seconds", "method" => method).record(started.elapsed().as_secs_f64());
}

pub fn record_invocation(function: &str, ok: bool, started: Instant) {
    let function = function.to_string();
    counter!("edge_function_invocations_total", "function" => function.clone(), "outcome" => outcome(ok)).increment(1);
    histogram!("edge_function_duration_seconds", "function" => function).record(started.elapsed().as_secs_f64());
}

pub fn record_function_failure(function: &str) {
    counter!("edge_function_failures_total", "function" => function.to_string()).increment(1);
}

pub fn record_reload(ok: bool) {
    counter!("edge_registry_reloads_total", "outcome" => outcome(ok)).increment(1);
}
