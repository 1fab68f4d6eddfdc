//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (decisions, latency, mode, dependency health)
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `shield_requests_total` (counter): requests by outcome (allowed, denied, rejected, error)
//! - `shield_denials_total` (counter): denials by reason
//! - `shield_request_duration_seconds` (histogram): time from arrival to response
//! - `shield_operating_mode` (gauge): 0=normal, 1=restricted
//! - `shield_mode_changes_total` (counter): mode transitions
//! - `shield_dependency_failures_total` (counter): fail-open events by dependency
//! - `shield_rate_tracked_clients` (gauge): clients holding in-process rate state
//!
//! # Design Decisions
//! - Recording functions are free functions; without an installed recorder they are no-ops
//! - Label values are static strings only

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::pipeline::verdict::DenyReason;
use crate::security::mode::OperatingMode;

/// Install the Prometheus recorder and its HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe();
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

fn describe() {
    describe_counter!("shield_requests_total", "Requests handled, by outcome");
    describe_counter!("shield_denials_total", "Requests denied, by reason");
    describe_histogram!("shield_request_duration_seconds", "Request handling time in seconds");
    describe_gauge!("shield_operating_mode", "Current operating mode (0 normal, 1 restricted)");
    describe_counter!("shield_mode_changes_total", "Operating mode transitions");
    describe_counter!("shield_dependency_failures_total", "Dependency failures handled by failing open");
    describe_gauge!("shield_rate_tracked_clients", "Clients with in-process rate state");
}

pub fn record_request(outcome: &'static str, start: Instant) {
    counter!("shield_requests_total", "outcome" => outcome).increment(1);
    histogram!("shield_request_duration_seconds", "outcome" => outcome).record(start.elapsed().as_secs_f64());
}

pub fn record_denial(reason: DenyReason) {
    counter!("shield_denials_total", "reason" => reason.as_str()).increment(1);
}

pub fn record_mode(mode: OperatingMode) {
    gauge!("shield_operating_mode").set(mode as u8 as f64);
}

pub fn record_mode_change() {
    counter!("shield_mode_changes_total").increment(1);
}

pub fn record_dependency_failure(dependency: &'static str) {
    counter!("shield_dependency_failures_total", "dependency" => dependency).increment(1);
}

pub fn record_tracked_clients(count: usize) {
    gauge!("shield_rate_tracked_clients").set(count as f64);
}
