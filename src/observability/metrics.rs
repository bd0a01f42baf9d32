//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define switch metrics (switches, probes, proxied requests)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `bluegreen_switch_total` (counter): switch attempts by outcome
//! - `bluegreen_active_environment` (gauge): 1 for the active side, 0 otherwise
//! - `bluegreen_environment_healthy` (gauge): 1=healthy, 0=unhealthy
//! - `bluegreen_probe_duration_seconds` (histogram): probe cycle latency
//! - `bluegreen_proxy_requests_total` (counter): proxied requests by environment, status
//! - `bluegreen_proxy_request_duration_seconds` (histogram): upstream latency
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Labels are bounded: environment name, outcome, status code

use std::net::SocketAddr;
use std::time::Instant;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::environment::Environment;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_switch(outcome: &'static str) {
    counter!("bluegreen_switch_total", "outcome" => outcome).increment(1);
}

pub fn record_active(active: Environment) {
    for env in Environment::ALL {
        let value = if env == active { 1.0 } else { 0.0 };
        gauge!("bluegreen_active_environment", "environment" => env.as_str()).set(value);
    }
}

pub fn record_environment_health(env: Environment, healthy: bool, start: Instant) {
    gauge!("bluegreen_environment_healthy", "environment" => env.as_str())
        .set(if healthy { 1.0 } else { 0.0 });
    histogram!("bluegreen_probe_duration_seconds", "environment" => env.as_str())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_probe_abandoned(env: Environment) {
    counter!("bluegreen_probe_abandoned_total", "environment" => env.as_str()).increment(1);
    gauge!("bluegreen_environment_healthy", "environment" => env.as_str()).set(0.0);
}

pub fn record_request(env: Environment, status: u16, start: Instant) {
    counter!(
        "bluegreen_proxy_requests_total",
        "environment" => env.as_str(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("bluegreen_proxy_request_duration_seconds", "environment" => env.as_str())
        .record(start.elapsed().as_secs_f64());
}
