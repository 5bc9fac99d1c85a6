//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define manager metrics (passes, durations, certificate operations)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `proxy_manager_passes_total` (counter): reload passes by trigger, outcome
//! - `proxy_manager_pass_duration_seconds` (histogram): render through reload
//! - `proxy_manager_certificate_operations_total` (counter): by operation, outcome
//! - `proxy_manager_certificate_days_left` (gauge): per domain
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so tests need no setup
//! - Labels are low-cardinality except the per-domain gauge

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP listener on `addr`.
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_pass(trigger: &str, outcome: &'static str, started: Instant) {
    counter!(
        "proxy_manager_passes_total",
        "trigger" => trigger.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("proxy_manager_pass_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_certificate_operation(operation: &'static str, outcome: &'static str) {
    counter!(
        "proxy_manager_certificate_operations_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_days_left(domain: &str, days: i64) {
    gauge!("proxy_manager_certificate_days_left", "domain" => domain.to_string()).set(days as f64);
}
