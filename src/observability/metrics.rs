//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dynconfig_reload_total` (counter): reload cycles by outcome
//! - `dynconfig_published_generation` (gauge): generation of the default bundle
//! - `dynconfig_admission_total` (counter): admissions by result
//! - `dynconfig_override_total` (counter): accepted overrides by mode
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_reload(outcome: &'static str) {
    ::metrics::counter!("dynconfig_reload_total", "outcome" => outcome).increment(1);
}

pub fn record_published_generation(generation: u64) {
    ::metrics::gauge!("dynconfig_published_generation").set(generation as f64);
}

pub fn record_admission(result: &'static str) {
    ::metrics::counter!("dynconfig_admission_total", "result" => result).increment(1);
}

pub fn record_override(mode: &'static str) {
    ::metrics::counter!("dynconfig_override_total", "mode" => mode).increment(1);
}
