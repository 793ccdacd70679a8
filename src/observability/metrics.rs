//! Metrics exposition.
//!
//! # Metrics
//! - `pool_reloads_total{outcome}` (counter): reload sessions by outcome
//! - `pool_nodes` (gauge): size of the promoted population
//! - `pool_node_failures_total` (counter): failed connections/probes
//! - `pool_selections_total` (counter): pool selections served

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on the given address. Failures are
/// logged, not fatal; the service runs without metrics.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter started"),
        Err(e) => tracing::error!(error = %e, "Failed to start metrics exporter"),
    }
}
