//! Observability subsystem.
//!
//! Structured logging via `tracing`; counters and gauges through the
//! `metrics` facade with a Prometheus exporter.

pub mod logging;
pub mod metrics;
