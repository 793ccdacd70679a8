//! Configuration validation.
//!
//! Semantic checks on top of what serde already enforces. All violations
//! are collected and returned together, not just the first.

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::AppConfig;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("reload.min_available_nodes must be at least 1")]
    MinAvailableNodes,

    #[error("pool.failure_threshold must be at least 1")]
    FailureThreshold,

    #[error("subscription enabled but no sources configured")]
    NoSources,

    #[error("subscription source is not a valid URL: {0}")]
    BadSource(String),

    #[error("{field} is not a valid socket address: {value}")]
    BadAddress { field: &'static str, value: String },

    #[error("engine.probe_target is not host:port: {0}")]
    BadProbeTarget(String),
}

/// Validate a loaded configuration. Pure function; runs before the config
/// is accepted into the system.
pub fn validate_config(cfg: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (value, field) in [
        (cfg.subscription.interval_secs, "subscription.interval_secs"),
        (
            cfg.subscription.fetch_timeout_secs,
            "subscription.fetch_timeout_secs",
        ),
        (
            cfg.reload.health_check_timeout_secs,
            "reload.health_check_timeout_secs",
        ),
        (cfg.reload.drain_timeout_secs, "reload.drain_timeout_secs"),
        (cfg.pool.blacklist_duration_secs, "pool.blacklist_duration_secs"),
        (cfg.engine.connect_timeout_secs, "engine.connect_timeout_secs"),
        (cfg.engine.probe_timeout_secs, "engine.probe_timeout_secs"),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroDuration { field });
        }
    }

    if cfg.reload.min_available_nodes == 0 {
        errors.push(ValidationError::MinAvailableNodes);
    }
    if cfg.pool.failure_threshold == 0 {
        errors.push(ValidationError::FailureThreshold);
    }

    if cfg.subscription.enabled && cfg.subscription.sources.is_empty() {
        errors.push(ValidationError::NoSources);
    }
    for source in &cfg.subscription.sources {
        if Url::parse(source).is_err() {
            errors.push(ValidationError::BadSource(source.clone()));
        }
    }

    if cfg.gateway.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BadAddress {
            field: "gateway.bind_address",
            value: cfg.gateway.bind_address.clone(),
        });
    }
    if cfg.api.enabled && cfg.api.listen.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BadAddress {
            field: "api.listen",
            value: cfg.api.listen.clone(),
        });
    }
    if cfg.observability.metrics_enabled
        && cfg.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::BadAddress {
            field: "observability.metrics_address",
            value: cfg.observability.metrics_address.clone(),
        });
    }

    if !valid_host_port(&cfg.engine.probe_target) {
        errors.push(ValidationError::BadProbeTarget(
            cfg.engine.probe_target.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn valid_host_port(value: &str) -> bool {
    match value.rsplit_once(':') {
        Some((host, port)) => {
            !host.is_empty() && port.parse::<u16>().map(|p| p > 0).unwrap_or(false)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.subscription.sources = vec!["https://sub.example.com/nodes".to_string()];
        cfg
    }

    #[test]
    fn default_with_source_passes() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn enabled_subscription_requires_sources() {
        let mut cfg = valid();
        cfg.subscription.sources.clear();
        let errors = validate_config(&cfg).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::NoSources)));
    }

    #[test]
    fn all_violations_are_collected() {
        let mut cfg = valid();
        cfg.reload.min_available_nodes = 0;
        cfg.reload.drain_timeout_secs = 0;
        cfg.engine.probe_target = "no-port".to_string();
        let errors = validate_config(&cfg).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn probe_target_must_be_host_port() {
        assert!(valid_host_port("example.com:80"));
        assert!(valid_host_port("10.0.0.1:443"));
        assert!(!valid_host_port("example.com"));
        assert!(!valid_host_port(":80"));
        assert!(!valid_host_port("example.com:0"));
        assert!(!valid_host_port("example.com:notaport"));
    }
}
