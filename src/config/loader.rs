//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", format_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_round_trips_through_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [subscription]
            sources = ["https://sub.example.com/a"]

            [pool]
            mode = "random"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.subscription.sources.len(), 1);
        assert_eq!(cfg.pool.failure_threshold, 3);
        assert!(matches!(cfg.pool.mode, crate::pool::PoolMode::Random));
        assert!(validate_config(&cfg).is_ok());
    }
}
