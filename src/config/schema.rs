//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files, with
//! defaults on every field so minimal configs work.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::FailurePolicy;
use crate::pool::PoolMode;
use crate::reload::ReloadSettings;

/// Root configuration for the proxy pool manager.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Shared inbound listener for pool-mode traffic.
    pub gateway: GatewayConfig,

    /// Subscription sources and refresh cadence.
    pub subscription: SubscriptionConfig,

    /// Reload bounds: preflight, drain, minimum healthy nodes.
    pub reload: ReloadConfig,

    /// Pool policy and blacklist thresholds.
    pub pool: PoolConfig,

    /// Engine connect/probe settings.
    pub engine: EngineConfig,

    /// Control API settings.
    pub api: ApiConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Shared gateway listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Bind address (e.g., "0.0.0.0:1080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:1080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Subscription refresh configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Enable periodic refresh.
    pub enabled: bool,

    /// Subscription source URLs, fetched and merged in order.
    pub sources: Vec<String>,

    /// Refresh interval in seconds.
    pub interval_secs: u64,

    /// Bound on one fetch pass in seconds.
    pub fetch_timeout_secs: u64,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sources: Vec::new(),
            interval_secs: 300,
            fetch_timeout_secs: 30,
        }
    }
}

/// Reload orchestration bounds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReloadConfig {
    /// Bound on the preflight health gate in seconds.
    pub health_check_timeout_secs: u64,

    /// Bound on draining the previous instance in seconds.
    pub drain_timeout_secs: u64,

    /// Minimum preflight-healthy nodes required to promote a candidate.
    pub min_available_nodes: usize,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            health_check_timeout_secs: 60,
            drain_timeout_secs: 30,
            min_available_nodes: 1,
        }
    }
}

/// Pool selection and blacklist configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Selection policy: sequential or random.
    pub mode: PoolMode,

    /// Consecutive failures before a node is blacklisted.
    pub failure_threshold: u32,

    /// Blacklist duration in seconds.
    pub blacklist_duration_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            mode: PoolMode::Sequential,
            failure_threshold: 3,
            blacklist_duration_secs: 300,
        }
    }
}

/// Engine connect/probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upstream connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Probe timeout in seconds.
    pub probe_timeout_secs: u64,

    /// Destination used by health probes (host:port).
    pub probe_target: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
            probe_timeout_secs: 10,
            probe_target: "www.gstatic.com:80".to_string(),
        }
    }
}

/// Control API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Enable the control API.
    pub enabled: bool,

    /// API bind address.
    pub listen: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: "127.0.0.1:9095".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9096".to_string(),
        }
    }
}

impl AppConfig {
    pub fn reload_settings(&self) -> ReloadSettings {
        ReloadSettings {
            fetch_timeout: Duration::from_secs(self.subscription.fetch_timeout_secs),
            health_check_timeout: Duration::from_secs(self.reload.health_check_timeout_secs),
            drain_timeout: Duration::from_secs(self.reload.drain_timeout_secs),
            min_available_nodes: self.reload.min_available_nodes,
            pool_mode: self.pool.mode,
        }
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy {
            failure_threshold: self.pool.failure_threshold,
            blacklist_duration: Duration::from_secs(self.pool.blacklist_duration_secs),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.subscription.interval_secs)
    }
}
