//! Node identity and snapshot types.

use serde::{Deserialize, Serialize};

/// Routing mode for a node: member of the shared pool, or bound to its own
/// dedicated inbound port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeMode {
    #[default]
    Pool,
    Dedicated,
}

/// Static identity of a proxy node. Updated in place when a tag is
/// re-registered; mutable runtime state lives in the registry entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Unique key for this node.
    pub tag: String,

    /// Display name, used for snapshot ordering.
    pub name: String,

    /// Raw endpoint descriptor. Interpreted only by the engine builder.
    pub uri: String,

    #[serde(default)]
    pub mode: NodeMode,

    /// Inbound address for dedicated mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_address: Option<String>,

    /// Inbound port for dedicated mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Point-in-time view of a node's identity plus runtime state.
///
/// Timestamps are epoch milliseconds; `last_probe_latency_ms` is -1 when the
/// node has never been probed.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    #[serde(flatten)]
    pub info: NodeInfo,

    pub failure_count: u32,
    pub blacklisted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blacklisted_until: Option<u64>,
    pub active_connections: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<u64>,
    pub last_probe_latency_ms: i64,
}
