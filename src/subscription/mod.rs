//! Subscription subsystem.
//!
//! # Data Flow
//! ```text
//! reload tick → NodeSource::fetch (bounded by fetch timeout)
//!     → Vec<NodeInfo> candidate population
//!     → SubscriptionStatus updated (timestamp, count, error)
//! ```

pub mod http;

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::registry::NodeInfo;

pub use http::HttpSource;

/// Errors from fetching a subscription.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("subscription fetch timed out")]
    Timeout,

    #[error("subscription request failed: {0}")]
    Http(String),

    #[error("subscription source returned status {0}")]
    Status(u16),

    #[error("subscription payload invalid: {0}")]
    Decode(String),

    #[error("all subscription sources failed: {0}")]
    AllSourcesFailed(String),
}

/// External source of node descriptors.
pub trait NodeSource: Send + Sync {
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<NodeInfo>, FetchError>>;
}

/// Merges several sources into one population.
///
/// Individual source failures are logged and tolerated; the fetch fails
/// only when every source fails.
pub struct MultiSource {
    sources: Vec<Box<dyn NodeSource>>,
}

impl MultiSource {
    pub fn new(sources: Vec<Box<dyn NodeSource>>) -> Self {
        Self { sources }
    }
}

impl NodeSource for MultiSource {
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<NodeInfo>, FetchError>> {
        Box::pin(async move {
            let mut merged = Vec::new();
            let mut last_error = None;
            let mut succeeded = 0usize;

            for (index, source) in self.sources.iter().enumerate() {
                match source.fetch().await {
                    Ok(nodes) => {
                        succeeded += 1;
                        merged.extend(nodes);
                    }
                    Err(e) => {
                        tracing::warn!(source = index, error = %e, "Subscription source failed");
                        last_error = Some(e);
                    }
                }
            }

            if succeeded == 0 {
                let detail = last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no sources configured".to_string());
                return Err(FetchError::AllSourcesFailed(detail));
            }
            Ok(merged)
        })
    }
}

#[derive(Debug, Default, Clone)]
struct StatusInner {
    last_refresh: Option<u64>,
    node_count: usize,
    last_error: Option<String>,
}

/// Last-known outcome of the subscription refresh cycle, served by the
/// control API.
#[derive(Debug, Default)]
pub struct SubscriptionStatus {
    inner: Mutex<StatusInner>,
}

impl SubscriptionStatus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StatusInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record_success(&self, node_count: usize) {
        let mut s = self.lock();
        s.last_refresh = Some(now_ms());
        s.node_count = node_count;
        s.last_error = None;
    }

    pub fn record_error(&self, err: &str) {
        let mut s = self.lock();
        s.last_refresh = Some(now_ms());
        s.last_error = Some(err.to_string());
    }

    pub fn to_json(&self) -> serde_json::Value {
        let s = self.lock();
        serde_json::json!({
            "last_refresh": s.last_refresh,
            "node_count": s.node_count,
            "last_error": s.last_error,
        })
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<NodeInfo>);

    impl NodeSource for Fixed {
        fn fetch(&self) -> BoxFuture<'_, Result<Vec<NodeInfo>, FetchError>> {
            let nodes = self.0.clone();
            Box::pin(async move { Ok(nodes) })
        }
    }

    struct Broken;

    impl NodeSource for Broken {
        fn fetch(&self) -> BoxFuture<'_, Result<Vec<NodeInfo>, FetchError>> {
            Box::pin(async move { Err(FetchError::Status(502)) })
        }
    }

    fn node(tag: &str) -> NodeInfo {
        NodeInfo {
            tag: tag.into(),
            name: tag.to_uppercase(),
            uri: format!("test://{tag}"),
            mode: Default::default(),
            listen_address: None,
            port: None,
        }
    }

    #[tokio::test]
    async fn multi_source_merges_and_tolerates_partial_failure() {
        let source = MultiSource::new(vec![
            Box::new(Fixed(vec![node("a"), node("b")])),
            Box::new(Broken),
            Box::new(Fixed(vec![node("c")])),
        ]);

        let nodes = source.fetch().await.expect("two sources succeed");
        assert_eq!(nodes.len(), 3);
    }

    #[tokio::test]
    async fn multi_source_fails_when_every_source_fails() {
        let source = MultiSource::new(vec![Box::new(Broken), Box::new(Broken)]);
        assert!(matches!(
            source.fetch().await,
            Err(FetchError::AllSourcesFailed(_))
        ));
    }

    #[test]
    fn status_tracks_last_outcome() {
        let status = SubscriptionStatus::new();
        status.record_success(42);
        let v = status.to_json();
        assert_eq!(v["node_count"], 42);
        assert!(v["last_error"].is_null());

        status.record_error("boom");
        let v = status.to_json();
        assert_eq!(v["last_error"], "boom");
        assert_eq!(v["node_count"], 42);
    }
}
