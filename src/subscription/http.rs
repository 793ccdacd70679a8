//! HTTP subscription source.

use axum::body::Body;
use futures_util::future::BoxFuture;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::registry::NodeInfo;

use super::{FetchError, NodeSource};

const MAX_PAYLOAD_BYTES: usize = 8 * 1024 * 1024;

/// Fetches a JSON array of node descriptors from one subscription URL.
pub struct HttpSource {
    client: Client<HttpConnector, Body>,
    url: String,
}

impl HttpSource {
    pub fn new(url: String) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client, url }
    }
}

impl NodeSource for HttpSource {
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<NodeInfo>, FetchError>> {
        Box::pin(async move {
            let request = axum::http::Request::builder()
                .method("GET")
                .uri(self.url.as_str())
                .header("user-agent", "proxy-pool-subscription")
                .body(Body::empty())
                .map_err(|e| FetchError::Http(e.to_string()))?;

            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| FetchError::Http(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }

            let bytes = axum::body::to_bytes(Body::new(response.into_body()), MAX_PAYLOAD_BYTES)
                .await
                .map_err(|e| FetchError::Http(e.to_string()))?;

            let nodes: Vec<NodeInfo> =
                serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode(e.to_string()))?;

            tracing::debug!(url = %self.url, count = nodes.len(), "Subscription fetched");
            Ok(nodes)
        })
    }
}
