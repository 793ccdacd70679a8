//! Shared TCP gateway with backpressure.
//!
//! # Responsibilities
//! - Bind the shared inbound address once at startup
//! - Accept connections under a max-connections limit
//! - Dispatch each connection to whichever instance currently accepts

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Semaphore};

use crate::reload::ReloadOrchestrator;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
}

/// A bounded TCP listener routing into the active engine instance.
pub struct Gateway {
    inner: TcpListener,
    connection_limit: Arc<Semaphore>,
}

impl Gateway {
    /// Bind the shared inbound address with a connection limit.
    pub async fn bind(addr: &str, max_connections: usize) -> Result<Self, GatewayError> {
        let inner = TcpListener::bind(addr).await.map_err(|e| GatewayError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;
        Ok(Self {
            inner,
            connection_limit: Arc::new(Semaphore::new(max_connections)),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Accept loop. Each connection is served by the instance holding the
    /// accepting role at the moment it arrives.
    pub async fn run(
        self,
        orchestrator: Arc<ReloadOrchestrator>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        if let Ok(addr) = self.local_addr() {
            tracing::info!(address = %addr, "Gateway listening");
        }

        loop {
            tokio::select! {
                accepted = self.inner.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let Ok(permit) = self.connection_limit.clone().try_acquire_owned() else {
                                tracing::warn!(peer = %peer, "Connection limit reached, dropping");
                                continue;
                            };
                            let Some(instance) = orchestrator.active_instance() else {
                                tracing::debug!(peer = %peer, "No active instance, dropping");
                                continue;
                            };
                            tokio::spawn(async move {
                                instance.serve(stream).await;
                                drop(permit);
                            });
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Accept failed");
                            tokio::time::sleep(Duration::from_millis(50)).await;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Gateway received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
