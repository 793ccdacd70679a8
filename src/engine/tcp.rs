//! Reference TCP relay engine.
//!
//! # Responsibilities
//! - Relay accepted connections to the selected node's upstream address
//! - Bind per-node listeners for dedicated-mode nodes at start
//! - Offer TCP-connect probes measuring upstream latency
//!
//! Protocol termination beyond a byte relay belongs to real engine
//! integrations; this implementation exists so the binary runs end-to-end
//! and so the switch/drain semantics are exercised against real sockets.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use url::Url;

use crate::pool::Pool;
use crate::registry::{NodeHandle, NodeInfo, NodeMode, ProbeFn};

use super::adapter::{ConnectionGuard, FailurePolicy};
use super::{BuiltEngine, EngineBuilder, EngineError, ProxyEngine};

/// Builds `TcpRelayEngine` bundles from a node population.
pub struct TcpRelayBuilder {
    policy: FailurePolicy,
    connect_timeout: Duration,
    probe_timeout: Duration,
}

impl TcpRelayBuilder {
    pub fn new(policy: FailurePolicy, connect_timeout: Duration, probe_timeout: Duration) -> Self {
        Self {
            policy,
            connect_timeout,
            probe_timeout,
        }
    }
}

impl EngineBuilder for TcpRelayBuilder {
    fn build(
        &self,
        pool: &Arc<Pool>,
        nodes: &[(NodeInfo, NodeHandle)],
    ) -> Result<BuiltEngine, EngineError> {
        let mut upstreams = HashMap::new();
        let mut probes: HashMap<String, ProbeFn> = HashMap::new();
        let mut dedicated = Vec::new();

        for (info, handle) in nodes {
            let addr = upstream_addr(&info.uri)
                .map_err(|e| EngineError::Build(format!("node {}: {e}", info.tag)))?;

            if info.mode == NodeMode::Dedicated {
                let listen = format!(
                    "{}:{}",
                    info.listen_address.as_deref().unwrap_or("127.0.0.1"),
                    info.port.unwrap_or(0)
                );
                dedicated.push(DedicatedInbound {
                    listen,
                    upstream: addr.clone(),
                    handle: handle.clone(),
                });
            }

            let probe_addr = addr.clone();
            let probe_timeout = self.probe_timeout;
            probes.insert(
                info.tag.clone(),
                Arc::new(move || {
                    let addr = probe_addr.clone();
                    Box::pin(async move { tcp_probe(&addr, probe_timeout).await })
                }),
            );
            upstreams.insert(info.tag.clone(), addr);
        }

        let engine = TcpRelayEngine {
            pool: pool.clone(),
            upstreams: Arc::new(upstreams),
            dedicated,
            policy: self.policy,
            connect_timeout: self.connect_timeout,
            inbound_tasks: Mutex::new(Vec::new()),
        };

        Ok(BuiltEngine {
            engine: Box::new(engine),
            probes,
        })
    }
}

struct DedicatedInbound {
    listen: String,
    upstream: String,
    handle: NodeHandle,
}

/// Plain TCP relay over one node population. Pool-mode traffic arrives via
/// `serve` from the shared gateway listener; dedicated-mode nodes get their
/// own listeners bound at `start`.
pub struct TcpRelayEngine {
    pool: Arc<Pool>,
    upstreams: Arc<HashMap<String, String>>,
    dedicated: Vec<DedicatedInbound>,
    policy: FailurePolicy,
    connect_timeout: Duration,
    inbound_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ProxyEngine for TcpRelayEngine {
    fn start(&self) -> BoxFuture<'_, Result<(), EngineError>> {
        Box::pin(async move {
            // Bind every dedicated listener before spawning any accept
            // loop: a conflict must leave no partial footprint behind.
            let mut bound = Vec::new();
            for inbound in &self.dedicated {
                let listener = TcpListener::bind(&inbound.listen)
                    .await
                    .map_err(|e| EngineError::Bind(format!("{}: {e}", inbound.listen)))?;
                bound.push((listener, inbound));
            }

            let mut tasks = self
                .inbound_tasks
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            for (listener, inbound) in bound {
                tracing::info!(
                    tag = %inbound.handle.tag(),
                    listen = %inbound.listen,
                    "Dedicated inbound listening"
                );
                tasks.push(tokio::spawn(dedicated_accept_loop(
                    listener,
                    inbound.upstream.clone(),
                    inbound.handle.clone(),
                    self.policy,
                    self.connect_timeout,
                )));
            }
            Ok(())
        })
    }

    fn serve(&self, stream: TcpStream) -> BoxFuture<'static, ()> {
        let pool = self.pool.clone();
        let upstreams = self.upstreams.clone();
        let policy = self.policy;
        let connect_timeout = self.connect_timeout;

        Box::pin(async move {
            let node = match pool.select() {
                Ok(node) => node,
                Err(e) => {
                    tracing::debug!(error = %e, "Dropping connection");
                    return;
                }
            };
            metrics::counter!("pool_selections_total").increment(1);

            let Some(addr) = upstreams.get(&node.tag()) else {
                tracing::error!(tag = %node.tag(), "Selected node missing from upstream map");
                return;
            };
            relay(stream, addr, node, policy, connect_timeout).await;
        })
    }

    fn begin_drain(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.stop_inbounds();
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), EngineError>> {
        Box::pin(async move {
            self.stop_inbounds();
            Ok(())
        })
    }
}

impl TcpRelayEngine {
    /// Abort the dedicated accept loops. Per-connection relay tasks are
    /// untouched; they finish on their own and are tracked by the node
    /// counters.
    fn stop_inbounds(&self) {
        let tasks: Vec<JoinHandle<()>> = {
            let mut guard = self.inbound_tasks.lock().unwrap_or_else(|e| e.into_inner());
            guard.drain(..).collect()
        };
        for task in tasks {
            task.abort();
        }
    }
}

async fn dedicated_accept_loop(
    listener: TcpListener,
    upstream: String,
    handle: NodeHandle,
    policy: FailurePolicy,
    connect_timeout: Duration,
) {
    loop {
        match listener.accept().await {
            Ok((stream, _peer)) => {
                let upstream = upstream.clone();
                let handle = handle.clone();
                tokio::spawn(async move {
                    relay(stream, &upstream, handle, policy, connect_timeout).await;
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dedicated accept failed");
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }
}

/// Open the upstream leg and shuttle bytes both ways, reporting the
/// connection outcome on the node.
async fn relay(
    mut client: TcpStream,
    upstream_addr: &str,
    node: NodeHandle,
    policy: FailurePolicy,
    connect_timeout: Duration,
) {
    let guard = ConnectionGuard::open(node.clone());

    let upstream = match tokio::time::timeout(connect_timeout, TcpStream::connect(upstream_addr)).await
    {
        Ok(Ok(stream)) => {
            policy.report_success(&node);
            stream
        }
        Ok(Err(e)) => {
            policy.report_failure(&node, &e.to_string());
            return;
        }
        Err(_) => {
            policy.report_failure(&node, "upstream connect timed out");
            return;
        }
    };

    let mut upstream = upstream;
    if let Err(e) = tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
        tracing::debug!(tag = %node.tag(), error = %e, "Relay ended with error");
    }
    drop(guard);
}

fn upstream_addr(uri: &str) -> Result<String, String> {
    let url = Url::parse(uri).map_err(|e| e.to_string())?;
    let host = url.host_str().ok_or("descriptor has no host")?;
    let port = url
        .port_or_known_default()
        .ok_or("descriptor has no port")?;
    Ok(format!("{host}:{port}"))
}

async fn tcp_probe(addr: &str, timeout: Duration) -> io::Result<Duration> {
    let started = Instant::now();
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => Ok(started.elapsed()),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "probe timed out")),
    }
}
