//! Shared mocks for integration testing.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::net::TcpStream;

use proxy_pool::engine::{BuiltEngine, EngineBuilder, EngineError, ProxyEngine};
use proxy_pool::lifecycle::Shutdown;
use proxy_pool::pool::{Pool, PoolMode};
use proxy_pool::registry::{NodeHandle, NodeInfo, NodeMode, NodeRegistry, ProbeFn};
use proxy_pool::reload::{ReloadOrchestrator, ReloadSettings};
use proxy_pool::subscription::{FetchError, NodeSource, SubscriptionStatus};

pub fn node(tag: &str) -> NodeInfo {
    NodeInfo {
        tag: tag.into(),
        name: tag.to_uppercase(),
        uri: format!("test://{tag}:1080"),
        mode: NodeMode::Pool,
        listen_address: None,
        port: None,
    }
}

#[allow(dead_code)]
pub fn nodes(tags: &[&str]) -> Vec<NodeInfo> {
    tags.iter().map(|t| node(t)).collect()
}

/// Subscription source whose population and behavior tests can change
/// between reloads.
#[derive(Default)]
pub struct ScriptedSource {
    nodes: Mutex<Vec<NodeInfo>>,
    fail: AtomicBool,
    delay: Mutex<Duration>,
}

impl ScriptedSource {
    pub fn new(initial: Vec<NodeInfo>) -> Arc<Self> {
        let source = Self::default();
        *source.nodes.lock().unwrap() = initial;
        Arc::new(source)
    }

    pub fn set_nodes(&self, nodes: Vec<NodeInfo>) {
        *self.nodes.lock().unwrap() = nodes;
    }

    #[allow(dead_code)]
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    #[allow(dead_code)]
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }
}

impl NodeSource for ScriptedSource {
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<NodeInfo>, FetchError>> {
        let delay = *self.delay.lock().unwrap();
        let fail = self.fail.load(Ordering::SeqCst);
        let nodes = self.nodes.lock().unwrap().clone();
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if fail {
                Err(FetchError::Http("synthetic fetch failure".into()))
            } else {
                Ok(nodes)
            }
        })
    }
}

pub struct MockEngine {
    pub closed: Arc<AtomicBool>,
    bind_fail: bool,
}

impl ProxyEngine for MockEngine {
    fn start(&self) -> BoxFuture<'_, Result<(), EngineError>> {
        Box::pin(async move {
            if self.bind_fail {
                return Err(EngineError::Bind("address already in use".into()));
            }
            Ok(())
        })
    }

    fn serve(&self, stream: TcpStream) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            drop(stream);
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), EngineError>> {
        Box::pin(async move {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// Engine builder whose probe results and failure modes tests can script.
/// Probe outcomes are decided at probe time from the `healthy` set.
#[derive(Default)]
pub struct ScriptedBuilder {
    healthy: Arc<Mutex<HashSet<String>>>,
    bind_fail: AtomicBool,
    build_fail: AtomicBool,
    engines: Mutex<Vec<Arc<AtomicBool>>>,
}

impl ScriptedBuilder {
    pub fn new(healthy_tags: &[&str]) -> Arc<Self> {
        let builder = Self::default();
        builder.set_healthy(healthy_tags);
        Arc::new(builder)
    }

    pub fn set_healthy(&self, tags: &[&str]) {
        *self.healthy.lock().unwrap() = tags.iter().map(|t| t.to_string()).collect();
    }

    #[allow(dead_code)]
    pub fn set_bind_fail(&self, fail: bool) {
        self.bind_fail.store(fail, Ordering::SeqCst);
    }

    #[allow(dead_code)]
    pub fn set_build_fail(&self, fail: bool) {
        self.build_fail.store(fail, Ordering::SeqCst);
    }

    /// Closed-flag of the most recently built engine.
    pub fn last_engine_closed(&self) -> Option<Arc<AtomicBool>> {
        self.engines.lock().unwrap().last().cloned()
    }
}

impl EngineBuilder for ScriptedBuilder {
    fn build(
        &self,
        _pool: &Arc<Pool>,
        nodes: &[(NodeInfo, NodeHandle)],
    ) -> Result<BuiltEngine, EngineError> {
        if self.build_fail.load(Ordering::SeqCst) {
            return Err(EngineError::Build("synthetic build failure".into()));
        }

        let mut probes: HashMap<String, ProbeFn> = HashMap::new();
        for (info, _) in nodes {
            let tag = info.tag.clone();
            let healthy = self.healthy.clone();
            probes.insert(
                info.tag.clone(),
                Arc::new(move || {
                    let ok = healthy.lock().unwrap().contains(&tag);
                    Box::pin(async move {
                        if ok {
                            Ok(Duration::from_millis(5))
                        } else {
                            Err(io::Error::new(io::ErrorKind::TimedOut, "probe timed out"))
                        }
                    })
                }),
            );
        }

        let closed = Arc::new(AtomicBool::new(false));
        self.engines.lock().unwrap().push(closed.clone());
        Ok(BuiltEngine {
            engine: Box::new(MockEngine {
                closed,
                bind_fail: self.bind_fail.load(Ordering::SeqCst),
            }),
            probes,
        })
    }
}

pub fn quick_settings(min_available_nodes: usize) -> ReloadSettings {
    ReloadSettings {
        fetch_timeout: Duration::from_secs(2),
        health_check_timeout: Duration::from_secs(2),
        drain_timeout: Duration::from_secs(5),
        min_available_nodes,
        pool_mode: PoolMode::Sequential,
    }
}

pub struct Harness {
    pub registry: Arc<NodeRegistry>,
    pub source: Arc<ScriptedSource>,
    pub builder: Arc<ScriptedBuilder>,
    pub subscription: Arc<SubscriptionStatus>,
    pub shutdown: Arc<Shutdown>,
    pub orchestrator: Arc<ReloadOrchestrator>,
}

/// Wire an orchestrator over scripted collaborators.
pub fn harness(
    initial: Vec<NodeInfo>,
    healthy_tags: &[&str],
    settings: ReloadSettings,
) -> Harness {
    let registry = Arc::new(NodeRegistry::new());
    let source = ScriptedSource::new(initial);
    let builder = ScriptedBuilder::new(healthy_tags);
    let subscription = Arc::new(SubscriptionStatus::new());
    let shutdown = Arc::new(Shutdown::new());

    let orchestrator = Arc::new(ReloadOrchestrator::new(
        registry.clone(),
        source.clone(),
        builder.clone(),
        settings,
        subscription.clone(),
        shutdown.clone(),
    ));

    Harness {
        registry,
        source,
        builder,
        subscription,
        shutdown,
        orchestrator,
    }
}
