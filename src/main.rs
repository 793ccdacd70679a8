//! Proxy pool manager.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │               PROXY POOL MANAGER             │
//!                        │                                              │
//!   Client Connection    │  ┌─────────┐      ┌────────────────────┐    │
//!   ─────────────────────┼─▶│ gateway │─────▶│  EngineInstance    │    │
//!                        │  │listener │      │  (active, swapped  │    │
//!                        │  └─────────┘      │   on reload)       │    │
//!                        │                   └───────┬────────────┘    │
//!                        │                           │ pool.select()   │
//!                        │                           ▼                 │
//!   Upstream Proxy       │                   ┌────────────────────┐    │
//!   ◀────────────────────┼───────────────────│  pool + registry   │    │
//!                        │                   └────────────────────┘    │
//!                        │                                              │
//!                        │  ┌───────────────────────────────────────┐  │
//!                        │  │          Cross-Cutting Concerns        │  │
//!                        │  │  config  subscription  reload  api     │  │
//!                        │  │  scheduler  lifecycle  observability   │  │
//!                        │  └───────────────────────────────────────┘  │
//!                        └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use proxy_pool::api::{ApiServer, AppState};
use proxy_pool::config::{load_config, AppConfig};
use proxy_pool::engine::tcp::TcpRelayBuilder;
use proxy_pool::engine::EngineBuilder;
use proxy_pool::lifecycle::{signals, Shutdown};
use proxy_pool::net::Gateway;
use proxy_pool::observability;
use proxy_pool::registry::NodeRegistry;
use proxy_pool::reload::ReloadOrchestrator;
use proxy_pool::scheduler::RefreshScheduler;
use proxy_pool::subscription::{HttpSource, MultiSource, NodeSource, SubscriptionStatus};

#[derive(Parser)]
#[command(name = "proxy-pool")]
#[command(about = "Upstream proxy pool manager with health failover and hot reload")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    observability::logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "proxy-pool starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => observability::metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Arc::new(Shutdown::new());
    let registry = Arc::new(NodeRegistry::new());
    let subscription = Arc::new(SubscriptionStatus::new());

    let source: Arc<dyn NodeSource> = Arc::new(MultiSource::new(
        config
            .subscription
            .sources
            .iter()
            .map(|url| Box::new(HttpSource::new(url.clone())) as Box<dyn NodeSource>)
            .collect(),
    ));
    let builder: Arc<dyn EngineBuilder> = Arc::new(TcpRelayBuilder::new(
        config.failure_policy(),
        Duration::from_secs(config.engine.connect_timeout_secs),
        Duration::from_secs(config.engine.probe_timeout_secs),
    ));

    let orchestrator = Arc::new(ReloadOrchestrator::new(
        registry.clone(),
        source,
        builder,
        config.reload_settings(),
        subscription.clone(),
        shutdown.clone(),
    ));
    let scheduler = Arc::new(RefreshScheduler::new(
        orchestrator.clone(),
        config.refresh_interval(),
        config.subscription.enabled,
    ));

    // Bind the gateway before the first reload: traffic has somewhere to
    // land the moment an instance is promoted.
    let gateway = Gateway::bind(
        &config.gateway.bind_address,
        config.gateway.max_connections,
    )
    .await?;

    // Initial population load. A failure here is not fatal; the scheduler
    // retries on its next tick.
    if config.subscription.enabled {
        if let Err(e) = orchestrator.reload().await {
            tracing::warn!(error = %e, "Initial reload failed, waiting for next refresh");
        }
    }

    let gateway_task = tokio::spawn(gateway.run(orchestrator.clone(), shutdown.subscribe()));

    let scheduler_task = {
        let scheduler = scheduler.clone();
        let rx = shutdown.subscribe();
        tokio::spawn(async move { scheduler.run(rx).await })
    };

    let api_task = if config.api.enabled {
        let listener = tokio::net::TcpListener::bind(&config.api.listen).await?;
        let server = ApiServer::new(AppState {
            registry: registry.clone(),
            orchestrator: orchestrator.clone(),
            scheduler: scheduler.clone(),
            subscription: subscription.clone(),
        });
        let rx = shutdown.subscribe();
        Some(tokio::spawn(async move {
            if let Err(e) = server.run(listener, rx).await {
                tracing::error!(error = %e, "API server error");
            }
        }))
    } else {
        None
    };

    signals::watch_signals(shutdown.clone()).await;

    let _ = scheduler_task.await;
    let _ = gateway_task.await;
    if let Some(task) = api_task {
        let _ = task.await;
    }
    orchestrator.close_active().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
