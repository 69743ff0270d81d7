//! F1 Cache - TTL-tiered cache-aside layer for F1 data services
//!
//! Runs the cache admin HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use f1_cache::api::create_router;
use f1_cache::cache::{MemoryStore, RedisStore, RedisStoreConfig, Store};
use f1_cache::tasks::run_startup_warm;
use f1_cache::{spawn_cleanup_task, AppState, Config, StoreBackend};

/// Main entry point for the cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the configured store (and the expiry sweep for the memory backend)
/// 4. Build the cache-aside layer and warm it from the seed file
/// 5. Serve the admin router until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "f1_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting F1 cache server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: backend={}, namespace={}, default_ttl={}s, max_ttl={}s, enabled={}, port={}",
        config.backend,
        config.key_namespace,
        config.default_ttl,
        config.max_ttl,
        config.cache_enabled,
        config.server_port
    );

    let (store, cleanup_handle) = build_store(&config)?;
    let state = AppState::from_config(&config, store)?;
    info!("Cache layer initialized");

    let report = run_startup_warm(&state.cache, state.warm_source.as_ref()).await?;
    if report.failed > 0 {
        warn!(
            "Startup warm finished with {} failures out of {}",
            report.failed, report.total
        );
    }

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cleanup_handle))
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Creates the configured store; the memory backend also gets its sweep task.
fn build_store(config: &Config) -> anyhow::Result<(Arc<dyn Store>, Option<JoinHandle<()>>)> {
    match config.backend {
        StoreBackend::Memory => {
            let store = Arc::new(MemoryStore::new(config.max_entries));
            let handle = spawn_cleanup_task(store.clone(), config.cleanup_interval);
            info!(
                "In-memory store created: max_entries={}, cleanup_interval={}s",
                config.max_entries, config.cleanup_interval
            );
            Ok((store as Arc<dyn Store>, Some(handle)))
        }
        StoreBackend::Redis => {
            let redis_config = RedisStoreConfig::new(config.redis_url.as_str())
                .with_connect_timeout(Duration::from_secs(config.redis_connect_timeout))
                .with_response_timeout(Duration::from_secs(config.redis_response_timeout));
            let store: Arc<dyn Store> = Arc::new(RedisStore::new(redis_config)?);
            info!("Redis store configured for {}", config.redis_url);
            Ok((store, None))
        }
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then stops the sweep task.
async fn shutdown_signal(cleanup_handle: Option<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    if let Some(handle) = cleanup_handle {
        handle.abort();
        warn!("Expiry sweep task aborted");
    }
}
