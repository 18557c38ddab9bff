use anyhow::{Context, Result};
use dotenv::dotenv;
use std::sync::Arc;
use token_api_rust::{create_router, AppState, Config};
use token_pulse_core::broadcast::SnapshotHub;
use token_pulse_core::cache::TieredCache;
use token_pulse_core::clients::{DexScreenerClient, JupiterClient, RetryingHttpClient, TokenSource};
use token_pulse_core::query::QueryService;
use token_pulse_core::redis::{RedisBus, RedisStore};
use token_pulse_core::refresh::RefreshScheduler;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Token API Service...");

    let config = Config::from_env()?;

    // Upstream clients
    let http = RetryingHttpClient::new(config.http_timeout(), config.retry_policy())?;
    let pairs: Arc<dyn TokenSource> = Arc::new(DexScreenerClient::with_base_url(
        http.clone(),
        config.dexscreener_base_url.clone(),
        config.chain_id.clone(),
    ));
    let registry: Arc<dyn TokenSource> = Arc::new(JupiterClient::with_base_urls(
        http,
        config.jupiter_search_base_url.clone(),
        config.jupiter_price_base_url.clone(),
    ));

    // Cache
    let cache = match &config.redis_url {
        Some(url) => {
            let store = RedisStore::new(url)?;
            info!("Cache: Redis at {} with in-process fallback", url);
            TieredCache::new(Arc::new(store))
        }
        None => {
            warn!("REDIS_URL is empty, running on the in-process cache only");
            TieredCache::local_only()
        }
    };

    // Broadcast
    let mut hub = SnapshotHub::new(config.broadcast_capacity);
    if let Some(url) = config.redis_url.as_deref().filter(|_| config.publish_to_redis) {
        let bus = RedisBus::new(url)
            .await
            .context("Failed to initialize Redis price-update mirror")?;
        hub = hub.with_redis_mirror(bus);
        info!("Mirroring price updates to Redis");
    }

    // Refresh loop
    let scheduler = RefreshScheduler::new(
        pairs.clone(),
        registry,
        cache.clone(),
        hub.clone(),
        config.refresh(),
    );
    let stats = scheduler.stats();
    let refresh_task = tokio::spawn(async move { scheduler.run().await });

    // HTTP server
    let state = AppState {
        query: Arc::new(QueryService::new(cache.clone(), pairs, config.search_ttl())),
        hub,
        cache,
        stats,
    };
    let app = create_router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Token API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    refresh_task.abort();
    info!("Token API Service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
