//! Periodic refresh: fetch every source, merge, cache, broadcast.
//!
//! One tick:
//! 1. One pair-search call per worker query plus one registry call, all
//!    concurrent, joined before anything else happens
//! 2. Pair-search results deduplicated across queries (higher volume wins)
//! 3. Merged with the registry records
//! 4. Written to the cache under the canonical key, plus a per-token mirror
//! 5. Published to subscribers, even when empty
//!
//! A failed source contributes nothing. A failed cache write or publish is
//! logged and the tick still completes; the next tick supersedes it.

use crate::aggregator::{dedup_by_volume, merge};
use crate::broadcast::{Snapshot, SnapshotHub};
use crate::cache::{token_key, CacheError, TieredCache, SNAPSHOT_KEY};
use crate::clients::TokenSource;
use crate::types::TokenRecord;
use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use futures_util::future::join_all;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub const DEFAULT_WORKER_QUERIES: [&str; 7] = ["SOL", "BONK", "WIF", "JUP", "RAY", "POPCAT", "MEW"];

#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub interval: Duration,
    /// Lifetime of the canonical snapshot; longer than `interval` so one slow
    /// tick does not blank the listing
    pub snapshot_ttl: Duration,
    pub token_ttl: Duration,
    pub worker_queries: Vec<String>,
    pub registry_query: String,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            snapshot_ttl: Duration::from_secs(30),
            token_ttl: Duration::from_secs(60),
            worker_queries: DEFAULT_WORKER_QUERIES.iter().map(|q| q.to_string()).collect(),
            registry_query: "SOL".to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct RefreshStats {
    ticks: AtomicU64,
    last_snapshot_size: AtomicU64,
    /// Unix millis of the last completed tick, 0 before the first
    last_tick_ms: AtomicI64,
}

impl RefreshStats {
    pub fn record_tick(&self, snapshot_size: usize) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.last_snapshot_size
            .store(snapshot_size as u64, Ordering::Relaxed);
        self.last_tick_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn last_snapshot_size(&self) -> u64 {
        self.last_snapshot_size.load(Ordering::Relaxed)
    }

    pub fn last_tick_at(&self) -> Option<DateTime<Utc>> {
        match self.last_tick_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Utc.timestamp_millis_opt(ms).single(),
        }
    }
}

pub struct RefreshScheduler {
    pair_source: Arc<dyn TokenSource>,
    registry_source: Arc<dyn TokenSource>,
    cache: TieredCache,
    hub: SnapshotHub,
    config: RefreshConfig,
    stats: Arc<RefreshStats>,
}

impl RefreshScheduler {
    pub fn new(
        pair_source: Arc<dyn TokenSource>,
        registry_source: Arc<dyn TokenSource>,
        cache: TieredCache,
        hub: SnapshotHub,
        config: RefreshConfig,
    ) -> Self {
        Self {
            pair_source,
            registry_source,
            cache,
            hub,
            config,
            stats: Arc::new(RefreshStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<RefreshStats> {
        self.stats.clone()
    }

    /// Tick forever. The first tick fires immediately so the listing is
    /// populated at startup; late ticks are skipped rather than bunched.
    pub async fn run(&self) {
        info!(
            "Refresh loop started (interval: {}s, {} worker queries)",
            self.config.interval.as_secs(),
            self.config.worker_queries.len()
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            self.run_tick().await;
        }
    }

    pub async fn run_tick(&self) -> Snapshot {
        let started = Instant::now();

        let pair_calls = self
            .config
            .worker_queries
            .iter()
            .map(|query| self.pair_source.fetch(query));
        let (pair_results, registry_records) = tokio::join!(
            join_all(pair_calls),
            self.registry_source.fetch(&self.config.registry_query)
        );

        let pair_records = dedup_by_volume(pair_results.into_iter().flatten().collect());
        debug!(
            "{} unique {} tokens, {} {} tokens",
            pair_records.len(),
            self.pair_source.source_name(),
            registry_records.len(),
            self.registry_source.source_name()
        );

        let snapshot: Snapshot = Arc::new(merge(pair_records, registry_records));

        if let Err(e) = self.store(&snapshot).await {
            warn!("Failed to cache snapshot: {:#}", e);
        }

        match self.hub.publish(snapshot.clone()).await {
            Ok(receivers) => debug!("Published snapshot to {} subscribers", receivers),
            Err(e) => warn!("Failed to publish snapshot: {:#}", e),
        }

        self.stats.record_tick(snapshot.len());
        info!(
            "Updated {} tokens in {}ms",
            snapshot.len(),
            started.elapsed().as_millis()
        );

        snapshot
    }

    async fn store(&self, snapshot: &[TokenRecord]) -> Result<()> {
        self.cache
            .set_json(SNAPSHOT_KEY, snapshot, self.config.snapshot_ttl)
            .await?;

        // Per-token mirror for point lookups, one batch per tick; nothing reads it yet
        let mirror = snapshot
            .iter()
            .map(|record| {
                let key = token_key(&record.address);
                serde_json::to_string(record)
                    .map(|value| (key.clone(), value))
                    .map_err(|source| CacheError::Codec { key, source })
            })
            .collect::<Result<Vec<_>, CacheError>>()?;
        self.cache.set_many(mirror, self.config.token_ttl).await;

        Ok(())
    }
}
