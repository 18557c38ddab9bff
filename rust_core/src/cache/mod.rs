//! Two-tier cache store
//!
//! Reads and writes go to a remote store (Redis) when it answers, with an
//! in-process [`MemoryStore`] behind it. Every write lands in both tiers.
//! Reads only drop to the local tier when the remote tier *errors*; a remote
//! miss is a miss. Remote failures are logged and never surfaced.
//!
//! Stored values are whole JSON documents. A new snapshot replaces the old one
//! under the same key; nothing is ever patched in place.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Canonical snapshot key
pub const SNAPSHOT_KEY: &str = "tokens:all";
const SEARCH_KEY_PREFIX: &str = "search:";
const TOKEN_KEY_PREFIX: &str = "token:";

/// Key for a cached live-search result
pub fn search_key(query: &str) -> String {
    format!("{}{}", SEARCH_KEY_PREFIX, query)
}

/// Key for the per-token mirror written by the refresh scheduler
pub fn token_key(address: &str) -> String {
    format!("{}{}", TOKEN_KEY_PREFIX, address)
}

#[derive(Debug, Error)]
pub enum CacheError {
    /// Connection refused, dropped or timed out
    #[error("remote cache unavailable: {0}")]
    Unavailable(String),

    /// The remote store answered with an error
    #[error("remote cache command failed: {0}")]
    Backend(String),

    #[error("cache entry {key} is not valid JSON: {source}")]
    Codec {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Distributed tier with native expiry
#[async_trait]
pub trait RemoteStore: Send + Sync {
    fn store_name(&self) -> &str;

    /// Whether the last operation reached the store
    fn is_healthy(&self) -> bool;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Write every entry with the same TTL in one round trip.
    async fn set_many(
        &self,
        entries: &[(String, String)],
        ttl: Duration,
    ) -> Result<(), CacheError>;

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError>;

    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError>;
}

#[derive(Clone)]
pub struct TieredCache {
    remote: Option<Arc<dyn RemoteStore>>,
    local: MemoryStore,
}

impl TieredCache {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            remote: Some(remote),
            local: MemoryStore::new(),
        }
    }

    /// Cache with no remote tier; everything is served from process memory.
    pub fn local_only() -> Self {
        Self {
            remote: None,
            local: MemoryStore::new(),
        }
    }

    pub fn local(&self) -> &MemoryStore {
        &self.local
    }

    pub fn remote_healthy(&self) -> bool {
        self.remote.as_ref().is_some_and(|r| r.is_healthy())
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        if let Some(remote) = &self.remote {
            match remote.get(key).await {
                Ok(value) => return value,
                Err(e) => warn!(
                    "{} unreachable, using memory cache [GET {}]: {}",
                    remote.store_name(),
                    key,
                    e
                ),
            }
        }
        self.local.get(key)
    }

    pub async fn set(&self, key: &str, value: String, ttl: Duration) {
        if let Some(remote) = &self.remote {
            if let Err(e) = remote.set(key, &value, ttl).await {
                warn!(
                    "{} unreachable, using memory cache [SET {}]: {}",
                    remote.store_name(),
                    key,
                    e
                );
            }
        }
        self.local.set(key, value, ttl);
    }

    /// Batched [`set`](Self::set): one remote call for all entries, then each
    /// entry is written to the local tier.
    pub async fn set_many(&self, entries: Vec<(String, String)>, ttl: Duration) {
        if entries.is_empty() {
            return;
        }
        if let Some(remote) = &self.remote {
            if let Err(e) = remote.set_many(&entries, ttl).await {
                warn!(
                    "{} unreachable, using memory cache [SET {} keys]: {}",
                    remote.store_name(),
                    entries.len(),
                    e
                );
            }
        }
        for (key, value) in entries {
            self.local.set(&key, value, ttl);
        }
    }

    pub async fn keys(&self, pattern: &str) -> Vec<String> {
        if let Some(remote) = &self.remote {
            match remote.keys(pattern).await {
                Ok(keys) => return keys,
                Err(e) => warn!(
                    "{} unreachable, using memory cache [KEYS {}]: {}",
                    remote.store_name(),
                    pattern,
                    e
                ),
            }
        }
        self.local.keys(pattern)
    }

    pub async fn multi_get(&self, keys: &[String]) -> Vec<Option<String>> {
        if keys.is_empty() {
            return Vec::new();
        }
        if let Some(remote) = &self.remote {
            match remote.multi_get(keys).await {
                Ok(values) => return values,
                Err(e) => warn!(
                    "{} unreachable, using memory cache [MGET {} keys]: {}",
                    remote.store_name(),
                    keys.len(),
                    e
                ),
            }
        }
        self.local.multi_get(keys)
    }

    /// Read and decode a JSON value. Absent keys are `Ok(None)`; an entry that
    /// does not decode is an error.
    pub async fn get_json<T>(&self, key: &str) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned,
    {
        match self.get(key).await {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| CacheError::Codec {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    pub async fn set_json<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError>
    where
        T: Serialize + ?Sized,
    {
        let raw = serde_json::to_string(value).map_err(|source| CacheError::Codec {
            key: key.to_string(),
            source,
        })?;
        self.set(key, raw, ttl).await;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Remote tier fake; `down` simulates an unreachable server.
    #[derive(Default)]
    pub(crate) struct FakeRemote {
        pub(crate) data: Mutex<HashMap<String, String>>,
        pub(crate) down: AtomicBool,
        /// Round trips attempted, failed ones included
        pub(crate) calls: AtomicUsize,
    }

    impl FakeRemote {
        pub(crate) fn unreachable() -> Self {
            let remote = Self::default();
            remote.down.store(true, Ordering::SeqCst);
            remote
        }

        fn check(&self) -> Result<(), CacheError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) {
                Err(CacheError::Unavailable("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl RemoteStore for FakeRemote {
        fn store_name(&self) -> &str {
            "FakeRemote"
        }

        fn is_healthy(&self) -> bool {
            !self.down.load(Ordering::SeqCst)
        }

        async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            self.check()?;
            Ok(self.data.lock().get(key).cloned())
        }

        async fn set(&self, key: &str, value: &str, _ttl: Duration) -> Result<(), CacheError> {
            self.check()?;
            self.data.lock().insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn set_many(
            &self,
            entries: &[(String, String)],
            _ttl: Duration,
        ) -> Result<(), CacheError> {
            self.check()?;
            let mut data = self.data.lock();
            for (key, value) in entries {
                data.insert(key.clone(), value.clone());
            }
            Ok(())
        }

        async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
            self.check()?;
            let prefix = pattern.trim_end_matches('*');
            Ok(self
                .data
                .lock()
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        }

        async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError> {
            self.check()?;
            let data = self.data.lock();
            Ok(keys.iter().map(|k| data.get(k).cloned()).collect())
        }
    }

    const TTL: Duration = Duration::from_secs(30);

    #[test]
    fn test_key_schema() {
        assert_eq!(SNAPSHOT_KEY, "tokens:all");
        assert_eq!(search_key("BONK"), "search:BONK");
        assert_eq!(token_key("So111"), "token:So111");
    }

    #[tokio::test]
    async fn test_fallback_when_remote_unreachable() {
        let cache = TieredCache::new(Arc::new(FakeRemote::unreachable()));

        cache.set("tokens:all", "[1,2,3]".to_string(), TTL).await;

        assert_eq!(cache.get("tokens:all").await.as_deref(), Some("[1,2,3]"));
        assert!(!cache.remote_healthy());
    }

    #[tokio::test]
    async fn test_remote_miss_is_not_fallback() {
        let remote = Arc::new(FakeRemote::default());
        let cache = TieredCache::new(remote.clone());

        cache.set("k", "v".to_string(), TTL).await;
        assert_eq!(remote.data.lock().get("k").map(String::as_str), Some("v"));

        // Remote evicted the key while the local copy is still live
        remote.data.lock().remove("k");
        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.local().get("k").as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_remote_error_reads_local_copy() {
        let remote = Arc::new(FakeRemote::default());
        let cache = TieredCache::new(remote.clone());

        cache.set("k", "v".to_string(), TTL).await;
        remote.down.store(true, Ordering::SeqCst);

        assert_eq!(cache.get("k").await.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_keys_and_multi_get_fallback() {
        let cache = TieredCache::new(Arc::new(FakeRemote::unreachable()));
        cache.set("token:a", "A".to_string(), TTL).await;
        cache.set("token:b", "B".to_string(), TTL).await;

        let mut keys = cache.keys("token:*").await;
        keys.sort();
        assert_eq!(keys, vec!["token:a", "token:b"]);

        let values = cache.multi_get(&keys).await;
        assert_eq!(values, vec![Some("A".to_string()), Some("B".to_string())]);
        assert!(cache.multi_get(&[]).await.is_empty());
    }

    #[tokio::test]
    async fn test_set_many_is_one_remote_call() {
        let remote = Arc::new(FakeRemote::default());
        let cache = TieredCache::new(remote.clone());
        let entries: Vec<(String, String)> = (0..20)
            .map(|i| (token_key(&format!("t{}", i)), i.to_string()))
            .collect();

        cache.set_many(entries, TTL).await;

        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
        assert_eq!(remote.data.lock().len(), 20);
        assert_eq!(cache.local().get("token:t7").as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn test_set_many_falls_back_locally() {
        let remote = Arc::new(FakeRemote::unreachable());
        let cache = TieredCache::new(remote.clone());
        let entries = vec![
            ("token:a".to_string(), "A".to_string()),
            ("token:b".to_string(), "B".to_string()),
        ];

        cache.set_many(entries, TTL).await;
        cache.set_many(Vec::new(), TTL).await;

        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get("token:b").await.as_deref(), Some("B"));
        assert_eq!(cache.local().len(), 2);
    }

    #[tokio::test]
    async fn test_json_roundtrip_and_corrupt_entry() {
        let cache = TieredCache::local_only();

        cache.set_json("nums", &vec![1u32, 2, 3], TTL).await.unwrap();
        let nums: Option<Vec<u32>> = cache.get_json("nums").await.unwrap();
        assert_eq!(nums, Some(vec![1, 2, 3]));

        let missing: Option<Vec<u32>> = cache.get_json("nope").await.unwrap();
        assert_eq!(missing, None);

        cache.set("nums", "not json".to_string(), TTL).await;
        let err = cache.get_json::<Vec<u32>>("nums").await.unwrap_err();
        assert!(matches!(err, CacheError::Codec { .. }));
    }
}
