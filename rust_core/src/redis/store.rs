//! Redis-backed remote cache tier
//!
//! The [`ConnectionManager`] is created by a single background task. Callers
//! never wait on that connect: until it succeeds every command reports
//! [`CacheError::Unavailable`] at once and the tiered cache serves from memory.
//! A failed connect is retried no sooner than [`RECONNECT_COOLDOWN`] later.
//! Once connected, the manager reconnects on its own after a drop.

use crate::cache::{CacheError, RemoteStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError, RedisResult};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(2);
pub const RECONNECT_COOLDOWN: Duration = Duration::from_secs(5);

// ConnectionManager backoff: 2 retries, 2^n * 50ms apart
const CONNECT_BACKOFF_BASE: u64 = 2;
const CONNECT_BACKOFF_FACTOR_MS: u64 = 50;
const CONNECT_RETRIES: usize = 2;

impl From<RedisError> for CacheError {
    fn from(e: RedisError) -> Self {
        if e.is_connection_refusal()
            || e.is_connection_dropped()
            || e.is_io_error()
            || e.is_timeout()
        {
            CacheError::Unavailable(e.to_string())
        } else {
            CacheError::Backend(e.to_string())
        }
    }
}

#[derive(Default)]
struct ConnectionState {
    manager: Mutex<Option<ConnectionManager>>,
    /// Set while the background connect task is running
    connecting: AtomicBool,
    /// No new connect attempt before this instant
    retry_after: Mutex<Option<Instant>>,
    healthy: AtomicBool,
    connect_attempts: AtomicU64,
}

pub struct RedisStore {
    client: Client,
    state: Arc<ConnectionState>,
}

impl RedisStore {
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).context("Invalid REDIS_URL")?;
        Ok(Self {
            client,
            state: Arc::new(ConnectionState::default()),
        })
    }

    /// Current connection, or `Unavailable` immediately while none exists.
    fn connection(&self) -> Result<ConnectionManager, CacheError> {
        if let Some(conn) = self.state.manager.lock().as_ref() {
            return Ok(conn.clone());
        }

        self.spawn_connect();
        Err(CacheError::Unavailable("not connected".to_string()))
    }

    fn spawn_connect(&self) {
        if let Some(retry_after) = *self.state.retry_after.lock() {
            if Instant::now() < retry_after {
                return;
            }
        }
        // Only one connect task at a time
        if self.state.connecting.swap(true, Ordering::AcqRel) {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.state.connecting.store(false, Ordering::Release);
            return;
        };

        let client = self.client.clone();
        let state = self.state.clone();
        handle.spawn(async move {
            state.connect_attempts.fetch_add(1, Ordering::Relaxed);
            let connect = ConnectionManager::new_with_backoff(
                client,
                CONNECT_BACKOFF_BASE,
                CONNECT_BACKOFF_FACTOR_MS,
                CONNECT_RETRIES,
            );

            match tokio::time::timeout(CONNECT_TIMEOUT, connect).await {
                Ok(Ok(conn)) => {
                    info!("Successfully connected to Redis");
                    *state.manager.lock() = Some(conn);
                    *state.retry_after.lock() = None;
                    state.healthy.store(true, Ordering::Relaxed);
                }
                Ok(Err(e)) => {
                    warn!("Redis connect failed, retrying in {:?}: {}", RECONNECT_COOLDOWN, e);
                    *state.retry_after.lock() = Some(Instant::now() + RECONNECT_COOLDOWN);
                    state.healthy.store(false, Ordering::Relaxed);
                }
                Err(_) => {
                    warn!("Redis connect timed out, retrying in {:?}", RECONNECT_COOLDOWN);
                    *state.retry_after.lock() = Some(Instant::now() + RECONNECT_COOLDOWN);
                    state.healthy.store(false, Ordering::Relaxed);
                }
            }
            state.connecting.store(false, Ordering::Release);
        });
    }

    /// Track reachability from the outcome of each command
    fn observe<T>(&self, result: Result<T, CacheError>) -> Result<T, CacheError> {
        match &result {
            Ok(_) => self.state.healthy.store(true, Ordering::Relaxed),
            Err(CacheError::Unavailable(_)) => self.state.healthy.store(false, Ordering::Relaxed),
            Err(_) => {}
        }
        result
    }

    async fn execute<T, F, Fut>(&self, f: F) -> Result<T, CacheError>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let result = match self.connection() {
            Ok(conn) => match tokio::time::timeout(COMMAND_TIMEOUT, f(conn)).await {
                Ok(reply) => reply.map_err(CacheError::from),
                Err(_) => Err(CacheError::Unavailable("command timed out".to_string())),
            },
            Err(e) => Err(e),
        };
        self.observe(result)
    }

    async fn query<T>(&self, cmd: redis::Cmd) -> Result<T, CacheError>
    where
        T: redis::FromRedisValue,
    {
        self.execute(|mut conn| async move { cmd.query_async::<_, T>(&mut conn).await })
            .await
    }
}

#[async_trait]
impl RemoteStore for RedisStore {
    fn store_name(&self) -> &str {
        "Redis"
    }

    fn is_healthy(&self) -> bool {
        self.state.healthy.load(Ordering::Relaxed)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.query(cmd).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("EX").arg(expiry_secs(ttl));
        self.query(cmd).await
    }

    async fn set_many(
        &self,
        entries: &[(String, String)],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        for (key, value) in entries {
            pipe.cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(expiry_secs(ttl))
                .ignore();
        }
        self.execute(|mut conn| async move { pipe.query_async::<_, ()>(&mut conn).await })
            .await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let mut cmd = redis::cmd("KEYS");
        cmd.arg(pattern);
        self.query(cmd).await
    }

    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut cmd = redis::cmd("MGET");
        cmd.arg(keys);
        self.query(cmd).await
    }
}

/// EX must be at least one second
fn expiry_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant as WallClock;

    async fn wait_for_connect_attempt(store: &RedisStore) {
        let deadline = WallClock::now() + Duration::from_secs(5);
        while store.state.connecting.load(Ordering::Acquire) && WallClock::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[test]
    fn test_rejects_invalid_url() {
        assert!(RedisStore::new("not a url").is_err());
    }

    #[test]
    fn test_expiry_rounds_up_to_one_second() {
        assert_eq!(expiry_secs(Duration::from_millis(200)), 1);
        assert_eq!(expiry_secs(Duration::from_secs(30)), 30);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        // Port 1 is reserved and closed on any sane host
        let store = RedisStore::new("redis://127.0.0.1:1").unwrap();

        let err = store.get("tokens:all").await.unwrap_err();
        assert!(matches!(err, CacheError::Unavailable(_)));
        assert!(!store.is_healthy());
    }

    #[tokio::test]
    async fn test_commands_do_not_wait_for_pending_connect() {
        // Non-routable address: the connect attempt hangs until its timeout
        let store = Arc::new(RedisStore::new("redis://10.255.255.1:6379").unwrap());

        let started = WallClock::now();
        let first = store.get("tokens:all").await;
        assert!(matches!(first, Err(CacheError::Unavailable(_))));

        let writes = (0..20).map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .set(&format!("token:{}", i), "{}", Duration::from_secs(60))
                    .await
            })
        });
        for write in futures_util::future::join_all(writes).await {
            assert!(matches!(write.unwrap(), Err(CacheError::Unavailable(_))));
        }
        let last = store.get("tokens:all").await;

        assert!(matches!(last, Err(CacheError::Unavailable(_))));
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(store.state.connect_attempts.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_failed_connect_waits_for_cooldown() {
        let store = RedisStore::new("redis://127.0.0.1:1").unwrap();

        assert!(store.get("k").await.is_err());
        wait_for_connect_attempt(&store).await;
        assert_eq!(store.state.connect_attempts.load(Ordering::Relaxed), 1);
        assert!(store.state.retry_after.lock().is_some());

        // Inside the cooldown no second attempt is started
        assert!(store.get("k").await.is_err());
        let batch = vec![("a".to_string(), "1".to_string())];
        assert!(store.set_many(&batch, Duration::from_secs(5)).await.is_err());
        assert!(!store.state.connecting.load(Ordering::Acquire));
        assert_eq!(store.state.connect_attempts.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    #[ignore] // Requires a local Redis
    async fn test_roundtrip_against_local_redis() {
        let store = RedisStore::new("redis://127.0.0.1:6379").unwrap();
        let _ = store.get("token-pulse:test").await;
        wait_for_connect_attempt(&store).await;

        store.set("token-pulse:test", "v", Duration::from_secs(5)).await.unwrap();
        assert_eq!(store.get("token-pulse:test").await.unwrap().as_deref(), Some("v"));

        let batch = vec![
            ("token-pulse:a".to_string(), "A".to_string()),
            ("token-pulse:b".to_string(), "B".to_string()),
        ];
        store.set_many(&batch, Duration::from_secs(5)).await.unwrap();
        let values = store
            .multi_get(&["token-pulse:a".to_string(), "token-pulse:b".to_string()])
            .await
            .unwrap();
        assert_eq!(values, vec![Some("A".to_string()), Some("B".to_string())]);
        assert!(store.is_healthy());
    }
}
