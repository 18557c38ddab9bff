//! In-process cache tier
//!
//! A mutex-guarded map used when the remote store is unreachable. Each `set`
//! schedules a deferred deletion after the TTL; the deletion only fires if the
//! key has not been rewritten since, so a snapshot refreshed every tick is
//! never dropped by the timer of an older write. Reads also ignore expired
//! entries in case no timer could be scheduled.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
    generation: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: Mutex<HashMap<String, Entry>>,
    next_generation: AtomicU64,
}

/// Cheap to clone; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let entries = self.inner.entries.lock();
        entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone())
    }

    pub fn set(&self, key: &str, value: String, ttl: Duration) {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
            generation,
        };
        self.inner.entries.lock().insert(key.to_string(), entry);
        self.schedule_eviction(key.to_string(), generation, ttl);
    }

    /// Keys matching a Redis-style glob (`*` and `?`)
    pub fn keys(&self, pattern: &str) -> Vec<String> {
        let now = Instant::now();
        let entries = self.inner.entries.lock();
        entries
            .iter()
            .filter(|(key, entry)| entry.expires_at > now && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn multi_get(&self, keys: &[String]) -> Vec<Option<String>> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    /// Live (unexpired) entry count
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .entries
            .lock()
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn schedule_eviction(&self, key: String, generation: u64, ttl: Duration) {
        // Outside a runtime, expiry falls back to the read-time check
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        handle.spawn(async move {
            tokio::time::sleep(ttl).await;
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let mut entries = inner.entries.lock();
            if entries
                .get(&key)
                .is_some_and(|entry| entry.generation == generation)
            {
                entries.remove(&key);
            }
        });
    }
}

/// Glob match supporting `*` (any run) and `?` (any single char).
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut star: Option<usize> = None;
    let mut resume = 0;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            resume = t;
            p += 1;
        } else if let Some(star_at) = star {
            p = star_at + 1;
            resume += 1;
            t = resume;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}
