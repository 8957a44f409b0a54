//! L1 in-memory LRU cache with TTL (spec §4.2).

use crate::model::{CacheEntry, Node};
use indexmap::IndexMap;
use std::time::Duration;
use tokio::sync::Mutex;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// In-memory LRU. `IndexMap` gives us insertion-order iteration; recency is
/// tracked by removing and re-inserting an entry on every access, so the
/// front of the map is always the least-recently-used entry.
struct Inner {
    capacity: usize,
    default_ttl: Duration,
    entries: IndexMap<String, CacheEntry>,
}

pub struct MemoryCache {
    inner: Mutex<Inner>,
}

impl MemoryCache {
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                capacity,
                default_ttl,
                entries: IndexMap::new(),
            }),
        }
    }

    pub fn with_default_ttl(capacity: usize) -> Self {
        Self::new(capacity, Duration::from_secs(5 * 60))
    }

    /// Insert a value, evicting the least-recently-accessed entry if the
    /// cache is at capacity.
    pub async fn set(&self, key: &str, value: Node, ttl: Option<Duration>) {
        let mut inner = self.inner.lock().await;
        let now = now_ms();
        let ttl = ttl.unwrap_or(inner.default_ttl);
        inner.entries.shift_remove(key);
        if inner.entries.len() >= inner.capacity && !inner.entries.is_empty() {
            inner.entries.shift_remove_index(0);
        }
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                data: value,
                expires_at: now + ttl.as_millis() as i64,
                created_at: now,
            },
        );
    }

    /// Insert a pre-built entry (used by the L2-promotion path) without
    /// touching its timestamps.
    pub async fn insert_entry(&self, entry: CacheEntry) {
        let mut inner = self.inner.lock().await;
        inner.entries.shift_remove(&entry.key);
        if inner.entries.len() >= inner.capacity && !inner.entries.is_empty() {
            inner.entries.shift_remove_index(0);
        }
        inner.entries.insert(entry.key.clone(), entry);
    }

    /// Fetch a value, updating its recency. Expired entries are removed and
    /// treated as absent.
    pub async fn get(&self, key: &str) -> Option<Node> {
        let mut inner = self.inner.lock().await;
        let now = now_ms();
        let entry = inner.entries.get(key)?.clone();
        if entry.is_expired(now) {
            inner.entries.shift_remove(key);
            return None;
        }
        // Touch recency: move to the back.
        inner.entries.shift_remove(key);
        inner.entries.insert(key.to_string(), entry.clone());
        Some(entry.data)
    }

    /// Containment check; does not update recency (spec §4.2 "Access updates
    /// recency; containment-check does not").
    pub async fn has(&self, key: &str) -> bool {
        let inner = self.inner.lock().await;
        match inner.entries.get(key) {
            Some(entry) => !entry.is_expired(now_ms()),
            None => false,
        }
    }

    pub async fn delete(&self, key: &str) {
        let mut inner = self.inner.lock().await;
        inner.entries.shift_remove(key);
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.entries.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = MemoryCache::with_default_ttl(10);
        cache.set("k", Node::String("v".into()), None).await;
        assert_eq!(cache.get("k").await, Some(Node::String("v".into())));
    }

    #[tokio::test]
    async fn expired_entry_is_treated_as_absent() {
        let cache = MemoryCache::new(10, Duration::from_millis(1));
        cache.set("k", Node::Bool(true), None).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(cache.get("k").await, None);
        assert!(!cache.has("k").await);
    }

    #[tokio::test]
    async fn lru_evicts_least_recently_accessed() {
        let cache = MemoryCache::with_default_ttl(2);
        cache.set("a", Node::Number(1.0), None).await;
        cache.set("b", Node::Number(2.0), None).await;
        // touch "a" so "b" becomes least-recently-used
        cache.get("a").await;
        cache.set("c", Node::Number(3.0), None).await;
        assert_eq!(cache.get("b").await, None);
        assert_eq!(cache.get("a").await, Some(Node::Number(1.0)));
        assert_eq!(cache.get("c").await, Some(Node::Number(3.0)));
    }

    #[tokio::test]
    async fn has_does_not_update_recency() {
        let cache = MemoryCache::with_default_ttl(2);
        cache.set("a", Node::Number(1.0), None).await;
        cache.set("b", Node::Number(2.0), None).await;
        cache.has("a").await;
        cache.set("c", Node::Number(3.0), None).await;
        // "a" was only `has`-checked, not `get`-accessed, so it is still LRU
        assert_eq!(cache.get("a").await, None);
    }
}
