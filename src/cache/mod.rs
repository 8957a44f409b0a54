//! Two-tier cache facade (spec §4.2): L1 in-memory LRU + L2 persistent file
//! store, composed under a single `CacheManager`.

pub mod disk;
pub mod memory;

use crate::model::{CacheEntry, Node};
use disk::DiskCache;
use memory::MemoryCache;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CacheManagerConfig {
    pub l1_capacity: usize,
    pub l1_ttl: Duration,
    pub l2_dir: Option<String>,
    pub l2_max_size: Option<String>,
    pub appname: String,
}

impl Default for CacheManagerConfig {
    fn default() -> Self {
        Self {
            l1_capacity: 1000,
            l1_ttl: Duration::from_secs(5 * 60),
            l2_dir: None,
            l2_max_size: Some("100MB".to_string()),
            appname: "vannotate".to_string(),
        }
    }
}

pub struct CacheManager {
    l1: MemoryCache,
    l2: DiskCache,
    l1_ttl: Duration,
}

impl CacheManager {
    pub fn new(config: CacheManagerConfig) -> Self {
        Self {
            l1: MemoryCache::new(config.l1_capacity, config.l1_ttl),
            l2: DiskCache::new(
                config.l2_dir.as_deref(),
                &config.appname,
                config.l2_max_size.as_deref(),
            ),
            l1_ttl: config.l1_ttl,
        }
    }

    /// Write to L1; best-effort write to L2 if enabled. L2 failures never
    /// cause this call to fail (spec §4.2 invariant (b)).
    pub async fn set(&self, key: &str, value: Node, ttl: Option<Duration>) {
        self.l1.set(key, value.clone(), ttl).await;
        if self.l2.enabled() {
            let ttl_ms = ttl.unwrap_or(self.l1_ttl).as_millis() as i64;
            self.l2.set(key, value, ttl_ms).await;
        }
    }

    /// L1 first; on miss, probe L2 and *promote* into L1 before returning
    /// (spec §4.2 invariant, "L2 promotion").
    pub async fn get(&self, key: &str) -> Option<Node> {
        if let Some(value) = self.l1.get(key).await {
            return Some(value);
        }
        if !self.l2.enabled() {
            return None;
        }
        let value = self.l2.get(key).await?;
        self.l1
            .insert_entry(CacheEntry {
                key: key.to_string(),
                data: value.clone(),
                expires_at: chrono::Utc::now().timestamp_millis() + self.l1_ttl.as_millis() as i64,
                created_at: chrono::Utc::now().timestamp_millis(),
            })
            .await;
        Some(value)
    }

    /// True if present (and unexpired) in either tier.
    pub async fn has(&self, key: &str) -> bool {
        self.l1.has(key).await || (self.l2.enabled() && self.l2.has(key).await)
    }

    /// Delete from both tiers; best-effort across tiers.
    pub async fn delete(&self, key: &str) {
        self.l1.delete(key).await;
        if self.l2.enabled() {
            self.l2.delete(key).await;
        }
    }

    pub async fn clear(&self) {
        self.l1.clear().await;
        if self.l2.enabled() {
            self.l2.clear().await;
        }
    }

    /// Exposed for tests/spec scenario 5 ("a subsequent `memoryCache.get(k)`
    /// (direct) returns `v`").
    pub fn memory(&self) -> &MemoryCache {
        &self.l1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn l2_hit_promotes_into_l1() {
        let dir = tempdir().unwrap();
        let manager = CacheManager::new(CacheManagerConfig {
            l2_dir: Some(dir.path().to_str().unwrap().to_string()),
            ..Default::default()
        });

        // Seed L2 only, bypassing the facade's L1 write.
        manager
            .l2
            .set("k", Node::String("v".into()), 60_000)
            .await;

        assert_eq!(manager.get("k").await, Some(Node::String("v".into())));
        // Now served straight from L1 without touching L2.
        assert_eq!(
            manager.memory().get("k").await,
            Some(Node::String("v".into()))
        );
    }

    #[tokio::test]
    async fn set_then_get_within_ttl_round_trips() {
        let manager = CacheManager::new(CacheManagerConfig::default());
        manager.set("k", Node::Bool(true), None).await;
        assert_eq!(manager.get("k").await, Some(Node::Bool(true)));
    }

    #[tokio::test]
    async fn delete_removes_from_both_tiers() {
        let dir = tempdir().unwrap();
        let manager = CacheManager::new(CacheManagerConfig {
            l2_dir: Some(dir.path().to_str().unwrap().to_string()),
            ..Default::default()
        });
        manager.set("k", Node::Bool(true), None).await;
        manager.delete("k").await;
        assert!(!manager.has("k").await);
    }
}
