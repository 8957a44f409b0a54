//! L2 persistent file-per-key cache (spec §4.2).

use crate::model::{CacheEntry, Node};
use byte_unit::Byte;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// File-backed L2 cache. Disabled gracefully if the directory cannot be
/// created (e.g. read-only or sandboxed environments).
pub struct DiskCache {
    dir: Option<PathBuf>,
    max_bytes: Option<u64>,
    lock: Mutex<()>,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Content-addressable filename for a cache key.
fn hashed_filename(key: &str) -> String {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    format!("{:016x}.json", hasher.finish())
}

impl DiskCache {
    /// `dir` defaults to `~/.cache/<appname>/` when `None`; `max_size`
    /// accepts byte-unit strings like `"100MB"`.
    pub fn new(dir: Option<&str>, appname: &str, max_size: Option<&str>) -> Self {
        let resolved = dir
            .map(|d| d.to_string())
            .unwrap_or_else(|| format!("~/.cache/{appname}/"));
        let expanded = shellexpand::tilde(&resolved).into_owned();
        let path = PathBuf::from(expanded);

        let dir = match std::fs::create_dir_all(&path) {
            Ok(()) => Some(path),
            Err(e) => {
                tracing::debug!(error = %e, "L2 cache disabled: could not create cache directory");
                None
            }
        };

        let max_bytes = max_size
            .and_then(|s| s.parse::<Byte>().ok())
            .map(|b| b.get_bytes() as u64);

        Self {
            dir,
            max_bytes,
            lock: Mutex::new(()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.dir.is_some()
    }

    fn entry_path(&self, key: &str) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join(hashed_filename(key)))
    }

    /// Best-effort write: a `.tmp` sibling is written then renamed into
    /// place for atomicity, and a background sweep removes expired entries.
    pub async fn set(&self, key: &str, value: Node, ttl_ms: i64) {
        let Some(path) = self.entry_path(key) else {
            return;
        };
        let _guard = self.lock.lock().await;
        let now = now_ms();
        let entry = CacheEntry {
            key: key.to_string(),
            data: value,
            expires_at: now + ttl_ms,
            created_at: now,
        };
        if let Err(e) = write_atomic(&path, &entry) {
            tracing::debug!(error = %e, "L2 cache write failed (best-effort, ignored)");
            return;
        }
        self.sweep_expired().await;
        self.sweep_over_capacity().await;
    }

    pub async fn get(&self, key: &str) -> Option<Node> {
        let path = self.entry_path(key)?;
        let _guard = self.lock.lock().await;
        let entry = read_entry(&path)?;
        if entry.is_expired(now_ms()) {
            let _ = std::fs::remove_file(&path);
            return None;
        }
        // touch access time for LRU-by-mtime eviction
        let _ = filetime_touch(&path);
        Some(entry.data)
    }

    pub async fn has(&self, key: &str) -> bool {
        let Some(path) = self.entry_path(key) else {
            return false;
        };
        match read_entry(&path) {
            Some(entry) => !entry.is_expired(now_ms()),
            None => false,
        }
    }

    pub async fn delete(&self, key: &str) {
        if let Some(path) = self.entry_path(key) {
            let _ = std::fs::remove_file(path);
        }
    }

    pub async fn clear(&self) {
        let Some(dir) = &self.dir else { return };
        if let Ok(entries) = std::fs::read_dir(dir) {
            for entry in entries.flatten() {
                let _ = std::fs::remove_file(entry.path());
            }
        }
    }

    async fn sweep_expired(&self) {
        let Some(dir) = &self.dir else { return };
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        let now = now_ms();
        for entry in entries.flatten() {
            let path = entry.path();
            if let Some(cached) = read_entry(&path) {
                if cached.is_expired(now) {
                    let _ = std::fs::remove_file(&path);
                }
            }
        }
    }

    /// Evict entries by least-recently-accessed (mtime) when the directory
    /// would exceed the configured size cap.
    async fn sweep_over_capacity(&self) {
        let (Some(dir), Some(max_bytes)) = (&self.dir, self.max_bytes) else {
            return;
        };
        let Ok(read_dir) = std::fs::read_dir(dir) else {
            return;
        };
        let mut files: Vec<(PathBuf, u64, std::time::SystemTime)> = Vec::new();
        let mut total = 0u64;
        for entry in read_dir.flatten() {
            if let Ok(meta) = entry.metadata() {
                let size = meta.len();
                let mtime = meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                total += size;
                files.push((entry.path(), size, mtime));
            }
        }
        if total <= max_bytes {
            return;
        }
        files.sort_by_key(|(_, _, mtime)| *mtime);
        for (path, size, _) in files {
            if total <= max_bytes {
                break;
            }
            if std::fs::remove_file(&path).is_ok() {
                total = total.saturating_sub(size);
            }
        }
    }
}

fn write_atomic(path: &Path, entry: &CacheEntry) -> std::io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    let payload = serde_json::to_vec(entry)?;
    std::fs::write(&tmp_path, payload)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn read_entry(path: &Path) -> Option<CacheEntry> {
    let bytes = std::fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Bump a file's mtime to "now" so LRU-by-mtime eviction sees it as recently
/// used. Uses a zero-byte re-write rather than a dedicated crate, since the
/// entry is small JSON anyway.
fn filetime_touch(path: &Path) -> std::io::Result<()> {
    let bytes = std::fs::read(path)?;
    std::fs::write(path, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(Some(dir.path().to_str().unwrap()), "vannotate", None);
        cache.set("k", Node::String("v".into()), 60_000).await;
        assert_eq!(cache.get("k").await, Some(Node::String("v".into())));
    }

    #[tokio::test]
    async fn expired_entry_is_removed_on_read() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(Some(dir.path().to_str().unwrap()), "vannotate", None);
        cache.set("k", Node::Bool(true), -1).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn writes_are_atomic_via_tmp_rename() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(Some(dir.path().to_str().unwrap()), "vannotate", None);
        cache.set("k", Node::Number(1.0), 60_000).await;
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert!(entries.iter().all(|name| !name.ends_with(".tmp")));
    }

    #[tokio::test]
    async fn disabled_gracefully_when_dir_uncreatable() {
        let cache = DiskCache::new(Some("/nonexistent-root-path/deep/cache"), "vannotate", None);
        // Under most test sandboxes this path cannot be created; either way
        // `set`/`get` must not panic.
        cache.set("k", Node::Bool(true), 1000).await;
        let _ = cache.get("k").await;
    }
}
