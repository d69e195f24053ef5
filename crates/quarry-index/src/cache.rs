//! Persistent content-addressed embedding cache.
//!
//! Maps chunk content-hash to its vector, so embedding is an idempotent
//! function of chunk text. The cache is a performance layer only: losing an
//! entry costs a re-embed, never correctness.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub vector: Vec<f32>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub disk_bytes: u64,
}

#[derive(Debug)]
pub struct EmbeddingCache {
    path: PathBuf,
    entries: HashMap<String, CacheEntry>,
    dirty: bool,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

impl EmbeddingCache {
    /// Load the cache from disk. A missing or corrupt file starts empty.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("corrupt embedding cache at {}: {e}; starting fresh", path.display());
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path: path.to_path_buf(),
            entries,
            dirty: false,
        }
    }

    #[must_use]
    pub fn get(&self, hash: &str) -> Option<&[f32]> {
        self.entries.get(hash).map(|e| e.vector.as_slice())
    }

    #[must_use]
    pub fn has(&self, hash: &str) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn set(&mut self, hash: String, vector: Vec<f32>) {
        self.entries.insert(
            hash,
            CacheEntry {
                vector,
                timestamp: now_ms(),
            },
        );
        self.dirty = true;
    }

    /// Write the cache to disk. A no-op when nothing changed and the file
    /// already exists; otherwise writes atomically via a temp-file rename.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// file cannot be written.
    pub fn save(&mut self) -> Result<()> {
        if !self.dirty && self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(&self.entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        self.dirty = false;
        Ok(())
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.dirty = true;
        }
        self.entries.clear();
    }

    /// Remove entries older than `max_age`. Returns the number removed.
    pub fn prune(&mut self, max_age: Duration) -> usize {
        let cutoff = now_ms().saturating_sub(u64::try_from(max_age.as_millis()).unwrap_or(u64::MAX));
        let before = self.entries.len();
        self.entries.retain(|_, e| e.timestamp >= cutoff);
        let removed = before - self.entries.len();
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let disk_bytes = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        CacheStats {
            entries: self.entries.len(),
            disk_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_has() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = EmbeddingCache::load(&dir.path().join("cache.json"));
        assert!(!cache.has("abc"));

        cache.set("abc".into(), vec![0.1, 0.2]);
        assert!(cache.has("abc"));
        assert_eq!(cache.get("abc"), Some([0.1, 0.2].as_slice()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        let mut cache = EmbeddingCache::load(&path);
        cache.set("h1".into(), vec![1.0, 2.0, 3.0]);
        cache.save().unwrap();

        let reloaded = EmbeddingCache::load(&path);
        assert_eq!(reloaded.get("h1"), Some([1.0, 2.0, 3.0].as_slice()));
    }

    #[test]
    fn save_without_mutation_skips_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let mut cache = EmbeddingCache::load(&path);
        cache.set("h1".into(), vec![1.0]);
        cache.save().unwrap();
        let mtime = std::fs::metadata(&path).unwrap().modified().unwrap();

        std::thread::sleep(std::time::Duration::from_millis(20));
        let mut reloaded = EmbeddingCache::load(&path);
        reloaded.save().unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), mtime);
    }

    #[test]
    fn save_writes_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let mut cache = EmbeddingCache::load(&path);
        cache.save().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn corrupt_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "][ not json").unwrap();

        let cache = EmbeddingCache::load(&path);
        assert!(cache.is_empty());
    }

    #[test]
    fn prune_removes_old_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = EmbeddingCache::load(&dir.path().join("cache.json"));
        cache.set("old".into(), vec![1.0]);
        cache.entries.get_mut("old").unwrap().timestamp = 0;
        cache.set("new".into(), vec![2.0]);

        let removed = cache.prune(Duration::from_secs(3600));
        assert_eq!(removed, 1);
        assert!(!cache.has("old"));
        assert!(cache.has("new"));
    }

    #[test]
    fn prune_nothing_returns_zero() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = EmbeddingCache::load(&dir.path().join("cache.json"));
        cache.set("h".into(), vec![1.0]);
        assert_eq!(cache.prune(Duration::from_secs(3600)), 0);
    }

    #[test]
    fn clear_empties_and_marks_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let mut cache = EmbeddingCache::load(&path);
        cache.set("h".into(), vec![1.0]);
        cache.save().unwrap();

        cache.clear();
        cache.save().unwrap();
        let reloaded = EmbeddingCache::load(&path);
        assert!(reloaded.is_empty());
    }

    #[test]
    fn stats_reports_entries_and_disk_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let mut cache = EmbeddingCache::load(&path);
        cache.set("h".into(), vec![1.0, 2.0]);
        cache.save().unwrap();

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert!(stats.disk_bytes > 0);
    }
}
