//! Content-addressed cache store.
//!
//! Layout: `<root>/index.json` (normalised URL -> cache key) and
//! `<root>/pages/<cache_key>.json` (one entry file per cached artifact).
//! File IO is best-effort-atomic (write-then-rename where practical);
//! corrupt data is treated as absent rather than propagated as a hard
//! error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::warn;

use crate::url_normalize;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub url: String,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub response: T,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub expired: usize,
    pub valid: usize,
    pub size_bytes: u64,
    pub size_human: String,
}

pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn pages_dir(&self) -> PathBuf {
        self.root.join("pages")
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("index.json")
    }

    fn entry_path(&self, cache_key: &str) -> PathBuf {
        self.pages_dir().join(format!("{cache_key}.json"))
    }

    async fn ensure_dirs(&self) -> Result<(), CacheError> {
        fs::create_dir_all(self.pages_dir()).await?;
        Ok(())
    }

    /// `max_age ≤ 0` is always a miss (cache fully bypassed: no read happens).
    pub async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        max_age: i64,
        variant: Option<&str>,
    ) -> Result<Option<T>, CacheError> {
        if max_age <= 0 {
            return Ok(None);
        }
        let key = url_normalize::cache_key(url, variant)?;
        let path = self.entry_path(&key);

        let bytes = match fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: CacheEntry<T> = match serde_json::from_slice(&bytes) {
            Ok(e) => e,
            Err(e) => {
                warn!("corrupt cache entry {}: {}", path.display(), e);
                return Ok(None);
            }
        };

        if Utc::now() > entry.expires_at {
            return Ok(None);
        }
        Ok(Some(entry.response))
    }

    /// `max_age ≤ 0` is a no-op (cache fully bypassed: no write happens).
    pub async fn set<T: Serialize>(
        &self,
        url: &str,
        response: &T,
        max_age: i64,
        variant: Option<&str>,
    ) -> Result<(), CacheError> {
        if max_age <= 0 {
            return Ok(());
        }
        self.ensure_dirs().await?;

        let key = url_normalize::cache_key(url, variant)?;
        let now = Utc::now();
        let entry = CacheEntry {
            url: url.to_string(),
            cached_at: now,
            expires_at: now + ChronoDuration::seconds(max_age),
            response,
        };
        let path = self.entry_path(&key);
        fs::write(&path, serde_json::to_vec_pretty(&entry)?).await?;

        let normalised = url_normalize::normalise(url)?;
        let mut index = self.load_index().await;
        index.insert(normalised, key);
        self.save_index(&index).await?;

        Ok(())
    }

    /// Delete one URL's entry (and index record), or wipe the whole directory
    /// when `url` is `None`.
    pub async fn clear(&self, url: Option<&str>) -> Result<usize, CacheError> {
        match url {
            Some(url) => {
                let key = url_normalize::cache_key(url, None)?;
                let path = self.entry_path(&key);
                let cleared = if fs::metadata(&path).await.is_ok() {
                    fs::remove_file(&path).await?;
                    1
                } else {
                    0
                };
                let normalised = url_normalize::normalise(url)?;
                let mut index = self.load_index().await;
                if index.remove(&normalised).is_some() {
                    self.save_index(&index).await?;
                }
                Ok(cleared)
            }
            None => {
                let mut cleared = 0;
                if let Ok(mut entries) = fs::read_dir(self.pages_dir()).await {
                    while let Ok(Some(entry)) = entries.next_entry().await {
                        if fs::remove_file(entry.path()).await.is_ok() {
                            cleared += 1;
                        }
                    }
                }
                let _ = fs::remove_file(self.index_path()).await;
                Ok(cleared)
            }
        }
    }

    /// Remove expired entries; returns the count pruned.
    pub async fn prune_expired(&self) -> Result<usize, CacheError> {
        let mut pruned = 0;
        let mut index = self.load_index().await;
        let mut index_changed = false;

        let Ok(mut entries) = fs::read_dir(self.pages_dir()).await else {
            return Ok(0);
        };
        while let Ok(Some(dir_entry)) = entries.next_entry().await {
            let path = dir_entry.path();
            let Ok(bytes) = fs::read(&path).await else { continue };
            let Ok(entry) = serde_json::from_slice::<CacheEntry<serde_json::Value>>(&bytes) else {
                continue;
            };
            if Utc::now() > entry.expires_at {
                if fs::remove_file(&path).await.is_ok() {
                    pruned += 1;
                }
                if let Ok(normalised) = url_normalize::normalise(&entry.url) {
                    if index.remove(&normalised).is_some() {
                        index_changed = true;
                    }
                }
            }
        }

        if index_changed {
            self.save_index(&index).await?;
        }
        Ok(pruned)
    }

    pub async fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        let Ok(mut entries) = fs::read_dir(self.pages_dir()).await else {
            return stats;
        };
        while let Ok(Some(dir_entry)) = entries.next_entry().await {
            let path = dir_entry.path();
            let Ok(metadata) = fs::metadata(&path).await else { continue };
            stats.entries += 1;
            stats.size_bytes += metadata.len();

            if let Ok(bytes) = fs::read(&path).await {
                if let Ok(entry) = serde_json::from_slice::<CacheEntry<serde_json::Value>>(&bytes) {
                    if Utc::now() > entry.expires_at {
                        stats.expired += 1;
                    }
                }
            }
        }
        stats.valid = stats.entries - stats.expired;
        stats.size_human = format_size(stats.size_bytes);
        stats
    }

    /// A corrupt index is treated as empty and rebuilt lazily on next write.
    async fn load_index(&self) -> HashMap<String, String> {
        match fs::read(self.index_path()).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => HashMap::new(),
        }
    }

    async fn save_index(&self, index: &HashMap<String, String>) -> Result<(), CacheError> {
        self.ensure_dirs().await?;
        fs::write(self.index_path(), serde_json::to_vec_pretty(index)?).await?;
        Ok(())
    }
}

fn format_size(size_bytes: u64) -> String {
    let mut size = size_bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} TB")
}

/// Default cache root: `$WEBCRAWL_CACHE_DIR` or `~/.webcrawl/cache`.
pub fn default_cache_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("WEBCRAWL_CACHE_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| Path::new(".").to_path_buf())
        .join(".webcrawl")
        .join("cache")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        store.set("https://a.test/x", &json!({"v": 1}), 3600, None).await.unwrap();
        let got: Option<serde_json::Value> = store.get("https://a.test/x", 3600, None).await.unwrap();
        assert_eq!(got, Some(json!({"v": 1})));
    }

    #[tokio::test]
    async fn max_age_zero_bypasses_cache_entirely() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        store.set("https://a.test/x", &json!({"v": 1}), 3600, None).await.unwrap();
        let got: Option<serde_json::Value> = store.get("https://a.test/x", 0, None).await.unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        store.set("https://a.test/x", &json!({"v": 1}), -1, None).await.unwrap();
        // max_age <= 0 is a no-op write, so force an already-expired entry directly.
        let key = url_normalize::cache_key("https://a.test/x", None).unwrap();
        let entry = CacheEntry {
            url: "https://a.test/x".to_string(),
            cached_at: Utc::now() - ChronoDuration::hours(2),
            expires_at: Utc::now() - ChronoDuration::hours(1),
            response: json!({"v": 1}),
        };
        fs::create_dir_all(store.pages_dir()).await.unwrap();
        fs::write(store.entry_path(&key), serde_json::to_vec(&entry).unwrap()).await.unwrap();

        let got: Option<serde_json::Value> = store.get("https://a.test/x", 3600, None).await.unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn last_writer_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        store.set("https://a.test/x", &json!({"v": 1}), 3600, None).await.unwrap();
        store.set("https://a.test/x", &json!({"v": 2}), 3600, None).await.unwrap();
        let got: Option<serde_json::Value> = store.get("https://a.test/x", 3600, None).await.unwrap();
        assert_eq!(got, Some(json!({"v": 2})));
    }

    #[tokio::test]
    async fn prune_expired_removes_only_expired() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        store.set("https://a.test/fresh", &json!({"v": 1}), 3600, None).await.unwrap();

        let key = url_normalize::cache_key("https://a.test/stale", None).unwrap();
        let stale = CacheEntry {
            url: "https://a.test/stale".to_string(),
            cached_at: Utc::now() - ChronoDuration::hours(2),
            expires_at: Utc::now() - ChronoDuration::hours(1),
            response: json!({"v": 1}),
        };
        fs::create_dir_all(store.pages_dir()).await.unwrap();
        fs::write(store.entry_path(&key), serde_json::to_vec(&stale).unwrap()).await.unwrap();

        let pruned = store.prune_expired().await.unwrap();
        assert_eq!(pruned, 1);
        let stats = store.stats().await;
        assert_eq!(stats.entries, 1);
    }
}
