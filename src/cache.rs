//! Time-stamped on-disk cache for the boundary document.
//!
//! The boundary file is large and changes rarely, so it is kept for a fixed
//! number of days. Every failure here is soft: the caller logs it and goes
//! to the network.

use crate::config::CacheConfig;
use crate::error::SoftError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    timestamp: DateTime<Utc>,
    data: Value,
}

#[derive(Debug, Clone)]
pub struct GeometryCache {
    path: PathBuf,
    max_age: Duration,
}

impl GeometryCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            path: config.dir.join(format!("{}.json", config.key)),
            max_age: Duration::try_days(config.days).unwrap_or_else(|| Duration::days(7)),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Cached document if it was written less than `max_age` before `now`.
    pub async fn read_fresh(&self, now: DateTime<Utc>) -> Result<Option<Value>, SoftError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SoftError::Cache(e.to_string())),
        };
        let entry: CacheEntry =
            serde_json::from_slice(&bytes).map_err(|e| SoftError::Cache(e.to_string()))?;

        if now - entry.timestamp < self.max_age {
            Ok(Some(entry.data))
        } else {
            Ok(None)
        }
    }

    pub async fn write(&self, data: &Value, now: DateTime<Utc>) -> Result<(), SoftError> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| SoftError::Cache(e.to_string()))?;
        }
        let entry = CacheEntry { timestamp: now, data: data.clone() };
        let bytes = serde_json::to_vec(&entry).map_err(|e| SoftError::Cache(e.to_string()))?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| SoftError::Cache(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache_in(dir: &std::path::Path) -> GeometryCache {
        GeometryCache::new(&CacheConfig {
            dir: dir.to_path_buf(),
            key: "geo_kec_cache_v1".to_string(),
            days: 7,
        })
    }

    #[tokio::test]
    async fn test_missing_file_is_a_clean_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = cache_in(tmp.path());
        assert!(cache.read_fresh(Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_freshness_window() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = cache_in(tmp.path());
        let now = Utc::now();
        let doc = json!({"type": "FeatureCollection", "features": []});

        cache.write(&doc, now - Duration::days(1)).await.unwrap();
        assert_eq!(cache.read_fresh(now).await.unwrap(), Some(doc.clone()));

        cache.write(&doc, now - Duration::days(8)).await.unwrap();
        assert_eq!(cache.read_fresh(now).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = cache_in(tmp.path());
        std::fs::write(cache.path(), b"not json").unwrap();
        assert!(matches!(cache.read_fresh(Utc::now()).await, Err(SoftError::Cache(_))));
    }

    #[tokio::test]
    async fn test_unrepresentable_window_falls_back_to_a_week() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = GeometryCache::new(&CacheConfig {
            dir: tmp.path().to_path_buf(),
            key: "geo_kec_cache_v1".to_string(),
            days: i64::MAX,
        });
        let now = Utc::now();
        let doc = json!({"type": "FeatureCollection", "features": []});

        cache.write(&doc, now - Duration::days(8)).await.unwrap();
        assert_eq!(cache.read_fresh(now).await.unwrap(), None);
    }
}
