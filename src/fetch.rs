//! Transport for the two upstream documents: the monthly sheet and the
//! boundary file.

use crate::cache::GeometryCache;
use crate::config::{AppConfig, SourcesConfig};
use crate::data::{contains_markup, parse_boundaries, parse_sheet};
use crate::error::{LoadError, LoadResult};
use crate::types::{BoundarySet, SheetRow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch_text(&self, url: &str) -> LoadResult<String>;

    async fn fetch_json(&self, url: &str) -> LoadResult<Value> {
        let text = self.fetch_text(url).await?;
        serde_json::from_str(&text).map_err(|e| LoadError::Json(e.to_string()))
    }
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(15))
            .user_agent(concat!("peta-bencana/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    #[instrument(skip(self))]
    async fn fetch_text(&self, url: &str) -> LoadResult<String> {
        let transport = |e: reqwest::Error| LoadError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Status { url: url.to_string(), status: status.as_u16() });
        }
        response.text().await.map_err(transport)
    }
}

/// Monthly sheet source with a single fallback to the default sheet.
#[derive(Clone)]
pub struct SheetSource {
    fetcher: Arc<dyn Fetch>,
    base_url: String,
    fallback_param: String,
}

impl SheetSource {
    pub fn new(fetcher: Arc<dyn Fetch>, sources: &SourcesConfig) -> Self {
        Self {
            fetcher,
            base_url: sources.sheet_base_url.clone(),
            fallback_param: sources.fallback_param.clone(),
        }
    }

    pub fn month_url(&self, month: &str) -> LoadResult<String> {
        self.url_with(|url| {
            url.query_pairs_mut().append_pair("sheet", month);
        })
    }

    pub fn fallback_url(&self) -> LoadResult<String> {
        let (key, value) = self
            .fallback_param
            .split_once('=')
            .unwrap_or((self.fallback_param.as_str(), ""));
        self.url_with(|url| {
            url.query_pairs_mut().append_pair(key, value);
        })
    }

    fn url_with(&self, edit: impl FnOnce(&mut Url)) -> LoadResult<String> {
        let mut url = Url::parse(&self.base_url).map_err(|e| LoadError::InvalidUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        edit(&mut url);
        Ok(url.to_string())
    }

    #[instrument(skip(self))]
    pub async fn fetch(&self, month: &str) -> LoadResult<Vec<SheetRow>> {
        let primary = self.month_url(month)?;
        match self.fetch_rows(&primary).await {
            Ok(rows) => Ok(rows),
            Err(e) if e.is_fallback_eligible() => {
                warn!(error = %e, "Month sheet unavailable, using default sheet");
                let fallback = self.fallback_url()?;
                self.fetch_rows(&fallback).await
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_rows(&self, url: &str) -> LoadResult<Vec<SheetRow>> {
        let text = self.fetcher.fetch_text(url).await?;
        if text.trim().is_empty() {
            return Err(LoadError::Empty { url: url.to_string() });
        }
        if contains_markup(&text) {
            return Err(LoadError::Markup { url: url.to_string() });
        }
        parse_sheet(&text)
    }
}

/// Boundary document source, served from the cache while it is fresh.
#[derive(Clone)]
pub struct BoundarySource {
    fetcher: Arc<dyn Fetch>,
    url: String,
    cache: Option<GeometryCache>,
}

impl BoundarySource {
    pub fn new(fetcher: Arc<dyn Fetch>, url: impl Into<String>, cache: Option<GeometryCache>) -> Self {
        Self { fetcher, url: url.into(), cache }
    }

    pub fn from_config(fetcher: Arc<dyn Fetch>, config: &AppConfig) -> Self {
        Self::new(
            fetcher,
            config.sources.geojson_url.clone(),
            Some(GeometryCache::new(&config.cache)),
        )
    }

    #[instrument(skip(self, now))]
    pub async fn load(&self, now: DateTime<Utc>) -> LoadResult<BoundarySet> {
        if let Some(cache) = &self.cache {
            match cache.read_fresh(now).await {
                Ok(Some(raw)) => match parse_boundaries(raw) {
                    Ok(set) => {
                        debug!(features = set.features.len(), "Boundaries served from cache");
                        return Ok(set);
                    }
                    Err(e) => debug!(error = %e, "Discarding unusable cached boundaries"),
                },
                Ok(None) => debug!(path = %cache.path().display(), "Boundary cache miss"),
                Err(e) => debug!(error = %e, "Ignoring boundary cache read failure"),
            }
        }

        let raw = self.fetcher.fetch_json(&self.url).await?;
        let set = parse_boundaries(raw)?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.write(&set.raw, now).await {
                debug!(error = %e, "Ignoring boundary cache write failure");
            }
        }
        Ok(set)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedFetcher;
    use super::*;
    use crate::config::CacheConfig;
    use serde_json::json;

    const BASE: &str = "https://sheets.example.org/pub?output=csv&single=true";
    const MARCH: &str = "https://sheets.example.org/pub?output=csv&single=true&sheet=March";
    const DEFAULT: &str = "https://sheets.example.org/pub?output=csv&single=true&gid=0";
    const GEO: &str = "https://raw.example.org/kecamatan.geojson";

    fn sources() -> SourcesConfig {
        SourcesConfig {
            sheet_base_url: BASE.to_string(),
            fallback_param: "gid=0".to_string(),
            geojson_url: GEO.to_string(),
        }
    }

    #[test]
    fn test_urls_append_to_existing_query() {
        let source = SheetSource::new(Arc::new(ScriptedFetcher::default()), &sources());
        assert_eq!(source.month_url("March").unwrap(), MARCH);
        assert_eq!(source.fallback_url().unwrap(), DEFAULT);
        assert!(source.month_url("Juli Agustus").unwrap().ends_with("sheet=Juli+Agustus"));
    }

    #[tokio::test]
    async fn test_missing_month_falls_back_to_default_sheet() {
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .failing(MARCH, 404)
                .with(DEFAULT, "kd_kecamatan,total_bencana\n1,4\n"),
        );
        let source = SheetSource::new(fetcher.clone(), &sources());

        let rows = source.fetch("March").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["total_bencana"], "4");
        assert_eq!(fetcher.call_count(), 2);
    }

    #[tokio::test]
    async fn test_markup_payload_triggers_fallback() {
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .with(MARCH, "<html><body>Sign in</body></html>")
                .with(DEFAULT, "kd_kecamatan,total_bencana\n2,1\n"),
        );
        let rows = SheetSource::new(fetcher, &sources()).fetch("March").await.unwrap();
        assert_eq!(rows[0]["kd_kecamatan"], "2");
    }

    #[tokio::test]
    async fn test_fallback_is_tried_only_once() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let source = SheetSource::new(fetcher.clone(), &sources());

        let err = source.fetch("March").await.unwrap_err();
        assert!(matches!(err, LoadError::Status { status: 404, .. }));
        assert_eq!(*fetcher.calls.lock().unwrap(), vec![MARCH.to_string(), DEFAULT.to_string()]);
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_network() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = GeometryCache::new(&CacheConfig {
            dir: tmp.path().to_path_buf(),
            key: "geo".to_string(),
            days: 7,
        });
        let now = Utc::now();
        let doc = json!({"type": "FeatureCollection", "features": []});
        cache.write(&doc, now - chrono::Duration::days(1)).await.unwrap();

        let fetcher = Arc::new(ScriptedFetcher::default());
        let source = BoundarySource::new(fetcher.clone(), GEO, Some(cache));
        let set = source.load(now).await.unwrap();

        assert!(set.features.is_empty());
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_cache_is_refetched_and_rewritten() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = GeometryCache::new(&CacheConfig {
            dir: tmp.path().to_path_buf(),
            key: "geo".to_string(),
            days: 7,
        });
        let now = Utc::now();
        let stale = json!({"type": "FeatureCollection", "features": []});
        cache.write(&stale, now - chrono::Duration::days(8)).await.unwrap();

        let fresh = r#"{"type":"FeatureCollection","features":[{"type":"Feature","properties":{"kd_kecamatan":"A"},"geometry":null}]}"#;
        let fetcher = Arc::new(ScriptedFetcher::default().with(GEO, fresh));
        let source = BoundarySource::new(fetcher.clone(), GEO, Some(cache.clone()));

        let set = source.load(now).await.unwrap();
        assert_eq!(set.features.len(), 1);
        assert_eq!(fetcher.call_count(), 1);

        let cached = cache.read_fresh(now).await.unwrap().unwrap();
        assert_eq!(cached["features"][0]["properties"]["kd_kecamatan"], "A");
    }

    #[tokio::test]
    async fn test_unreadable_cache_falls_through_to_network() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = GeometryCache::new(&CacheConfig {
            dir: tmp.path().to_path_buf(),
            key: "geo".to_string(),
            days: 7,
        });
        std::fs::write(cache.path(), b"{broken").unwrap();

        let fetcher = Arc::new(
            ScriptedFetcher::default().with(GEO, r#"{"type":"FeatureCollection","features":[]}"#),
        );
        let set = BoundarySource::new(fetcher.clone(), GEO, Some(cache)).load(Utc::now()).await.unwrap();
        assert!(set.features.is_empty());
        assert_eq!(fetcher.call_count(), 1);
    }
}
