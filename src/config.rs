use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{bail, Context, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub sources: SourcesConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourcesConfig {
    /// Published spreadsheet CSV URL; the month is appended as `sheet=<name>`.
    pub sheet_base_url: String,
    /// Query parameter selecting the default sheet when the month sheet fails.
    #[serde(default = "default_fallback_param")]
    pub fallback_param: String,
    pub geojson_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_cache_key")]
    pub key: String,
    #[serde(default = "default_cache_days")]
    pub days: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MapConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Horizontal pan applied after fitting, leaves room for the info panel.
    #[serde(default = "default_pan_offset")]
    pub pan_offset_px: f64,
    #[serde(default = "default_bounds_padding")]
    pub bounds_padding: f64,
    #[serde(default = "default_initial_month")]
    pub initial_month: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    pub static_dir: Option<PathBuf>,
}

const MAX_CACHE_DAYS: i64 = 3650;

fn default_fallback_param() -> String { "gid=0".to_string() }
fn default_cache_dir() -> PathBuf { PathBuf::from(".cache") }
fn default_cache_key() -> String { "geo_kec_cache_v1".to_string() }
fn default_cache_days() -> i64 { 7 }
fn default_width() -> u32 { 1024 }
fn default_height() -> u32 { 768 }
fn default_pan_offset() -> f64 { 180.0 }
fn default_bounds_padding() -> f64 { 0.3 }
fn default_initial_month() -> String { "January".to_string() }
fn default_port() -> u16 { 8080 }

impl Default for CacheConfig {
    fn default() -> Self {
        Self { dir: default_cache_dir(), key: default_cache_key(), days: default_cache_days() }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            pan_offset_px: default_pan_offset(),
            bounds_padding: default_bounds_padding(),
            initial_month: default_initial_month(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_port(), static_dir: None }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.map.width == 0 || self.map.height == 0 {
            bail!("map.width and map.height must be positive, got {}x{}", self.map.width, self.map.height);
        }
        if !(1..=MAX_CACHE_DAYS).contains(&self.cache.days) {
            bail!("cache.days must be between 1 and {}, got {}", MAX_CACHE_DAYS, self.cache.days);
        }
        Ok(())
    }
}
