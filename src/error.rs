//! Failure taxonomy for one load cycle.

use thiserror::Error;

pub type LoadResult<T> = Result<T, LoadError>;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("Request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Response from {url} contains markup instead of data")]
    Markup { url: String },

    #[error("Response from {url} is empty")]
    Empty { url: String },

    #[error("Invalid JSON payload: {0}")]
    Json(String),

    #[error("Invalid CSV payload: {0}")]
    Csv(String),

    #[error("Boundary document must be a FeatureCollection")]
    NotFeatureCollection,

    #[error("Invalid base URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl LoadError {
    /// Whether the tabular source should retry once against the default sheet.
    pub fn is_fallback_eligible(&self) -> bool {
        !matches!(self, LoadError::InvalidUrl { .. } | LoadError::NotFeatureCollection)
    }
}

/// Failure of a best-effort step; callers log and discard it.
#[derive(Debug, Error)]
pub enum SoftError {
    #[error("Cache I/O failed: {0}")]
    Cache(String),

    #[error("Feature {position} has no usable bounds for a label")]
    DegenerateGeometry { position: usize },
}
