//! Load cycle orchestration: month selection, concurrent fetch of sheet and
//! boundaries, join, redraw and panel reset.

use crate::config::AppConfig;
use crate::error::LoadResult;
use crate::fetch::{BoundarySource, Fetch, SheetSource};
use crate::join::{join_rows, JoinedData, KeyBridge};
use crate::render::{MapRenderer, RenderOptions};
use crate::types::{SheetRow, MONTHS};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument};

/// Month slider state, positions 1..=12.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthController {
    position: usize,
}

impl Default for MonthController {
    fn default() -> Self {
        Self { position: 1 }
    }
}

impl MonthController {
    pub fn month_at(position: usize) -> Option<&'static str> {
        position.checked_sub(1).and_then(|idx| MONTHS.get(idx)).copied()
    }

    pub fn position_of(month: &str) -> Option<usize> {
        MONTHS
            .iter()
            .position(|m| m.eq_ignore_ascii_case(month.trim()))
            .map(|idx| idx + 1)
    }

    pub fn for_month(month: &str) -> Option<Self> {
        Self::position_of(month).map(|position| Self { position })
    }

    /// Move the slider; out-of-range positions leave it untouched.
    pub fn select(&mut self, position: usize) -> Option<&'static str> {
        let month = Self::month_at(position)?;
        self.position = position;
        Some(month)
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Label text shown next to the slider.
    pub fn label(&self) -> &'static str {
        MONTHS[self.position - 1]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadSummary {
    pub month: String,
    pub generation: u64,
    pub layer_id: u64,
    pub features: usize,
    pub rows: usize,
    pub joined: usize,
    pub skipped_labels: usize,
}

#[derive(Debug, Clone)]
pub enum LoadOutcome {
    Rendered(LoadSummary),
    /// A newer load started while this one was in flight; nothing was drawn.
    Superseded { generation: u64 },
}

/// Everything the current render depends on.
pub struct SessionState {
    pub month: MonthController,
    pub renderer: MapRenderer,
    pub bridge: KeyBridge,
    pub joined: JoinedData,
    pub rows: Vec<SheetRow>,
}

pub struct Session {
    sheets: SheetSource,
    boundaries: BoundarySource,
    generation: AtomicU64,
    state: RwLock<SessionState>,
}

impl Session {
    pub fn new(sheets: SheetSource, boundaries: BoundarySource, options: RenderOptions) -> Self {
        Self {
            sheets,
            boundaries,
            generation: AtomicU64::new(0),
            state: RwLock::new(SessionState {
                month: MonthController::default(),
                renderer: MapRenderer::new(options),
                bridge: KeyBridge::default(),
                joined: JoinedData::default(),
                rows: Vec::new(),
            }),
        }
    }

    pub fn from_config(fetcher: Arc<dyn Fetch>, config: &AppConfig) -> Self {
        Self::new(
            SheetSource::new(fetcher.clone(), &config.sources),
            BoundarySource::from_config(fetcher, config),
            RenderOptions::from(&config.map),
        )
    }

    pub fn state(&self) -> &RwLock<SessionState> {
        &self.state
    }

    /// Move the slider and reload for the month under it.
    pub async fn select_position(&self, position: usize) -> Option<LoadResult<LoadOutcome>> {
        let month = {
            let mut state = self.state.write().await;
            state.month.select(position)?
        };
        Some(self.load_month(month).await)
    }

    /// Fetch both documents concurrently, then join and redraw. A failed
    /// load leaves the previous render in place.
    #[instrument(skip(self))]
    pub async fn load_month(&self, month: &str) -> LoadResult<LoadOutcome> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let (rows, boundaries) = tokio::join!(
            self.sheets.fetch(month),
            self.boundaries.load(Utc::now())
        );
        let (rows, boundaries) = match (rows, boundaries) {
            (Ok(rows), Ok(boundaries)) => (rows, boundaries),
            (Err(e), _) | (_, Err(e)) => {
                error!(error = %e, "Load failed, keeping previous map");
                return Err(e);
            }
        };

        let mut state = self.state.write().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "Discarding stale load");
            return Ok(LoadOutcome::Superseded { generation });
        }

        let bridge = KeyBridge::build(&boundaries.features);
        let joined = join_rows(&rows, &bridge);
        let report = state.renderer.draw(&boundaries, &joined);
        state.renderer.reset_panel();

        let summary = LoadSummary {
            month: month.to_string(),
            generation,
            layer_id: report.layer_id,
            features: report.features,
            rows: rows.len(),
            joined: joined.len(),
            skipped_labels: report.skipped_labels.len(),
        };
        if let Some(m) = MonthController::for_month(month) {
            state.month = m;
        }
        state.bridge = bridge;
        state.joined = joined;
        state.rows = rows;

        info!(
            month,
            features = summary.features,
            joined = summary.joined,
            "Map rendered"
        );
        Ok(LoadOutcome::Rendered(summary))
    }

    /// Raw documents for one month, as served by the query endpoint.
    pub async fn payload(&self, month: &str) -> LoadResult<(Value, Vec<SheetRow>)> {
        let (rows, boundaries) = tokio::join!(
            self.sheets.fetch(month),
            self.boundaries.load(Utc::now())
        );
        Ok((boundaries?.raw, rows?))
    }
}
