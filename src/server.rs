use crate::config::AppConfig;
use crate::panel::InfoPanel;
use crate::raster::{encode_png, render_png};
use crate::render::Style;
use crate::session::{LoadOutcome, LoadSummary, Session};
use crate::svg::{render_page, render_svg};
use crate::types::SheetRow;
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info, warn};

pub struct AppState {
    pub session: Session,
}

#[derive(Deserialize)]
pub struct MonthParams {
    month: Option<String>,
}

#[derive(Deserialize)]
pub struct SliderParams {
    slider: usize,
}

#[derive(Deserialize)]
pub struct QueryParams {
    lat: f64,
    lon: f64,
}

#[derive(Serialize)]
pub struct DataPayload {
    geojson: Value,
    sheet: Vec<SheetRow>,
}

#[derive(Serialize)]
pub struct PanelResponse {
    heading: String,
    lines: Vec<String>,
    html: String,
    panel: InfoPanel,
    #[serde(skip_serializing_if = "Option::is_none")]
    style: Option<Style>,
}

impl PanelResponse {
    fn new(panel: &InfoPanel, style: Option<Style>) -> Self {
        Self {
            heading: panel.heading().to_string(),
            lines: panel.body_lines(),
            html: panel.to_html(),
            panel: panel.clone(),
            style,
        }
    }
}

#[derive(Serialize)]
pub struct MonthResponse {
    month: String,
    slider: usize,
    panel_html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    load: Option<LoadSummary>,
}

#[derive(Serialize)]
pub struct QueryResponse {
    position: usize,
    code: String,
    name: String,
    total_bencana: u32,
    manusia: u32,
    rumah: u32,
}

#[derive(Serialize)]
pub struct SummaryResponse {
    month: String,
    slider: usize,
    features: usize,
    bridge_keys: usize,
    rows: usize,
    joined: usize,
    /// `[min_lon, min_lat, max_lon, max_lat]` of the drawn layer.
    bounds: Option<[f64; 4]>,
}

pub fn router(state: Arc<AppState>, static_dir: Option<&std::path::Path>) -> Router {
    let app = Router::new()
        .route("/", get(page_handler))
        .route("/map.svg", get(svg_handler))
        .route("/map.png", get(png_handler))
        .route("/api/data", get(data_handler))
        .route("/api/month", get(month_handler))
        .route("/api/summary", get(summary_handler))
        .route("/api/panel", get(panel_handler))
        .route("/api/query", get(query_handler))
        .route("/api/features/:position/:action", get(feature_handler));

    let app = match static_dir {
        Some(dir) => app.nest_service("/static", ServeDir::new(dir)),
        None => app,
    };

    app.layer(CorsLayer::permissive()).with_state(state)
}

pub async fn start_server(config: AppConfig, session: Session) -> Result<()> {
    let initial = config.map.initial_month.clone();
    match session.load_month(&initial).await {
        Ok(_) => info!(month = %initial, "Initial month loaded"),
        Err(e) => warn!(error = %e, month = %initial, "Initial load failed, serving empty map"),
    }

    let state = Arc::new(AppState { session });
    let app = router(state, config.server.static_dir.as_deref());

    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn page_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    let s = state.session.state().read().await;
    Html(render_page(&s.renderer, s.month.label(), s.month.position()))
}

async fn svg_handler(State(state): State<Arc<AppState>>) -> Response {
    let s = state.session.state().read().await;
    ([(header::CONTENT_TYPE, "image/svg+xml")], render_svg(&s.renderer)).into_response()
}

async fn png_handler(State(state): State<Arc<AppState>>) -> Response {
    let img = {
        let s = state.session.state().read().await;
        render_png(&s.renderer)
    };
    match encode_png(&img) {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/png")], bytes).into_response(),
        Err(e) => {
            error!(error = %e, "PNG encoding failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Raw documents for a month; `null` when either upstream fails.
async fn data_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MonthParams>,
) -> Json<Option<DataPayload>> {
    let month = params.month.unwrap_or_else(|| "January".to_string());
    match state.session.payload(&month).await {
        Ok((geojson, sheet)) => Json(Some(DataPayload { geojson, sheet })),
        Err(e) => {
            error!(error = %e, month = %month, "Data request failed");
            Json(None)
        }
    }
}

async fn month_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SliderParams>,
) -> Response {
    let load = match state.session.select_position(params.slider).await {
        None => return (StatusCode::BAD_REQUEST, "slider must be between 1 and 12").into_response(),
        Some(Err(e)) => {
            return (StatusCode::BAD_GATEWAY, format!("Gagal memuat data: {}", e)).into_response();
        }
        Some(Ok(LoadOutcome::Rendered(summary))) => Some(summary),
        Some(Ok(LoadOutcome::Superseded { .. })) => None,
    };

    let s = state.session.state().read().await;
    Json(MonthResponse {
        month: s.month.label().to_string(),
        slider: s.month.position(),
        panel_html: s.renderer.panel().to_html(),
        load,
    })
    .into_response()
}

async fn summary_handler(State(state): State<Arc<AppState>>) -> Json<SummaryResponse> {
    let s = state.session.state().read().await;
    Json(SummaryResponse {
        month: s.month.label().to_string(),
        slider: s.month.position(),
        features: s.renderer.layer().map(|l| l.features.len()).unwrap_or(0),
        bridge_keys: s.bridge.len(),
        rows: s.rows.len(),
        joined: s.joined.len(),
        bounds: s
            .renderer
            .layer()
            .and_then(|l| l.bounds)
            .map(|b| [b.min().x, b.min().y, b.max().x, b.max().y]),
    })
}

async fn panel_handler(State(state): State<Arc<AppState>>) -> Json<PanelResponse> {
    let s = state.session.state().read().await;
    Json(PanelResponse::new(s.renderer.panel(), None))
}

async fn query_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Json<Option<QueryResponse>> {
    let s = state.session.state().read().await;
    Json(s.renderer.feature_at(params.lon, params.lat).map(|f| QueryResponse {
        position: f.position,
        code: f.code.clone(),
        name: f.name.clone(),
        total_bencana: f.record.total_bencana,
        manusia: f.record.manusia,
        rumah: f.record.rumah,
    }))
}

async fn feature_handler(
    State(state): State<Arc<AppState>>,
    Path((position, action)): Path<(usize, String)>,
) -> Response {
    let mut s = state.session.state().write().await;
    let found = match action.as_str() {
        "hover" => s.renderer.hover(position),
        "leave" => s.renderer.leave(position),
        "click" => s.renderer.click(position),
        _ => return (StatusCode::NOT_FOUND, "unknown action").into_response(),
    };
    if !found {
        return (StatusCode::NOT_FOUND, "unknown feature").into_response();
    }

    let style = s
        .renderer
        .layer()
        .and_then(|l| l.feature(position))
        .map(|f| f.style.clone());
    Json(PanelResponse::new(s.renderer.panel(), style)).into_response()
}
