use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_embed::Embed;
use serde::{Deserialize, Serialize};

use crate::alert::AlertHistory;
use crate::display::FrameStore;
use crate::monitor::{MonitorStats, StatusSnapshot};
use crate::zone::{self, SharedZone, ZoneRect};

const DEFAULT_ALERT_LIMIT: usize = 50;

#[derive(Embed)]
#[folder = "src/assets/"]
struct Assets;

#[derive(Clone)]
pub struct AppState {
    pub zone: SharedZone,
    pub frames: FrameStore,
    pub alerts: AlertHistory,
    pub stats: Arc<MonitorStats>,
}

impl AppState {
    pub fn new(
        zone: SharedZone,
        frames: FrameStore,
        alerts: AlertHistory,
        stats: Arc<MonitorStats>,
    ) -> Self {
        Self {
            zone,
            frames,
            alerts,
            stats,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum DragPhase {
    Press,
    Move,
    Release,
}

#[derive(Debug, Deserialize)]
struct DragRequest {
    phase: DragPhase,
    x: i32,
    y: i32,
}

#[derive(Deserialize)]
struct AlertsQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    monitor: StatusSnapshot,
    zone: ZoneRect,
    dragging: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/assets/{*path}", get(static_handler))
        .route("/api/zone", get(zone_handler).put(set_zone_handler))
        .route("/api/zone/drag", post(drag_handler))
        .route("/api/frame.jpg", get(frame_handler))
        .route("/api/mask.jpg", get(mask_handler))
        .route("/api/annotations", get(annotations_handler))
        .route("/api/alerts", get(alerts_handler))
        .route("/api/status", get(status_handler))
        .with_state(state)
}

pub async fn start_server(state: AppState, port: u16) -> Result<(), std::io::Error> {
    let app = router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("starting HTTP server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn index_handler() -> impl IntoResponse {
    match Assets::get("index.html") {
        Some(content) => Html(content.data.to_vec()).into_response(),
        None => (StatusCode::NOT_FOUND, "index.html not found").into_response(),
    }
}

async fn static_handler(Path(path): Path<String>) -> impl IntoResponse {
    match Assets::get(&path) {
        Some(content) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            (
                [(header::CONTENT_TYPE, mime.as_ref())],
                content.data.to_vec(),
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

async fn zone_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(zone::snapshot(&state.zone))
}

async fn set_zone_handler(State(state): State<AppState>, Json(rect): Json<ZoneRect>) -> Response {
    let mut editor = match state.zone.write() {
        Ok(e) => e,
        Err(_) => return (StatusCode::INTERNAL_SERVER_ERROR, "zone lock error").into_response(),
    };
    editor.set(rect);
    let current = editor.current();
    tracing::info!(
        x = current.x,
        y = current.y,
        width = current.width,
        height = current.height,
        "zone set"
    );
    Json(current).into_response()
}

async fn drag_handler(State(state): State<AppState>, Json(req): Json<DragRequest>) -> Response {
    let mut editor = match state.zone.write() {
        Ok(e) => e,
        Err(_) => return (StatusCode::INTERNAL_SERVER_ERROR, "zone lock error").into_response(),
    };
    match req.phase {
        DragPhase::Press => editor.begin_drag(req.x, req.y),
        DragPhase::Move => editor.update_drag(req.x, req.y),
        DragPhase::Release => editor.end_drag(req.x, req.y),
    }
    Json(editor.current()).into_response()
}

async fn frame_handler(State(state): State<AppState>) -> Response {
    jpeg_response(state.frames.frame_jpeg(), "no frame yet")
}

async fn mask_handler(State(state): State<AppState>) -> Response {
    jpeg_response(state.frames.mask_jpeg(), "no mask yet")
}

fn jpeg_response(data: Option<Vec<u8>>, missing: &'static str) -> Response {
    match data {
        Some(jpeg) => (
            [
                (header::CONTENT_TYPE, "image/jpeg"),
                (header::CACHE_CONTROL, "no-store"),
            ],
            jpeg,
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, missing).into_response(),
    }
}

async fn annotations_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.frames.annotations())
}

async fn alerts_handler(
    State(state): State<AppState>,
    Query(query): Query<AlertsQuery>,
) -> impl IntoResponse {
    Json(state.alerts.recent(query.limit.unwrap_or(DEFAULT_ALERT_LIMIT)))
}

async fn status_handler(State(state): State<AppState>) -> Response {
    let (zone, dragging) = match state.zone.read() {
        Ok(editor) => (editor.current(), editor.is_dragging()),
        Err(_) => return (StatusCode::INTERNAL_SERVER_ERROR, "zone lock error").into_response(),
    };
    Json(StatusResponse {
        monitor: state.stats.snapshot(),
        zone,
        dragging,
    })
    .into_response()
}
