use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use image::{ImageFormat, RgbImage};
use scoreboard_capture::{CaptureLoop, CaptureObserver};
use scoreboard_common::config::{validate_groups, validate_params, GroupConfig};
use scoreboard_common::frame::DecodedValues;
use scoreboard_common::params::ProcessingParameters;
use scoreboard_vision::PreviewFrames;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

// ---------------------------------------------------------------------------
// Latest tick
// ---------------------------------------------------------------------------

/// Keeps the most recent values and previews for the HTTP API.
#[derive(Default)]
pub struct PreviewStore {
    latest: Mutex<Option<(DecodedValues, PreviewFrames)>>,
}

impl PreviewStore {
    pub fn values(&self) -> Option<DecodedValues> {
        self.lock().as_ref().map(|(values, _)| values.clone())
    }

    pub fn previews(&self) -> Option<PreviewFrames> {
        self.lock().as_ref().map(|(_, previews)| previews.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<(DecodedValues, PreviewFrames)>> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CaptureObserver for PreviewStore {
    fn notify(&self, values: &DecodedValues, previews: &PreviewFrames) {
        *self.lock() = Some((values.clone(), previews.clone()));
    }

    fn name(&self) -> &str {
        "preview-store"
    }
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

pub struct AppState {
    pub capture: Arc<CaptureLoop>,
    pub store: Arc<PreviewStore>,
}

#[derive(Debug, Serialize)]
struct StateReport {
    state: String,
    params: ProcessingParameters,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/state
async fn get_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(StateReport {
        state: state.capture.state().to_string(),
        params: state.capture.params(),
    })
}

/// POST /api/pause
async fn pause(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.capture.pause() {
        StatusCode::NO_CONTENT.into_response()
    } else {
        conflict(&state)
    }
}

/// POST /api/resume
async fn resume(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.capture.resume() {
        StatusCode::NO_CONTENT.into_response()
    } else {
        conflict(&state)
    }
}

fn conflict(state: &AppState) -> Response {
    let current = state.capture.state();
    (StatusCode::CONFLICT, format!("capture is {current}")).into_response()
}

/// PUT /api/params, body: ProcessingParameters
async fn put_params(
    State(state): State<Arc<AppState>>,
    Json(params): Json<ProcessingParameters>,
) -> impl IntoResponse {
    if let Err(e) = validate_params(&params) {
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }
    info!(?params, "processing parameters updated");
    state.capture.update_params(params);
    StatusCode::NO_CONTENT.into_response()
}

/// PUT /api/groups, body: [{ "name", "mode", "rect" }, ...]
async fn put_groups(
    State(state): State<Arc<AppState>>,
    Json(groups): Json<Vec<GroupConfig>>,
) -> impl IntoResponse {
    if let Err(e) = validate_groups(&groups) {
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }
    info!(count = groups.len(), "digit groups updated");
    state.capture.update_coordinates(groups);
    StatusCode::NO_CONTENT.into_response()
}

/// GET /api/values
async fn get_values(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.values() {
        Some(values) => Json(values).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET /api/preview/raw.jpg
async fn raw_preview(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.previews() {
        Some(previews) => encode_response(previews.raw, ImageFormat::Jpeg, "image/jpeg").await,
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET /api/preview/processed.png
async fn processed_preview(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.previews() {
        Some(previews) => {
            encode_response(previews.processed, ImageFormat::Png, "image/png").await
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn encode_response(
    image: Arc<RgbImage>,
    format: ImageFormat,
    content_type: &'static str,
) -> Response {
    let result = tokio::task::spawn_blocking(move || encode_image(&image, format)).await;

    match result {
        Ok(Ok(bytes)) => ([(header::CONTENT_TYPE, content_type)], bytes).into_response(),
        Ok(Err(e)) => {
            error!(error = %e, "preview encoding failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
        Err(e) => {
            error!(error = %e, "spawn_blocking failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn encode_image(image: &RgbImage, format: ImageFormat) -> image::ImageResult<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format)?;
    Ok(buf.into_inner())
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Control API under `/api`, with the overlay directory as fallback.
pub fn router(state: Arc<AppState>, static_dir: Option<&Path>) -> Router {
    let api = Router::new()
        .route("/api/state", get(get_state))
        .route("/api/pause", post(pause))
        .route("/api/resume", post(resume))
        .route("/api/params", put(put_params))
        .route("/api/groups", put(put_groups))
        .route("/api/values", get(get_values))
        .route("/api/preview/raw.jpg", get(raw_preview))
        .route("/api/preview/processed.png", get(processed_preview))
        .with_state(state);

    let app = match static_dir {
        Some(dir) => {
            let index = ServeFile::new(dir.join("index.html"));
            api.fallback_service(ServeDir::new(dir).fallback(index))
        }
        None => api,
    };
    app.layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
