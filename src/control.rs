//! Control/Query Surface (§4.H) — status, current screen, liveness.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::app::AppState;

pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.hub.status_snapshot())
}

pub async fn screen(State(state): State<AppState>) -> impl IntoResponse {
    state.hub.current_screen_or_placeholder()
}

/// Liveness probe distinct from `/api/status`: no lock beyond what the
/// framework itself takes, so it stays responsive even under hub
/// contention.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}
