use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::state::SharedState;

/// Simple health-check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// `GET /health`
///
/// `200 ok` while the devnet loop runs, `503 halted` once it stopped on a
/// fatal error.
pub async fn health(State(state): State<SharedState>) -> (StatusCode, Json<HealthResponse>) {
    let halted = state.status.lock().await.halted.is_some();
    if halted {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse { status: "halted" }),
        )
    } else {
        (StatusCode::OK, Json(HealthResponse { status: "ok" }))
    }
}
