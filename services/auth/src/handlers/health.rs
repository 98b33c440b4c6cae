use axum::{Json, extract::State, http::StatusCode};
use serde_json::Value;

use latchkey_core::health::readiness;

use crate::state::{AppState, AuthBackend};

/// `GET /readyz`: 200 only when every backing store answers.
pub async fn readyz<B: AuthBackend>(
    State(state): State<AppState<B>>,
) -> (StatusCode, Json<Value>) {
    let checks = state.backend.readiness().await;
    readiness(&checks)
}
