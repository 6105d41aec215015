use axum::extract::State;
use axum::Json;

use crate::api::AppState;
use crate::error::AppError;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Readiness requires the persisted timer singleton to be reachable; without
/// it no cycle can ever run.
pub async fn ready(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let timer = state.repo.get_timer_state().await?;
    Ok(Json(serde_json::json!({
        "status": "ready",
        "currentCycle": timer.current_cycle,
    })))
}
