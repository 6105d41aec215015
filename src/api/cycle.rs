use axum::extract::{Path, State};
use axum::Json;

use crate::api::AppState;
use crate::domain::CyclePayout;
use crate::error::AppError;
use crate::orchestration::{CycleResult, CycleStatus};

/// Timer visibility: countdown and cycle number.
pub async fn get_cycle_status(
    State(state): State<AppState>,
) -> Result<Json<CycleStatus>, AppError> {
    let status = state.orchestrator.cycle_status().await?;
    Ok(Json(status))
}

/// Explicitly request a payout attempt.
///
/// This is the command half of the command/result pattern: the caller gets
/// the structured outcome synchronously — completed, skipped, busy, not due,
/// already paid, attempts exhausted, or failed — never a fire-and-forget.
pub async fn attempt_payout(
    State(state): State<AppState>,
) -> Result<Json<CycleResult>, AppError> {
    let result = state.orchestrator.attempt_payout().await?;
    Ok(Json(result))
}

/// Audit trail: payout rows recorded for one cycle.
pub async fn get_cycle_payouts(
    Path(cycle): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<Vec<CyclePayout>>, AppError> {
    if cycle < 1 {
        return Err(AppError::BadRequest("cycle must be positive".to_string()));
    }
    let payouts = state.orchestrator.payouts_for_cycle(cycle).await?;
    Ok(Json(payouts))
}
