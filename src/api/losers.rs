use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::api::AppState;
use crate::engine::RankedEntry;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LosersQuery {
    /// Cap the number of returned entries.
    pub limit: Option<usize>,
}

/// Current ranked losers, worst drawdown first.
pub async fn get_ranked_losers(
    Query(params): Query<LosersQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<RankedEntry>>, AppError> {
    if let Some(limit) = params.limit {
        if limit == 0 {
            return Err(AppError::BadRequest("limit must be positive".to_string()));
        }
    }

    let mut ranked = state.orchestrator.ranked_losers().await?;
    if let Some(limit) = params.limit {
        ranked.truncate(limit);
    }

    Ok(Json(ranked))
}
