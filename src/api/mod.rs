pub mod cycle;
pub mod health;
pub mod losers;

use crate::cache::HolderCache;
use crate::config::Config;
use crate::db::Repository;
use crate::orchestration::CycleOrchestrator;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub orchestrator: Arc<CycleOrchestrator>,
    pub cache: Arc<HolderCache>,
}

impl AppState {
    pub fn new(
        repo: Arc<Repository>,
        config: Config,
        orchestrator: Arc<CycleOrchestrator>,
        cache: Arc<HolderCache>,
    ) -> Self {
        Self {
            repo,
            config,
            orchestrator,
            cache,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/losers", get(losers::get_ranked_losers))
        .route("/v1/cycle/status", get(cycle::get_cycle_status))
        .route("/v1/cycle/attempt", post(cycle::attempt_payout))
        .route("/v1/cycles/:cycle/payouts", get(cycle::get_cycle_payouts))
        .layer(cors)
        .with_state(state)
}
