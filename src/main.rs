use anyhow::Context;
use lossback::datasource::{HttpIndexerClient, HttpTreasury, PriceOracle, Treasury};
use lossback::engine::PayoutAllocator;
use lossback::orchestration::CycleOrchestrator;
use lossback::{api, config::Config, db::init_db, HolderCache, IndexerProvider, Repository};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("loading configuration")?;
    let port = config.port;

    let pool = init_db(&config.database_path)
        .await
        .context("initializing database")?;
    let repo = Arc::new(Repository::new(pool));

    let indexer_client = Arc::new(HttpIndexerClient::new(config.indexer_api_url.clone()));
    let indexer: Arc<dyn IndexerProvider> = indexer_client.clone();
    let oracle: Arc<dyn PriceOracle> = indexer_client;
    let treasury: Arc<dyn Treasury> = Arc::new(HttpTreasury::new(config.treasury_api_url.clone()));

    let cache = Arc::new(HolderCache::new(indexer, repo.clone(), config.clone()));
    let warmed = cache
        .warm_from_db()
        .await
        .context("warming holder cache from database")?;
    tracing::info!(holders = warmed, "Holder cache warmed from store");
    let _refresh_task = cache.clone().spawn_refresh_loop();

    let allocator = PayoutAllocator::new(config.payout_splits.clone())
        .context("building payout allocator")?;
    let orchestrator = Arc::new(CycleOrchestrator::new(
        repo.clone(),
        cache.clone(),
        oracle,
        treasury,
        allocator,
        config.clone(),
    ));

    let app = api::create_router(api::AppState::new(repo, config, orchestrator, cache));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}
