pub mod api;
pub mod cache;
pub mod config;
pub mod datasource;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use cache::HolderCache;
pub use config::Config;
pub use datasource::{
    HttpIndexerClient, HttpTreasury, IndexerProvider, MockIndexer, MockTreasury, PriceOracle,
    ProviderError, Treasury,
};
pub use db::{init_db, Repository};
pub use domain::{
    CyclePayout, CycleTimerState, Decimal, Disqualification, HolderSnapshot, PayoutStatus, TimeMs,
    TokenEvent, TxKind, Wallet,
};
pub use engine::{
    classify, rank_losers, CostBasisAggregator, EligibilityParams, EligibilityResult,
    IneligibleReason, PayoutAllocator, RankedEntry,
};
pub use error::AppError;
pub use orchestration::{CycleOrchestrator, CycleOutcome, CycleResult, CycleStatus};
