//! In-process mirror of holder snapshots.
//!
//! Each instance keeps its own copy, refreshed in batches from the indexing
//! collaborator on an independent timer. Readers get an eventually-consistent
//! snapshot: a slightly stale ranking is preferable to blocking payouts on a
//! full rescan.

use crate::config::Config;
use crate::datasource::{IndexerProvider, ProviderError};
use crate::db::Repository;
use crate::domain::{Decimal, HolderSnapshot, TokenEvent, Wallet};
use crate::engine::CostBasisAggregator;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Cached holder state with a batch refresh pipeline.
pub struct HolderCache {
    indexer: Arc<dyn IndexerProvider>,
    repo: Arc<Repository>,
    config: Config,
    holders: RwLock<HashMap<Wallet, HolderSnapshot>>,
}

/// Outcome of one refresh pass.
#[derive(Debug, Default)]
pub struct RefreshSummary {
    pub holders_seen: usize,
    pub holders_failed: usize,
    pub events_ingested: u64,
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl HolderCache {
    pub fn new(indexer: Arc<dyn IndexerProvider>, repo: Arc<Repository>, config: Config) -> Self {
        Self {
            indexer,
            repo,
            config,
            holders: RwLock::new(HashMap::new()),
        }
    }

    /// Load previously persisted snapshots so rankings work before the
    /// first indexer round-trip completes.
    pub async fn warm_from_db(&self) -> Result<usize, sqlx::Error> {
        let stored = self.repo.all_holders().await?;
        let count = stored.len();
        let mut map = self.holders.write().await;
        for holder in stored {
            map.insert(holder.wallet.clone(), holder);
        }
        Ok(count)
    }

    /// Pull current holders and their new transactions from the indexer,
    /// fold them through the cost-basis aggregator, persist, and update the
    /// in-memory mirror.
    ///
    /// A failure for one wallet skips that wallet and continues; only a
    /// failed holder listing aborts the pass.
    ///
    /// # Errors
    /// Returns an error if the holder listing or a persistence write fails.
    pub async fn refresh(&self) -> Result<RefreshSummary, RefreshError> {
        let raw_holders = self
            .indexer
            .list_holders(&self.config.asset_id, self.config.holder_page_limit)
            .await?;

        let mut summary = RefreshSummary {
            holders_seen: raw_holders.len(),
            ..RefreshSummary::default()
        };

        for raw in raw_holders {
            match self.refresh_one(&raw.wallet, raw.balance).await {
                Ok(events_new) => summary.events_ingested += events_new,
                Err(RefreshError::Provider(e)) => {
                    warn!(wallet = %raw.wallet, error = %e, "Skipping holder this pass");
                    summary.holders_failed += 1;
                }
                Err(fatal) => return Err(fatal),
            }
        }

        info!(
            holders = summary.holders_seen,
            failed = summary.holders_failed,
            events = summary.events_ingested,
            "Holder cache refreshed"
        );
        Ok(summary)
    }

    async fn refresh_one(&self, wallet: &Wallet, balance: Decimal) -> Result<u64, RefreshError> {
        let cached = self.holders.read().await.get(wallet).cloned();
        let mut holder = match cached {
            Some(holder) => holder,
            None => match self.repo.get_holder(wallet).await? {
                Some(stored) => stored,
                None => HolderSnapshot::empty(wallet.clone()),
            },
        };

        // Re-fetch a lookback window behind the watermark; the event-key
        // dedupe below makes the overlap harmless.
        let from_ms = holder
            .aggregated_through
            .map(|t| t.as_ms().saturating_sub(self.config.ingest_lookback_ms))
            .unwrap_or(0);

        let fetched = self
            .indexer
            .list_wallet_transactions(wallet, &self.config.asset_id, from_ms, self.config.tx_page_limit)
            .await?;

        let fetched_keys: Vec<String> =
            fetched.iter().map(|e| e.event_key().to_string()).collect();
        let known = self.repo.existing_event_keys(&fetched_keys).await?;

        let mut new_events: Vec<TokenEvent> = fetched
            .into_iter()
            .filter(|e| !known.contains(e.event_key()))
            .collect();
        new_events.sort_by(|a, b| {
            a.time_ms
                .cmp(&b.time_ms)
                .then_with(|| a.event_key().cmp(b.event_key()))
        });

        let mut aggregator = CostBasisAggregator::seeded(&holder);
        aggregator.process_events(&new_events);
        if aggregator.skipped_unpriced_buys() > 0 {
            warn!(
                wallet = %wallet,
                skipped = aggregator.skipped_unpriced_buys(),
                "Buys without USD valuation excluded from cost basis"
            );
        }
        aggregator.apply_to(&mut holder);

        holder.balance = balance;
        // Stays None until something is observed, so the next pass still
        // fetches from the beginning of history.
        holder.aggregated_through = holder.last_activity_at.max(holder.aggregated_through);

        let inserted = self.repo.insert_events(&new_events).await?;
        self.repo.upsert_holder(&holder).await?;

        self.holders
            .write()
            .await
            .insert(wallet.clone(), holder);

        Ok(inserted)
    }

    /// Clone the current snapshot set.
    pub async fn snapshot(&self) -> Vec<HolderSnapshot> {
        self.holders.read().await.values().cloned().collect()
    }

    /// Reflect a payout win in the mirror: win-cycle stamp plus cost-basis
    /// reset to the at-win price. The repository write happens separately in
    /// the orchestrator; the next refresh would converge anyway.
    pub async fn mark_winner(&self, wallet: &Wallet, win_cycle: i64, price: Decimal) {
        let mut map = self.holders.write().await;
        if let Some(holder) = map.get_mut(wallet) {
            holder.last_win_cycle = Some(win_cycle);
            holder.reset_cost_basis_to(price);
        }
    }

    /// Run `refresh` forever on the configured cadence.
    pub fn spawn_refresh_loop(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let period = std::time::Duration::from_secs(self.config.holder_refresh_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.refresh().await {
                    warn!(error = %e, "Holder cache refresh failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::MockIndexer;
    use crate::db::migrations::init_db;
    use crate::domain::{TimeMs, TxKind};
    use std::str::FromStr;
    use tempfile::TempDir;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn test_config(temp: &TempDir) -> Config {
        let mut env = HashMap::new();
        env.insert(
            "DATABASE_PATH".to_string(),
            temp.path().join("test.db").to_string_lossy().to_string(),
        );
        env.insert("INDEXER_API_URL".to_string(), "http://invalid".to_string());
        env.insert("TREASURY_API_URL".to_string(), "http://invalid".to_string());
        env.insert("ASSET_ID".to_string(), "token".to_string());
        env.insert("NATIVE_ASSET_ID".to_string(), "native".to_string());
        env.insert("FEE_WALLET".to_string(), "addr_fee".to_string());
        Config::from_env_map(env).unwrap()
    }

    async fn setup(indexer: MockIndexer) -> (Arc<HolderCache>, TempDir) {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        let pool = init_db(&config.database_path).await.unwrap();
        let repo = Arc::new(Repository::new(pool));
        let cache = Arc::new(HolderCache::new(Arc::new(indexer), repo, config));
        (cache, temp)
    }

    fn buy(wallet: &str, amount: &str, usd: &str, time_ms: i64) -> TokenEvent {
        TokenEvent::new(
            TimeMs::new(time_ms),
            Wallet::new(wallet),
            TxKind::Buy,
            d(amount),
            Some(d(usd)),
            Some(format!("tx{}", time_ms)),
        )
    }

    #[tokio::test]
    async fn test_refresh_builds_snapshot() {
        let indexer = MockIndexer::new()
            .with_holder("addr_1", d("1500000"))
            .with_event(buy("addr_1", "1000000", "100", 1000))
            .with_event(buy("addr_1", "500000", "100", 2000));
        let (cache, _temp) = setup(indexer).await;

        let summary = cache.refresh().await.unwrap();
        assert_eq!(summary.holders_seen, 1);
        assert_eq!(summary.events_ingested, 2);

        let snapshot = cache.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        let holder = &snapshot[0];
        assert_eq!(holder.balance, d("1500000"));
        assert_eq!(holder.total_tokens_bought, d("1500000"));
        assert_eq!(holder.total_cost_usd, d("200"));
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent() {
        let indexer = MockIndexer::new()
            .with_holder("addr_1", d("1000000"))
            .with_event(buy("addr_1", "1000000", "100", 1000));
        let (cache, _temp) = setup(indexer).await;

        cache.refresh().await.unwrap();
        let summary = cache.refresh().await.unwrap();
        // The same events re-fetched through the lookback window must not
        // double-count.
        assert_eq!(summary.events_ingested, 0);

        let snapshot = cache.snapshot().await;
        assert_eq!(snapshot[0].total_cost_usd, d("100"));
    }

    #[tokio::test]
    async fn test_warm_from_db_restores_state() {
        let indexer = MockIndexer::new()
            .with_holder("addr_1", d("1000000"))
            .with_event(buy("addr_1", "1000000", "100", 1000));
        let (cache, temp) = setup(indexer).await;
        cache.refresh().await.unwrap();

        // A second instance over the same database sees the same holders.
        let config = test_config(&temp);
        let pool = init_db(&config.database_path).await.unwrap();
        let repo = Arc::new(Repository::new(pool));
        let second = HolderCache::new(Arc::new(MockIndexer::new()), repo, config);

        let count = second.warm_from_db().await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(second.snapshot().await[0].total_cost_usd, d("100"));
    }

    #[tokio::test]
    async fn test_mark_winner_updates_mirror() {
        let indexer = MockIndexer::new()
            .with_holder("addr_1", d("1000000"))
            .with_event(buy("addr_1", "1000000", "1000", 1000));
        let (cache, _temp) = setup(indexer).await;
        cache.refresh().await.unwrap();

        cache
            .mark_winner(&Wallet::new("addr_1"), 6, d("0.0004"))
            .await;

        let snapshot = cache.snapshot().await;
        assert_eq!(snapshot[0].last_win_cycle, Some(6));
        assert_eq!(snapshot[0].cost_basis(), Some(d("0.0004")));
    }
}
