//! The payout-cycle state machine.
//!
//! There is no dedicated scheduler: any number of uncoordinated callers may
//! invoke `attempt_payout` at once, from separate processes. The persisted
//! `cycle_timer_state` row is the only synchronization primitive; its
//! conditional update is the cross-instance mutex. Once execution begins the
//! attempt commits to advancing the timer, whatever else fails.

use crate::cache::HolderCache;
use crate::config::Config;
use crate::datasource::{PriceOracle, ProviderError, Treasury};
use crate::db::Repository;
use crate::domain::{CyclePayout, Decimal, Disqualification, PayoutStatus, TimeMs};
use crate::engine::{classify, rank_losers, PayoutAllocator, RankedEntry};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Ceiling on a single transfer attempt; a hung call here holds the global
/// cycle lock.
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(10);

/// Drives the recurring payout cycle against the persisted timer state.
pub struct CycleOrchestrator {
    repo: Arc<Repository>,
    cache: Arc<HolderCache>,
    oracle: Arc<dyn PriceOracle>,
    treasury: Arc<dyn Treasury>,
    allocator: PayoutAllocator,
    config: Config,
}

/// How an attempt ended, from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Payouts were attempted; per-payee results are in `payouts`.
    Completed,
    /// The cycle ran but nothing was paid; the timer still advanced.
    Skipped,
    /// Another caller holds the lock right now.
    Busy,
    /// The interval has not elapsed yet.
    NotDue,
    /// Payout rows already exist for this interval.
    AlreadyPaid,
    /// The interval burned through its attempt budget and is abandoned
    /// until the next natural rollover.
    AttemptsExhausted,
    /// Execution started but failed; the timer advanced regardless.
    Failed,
}

/// Structured result of one payout attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleResult {
    pub attempt_id: Uuid,
    pub outcome: CycleOutcome,
    pub cycle: i64,
    pub reason: Option<String>,
    pub payouts: Vec<CyclePayout>,
}

impl CycleResult {
    fn empty(outcome: CycleOutcome, cycle: i64, reason: Option<String>) -> Self {
        CycleResult {
            attempt_id: Uuid::new_v4(),
            outcome,
            cycle,
            reason,
            payouts: Vec::new(),
        }
    }
}

/// Timer visibility for external callers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleStatus {
    pub seconds_until_next: i64,
    pub current_cycle: i64,
    pub failed_attempts: i64,
    pub in_progress: bool,
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("no price available for asset {0}")]
    PriceUnavailable(String),
}

impl CycleOrchestrator {
    pub fn new(
        repo: Arc<Repository>,
        cache: Arc<HolderCache>,
        oracle: Arc<dyn PriceOracle>,
        treasury: Arc<dyn Treasury>,
        allocator: PayoutAllocator,
        config: Config,
    ) -> Self {
        Self {
            repo,
            cache,
            oracle,
            treasury,
            allocator,
            config,
        }
    }

    /// Attempt one payout cycle. Safe to call from any number of concurrent
    /// callers; at most one reaches execution per interval.
    ///
    /// # Errors
    /// Returns an error only for persistence failures in the guard phase;
    /// execution-phase failures come back as a `Failed` result with the
    /// timer already advanced.
    pub async fn attempt_payout(&self) -> Result<CycleResult, CycleError> {
        let now = TimeMs::now();
        let interval_ms = self.config.interval_ms();

        let state = self.repo.get_timer_state().await?;
        if !state.is_due(now, interval_ms) {
            return Ok(CycleResult::empty(
                CycleOutcome::NotDue,
                state.current_cycle,
                Some(format!(
                    "next cycle due in {}s",
                    state.ms_until_due(now, interval_ms) / 1000
                )),
            ));
        }

        if !self
            .repo
            .try_acquire_cycle_lock(now, self.config.stale_lock_ms())
            .await?
        {
            return Ok(CycleResult::empty(
                CycleOutcome::Busy,
                state.current_cycle,
                Some("payout attempt already in progress".to_string()),
            ));
        }

        // Lock held: every path below must give it back, including errors.
        match self.locked_attempt(now).await {
            Ok(result) => Ok(result),
            Err(e) => {
                if let Err(unlock_err) = self.repo.release_cycle_lock().await {
                    error!(error = %unlock_err, "Failed to release cycle lock after error");
                }
                Err(e)
            }
        }
    }

    /// Guard re-validation and execution, entered with the lock held.
    async fn locked_attempt(&self, now: TimeMs) -> Result<CycleResult, CycleError> {
        // Re-read under the lock: the pre-lock read may have raced.
        let state = self.repo.get_timer_state().await?;
        let cycle = state.current_cycle;

        if !state.is_due(now, self.config.interval_ms()) {
            self.repo.release_cycle_lock().await?;
            return Ok(CycleResult::empty(
                CycleOutcome::NotDue,
                cycle,
                Some("interval not elapsed".to_string()),
            ));
        }

        if self.repo.count_payouts_for_cycle(cycle).await? > 0 {
            self.repo.release_cycle_lock().await?;
            return Ok(CycleResult::empty(
                CycleOutcome::AlreadyPaid,
                cycle,
                Some("payouts already recorded for this interval".to_string()),
            ));
        }

        if state.failed_attempts >= self.config.max_cycle_attempts {
            self.repo.release_cycle_lock().await?;
            return Ok(CycleResult::empty(
                CycleOutcome::AttemptsExhausted,
                cycle,
                Some("max attempts reached; waiting for next interval".to_string()),
            ));
        }

        self.repo.increment_failed_attempts().await?;

        // Execution committed: the timer advances no matter what happens in
        // execute_cycle, or the lock would stay wedged on a crash path.
        let executed = self.execute_cycle(cycle, now).await;

        if let Err(e) = self.repo.finalize_cycle(now, cycle + 1).await {
            error!(cycle, error = %e, "Failed to finalize cycle timer");
            if let Err(unlock_err) = self.repo.release_cycle_lock().await {
                error!(error = %unlock_err, "Failed to release cycle lock after finalize failure");
            }
        }

        match executed {
            Ok(result) => Ok(result),
            Err(e) => {
                warn!(cycle, error = %e, "Cycle execution failed");
                Ok(CycleResult::empty(
                    CycleOutcome::Failed,
                    cycle,
                    Some(e.to_string()),
                ))
            }
        }
    }

    /// Steps 5-10: pool sizing, ranking, pending rows, transfers, winner
    /// bookkeeping. The caller advances the timer afterwards in every case.
    async fn execute_cycle(&self, cycle: i64, now: TimeMs) -> Result<CycleResult, CycleError> {
        let balance = self.treasury.pool_balance().await?;
        let token_price = self
            .oracle
            .get_asset_price(&self.config.asset_id)
            .await?;
        let native_price = self
            .oracle
            .get_asset_price(&self.config.native_asset_id)
            .await?;

        let (token_price, native_price) = match (token_price, native_price) {
            (Some(t), Some(n)) => (t, n),
            _ => return Ok(self.skipped(cycle, "price unavailable")),
        };

        let distributable = balance * self.config.pool_fraction;
        if distributable < self.config.min_pool_native {
            return Ok(self.skipped(cycle, "pool below minimum"));
        }
        let pool_value_usd = distributable * native_price;

        let ranked = self
            .rank(token_price, pool_value_usd, cycle, now)
            .await?;
        let winners: Vec<RankedEntry> = ranked
            .into_iter()
            .take(self.allocator.share_count())
            .collect();
        if winners.is_empty() {
            return Ok(self.skipped(cycle, "no eligible winners"));
        }

        let fee_amount = balance * self.config.fee_fraction;
        let shares = self.allocator.allocate(distributable);

        // Pending rows first: a crash after this point leaves an auditable
        // record of every payment decision.
        let mut pending: Vec<(i64, CyclePayout)> = Vec::new();
        for (rank, wallet, amount_native, drawdown_pct, loss_usd) in
            std::iter::once((
                0i64,
                self.config.fee_wallet.clone(),
                fee_amount,
                Decimal::zero(),
                Decimal::zero(),
            ))
            .chain(winners.iter().zip(shares.iter()).map(|(winner, share)| {
                (
                    winner.rank,
                    winner.wallet.clone(),
                    *share,
                    winner.drawdown_pct,
                    winner.loss_usd,
                )
            }))
        {
            if amount_native < self.config.min_transfer_native {
                info!(cycle, rank, wallet = %wallet, amount = %amount_native,
                    "Skipping sub-minimum transfer");
                continue;
            }

            let payout = CyclePayout {
                cycle,
                rank,
                wallet,
                amount_usd: amount_native * native_price,
                amount_native,
                drawdown_pct,
                loss_usd,
                tx_ref: None,
                status: PayoutStatus::Pending,
                error_detail: None,
            };
            let row_id = self.repo.insert_payout(&payout).await?;
            pending.push((row_id, payout));
        }

        // Transfers to distinct payees are independent; issue them
        // concurrently and record each outcome as it lands. One payee
        // failing never blocks the others.
        let transfers = pending.into_iter().map(|(row_id, payout)| async move {
            self.settle_payee(row_id, payout).await
        });
        let payouts: Vec<CyclePayout> = join_all(transfers).await;

        // Winner bookkeeping applies only to payees whose transfer landed.
        for payout in payouts.iter().filter(|p| {
            p.status == PayoutStatus::Success && p.rank >= 1
        }) {
            self.record_winner(payout, cycle, token_price, now).await?;
        }

        let succeeded = payouts
            .iter()
            .filter(|p| p.status == PayoutStatus::Success)
            .count();
        info!(cycle, payees = payouts.len(), succeeded, "Cycle executed");

        Ok(CycleResult {
            attempt_id: Uuid::new_v4(),
            outcome: CycleOutcome::Completed,
            cycle,
            reason: None,
            payouts,
        })
    }

    /// Attempt one payee's transfer and persist the terminal status.
    async fn settle_payee(&self, row_id: i64, mut payout: CyclePayout) -> CyclePayout {
        let attempt = tokio::time::timeout(
            TRANSFER_TIMEOUT,
            self.treasury.transfer(&payout.wallet, payout.amount_native),
        )
        .await;

        let (status, tx_ref, error_detail) = match attempt {
            Ok(Ok(receipt)) => (PayoutStatus::Success, Some(receipt.reference), None),
            Ok(Err(e)) => {
                warn!(wallet = %payout.wallet, error = %e, "Transfer failed");
                (PayoutStatus::Failed, None, Some(e.to_string()))
            }
            Err(_) => {
                warn!(wallet = %payout.wallet, "Transfer timed out");
                (
                    PayoutStatus::Failed,
                    None,
                    Some("transfer timed out".to_string()),
                )
            }
        };

        if let Err(e) = self
            .repo
            .mark_payout_result(row_id, status, tx_ref.as_deref(), error_detail.as_deref())
            .await
        {
            // The row stays pending in the store; the returned result still
            // reflects what the treasury reported.
            error!(wallet = %payout.wallet, error = %e, "Failed to persist payout status");
        }

        payout.status = status;
        payout.tx_ref = tx_ref;
        payout.error_detail = error_detail;
        payout
    }

    /// Cooldown + cost-basis reset for a paid winner.
    async fn record_winner(
        &self,
        payout: &CyclePayout,
        cycle: i64,
        token_price: Decimal,
        now: TimeMs,
    ) -> Result<(), CycleError> {
        let win_cycle = cycle + 1;

        let dq = Disqualification {
            wallet: payout.wallet.clone(),
            reason: "winner cooldown".to_string(),
            expires_at: TimeMs::new(now.as_ms() + 2 * self.config.interval_ms()),
        };
        self.repo.upsert_disqualification(&dq).await?;

        let reset_total_cost_usd = match self.repo.get_holder(&payout.wallet).await? {
            Some(holder) => token_price * holder.total_tokens_bought,
            None => Decimal::zero(),
        };
        self.repo
            .record_win(&payout.wallet, win_cycle, reset_total_cost_usd)
            .await?;
        self.cache
            .mark_winner(&payout.wallet, win_cycle, token_price)
            .await;

        info!(wallet = %payout.wallet, win_cycle, "Winner recorded; cost basis reset");
        Ok(())
    }

    fn skipped(&self, cycle: i64, reason: &str) -> CycleResult {
        info!(cycle, reason, "Cycle skipped");
        CycleResult::empty(CycleOutcome::Skipped, cycle, Some(reason.to_string()))
    }

    /// Current ranked losers, for external consumers.
    ///
    /// # Errors
    /// Returns an error if a collaborator call fails or no price is
    /// available for the tracked or native asset.
    pub async fn ranked_losers(&self) -> Result<Vec<RankedEntry>, CycleError> {
        let now = TimeMs::now();
        let state = self.repo.get_timer_state().await?;

        let token_price = self
            .oracle
            .get_asset_price(&self.config.asset_id)
            .await?
            .ok_or_else(|| CycleError::PriceUnavailable(self.config.asset_id.clone()))?;
        let native_price = self
            .oracle
            .get_asset_price(&self.config.native_asset_id)
            .await?
            .ok_or_else(|| CycleError::PriceUnavailable(self.config.native_asset_id.clone()))?;

        let balance = self.treasury.pool_balance().await?;
        let pool_value_usd = balance * self.config.pool_fraction * native_price;

        self.rank(token_price, pool_value_usd, state.current_cycle, now)
            .await
            .map_err(CycleError::from)
    }

    /// Classify and rank the cached holder set.
    async fn rank(
        &self,
        token_price: Decimal,
        pool_value_usd: Decimal,
        current_cycle: i64,
        now: TimeMs,
    ) -> Result<Vec<RankedEntry>, sqlx::Error> {
        self.repo.purge_expired_disqualifications(now).await?;
        let disqualified = self.repo.active_disqualified_wallets(now).await?;

        let params = self.config.eligibility_params();
        let holders = self.cache.snapshot().await;
        let annotated: Vec<_> = holders
            .iter()
            .filter(|h| !disqualified.contains(&h.wallet))
            .map(|h| {
                (
                    h.wallet.clone(),
                    classify(h, &params, token_price, pool_value_usd, current_cycle, now),
                )
            })
            .collect();

        Ok(rank_losers(&annotated))
    }

    /// Timer visibility for status endpoints.
    ///
    /// # Errors
    /// Returns an error if the timer read fails.
    pub async fn cycle_status(&self) -> Result<CycleStatus, CycleError> {
        let now = TimeMs::now();
        let state = self.repo.get_timer_state().await?;
        Ok(CycleStatus {
            seconds_until_next: state.ms_until_due(now, self.config.interval_ms()) / 1000,
            current_cycle: state.current_cycle,
            failed_attempts: state.failed_attempts,
            in_progress: state.in_progress,
        })
    }

    /// Payout history for one cycle.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn payouts_for_cycle(&self, cycle: i64) -> Result<Vec<CyclePayout>, CycleError> {
        Ok(self.repo.payouts_for_cycle(cycle).await?)
    }
}
