//! Repository layer for database operations.

use crate::domain::{
    CyclePayout, CycleTimerState, Decimal, Disqualification, HolderSnapshot, PayoutStatus, TimeMs,
    TokenEvent, TxKind, Wallet,
};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::collections::HashSet;
use std::str::FromStr;

/// Repository for all persisted state.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    // ---- holders ----

    /// Insert or fully replace a holder snapshot.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub async fn upsert_holder(&self, holder: &HolderSnapshot) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO holders (
                wallet, balance, total_tokens_bought, total_cost_usd,
                first_acquired_at_ms, last_activity_at_ms, has_disposed,
                has_withdrawn, last_win_cycle, aggregated_through_ms, updated_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(wallet) DO UPDATE SET
                balance = excluded.balance,
                total_tokens_bought = excluded.total_tokens_bought,
                total_cost_usd = excluded.total_cost_usd,
                first_acquired_at_ms = excluded.first_acquired_at_ms,
                last_activity_at_ms = excluded.last_activity_at_ms,
                has_disposed = excluded.has_disposed,
                has_withdrawn = excluded.has_withdrawn,
                last_win_cycle = excluded.last_win_cycle,
                aggregated_through_ms = excluded.aggregated_through_ms,
                updated_at_ms = excluded.updated_at_ms
            "#,
        )
        .bind(holder.wallet.as_str())
        .bind(holder.balance.to_canonical_string())
        .bind(holder.total_tokens_bought.to_canonical_string())
        .bind(holder.total_cost_usd.to_canonical_string())
        .bind(holder.first_acquired_at.map(|t| t.as_ms()))
        .bind(holder.last_activity_at.map(|t| t.as_ms()))
        .bind(holder.has_disposed as i64)
        .bind(holder.has_withdrawn as i64)
        .bind(holder.last_win_cycle)
        .bind(holder.aggregated_through.map(|t| t.as_ms()))
        .bind(TimeMs::now().as_ms())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch one holder by wallet.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_holder(&self, wallet: &Wallet) -> Result<Option<HolderSnapshot>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM holders WHERE wallet = ?")
            .bind(wallet.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| holder_from_row(&r)))
    }

    /// Fetch all tracked holders.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn all_holders(&self) -> Result<Vec<HolderSnapshot>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM holders ORDER BY wallet ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(holder_from_row).collect())
    }

    /// Record a payout win: stamp the win cycle and rewrite the cost
    /// accumulator so the derived basis equals the at-win market price.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub async fn record_win(
        &self,
        wallet: &Wallet,
        win_cycle: i64,
        reset_total_cost_usd: Decimal,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE holders
            SET last_win_cycle = ?, total_cost_usd = ?, updated_at_ms = ?
            WHERE wallet = ?
            "#,
        )
        .bind(win_cycle)
        .bind(reset_total_cost_usd.to_canonical_string())
        .bind(TimeMs::now().as_ms())
        .bind(wallet.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ---- token events ----

    /// Of the given keys, return those already present in token_events.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn existing_event_keys(
        &self,
        keys: &[String],
    ) -> Result<HashSet<String>, sqlx::Error> {
        if keys.is_empty() {
            return Ok(HashSet::new());
        }

        let placeholders = vec!["?"; keys.len()].join(", ");
        let sql = format!(
            "SELECT event_key FROM token_events WHERE event_key IN ({})",
            placeholders
        );

        let mut query = sqlx::query(&sql);
        for key in keys {
            query = query.bind(key);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(|r| r.get("event_key")).collect())
    }

    /// Insert events idempotently; returns how many were new.
    ///
    /// # Errors
    /// Returns an error if any insert fails.
    pub async fn insert_events(&self, events: &[TokenEvent]) -> Result<u64, sqlx::Error> {
        let mut inserted = 0;
        for event in events {
            let result = sqlx::query(
                r#"
                INSERT INTO token_events (
                    event_key, wallet, time_ms, kind, token_amount,
                    usd_value, tx_hash, created_at_ms
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(event_key) DO NOTHING
                "#,
            )
            .bind(event.event_key())
            .bind(event.wallet.as_str())
            .bind(event.time_ms.as_ms())
            .bind(event.kind.to_string())
            .bind(event.token_amount.to_canonical_string())
            .bind(event.usd_value.map(|d| d.to_canonical_string()))
            .bind(event.tx_hash.as_deref())
            .bind(TimeMs::now().as_ms())
            .execute(&self.pool)
            .await?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    /// Query a wallet's stored events, ascending by time.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn wallet_events(&self, wallet: &Wallet) -> Result<Vec<TokenEvent>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT event_key, wallet, time_ms, kind, token_amount, usd_value, tx_hash
            FROM token_events
            WHERE wallet = ?
            ORDER BY time_ms ASC, event_key ASC
            "#,
        )
        .bind(wallet.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(event_from_row).collect())
    }

    // ---- cycle payouts ----

    /// Insert a payout row (normally with Pending status, before the
    /// transfer is attempted) and return its row id.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_payout(&self, payout: &CyclePayout) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO cycle_payouts (
                cycle, rank, wallet, amount_usd, amount_native,
                drawdown_pct, loss_usd, tx_ref, status, error_detail, created_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(payout.cycle)
        .bind(payout.rank)
        .bind(payout.wallet.as_str())
        .bind(payout.amount_usd.to_canonical_string())
        .bind(payout.amount_native.to_canonical_string())
        .bind(payout.drawdown_pct.to_canonical_string())
        .bind(payout.loss_usd.to_canonical_string())
        .bind(payout.tx_ref.as_deref())
        .bind(payout.status.to_string())
        .bind(payout.error_detail.as_deref())
        .bind(TimeMs::now().as_ms())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Move a pending payout row to its terminal status. Rows already in a
    /// terminal state are never touched again.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn mark_payout_result(
        &self,
        payout_id: i64,
        status: PayoutStatus,
        tx_ref: Option<&str>,
        error_detail: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE cycle_payouts
            SET status = ?, tx_ref = ?, error_detail = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(status.to_string())
        .bind(tx_ref)
        .bind(error_detail)
        .bind(payout_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All payout rows for one cycle, fee first then winners by rank.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn payouts_for_cycle(&self, cycle: i64) -> Result<Vec<CyclePayout>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT cycle, rank, wallet, amount_usd, amount_native,
                   drawdown_pct, loss_usd, tx_ref, status, error_detail
            FROM cycle_payouts
            WHERE cycle = ?
            ORDER BY rank ASC
            "#,
        )
        .bind(cycle)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(payout_from_row).collect())
    }

    /// Count payout rows for one cycle (already-paid detection).
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn count_payouts_for_cycle(&self, cycle: i64) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cycle_payouts WHERE cycle = ?")
            .bind(cycle)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    // ---- disqualifications ----

    /// Insert or refresh a time-bounded disqualification.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub async fn upsert_disqualification(
        &self,
        dq: &Disqualification,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO disqualifications (wallet, reason, expires_at_ms)
            VALUES (?, ?, ?)
            ON CONFLICT(wallet) DO UPDATE SET
                reason = excluded.reason,
                expires_at_ms = excluded.expires_at_ms
            "#,
        )
        .bind(dq.wallet.as_str())
        .bind(dq.reason.as_str())
        .bind(dq.expires_at.as_ms())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Wallets currently under an active disqualification.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn active_disqualified_wallets(
        &self,
        now: TimeMs,
    ) -> Result<HashSet<Wallet>, sqlx::Error> {
        let rows = sqlx::query("SELECT wallet FROM disqualifications WHERE expires_at_ms > ?")
            .bind(now.as_ms())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|r| Wallet::new(r.get::<String, _>("wallet")))
            .collect())
    }

    /// Delete expired disqualifications; returns how many were purged.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub async fn purge_expired_disqualifications(&self, now: TimeMs) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM disqualifications WHERE expires_at_ms <= ?")
            .bind(now.as_ms())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // ---- cycle timer state ----

    /// Read the timer singleton.
    ///
    /// # Errors
    /// Returns an error if the query fails or the singleton is missing.
    pub async fn get_timer_state(&self) -> Result<CycleTimerState, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM cycle_timer_state WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(CycleTimerState {
            last_payout_at: TimeMs::new(row.get("last_payout_at_ms")),
            current_cycle: row.get("current_cycle"),
            failed_attempts: row.get("failed_attempts"),
            in_progress: row.get::<i64, _>("in_progress") != 0,
            locked_at: row
                .get::<Option<i64>, _>("locked_at_ms")
                .map(TimeMs::new),
        })
    }

    /// Atomically acquire the cross-instance cycle lock.
    ///
    /// Succeeds iff the lock is free, or held but stale (older than
    /// `stale_ms`). SQLite serializes writers, so `rows_affected == 1` is
    /// the linearization point: exactly one racing caller wins.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn try_acquire_cycle_lock(
        &self,
        now: TimeMs,
        stale_ms: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE cycle_timer_state
            SET in_progress = 1, locked_at_ms = ?1
            WHERE id = 1
              AND (in_progress = 0 OR locked_at_ms IS NULL OR ?1 - locked_at_ms >= ?2)
            "#,
        )
        .bind(now.as_ms())
        .bind(stale_ms)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Release the lock without advancing the cycle (guard-path exits).
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn release_cycle_lock(&self) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE cycle_timer_state SET in_progress = 0, locked_at_ms = NULL WHERE id = 1")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Bump the persisted attempt counter for the current interval.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn increment_failed_attempts(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE cycle_timer_state SET failed_attempts = failed_attempts + 1 WHERE id = 1",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Advance the timer and release the lock in one write: the attempt is
    /// over, whatever happened during execution.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn finalize_cycle(&self, now: TimeMs, next_cycle: i64) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE cycle_timer_state
            SET last_payout_at_ms = ?, current_cycle = ?, failed_attempts = 0,
                in_progress = 0, locked_at_ms = NULL
            WHERE id = 1
            "#,
        )
        .bind(now.as_ms())
        .bind(next_cycle)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn holder_from_row(row: &SqliteRow) -> HolderSnapshot {
    HolderSnapshot {
        wallet: Wallet::new(row.get::<String, _>("wallet")),
        balance: decimal_col(row, "balance"),
        total_tokens_bought: decimal_col(row, "total_tokens_bought"),
        total_cost_usd: decimal_col(row, "total_cost_usd"),
        first_acquired_at: row
            .get::<Option<i64>, _>("first_acquired_at_ms")
            .map(TimeMs::new),
        last_activity_at: row
            .get::<Option<i64>, _>("last_activity_at_ms")
            .map(TimeMs::new),
        has_disposed: row.get::<i64, _>("has_disposed") != 0,
        has_withdrawn: row.get::<i64, _>("has_withdrawn") != 0,
        last_win_cycle: row.get("last_win_cycle"),
        aggregated_through: row
            .get::<Option<i64>, _>("aggregated_through_ms")
            .map(TimeMs::new),
    }
}

fn event_from_row(row: &SqliteRow) -> TokenEvent {
    let kind_str: String = row.get("kind");
    TokenEvent {
        event_key: row.get("event_key"),
        wallet: Wallet::new(row.get::<String, _>("wallet")),
        time_ms: TimeMs::new(row.get("time_ms")),
        kind: TxKind::parse(&kind_str).unwrap_or(TxKind::TransferIn),
        token_amount: decimal_col(row, "token_amount"),
        usd_value: row
            .get::<Option<String>, _>("usd_value")
            .and_then(|s| Decimal::from_str(&s).ok()),
        tx_hash: row.get("tx_hash"),
    }
}

fn payout_from_row(row: &SqliteRow) -> CyclePayout {
    let status_str: String = row.get("status");
    CyclePayout {
        cycle: row.get("cycle"),
        rank: row.get("rank"),
        wallet: Wallet::new(row.get::<String, _>("wallet")),
        amount_usd: decimal_col(row, "amount_usd"),
        amount_native: decimal_col(row, "amount_native"),
        drawdown_pct: decimal_col(row, "drawdown_pct"),
        loss_usd: decimal_col(row, "loss_usd"),
        tx_ref: row.get("tx_ref"),
        status: PayoutStatus::parse(&status_str).unwrap_or(PayoutStatus::Failed),
        error_detail: row.get("error_detail"),
    }
}

fn decimal_col(row: &SqliteRow, col: &str) -> Decimal {
    let raw: String = row.get(col);
    Decimal::from_str(&raw).unwrap_or_default()
}
