//! HolderSnapshot: one wallet's tracked position state.

use crate::domain::{Decimal, TimeMs, Wallet};
use serde::{Deserialize, Serialize};

/// Current tracked state of one wallet.
///
/// Created on first observed balance, mutated by every ingested event and
/// periodic refresh, never hard-deleted. The cost basis is derived from the
/// accumulators; `cost_basis()` is `None` until at least one priced buy has
/// been observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderSnapshot {
    /// Wallet address, unique key.
    pub wallet: Wallet,
    /// Current token balance (human units).
    pub balance: Decimal,
    /// Total tokens acquired via priced buys.
    pub total_tokens_bought: Decimal,
    /// Total USD spent on priced buys.
    pub total_cost_usd: Decimal,
    /// Earliest observed buy.
    pub first_acquired_at: Option<TimeMs>,
    /// Latest observed event of any kind.
    pub last_activity_at: Option<TimeMs>,
    /// True once any sell has been observed. Permanent disqualifier.
    pub has_disposed: bool,
    /// True once any outbound transfer has been observed.
    pub has_withdrawn: bool,
    /// Last cycle in which this wallet was paid, if any.
    pub last_win_cycle: Option<i64>,
    /// Ingestion watermark: events up to this time have been folded in.
    pub aggregated_through: Option<TimeMs>,
}

impl HolderSnapshot {
    /// A fresh snapshot for a wallet with no observed history.
    pub fn empty(wallet: Wallet) -> Self {
        HolderSnapshot {
            wallet,
            balance: Decimal::zero(),
            total_tokens_bought: Decimal::zero(),
            total_cost_usd: Decimal::zero(),
            first_acquired_at: None,
            last_activity_at: None,
            has_disposed: false,
            has_withdrawn: false,
            last_win_cycle: None,
            aggregated_through: None,
        }
    }

    /// Volume-weighted average acquisition price, or None with no priced buys.
    ///
    /// Invariant: equals `total_cost_usd / total_tokens_bought` whenever
    /// `total_tokens_bought > 0`.
    pub fn cost_basis(&self) -> Option<Decimal> {
        if self.total_tokens_bought.is_positive() {
            self.total_cost_usd.checked_div(self.total_tokens_bought)
        } else {
            None
        }
    }

    /// Overwrite the accumulators so the derived cost basis equals `price`.
    ///
    /// Applied when the wallet is paid: its realized loss is considered paid
    /// out, so further rewards require a new loss measured from this price.
    pub fn reset_cost_basis_to(&mut self, price: Decimal) {
        if self.total_tokens_bought.is_positive() {
            self.total_cost_usd = price * self.total_tokens_bought;
        }
    }
}
