//! Eligibility classification for payout candidacy.

use crate::domain::{Decimal, HolderSnapshot, TimeMs};
use serde::Serialize;

/// Thresholds applied by the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibilityParams {
    /// Minimum token balance to be considered at all.
    pub min_holding: Decimal,
    /// Minimum hours since the first priced buy.
    pub min_hold_hours: i64,
    /// Loss threshold as a percentage of the pool's USD value.
    pub min_loss_pct: Decimal,
}

/// Why a holder was ruled out, reported in classification order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IneligibleReason {
    InsufficientBalance,
    NoBuyHistory,
    HoldDurationNotMet,
    SoldTokens,
    TransferredOut,
    WinnerCooldown,
    InProfit,
    LossBelowThreshold,
}

impl std::fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IneligibleReason::InsufficientBalance => "Insufficient balance",
            IneligibleReason::NoBuyHistory => "No buy history",
            IneligibleReason::HoldDurationNotMet => "Hold duration not met",
            IneligibleReason::SoldTokens => "Sold tokens",
            IneligibleReason::TransferredOut => "Transferred out",
            IneligibleReason::WinnerCooldown => "Winner cooldown",
            IneligibleReason::InProfit => "In profit",
            IneligibleReason::LossBelowThreshold => "Loss below threshold",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of classifying one holder.
///
/// `drawdown_pct` and `loss_usd` are reported even for ineligible holders
/// (they feed diagnostics and the UI); both default to zero when the holder
/// has no usable cost basis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityResult {
    pub eligible: bool,
    pub reason: Option<IneligibleReason>,
    pub drawdown_pct: Decimal,
    pub loss_usd: Decimal,
}

impl EligibilityResult {
    fn ineligible(reason: IneligibleReason, drawdown_pct: Decimal, loss_usd: Decimal) -> Self {
        EligibilityResult {
            eligible: false,
            reason: Some(reason),
            drawdown_pct,
            loss_usd,
        }
    }
}

/// Classify one holder against the payout rules.
///
/// Rules are evaluated in a fixed order and short-circuit on the first
/// failure, so the reported reason is deterministic:
/// balance -> buy history -> hold duration -> sold -> withdrawn ->
/// cooldown -> in profit -> loss threshold.
pub fn classify(
    holder: &HolderSnapshot,
    params: &EligibilityParams,
    current_price: Decimal,
    pool_value_usd: Decimal,
    current_cycle: i64,
    now: TimeMs,
) -> EligibilityResult {
    let (drawdown_pct, loss_usd) = loss_metrics(holder, current_price);

    if holder.balance < params.min_holding {
        return EligibilityResult::ineligible(
            IneligibleReason::InsufficientBalance,
            drawdown_pct,
            loss_usd,
        );
    }

    match holder.cost_basis() {
        Some(basis) if basis.is_positive() => {}
        _ => {
            return EligibilityResult::ineligible(
                IneligibleReason::NoBuyHistory,
                drawdown_pct,
                loss_usd,
            )
        }
    }

    match holder.first_acquired_at {
        Some(first_buy) => {
            let held_ms = now.since(first_buy);
            if held_ms < params.min_hold_hours * 3_600_000 {
                return EligibilityResult::ineligible(
                    IneligibleReason::HoldDurationNotMet,
                    drawdown_pct,
                    loss_usd,
                );
            }
        }
        // A basis without a first-buy timestamp cannot happen through the
        // aggregator; treat it as missing history rather than guessing.
        None => {
            return EligibilityResult::ineligible(
                IneligibleReason::NoBuyHistory,
                drawdown_pct,
                loss_usd,
            )
        }
    }

    if holder.has_disposed {
        return EligibilityResult::ineligible(IneligibleReason::SoldTokens, drawdown_pct, loss_usd);
    }

    if holder.has_withdrawn {
        return EligibilityResult::ineligible(
            IneligibleReason::TransferredOut,
            drawdown_pct,
            loss_usd,
        );
    }

    if let Some(last_win) = holder.last_win_cycle {
        if last_win >= current_cycle - 1 {
            return EligibilityResult::ineligible(
                IneligibleReason::WinnerCooldown,
                drawdown_pct,
                loss_usd,
            );
        }
    }

    if !drawdown_pct.is_negative() {
        return EligibilityResult::ineligible(IneligibleReason::InProfit, drawdown_pct, loss_usd);
    }

    let threshold = pool_value_usd * params.min_loss_pct / Decimal::hundred();
    if loss_usd < threshold {
        return EligibilityResult::ineligible(
            IneligibleReason::LossBelowThreshold,
            drawdown_pct,
            loss_usd,
        );
    }

    EligibilityResult {
        eligible: true,
        reason: None,
        drawdown_pct,
        loss_usd,
    }
}

/// Drawdown percentage and USD loss for a holder at the given price.
///
/// Loss size uses `min(balance, total_tokens_bought)` so tokens received via
/// transfer-in cannot inflate a loss beyond what the wallet actually paid
/// for. Both metrics are zero when there is no usable cost basis.
pub fn loss_metrics(holder: &HolderSnapshot, current_price: Decimal) -> (Decimal, Decimal) {
    let basis = match holder.cost_basis() {
        Some(basis) if basis.is_positive() => basis,
        _ => return (Decimal::zero(), Decimal::zero()),
    };

    let drawdown_pct = (current_price - basis) / basis * Decimal::hundred();
    let counted = holder.balance.min(holder.total_tokens_bought);
    let loss_usd = (basis - current_price) * counted;
    (drawdown_pct, loss_usd)
}
