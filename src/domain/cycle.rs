//! Persisted payout-cycle records: CyclePayout, Disqualification, CycleTimerState.

use crate::domain::{Decimal, TimeMs, Wallet};
use serde::{Deserialize, Serialize};

/// Terminal-or-pending status of one payee's transfer within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    /// Row written, transfer not yet attempted or still in flight.
    Pending,
    /// Transfer confirmed by the treasury collaborator.
    Success,
    /// Transfer attempted and rejected or errored.
    Failed,
}

impl PayoutStatus {
    pub fn parse(s: &str) -> Option<PayoutStatus> {
        match s {
            "pending" => Some(PayoutStatus::Pending),
            "success" => Some(PayoutStatus::Success),
            "failed" => Some(PayoutStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayoutStatus::Pending => write!(f, "pending"),
            PayoutStatus::Success => write!(f, "success"),
            PayoutStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Immutable audit record of one payee in one cycle.
///
/// Written with `Pending` status before the transfer is attempted, then
/// updated once with the terminal outcome. Never mutated after that.
/// Rank 0 is the operating-fee payee; ranks 1..=3 are winners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CyclePayout {
    pub cycle: i64,
    pub rank: i64,
    pub wallet: Wallet,
    pub amount_usd: Decimal,
    pub amount_native: Decimal,
    pub drawdown_pct: Decimal,
    pub loss_usd: Decimal,
    pub tx_ref: Option<String>,
    pub status: PayoutStatus,
    pub error_detail: Option<String>,
}

/// Time-bounded eligibility override, independent of the derived rules.
///
/// Created when a wallet wins (cooldown belt-and-braces) or misbehaves.
/// Expired rows are purged lazily during ranking passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disqualification {
    pub wallet: Wallet,
    pub reason: String,
    pub expires_at: TimeMs,
}

impl Disqualification {
    pub fn is_active(&self, now: TimeMs) -> bool {
        self.expires_at > now
    }
}

/// Singleton coordination record for the payout timer.
///
/// The one piece of state that must be strongly consistent: `in_progress`
/// is flipped with an atomic conditional update and acts as the
/// cross-instance mutex. `locked_at` backs stale-lock recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleTimerState {
    pub last_payout_at: TimeMs,
    pub current_cycle: i64,
    pub failed_attempts: i64,
    pub in_progress: bool,
    pub locked_at: Option<TimeMs>,
}

impl CycleTimerState {
    /// Whether a full interval has elapsed since the last payout.
    pub fn is_due(&self, now: TimeMs, interval_ms: i64) -> bool {
        now.since(self.last_payout_at) >= interval_ms
    }

    /// Milliseconds until the next cycle is due (zero if already due).
    pub fn ms_until_due(&self, now: TimeMs, interval_ms: i64) -> i64 {
        (interval_ms - now.since(self.last_payout_at)).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payout_status_round_trip() {
        for status in [
            PayoutStatus::Pending,
            PayoutStatus::Success,
            PayoutStatus::Failed,
        ] {
            assert_eq!(PayoutStatus::parse(&status.to_string()), Some(status));
        }
        assert_eq!(PayoutStatus::parse("retrying"), None);
    }

    #[test]
    fn test_disqualification_expiry() {
        let dq = Disqualification {
            wallet: Wallet::new("addr_1"),
            reason: "winner cooldown".to_string(),
            expires_at: TimeMs::new(5000),
        };
        assert!(dq.is_active(TimeMs::new(4999)));
        assert!(!dq.is_active(TimeMs::new(5000)));
    }

    #[test]
    fn test_timer_due_math() {
        let state = CycleTimerState {
            last_payout_at: TimeMs::new(10_000),
            current_cycle: 3,
            failed_attempts: 0,
            in_progress: false,
            locked_at: None,
        };
        assert!(!state.is_due(TimeMs::new(10_500), 1000));
        assert!(state.is_due(TimeMs::new(11_000), 1000));
        assert_eq!(state.ms_until_due(TimeMs::new(10_400), 1000), 600);
        assert_eq!(state.ms_until_due(TimeMs::new(12_000), 1000), 0);
    }
}
