//! Deterministic loss ranking of eligible holders.

use crate::domain::{Decimal, Wallet};
use crate::engine::eligibility::EligibilityResult;
use serde::Serialize;

/// One row of the ranked-losers output, rebuilt fresh each cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedEntry {
    pub wallet: Wallet,
    pub drawdown_pct: Decimal,
    pub loss_usd: Decimal,
    /// 1-based, dense, gapless.
    pub rank: i64,
}

/// Rank eligible holders worst-first.
///
/// Sort keys: `drawdown_pct` ascending (more negative first), then
/// `loss_usd` descending, then wallet address lexical ascending. The wallet
/// fallback makes the order a total one, so repeated calls over the same
/// input always agree regardless of input order.
pub fn rank_losers(annotated: &[(Wallet, EligibilityResult)]) -> Vec<RankedEntry> {
    let mut eligible: Vec<&(Wallet, EligibilityResult)> =
        annotated.iter().filter(|(_, r)| r.eligible).collect();

    eligible.sort_by(|(wallet_a, a), (wallet_b, b)| {
        a.drawdown_pct
            .cmp(&b.drawdown_pct)
            .then_with(|| b.loss_usd.cmp(&a.loss_usd))
            .then_with(|| wallet_a.as_str().cmp(wallet_b.as_str()))
    });

    eligible
        .into_iter()
        .enumerate()
        .map(|(idx, (wallet, result))| RankedEntry {
            wallet: wallet.clone(),
            drawdown_pct: result.drawdown_pct,
            loss_usd: result.loss_usd,
            rank: (idx + 1) as i64,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn entry(wallet: &str, eligible: bool, drawdown: &str, loss: &str) -> (Wallet, EligibilityResult) {
        (
            Wallet::new(wallet),
            EligibilityResult {
                eligible,
                reason: None,
                drawdown_pct: d(drawdown),
                loss_usd: d(loss),
            },
        )
    }

    #[test]
    fn test_worst_drawdown_ranks_first() {
        let annotated = vec![
            entry("addr_a", true, "-20", "100"),
            entry("addr_b", true, "-60", "50"),
            entry("addr_c", true, "-40", "500"),
        ];
        let ranked = rank_losers(&annotated);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].wallet.as_str(), "addr_b");
        assert_eq!(ranked[1].wallet.as_str(), "addr_c");
        assert_eq!(ranked[2].wallet.as_str(), "addr_a");
        assert_eq!(
            ranked.iter().map(|e| e.rank).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_ineligible_filtered_out() {
        let annotated = vec![
            entry("addr_a", false, "-90", "1000"),
            entry("addr_b", true, "-10", "10"),
        ];
        let ranked = rank_losers(&annotated);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].wallet.as_str(), "addr_b");
        assert_eq!(ranked[0].rank, 1);
    }

    #[test]
    fn test_equal_drawdown_breaks_on_larger_loss() {
        let annotated = vec![
            entry("addr_a", true, "-50", "100"),
            entry("addr_b", true, "-50", "900"),
        ];
        let ranked = rank_losers(&annotated);
        assert_eq!(ranked[0].wallet.as_str(), "addr_b");
    }

    #[test]
    fn test_exact_ties_are_deterministic_across_input_orders() {
        let forward = vec![
            entry("addr_b", true, "-50", "100"),
            entry("addr_a", true, "-50", "100"),
            entry("addr_c", true, "-50", "100"),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();

        let ranked_fwd = rank_losers(&forward);
        let ranked_rev = rank_losers(&reversed);
        assert_eq!(ranked_fwd, ranked_rev);
        assert_eq!(ranked_fwd[0].wallet.as_str(), "addr_a");
        assert_eq!(ranked_fwd[1].wallet.as_str(), "addr_b");
        assert_eq!(ranked_fwd[2].wallet.as_str(), "addr_c");
    }

    #[test]
    fn test_empty_input() {
        assert!(rank_losers(&[]).is_empty());
    }
}
