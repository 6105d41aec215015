//! End-to-end engine pipeline: fold events, classify, rank, allocate.

use lossback::domain::{Decimal, HolderSnapshot, TimeMs, TokenEvent, TxKind, Wallet};
use lossback::engine::{
    classify, rank_losers, CostBasisAggregator, EligibilityParams, IneligibleReason,
    PayoutAllocator,
};
use std::str::FromStr;

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn event(wallet: &str, kind: TxKind, amount: &str, usd: Option<&str>, time_ms: i64) -> TokenEvent {
    TokenEvent::new(
        TimeMs::new(time_ms),
        Wallet::new(wallet),
        kind,
        d(amount),
        usd.map(d),
        Some(format!("{}-{}", wallet, time_ms)),
    )
}

fn holder_from_events(wallet: &str, balance: &str, events: &[TokenEvent]) -> HolderSnapshot {
    let mut holder = HolderSnapshot::empty(Wallet::new(wallet));
    let mut aggregator = CostBasisAggregator::new();
    aggregator.process_events(events);
    aggregator.apply_to(&mut holder);
    holder.balance = d(balance);
    holder
}

fn params() -> EligibilityParams {
    EligibilityParams {
        min_holding: d("1000"),
        min_hold_hours: 24,
        min_loss_pct: d("0.1"),
    }
}

fn far_future() -> TimeMs {
    TimeMs::new(365 * 24 * 3_600_000)
}

#[test]
fn test_vwap_through_mixed_history() {
    let events = vec![
        event("addr_1", TxKind::Buy, "1000000", Some("100"), 1000),
        event("addr_1", TxKind::TransferIn, "500000", None, 1500),
        event("addr_1", TxKind::Buy, "500000", Some("100"), 2000),
    ];
    let holder = holder_from_events("addr_1", "2000000", &events);

    // 200 USD over 1.5M bought tokens; the transfer-in is not a buy.
    let vwap = holder.cost_basis().unwrap();
    assert!((vwap - d("0.000133333")).abs() < d("0.000001"));
    assert_eq!(holder.total_tokens_bought, d("1500000"));
}

#[test]
fn test_sell_disqualifies_but_keeps_basis() {
    let events = vec![
        event("addr_1", TxKind::Buy, "1000000", Some("1000"), 1000),
        event("addr_1", TxKind::Sell, "100", None, 2000),
    ];
    let holder = holder_from_events("addr_1", "999900", &events);
    assert_eq!(holder.cost_basis(), Some(d("0.001")));

    let result = classify(&holder, &params(), d("0.0004"), d("10000"), 5, far_future());
    assert_eq!(result.reason, Some(IneligibleReason::SoldTokens));
    // Diagnostics still carry the underwater metrics.
    assert_eq!(result.drawdown_pct, d("-60"));
}

#[test]
fn test_pipeline_ranks_only_eligible_holders() {
    let make = |wallet: &str, cost: &str| {
        holder_from_events(
            wallet,
            "1000000",
            &[event(wallet, TxKind::Buy, "1000000", Some(cost), 1000)],
        )
    };

    let deep_loser = make("addr_deep", "1000"); // basis 0.001, -60%
    let mild_loser = make("addr_mild", "500"); // basis 0.0005, -20%
    let in_profit = make("addr_profit", "300"); // basis 0.0003, +33%
    let mut seller = make("addr_seller", "1000");
    seller.has_disposed = true;

    let price = d("0.0004");
    let pool_usd = d("10000");
    let annotated: Vec<_> = [&deep_loser, &mild_loser, &in_profit, &seller]
        .into_iter()
        .map(|h| {
            (
                h.wallet.clone(),
                classify(h, &params(), price, pool_usd, 5, far_future()),
            )
        })
        .collect();

    let ranked = rank_losers(&annotated);
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].wallet.as_str(), "addr_deep");
    assert_eq!(ranked[0].rank, 1);
    assert_eq!(ranked[1].wallet.as_str(), "addr_mild");
    assert_eq!(ranked[1].rank, 2);
}

#[test]
fn test_ranking_is_stable_for_identical_losses() {
    let make = |wallet: &str| {
        holder_from_events(
            wallet,
            "1000000",
            &[event(wallet, TxKind::Buy, "1000000", Some("800"), 1000)],
        )
    };
    let holders = vec![make("addr_y"), make("addr_x"), make("addr_z")];

    let classify_all = |hs: &[HolderSnapshot]| {
        let annotated: Vec<_> = hs
            .iter()
            .map(|h| {
                (
                    h.wallet.clone(),
                    classify(h, &params(), d("0.0004"), d("10000"), 5, far_future()),
                )
            })
            .collect();
        rank_losers(&annotated)
    };

    let first = classify_all(&holders);
    let mut shuffled = holders.clone();
    shuffled.reverse();
    let second = classify_all(&shuffled);

    assert_eq!(first, second);
    assert_eq!(first[0].wallet.as_str(), "addr_x");
}

#[test]
fn test_allocator_matches_ranked_order() {
    let allocator = PayoutAllocator::new(vec![d("0.80"), d("0.15"), d("0.05")]).unwrap();
    let shares = allocator.allocate(d("300"));
    assert_eq!(shares, vec![d("240"), d("45"), d("15")]);
    assert_eq!(shares.iter().copied().sum::<Decimal>(), d("300"));
}

#[test]
fn test_reset_then_new_loss_restores_eligibility() {
    let mut holder = holder_from_events(
        "addr_1",
        "1000000",
        &[event("addr_1", TxKind::Buy, "1000000", Some("1000"), 1000)],
    );

    // Paid out at 0.0004: basis resets, wallet sits at break-even.
    holder.reset_cost_basis_to(d("0.0004"));
    holder.last_win_cycle = Some(5);

    let at_seven = classify(&holder, &params(), d("0.0004"), d("10000"), 7, far_future());
    assert_eq!(at_seven.reason, Some(IneligibleReason::InProfit));

    // The market falls again: a genuinely new loss, eligible once the
    // cooldown has lapsed.
    let fallen = classify(&holder, &params(), d("0.0002"), d("10000"), 7, far_future());
    assert!(fallen.eligible);
    assert_eq!(fallen.drawdown_pct, d("-50"));
}
