//! TokenEvent: a single observed buy/sell/transfer for a wallet.

use crate::domain::{Decimal, TimeMs, TxKind, Wallet};
use serde::{Deserialize, Serialize};

/// One token movement observed on-chain for a wallet.
///
/// Events are the input to the cost-basis fold. For buys, `usd_value` is the
/// USD notional of the swap's stablecoin counter-leg as reported by the
/// indexer; buys without it never contribute to the cost basis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEvent {
    /// Stable unique identifier for this event (dedupe key).
    pub event_key: String,
    /// Time of the event in milliseconds since Unix epoch.
    pub time_ms: TimeMs,
    /// Wallet the event belongs to.
    pub wallet: Wallet,
    /// Kind of movement.
    pub kind: TxKind,
    /// Token quantity moved (human units, always positive).
    pub token_amount: Decimal,
    /// USD notional for buys, when the indexer could derive one.
    pub usd_value: Option<Decimal>,
    /// On-chain transaction hash, when known.
    pub tx_hash: Option<String>,
}

impl TokenEvent {
    /// Create a new TokenEvent, deriving its dedupe key.
    pub fn new(
        time_ms: TimeMs,
        wallet: Wallet,
        kind: TxKind,
        token_amount: Decimal,
        usd_value: Option<Decimal>,
        tx_hash: Option<String>,
    ) -> Self {
        let event_key =
            Self::compute_event_key(&wallet, time_ms, kind, &token_amount, tx_hash.as_deref());
        TokenEvent {
            event_key,
            time_ms,
            wallet,
            kind,
            token_amount,
            usd_value,
            tx_hash,
        }
    }

    /// Generate a stable unique key for this event.
    ///
    /// Priority: transaction hash (if present) > hash of deterministic fields.
    pub fn compute_event_key(
        wallet: &Wallet,
        time_ms: TimeMs,
        kind: TxKind,
        token_amount: &Decimal,
        tx_hash: Option<&str>,
    ) -> String {
        if let Some(tx_hash) = tx_hash {
            return format!("tx:{}:{}", tx_hash, kind);
        }

        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(wallet.as_str());
        hasher.update(time_ms.as_ms().to_le_bytes());
        hasher.update(kind.to_string());
        hasher.update(token_amount.to_canonical_string());
        let hash = hasher.finalize();
        format!("hash:{}", hex::encode(&hash[..16]))
    }

    /// Borrow the precomputed event key.
    pub fn event_key(&self) -> &str {
        &self.event_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_event_key_prefers_tx_hash() {
        let event = TokenEvent::new(
            TimeMs::new(1000),
            Wallet::new("addr_1"),
            TxKind::Buy,
            d("100"),
            Some(d("10")),
            Some("abc123".to_string()),
        );
        assert_eq!(event.event_key(), "tx:abc123:buy");
    }

    #[test]
    fn test_event_key_hash_fallback_deterministic() {
        let key = |amount: &str| {
            TokenEvent::compute_event_key(
                &Wallet::new("addr_1"),
                TimeMs::new(1000),
                TxKind::Sell,
                &d(amount),
                None,
            )
        };
        assert!(key("5").starts_with("hash:"));
        assert_eq!(key("5"), key("5"));
        assert_ne!(key("5"), key("6"));
    }

    #[test]
    fn test_same_tx_different_kinds_distinct_keys() {
        let buy = TokenEvent::new(
            TimeMs::new(1000),
            Wallet::new("addr_1"),
            TxKind::Buy,
            d("100"),
            None,
            Some("abc".to_string()),
        );
        let out = TokenEvent::new(
            TimeMs::new(1000),
            Wallet::new("addr_1"),
            TxKind::TransferOut,
            d("100"),
            None,
            Some("abc".to_string()),
        );
        assert_ne!(buy.event_key(), out.event_key());
    }

    #[test]
    fn test_event_serialization_round_trip() {
        let event = TokenEvent::new(
            TimeMs::new(1000),
            Wallet::new("addr_1"),
            TxKind::Buy,
            d("100"),
            Some(d("12.5")),
            Some("abc".to_string()),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: TokenEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }
}
