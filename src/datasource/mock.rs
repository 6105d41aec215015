//! Mock collaborators for testing without network calls.

use super::{
    IndexerProvider, PriceOracle, ProviderError, RawHolder, TransferReceipt, Treasury,
};
use crate::domain::{Decimal, TimeMs, TokenEvent, Wallet};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Mock indexer + oracle backed by predefined fixtures.
#[derive(Debug, Default)]
pub struct MockIndexer {
    holders: Vec<RawHolder>,
    events: Vec<TokenEvent>,
    prices: HashMap<String, Decimal>,
}

impl MockIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a holder listing entry.
    pub fn with_holder(mut self, wallet: &str, balance: Decimal) -> Self {
        self.holders.push(RawHolder {
            wallet: Wallet::new(wallet),
            balance,
        });
        self
    }

    /// Add a wallet transaction event.
    pub fn with_event(mut self, event: TokenEvent) -> Self {
        self.events.push(event);
        self
    }

    /// Add multiple wallet transaction events.
    pub fn with_events(mut self, events: Vec<TokenEvent>) -> Self {
        self.events.extend(events);
        self
    }

    /// Set the spot price for an asset id. Assets without a price quote
    /// resolve to None.
    pub fn with_price(mut self, asset_id: &str, price: Decimal) -> Self {
        self.prices.insert(asset_id.to_string(), price);
        self
    }
}

#[async_trait]
impl IndexerProvider for MockIndexer {
    async fn list_holders(
        &self,
        _asset_id: &str,
        limit: u32,
    ) -> Result<Vec<RawHolder>, ProviderError> {
        Ok(self.holders.iter().take(limit as usize).cloned().collect())
    }

    async fn list_wallet_transactions(
        &self,
        wallet: &Wallet,
        _asset_id: &str,
        from_ms: i64,
        limit: u32,
    ) -> Result<Vec<TokenEvent>, ProviderError> {
        let from = TimeMs::new(from_ms);
        let mut events: Vec<TokenEvent> = self
            .events
            .iter()
            .filter(|e| e.wallet == *wallet && e.time_ms >= from)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.time_ms);
        events.truncate(limit as usize);
        Ok(events)
    }
}

#[async_trait]
impl PriceOracle for MockIndexer {
    async fn get_asset_price(&self, asset_id: &str) -> Result<Option<Decimal>, ProviderError> {
        Ok(self.prices.get(asset_id).copied())
    }
}

/// Mock treasury with scripted per-destination failures and call recording.
#[derive(Debug)]
pub struct MockTreasury {
    balance: Decimal,
    failing_destinations: HashSet<Wallet>,
    transfers: Mutex<Vec<(Wallet, Decimal)>>,
    next_reference: AtomicU64,
}

impl MockTreasury {
    pub fn new(balance: Decimal) -> Self {
        Self {
            balance,
            failing_destinations: HashSet::new(),
            transfers: Mutex::new(Vec::new()),
            next_reference: AtomicU64::new(1),
        }
    }

    /// Make transfers to `wallet` fail with a rejection.
    pub fn failing_for(mut self, wallet: &str) -> Self {
        self.failing_destinations.insert(Wallet::new(wallet));
        self
    }

    /// Transfers attempted so far, in call order.
    pub fn recorded_transfers(&self) -> Vec<(Wallet, Decimal)> {
        self.transfers.lock().expect("transfer log poisoned").clone()
    }
}

#[async_trait]
impl Treasury for MockTreasury {
    async fn pool_balance(&self) -> Result<Decimal, ProviderError> {
        Ok(self.balance)
    }

    async fn transfer(
        &self,
        destination: &Wallet,
        amount: Decimal,
    ) -> Result<TransferReceipt, ProviderError> {
        self.transfers
            .lock()
            .expect("transfer log poisoned")
            .push((destination.clone(), amount));

        if self.failing_destinations.contains(destination) {
            return Err(ProviderError::TransferRejected(
                "destination rejected by fixture".to_string(),
            ));
        }

        let seq = self.next_reference.fetch_add(1, Ordering::SeqCst);
        Ok(TransferReceipt {
            reference: format!("mock-tx-{}", seq),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TxKind;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn event(wallet: &str, time_ms: i64) -> TokenEvent {
        TokenEvent::new(
            TimeMs::new(time_ms),
            Wallet::new(wallet),
            TxKind::Buy,
            d("100"),
            Some(d("10")),
            Some(format!("tx{}", time_ms)),
        )
    }

    #[tokio::test]
    async fn test_mock_indexer_filters_by_wallet_and_time() {
        let indexer = MockIndexer::new()
            .with_event(event("addr_1", 1000))
            .with_event(event("addr_1", 3000))
            .with_event(event("addr_2", 2000));

        let events = indexer
            .list_wallet_transactions(&Wallet::new("addr_1"), "token", 2000, 100)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].time_ms, TimeMs::new(3000));
    }

    #[tokio::test]
    async fn test_mock_indexer_price_lookup() {
        let indexer = MockIndexer::new().with_price("token", d("0.5"));
        assert_eq!(
            indexer.get_asset_price("token").await.unwrap(),
            Some(d("0.5"))
        );
        assert_eq!(indexer.get_asset_price("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_mock_treasury_records_and_fails() {
        let treasury = MockTreasury::new(d("1000")).failing_for("addr_bad");

        let ok = treasury
            .transfer(&Wallet::new("addr_good"), d("10"))
            .await;
        assert!(ok.is_ok());

        let err = treasury.transfer(&Wallet::new("addr_bad"), d("10")).await;
        assert!(matches!(err, Err(ProviderError::TransferRejected(_))));

        // Both attempts are recorded, including the failed one.
        assert_eq!(treasury.recorded_transfers().len(), 2);
    }
}
