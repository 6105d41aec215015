//! HTTP client for the blockchain indexing provider's JSON API.

use super::{IndexerProvider, PriceOracle, ProviderError, RawHolder};
use crate::domain::{Decimal, TimeMs, TokenEvent, TxKind, Wallet};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Indexer client speaking the provider's POST /query protocol.
///
/// Also serves as the price oracle: the same provider exposes spot prices
/// for any asset id it indexes.
#[derive(Debug, Clone)]
pub struct HttpIndexerClient {
    client: Client,
    base_url: String,
}

impl HttpIndexerClient {
    /// Create a new indexer client.
    ///
    /// Requests carry a conservative timeout: a hung indexer call while the
    /// cycle lock is held stalls every other instance.
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(8))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, base_url }
    }

    async fn post_query(
        &self,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        let url = format!("{}/query", self.base_url);
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(20)),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .client
                .post(&url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(ProviderError::Network(e.to_string())))?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(ProviderError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(ProviderError::Http {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(ProviderError::Http {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| backoff::Error::permanent(ProviderError::Parse(e.to_string())))
        })
        .await
    }
}

#[async_trait]
impl IndexerProvider for HttpIndexerClient {
    async fn list_holders(
        &self,
        asset_id: &str,
        limit: u32,
    ) -> Result<Vec<RawHolder>, ProviderError> {
        debug!(asset_id, limit, "Listing holders");

        let payload = serde_json::json!({
            "type": "assetHolders",
            "assetId": asset_id,
            "limit": limit
        });

        let response = self.post_query(payload).await?;
        let holders_json = response
            .as_array()
            .ok_or_else(|| ProviderError::Parse("Expected array response".to_string()))?;

        let mut holders = Vec::new();
        for holder_json in holders_json {
            match parse_holder(holder_json) {
                Ok(holder) => holders.push(holder),
                Err(e) => {
                    warn!("Failed to parse holder: {}", e);
                }
            }
        }

        Ok(holders)
    }

    async fn list_wallet_transactions(
        &self,
        wallet: &Wallet,
        asset_id: &str,
        from_ms: i64,
        limit: u32,
    ) -> Result<Vec<TokenEvent>, ProviderError> {
        debug!(wallet = %wallet, asset_id, from_ms, "Listing wallet transactions");

        let payload = serde_json::json!({
            "type": "walletTransactions",
            "wallet": wallet.as_str(),
            "assetId": asset_id,
            "fromMs": from_ms,
            "limit": limit
        });

        let response = self.post_query(payload).await?;
        let events_json = response
            .as_array()
            .ok_or_else(|| ProviderError::Parse("Expected array response".to_string()))?;

        let mut events = Vec::new();
        for event_json in events_json {
            match parse_event(event_json, wallet) {
                Ok(event) => events.push(event),
                Err(e) => {
                    warn!("Failed to parse transaction: {}", e);
                }
            }
        }

        Ok(events)
    }
}

#[async_trait]
impl PriceOracle for HttpIndexerClient {
    async fn get_asset_price(&self, asset_id: &str) -> Result<Option<Decimal>, ProviderError> {
        debug!(asset_id, "Fetching asset price");

        let payload = serde_json::json!({
            "type": "assetPrice",
            "assetId": asset_id
        });

        let response = self.post_query(payload).await?;
        match response.get("priceUsd") {
            Some(serde_json::Value::Null) | None => Ok(None),
            Some(value) => {
                let raw = value
                    .as_str()
                    .map(|s| s.to_string())
                    .or_else(|| value.as_f64().map(|f| f.to_string()))
                    .ok_or_else(|| ProviderError::Parse("Invalid priceUsd".to_string()))?;
                Decimal::from_str_canonical(&raw)
                    .map(Some)
                    .map_err(|e| ProviderError::Parse(format!("Invalid priceUsd: {}", e)))
            }
        }
    }
}

fn parse_holder(holder_json: &serde_json::Value) -> Result<RawHolder, ProviderError> {
    let wallet = holder_json
        .get("wallet")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ProviderError::Parse("Missing wallet field".to_string()))?;

    let balance_str = holder_json
        .get("balance")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ProviderError::Parse("Missing balance field".to_string()))?;
    let balance = Decimal::from_str_canonical(balance_str)
        .map_err(|e| ProviderError::Parse(format!("Invalid balance: {}", e)))?;

    Ok(RawHolder {
        wallet: Wallet::new(wallet),
        balance,
    })
}

fn parse_event(event_json: &serde_json::Value, wallet: &Wallet) -> Result<TokenEvent, ProviderError> {
    let time_ms = event_json
        .get("timeMs")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ProviderError::Parse("Missing timeMs field".to_string()))?;

    let kind_str = event_json
        .get("kind")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ProviderError::Parse("Missing kind field".to_string()))?;
    let kind = TxKind::parse(kind_str)
        .ok_or_else(|| ProviderError::Parse(format!("Invalid kind: {}", kind_str)))?;

    let amount_str = event_json
        .get("tokenAmount")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ProviderError::Parse("Missing tokenAmount field".to_string()))?;
    let token_amount = Decimal::from_str_canonical(amount_str)
        .map_err(|e| ProviderError::Parse(format!("Invalid tokenAmount: {}", e)))?;

    // Only the explicit stablecoin-leg valuation is honored; anything else
    // leaves the buy unpriced.
    let usd_value = match event_json.get("usdValue").and_then(|v| v.as_str()) {
        Some(s) => Some(
            Decimal::from_str_canonical(s)
                .map_err(|e| ProviderError::Parse(format!("Invalid usdValue: {}", e)))?,
        ),
        None => None,
    };

    let tx_hash = event_json
        .get("txHash")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    Ok(TokenEvent::new(
        TimeMs::new(time_ms),
        wallet.clone(),
        kind,
        token_amount,
        usd_value,
        tx_hash,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_holder_valid() {
        let holder_json = serde_json::json!({
            "wallet": "addr_1",
            "balance": "250000.5"
        });
        let holder = parse_holder(&holder_json).unwrap();
        assert_eq!(holder.wallet, Wallet::new("addr_1"));
        assert_eq!(
            holder.balance,
            Decimal::from_str_canonical("250000.5").unwrap()
        );
    }

    #[test]
    fn test_parse_holder_missing_balance() {
        let holder_json = serde_json::json!({ "wallet": "addr_1" });
        assert!(parse_holder(&holder_json).is_err());
    }

    #[test]
    fn test_parse_event_buy_with_usd() {
        let event_json = serde_json::json!({
            "timeMs": 1000,
            "kind": "buy",
            "tokenAmount": "1000000",
            "usdValue": "100",
            "txHash": "abc123"
        });
        let event = parse_event(&event_json, &Wallet::new("addr_1")).unwrap();
        assert_eq!(event.kind, TxKind::Buy);
        assert_eq!(event.usd_value, Some(Decimal::from_str_canonical("100").unwrap()));
        assert_eq!(event.event_key(), "tx:abc123:buy");
    }

    #[test]
    fn test_parse_event_unpriced_buy() {
        let event_json = serde_json::json!({
            "timeMs": 1000,
            "kind": "buy",
            "tokenAmount": "1000000"
        });
        let event = parse_event(&event_json, &Wallet::new("addr_1")).unwrap();
        assert_eq!(event.usd_value, None);
    }

    #[test]
    fn test_parse_event_rejects_unknown_kind() {
        let event_json = serde_json::json!({
            "timeMs": 1000,
            "kind": "stake",
            "tokenAmount": "1"
        });
        assert!(parse_event(&event_json, &Wallet::new("addr_1")).is_err());
    }
}
