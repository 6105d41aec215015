//! Collaborator abstractions: blockchain indexer, price oracle, treasury.
//!
//! These are the fixed external interfaces the engine is built against.
//! Implementations must handle pagination, retry/backoff, and rate limiting;
//! the transfer primitive must NOT be retried (it carries no dedupe
//! guarantee).

use crate::domain::{Decimal, TokenEvent, Wallet};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod indexer;
pub mod mock;
pub mod treasury;

pub use indexer::HttpIndexerClient;
pub use mock::{MockIndexer, MockTreasury};
pub use treasury::HttpTreasury;

/// A wallet's current balance as reported by the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawHolder {
    pub wallet: Wallet,
    pub balance: Decimal,
}

/// Receipt for a confirmed treasury transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    /// Chain-side reference (transaction id) for the transfer.
    pub reference: String,
}

/// Blockchain indexing provider: holder listings and per-wallet histories.
#[async_trait]
pub trait IndexerProvider: Send + Sync + fmt::Debug {
    /// List current holders of an asset, largest balances first.
    async fn list_holders(
        &self,
        asset_id: &str,
        limit: u32,
    ) -> Result<Vec<RawHolder>, ProviderError>;

    /// List a wallet's token events from `from_ms` (inclusive) onward,
    /// ordered ascending by time.
    async fn list_wallet_transactions(
        &self,
        wallet: &Wallet,
        asset_id: &str,
        from_ms: i64,
        limit: u32,
    ) -> Result<Vec<TokenEvent>, ProviderError>;
}

/// Spot-price source for assets, keyed by the indexer's asset id.
#[async_trait]
pub trait PriceOracle: Send + Sync + fmt::Debug {
    /// Current USD price, or None if the oracle has no quote.
    async fn get_asset_price(&self, asset_id: &str) -> Result<Option<Decimal>, ProviderError>;
}

/// The pooled treasury: balance reads and outbound transfers.
#[async_trait]
pub trait Treasury: Send + Sync + fmt::Debug {
    /// Current pool balance in native units.
    async fn pool_balance(&self) -> Result<Decimal, ProviderError>;

    /// Send `amount` native units to `destination`.
    ///
    /// Not idempotent: callers must record intent before invoking and must
    /// never retry blindly.
    async fn transfer(
        &self,
        destination: &Wallet,
        amount: Decimal,
    ) -> Result<TransferReceipt, ProviderError>;
}

/// Error type shared by all collaborator clients.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Transfer rejected: {0}")]
    TransferRejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::Network("connection timeout".to_string());
        assert_eq!(err.to_string(), "Network error: connection timeout");

        let err = ProviderError::Http {
            status: 429,
            message: "Too many requests".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP error 429: Too many requests");

        let err = ProviderError::TransferRejected("insufficient funds".to_string());
        assert_eq!(err.to_string(), "Transfer rejected: insufficient funds");
    }
}
