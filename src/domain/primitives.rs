//! Domain primitives: TimeMs, Wallet, TxKind.

use serde::{Deserialize, Serialize};

/// Time in milliseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(chrono::Utc::now().timestamp_millis())
    }

    /// Get the underlying milliseconds value.
    pub fn as_ms(&self) -> i64 {
        self.0
    }

    /// Milliseconds elapsed since `earlier` (saturating at zero).
    pub fn since(&self, earlier: TimeMs) -> i64 {
        (self.0 - earlier.0).max(0)
    }
}

/// Wallet address (opaque chain-specific string, unique holder key).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Wallet(pub String);

impl Wallet {
    /// Create a Wallet from a string.
    pub fn new(addr: impl Into<String>) -> Self {
        Wallet(addr.into())
    }

    /// Get the address as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of token movement observed for a wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    /// Swap acquiring the tracked token.
    Buy,
    /// Swap disposing of the tracked token.
    Sell,
    /// Inbound wallet-to-wallet transfer.
    TransferIn,
    /// Outbound wallet-to-wallet transfer.
    TransferOut,
}

impl TxKind {
    /// Parse from the stored/wire string form.
    pub fn parse(s: &str) -> Option<TxKind> {
        match s {
            "buy" => Some(TxKind::Buy),
            "sell" => Some(TxKind::Sell),
            "transfer_in" => Some(TxKind::TransferIn),
            "transfer_out" => Some(TxKind::TransferOut),
            _ => None,
        }
    }
}

impl std::fmt::Display for TxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxKind::Buy => write!(f, "buy"),
            TxKind::Sell => write!(f, "sell"),
            TxKind::TransferIn => write!(f, "transfer_in"),
            TxKind::TransferOut => write!(f, "transfer_out"),
        }
    }
}
