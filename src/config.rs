use crate::domain::{Decimal, Wallet};
use std::collections::HashMap;
use thiserror::Error;

/// Runtime configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub indexer_api_url: String,
    pub treasury_api_url: String,
    /// Identifier of the tracked token at the indexer.
    pub asset_id: String,
    /// Identifier of the chain's native asset, used to price the pool in USD.
    pub native_asset_id: String,
    /// Destination of the operating-fee share (payout rank 0).
    pub fee_wallet: Wallet,
    /// Minimum token balance for payout candidacy.
    pub min_holding: Decimal,
    /// Minimum hours since first buy for payout candidacy.
    pub min_hold_hours: i64,
    /// Minimum loss as a percentage of the pool's USD value.
    pub min_loss_pct: Decimal,
    /// Length of one payout cycle, in seconds.
    pub cycle_interval_secs: i64,
    /// Fraction of the treasury balance distributed to winners each cycle.
    pub pool_fraction: Decimal,
    /// Fraction of the treasury balance sent to the fee wallet each cycle.
    pub fee_fraction: Decimal,
    /// Cycles with a distributable pool below this are skipped.
    pub min_pool_native: Decimal,
    /// Transfers below this amount are never attempted.
    pub min_transfer_native: Decimal,
    /// Attempts allowed per interval before the interval is abandoned.
    pub max_cycle_attempts: i64,
    /// Ordered winner fractions, first place first. Must sum to 1.0.
    pub payout_splits: Vec<Decimal>,
    /// Holder cache refresh cadence, in seconds.
    pub holder_refresh_secs: u64,
    /// Page size for indexer holder listings.
    pub holder_page_limit: u32,
    /// Page size for indexer per-wallet transaction listings.
    pub tx_page_limit: u32,
    /// Re-fetch window behind the ingestion watermark, in milliseconds.
    pub ingest_lookback_ms: i64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parse_with_default(&env_map, "PORT", "8080", "must be a valid u16", |s| {
            s.parse::<u16>().ok()
        })?;

        let database_path = required(&env_map, "DATABASE_PATH")?;
        let indexer_api_url = required(&env_map, "INDEXER_API_URL")?;
        let treasury_api_url = required(&env_map, "TREASURY_API_URL")?;
        let asset_id = required(&env_map, "ASSET_ID")?;
        let native_asset_id = required(&env_map, "NATIVE_ASSET_ID")?;
        let fee_wallet = Wallet::new(required(&env_map, "FEE_WALLET")?);

        let min_holding = parse_decimal(&env_map, "MIN_HOLDING", "10000")?;
        let min_hold_hours =
            parse_with_default(&env_map, "MIN_HOLD_HOURS", "24", "must be a valid i64", |s| {
                s.parse::<i64>().ok().filter(|v| *v >= 0)
            })?;
        let min_loss_pct = parse_decimal(&env_map, "MIN_LOSS_PCT", "0.1")?;

        let cycle_interval_secs = parse_with_default(
            &env_map,
            "CYCLE_INTERVAL_SECS",
            "86400",
            "must be a positive i64",
            |s| s.parse::<i64>().ok().filter(|v| *v > 0),
        )?;

        let pool_fraction = parse_decimal(&env_map, "POOL_FRACTION", "0.90")?;
        let fee_fraction = parse_decimal(&env_map, "FEE_FRACTION", "0.05")?;
        if pool_fraction + fee_fraction > Decimal::one() {
            return Err(ConfigError::InvalidValue(
                "POOL_FRACTION".to_string(),
                "POOL_FRACTION + FEE_FRACTION must not exceed 1.0".to_string(),
            ));
        }

        let min_pool_native = parse_decimal(&env_map, "MIN_POOL_NATIVE", "10")?;
        let min_transfer_native = parse_decimal(&env_map, "MIN_TRANSFER_NATIVE", "0.01")?;

        let max_cycle_attempts = parse_with_default(
            &env_map,
            "MAX_CYCLE_ATTEMPTS",
            "3",
            "must be a positive i64",
            |s| s.parse::<i64>().ok().filter(|v| *v > 0),
        )?;

        let payout_splits = parse_splits(
            env_map
                .get("PAYOUT_SPLITS")
                .map(|s| s.as_str())
                .unwrap_or("0.80,0.15,0.05"),
        )?;

        let holder_refresh_secs = parse_with_default(
            &env_map,
            "HOLDER_REFRESH_SECS",
            "300",
            "must be a positive u64",
            |s| s.parse::<u64>().ok().filter(|v| *v > 0),
        )?;
        let holder_page_limit = parse_with_default(
            &env_map,
            "HOLDER_PAGE_LIMIT",
            "500",
            "must be a positive u32",
            |s| s.parse::<u32>().ok().filter(|v| *v > 0),
        )?;
        let tx_page_limit = parse_with_default(
            &env_map,
            "TX_PAGE_LIMIT",
            "200",
            "must be a positive u32",
            |s| s.parse::<u32>().ok().filter(|v| *v > 0),
        )?;
        let ingest_lookback_ms = parse_with_default(
            &env_map,
            "INGEST_LOOKBACK_MS",
            "60000",
            "must be a non-negative i64",
            |s| s.parse::<i64>().ok().filter(|v| *v >= 0),
        )?;

        Ok(Config {
            port,
            database_path,
            indexer_api_url,
            treasury_api_url,
            asset_id,
            native_asset_id,
            fee_wallet,
            min_holding,
            min_hold_hours,
            min_loss_pct,
            cycle_interval_secs,
            pool_fraction,
            fee_fraction,
            min_pool_native,
            min_transfer_native,
            max_cycle_attempts,
            payout_splits,
            holder_refresh_secs,
            holder_page_limit,
            tx_page_limit,
            ingest_lookback_ms,
        })
    }

    /// Cycle interval in milliseconds.
    pub fn interval_ms(&self) -> i64 {
        self.cycle_interval_secs * 1000
    }

    /// Age past which a held lock is considered abandoned (2x the interval).
    pub fn stale_lock_ms(&self) -> i64 {
        self.interval_ms() * 2
    }

    /// Classifier thresholds derived from this config.
    pub fn eligibility_params(&self) -> crate::engine::EligibilityParams {
        crate::engine::EligibilityParams {
            min_holding: self.min_holding,
            min_hold_hours: self.min_hold_hours,
            min_loss_pct: self.min_loss_pct,
        }
    }
}

fn required(env_map: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    env_map
        .get(key)
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

fn parse_with_default<T>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
    expect: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, ConfigError> {
    let raw = env_map.get(key).map(|s| s.as_str()).unwrap_or(default);
    parse(raw).ok_or_else(|| ConfigError::InvalidValue(key.to_string(), expect.to_string()))
}

fn parse_decimal(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<Decimal, ConfigError> {
    parse_with_default(env_map, key, default, "must be a valid decimal", |s| {
        Decimal::from_str_canonical(s.trim()).ok()
    })
}

fn parse_splits(raw: &str) -> Result<Vec<Decimal>, ConfigError> {
    let splits: Vec<Decimal> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(Decimal::from_str_canonical)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| {
            ConfigError::InvalidValue(
                "PAYOUT_SPLITS".to_string(),
                "must be a comma-separated list of decimals".to_string(),
            )
        })?;

    let sum: Decimal = splits.iter().copied().sum();
    if splits.is_empty() || sum != Decimal::one() {
        return Err(ConfigError::InvalidValue(
            "PAYOUT_SPLITS".to_string(),
            format!("fractions must sum to 1.0, got {}", sum),
        ));
    }

    Ok(splits)
}
