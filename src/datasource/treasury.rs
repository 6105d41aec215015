//! HTTP client for the treasury's funds-transfer service.

use super::{ProviderError, Treasury, TransferReceipt};
use crate::domain::{Decimal, Wallet};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

/// Treasury client. Balance reads retry on transient failures; transfers
/// are issued exactly once per call (the primitive has no dedupe guarantee).
#[derive(Debug, Clone)]
pub struct HttpTreasury {
    client: Client,
    base_url: String,
}

impl HttpTreasury {
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(8))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, base_url }
    }
}

#[async_trait]
impl Treasury for HttpTreasury {
    async fn pool_balance(&self) -> Result<Decimal, ProviderError> {
        let url = format!("{}/balance", self.base_url);
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(15)),
            ..Default::default()
        };

        let response = retry(backoff, || async {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(ProviderError::Network(e.to_string())))?;

            let status = response.status();
            if status.is_server_error() || status == 429 {
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
        .await?;

        let balance_str = response
            .get("balance")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::Parse("Missing balance field".to_string()))?;
        Decimal::from_str_canonical(balance_str)
            .map_err(|e| ProviderError::Parse(format!("Invalid balance: {}", e)))
    }

    async fn transfer(
        &self,
        destination: &Wallet,
        amount: Decimal,
    ) -> Result<TransferReceipt, ProviderError> {
        debug!(destination = %destination, amount = %amount, "Submitting transfer");

        let url = format!("{}/transfer", self.base_url);
        let payload = serde_json::json!({
            "destination": destination.as_str(),
            "amount": amount.to_canonical_string()
        });

        // No retry here: a timed-out transfer may still have landed.
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Http {
                status: status.as_u16(),
                message: "Transfer request failed".to_string(),
            });
        }

        let body = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let success = body
            .get("success")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if !success {
            let error = body
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("unspecified")
                .to_string();
            return Err(ProviderError::TransferRejected(error));
        }

        let reference = body
            .get("reference")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::Parse("Missing reference field".to_string()))?
            .to_string();

        info!(destination = %destination, amount = %amount, reference, "Transfer confirmed");
        Ok(TransferReceipt { reference })
    }
}
