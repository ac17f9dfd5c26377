//! Shared RPC utilities for interacting with Ethereum JSON-RPC endpoints.

use std::time::Duration;

use alloy_core::primitives::{Address, B256};
use anyhow::Context;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;

/// Default timeout for a single RPC request.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default interval between receipt polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Make a JSON-RPC call and deserialize the result. A JSON-RPC error response is an error.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", method))?;

    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    if let Some(error) = result.get("error") {
        anyhow::bail!(
            "RPC error from {}: {}",
            method,
            error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
        );
    }

    let result_value = result
        .get("result")
        .context("No result in response")?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// The fields of a transaction receipt this crate looks at.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_hash: B256,
    /// `0x1` on success, `0x0` on revert.
    pub status: Option<String>,
    pub contract_address: Option<Address>,
    pub block_number: Option<String>,
}

impl TxReceipt {
    pub fn succeeded(&self) -> bool {
        matches!(self.status.as_deref(), Some("0x1") | Some("0x01"))
    }
}

/// Poll `eth_getTransactionReceipt` until the transaction is included.
///
/// Polls without an upper bound. A transaction that never confirms keeps the workflow
/// pending until the operator interrupts it. A failed poll is logged and retried, since
/// the transaction is already submitted.
pub async fn wait_for_receipt(
    client: &reqwest::Client,
    url: &str,
    tx_hash: B256,
) -> Result<TxReceipt, anyhow::Error> {
    poll_receipt(client, url, tx_hash, DEFAULT_POLL_INTERVAL).await
}

async fn poll_receipt(
    client: &reqwest::Client,
    url: &str,
    tx_hash: B256,
    interval: Duration,
) -> Result<TxReceipt, anyhow::Error> {
    let mut polls: u64 = 0;

    loop {
        let receipt: Result<Option<TxReceipt>, anyhow::Error> = json_rpc_call(
            client,
            url,
            "eth_getTransactionReceipt",
            vec![serde_json::json!(tx_hash)],
        )
        .await;

        polls += 1;
        match receipt {
            Ok(Some(receipt)) => {
                tracing::debug!(
                    tx_hash = %tx_hash,
                    block = ?receipt.block_number,
                    status = ?receipt.status,
                    "Transaction confirmed"
                );
                return Ok(receipt);
            }
            Ok(None) if polls % 30 == 0 => {
                tracing::info!(tx_hash = %tx_hash, polls, "Still waiting for transaction confirmation...");
            }
            Ok(None) => {
                tracing::trace!(tx_hash = %tx_hash, "Transaction not yet included, retrying...");
            }
            Err(e) => {
                tracing::warn!(tx_hash = %tx_hash, error = %format!("{e:#}"), "Receipt poll failed, retrying...");
            }
        }

        tokio::time::sleep(interval).await;
    }
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_quantity(value: &str) -> Result<u64, anyhow::Error> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16)
        .with_context(|| format!("Invalid hex quantity: {}", value))
}
