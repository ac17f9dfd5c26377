//! JSON-RPC chain client backed by a node that manages the signing accounts.
//!
//! Transactions are submitted with `eth_sendTransaction`, so the signer must be one of
//! the node's unlocked accounts (Anvil, Hardhat node, or a node fronted by a signing proxy).

use alloy_core::primitives::{Address, B256, Bytes, U256};
use anyhow::Context;
use serde::Serialize;
use url::Url;

use crate::{
    rpc::{self, TxReceipt},
    traits::ChainClient,
};

/// A transaction to send from a node-managed account.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionRequest {
    pub from: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    pub data: Bytes,
}

/// Chain client speaking JSON-RPC to a single node.
#[derive(Debug, Clone)]
pub struct NodeClient {
    client: reqwest::Client,
    url: Url,
    signer: Option<Address>,
}

impl NodeClient {
    /// Create a client for `rpc_url`.
    ///
    /// `signer` pins the sending account. Without it the node's first account is used.
    pub fn new(rpc_url: &str, signer: Option<Address>) -> anyhow::Result<Self> {
        let url = Url::parse(rpc_url).with_context(|| format!("Invalid RPC URL: {}", rpc_url))?;

        Ok(Self {
            client: rpc::create_client()?,
            url,
            signer,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> anyhow::Result<T> {
        rpc::json_rpc_call(&self.client, self.url.as_str(), method, params).await
    }

    /// Send a transaction and wait until it is included.
    ///
    /// The receipt is returned whether or not the transaction reverted.
    pub async fn send_transaction(&self, tx: &TransactionRequest) -> anyhow::Result<TxReceipt> {
        let tx_hash: B256 = self
            .call("eth_sendTransaction", vec![serde_json::json!(tx)])
            .await
            .context("Failed to submit transaction")?;

        tracing::info!(tx_hash = %tx_hash, from = %tx.from, to = ?tx.to, "Transaction submitted, waiting for confirmation...");

        rpc::wait_for_receipt(&self.client, self.url.as_str(), tx_hash).await
    }

    /// Read a storage slot of `address` at the latest block.
    pub async fn storage_at(&self, address: Address, slot: B256) -> anyhow::Result<B256> {
        self.call(
            "eth_getStorageAt",
            vec![
                serde_json::json!(address),
                serde_json::json!(slot),
                serde_json::json!("latest"),
            ],
        )
        .await
        .with_context(|| format!("Failed to read storage of {}", address))
    }

    async fn accounts(&self) -> anyhow::Result<Vec<Address>> {
        self.call("eth_accounts", vec![])
            .await
            .context("Failed to list node accounts")
    }
}

impl ChainClient for NodeClient {
    async fn signer(&self) -> anyhow::Result<Option<Address>> {
        let accounts = self.accounts().await?;

        match self.signer {
            Some(signer) if accounts.contains(&signer) => Ok(Some(signer)),
            Some(signer) => anyhow::bail!(
                "Configured signer {} is not managed by the node at {}",
                signer,
                self.url
            ),
            None => Ok(accounts.first().copied()),
        }
    }

    async fn balance(&self, account: Address) -> anyhow::Result<U256> {
        self.call(
            "eth_getBalance",
            vec![serde_json::json!(account), serde_json::json!("latest")],
        )
        .await
        .with_context(|| format!("Failed to get balance of {}", account))
    }

    async fn chain_id(&self) -> anyhow::Result<u64> {
        let chain_id: String = self
            .call("eth_chainId", vec![])
            .await
            .context("Failed to get chain ID")?;
        rpc::parse_quantity(&chain_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_url() {
        assert!(NodeClient::new("not a url", None).is_err());
        assert!(NodeClient::new("http://127.0.0.1:8545", None).is_ok());
    }

    #[test]
    fn test_create_request_omits_to() {
        let tx = TransactionRequest {
            from: Address::with_last_byte(1),
            to: None,
            data: Bytes::from_static(&[0x60, 0x80]),
        };

        let json = serde_json::to_value(&tx).unwrap();
        assert!(json.get("to").is_none());
        assert_eq!(json["data"], "0x6080");
    }
}
