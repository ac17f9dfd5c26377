//! Source verification through an Etherscan-compatible explorer API.
//!
//! The standard-JSON compiler input is submitted with `verifysourcecode`, then
//! `checkverifystatus` is polled until the explorer leaves the "Pending in queue" state.

pub mod api;

use std::{path::PathBuf, time::Duration};

use alloy_core::primitives::{Address, Bytes};
use anyhow::Context;
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, Serialize};

use crate::traits::Verifier;

use api::{ApiResponse, CheckStatus};

/// Default interval between `checkverifystatus` polls.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
/// Default number of `checkverifystatus` polls before giving up.
pub const DEFAULT_MAX_POLLS: usize = 12;

/// Timeout for a single explorer request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Explorer verification settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Explorer API endpoint, e.g. `https://api.etherscan.io/v2/api`.
    pub api_url: String,
    /// Explorer API key.
    pub api_key: String,
    /// Chain ID sent as `chainid`, required by multichain endpoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    /// Path to the standard-JSON compiler input of the implementation.
    pub standard_json: PathBuf,
    /// Fully qualified contract name, e.g. `contracts/Meeting.sol:Meeting`.
    pub contract_path: String,
    /// Full compiler version, e.g. `v0.8.17+commit.8df45f5f`.
    pub compiler_version: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_polls")]
    pub max_polls: usize,
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_max_polls() -> usize {
    DEFAULT_MAX_POLLS
}

/// Returned by a status poll while the explorer is still processing.
#[derive(Debug, thiserror::Error)]
#[error("verification is still pending")]
struct StillPending;

/// [`Verifier`] that talks to an Etherscan-compatible explorer.
#[derive(Debug, Clone)]
pub struct EtherscanVerifier {
    client: reqwest::Client,
    config: VerificationConfig,
}

impl EtherscanVerifier {
    pub fn new(config: VerificationConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }

    fn chain_query(&self) -> Vec<(&'static str, String)> {
        self.config
            .chain_id
            .map(|id| vec![("chainid", id.to_string())])
            .unwrap_or_default()
    }

    async fn submit(&self, implementation: Address, constructor_args: &Bytes) -> anyhow::Result<String> {
        let source = std::fs::read_to_string(&self.config.standard_json).with_context(|| {
            format!(
                "Failed to read standard JSON input {}",
                self.config.standard_json.display()
            )
        })?;

        let address = implementation.to_string();
        let args = hex::encode(constructor_args);
        let form = [
            ("apikey", self.config.api_key.as_str()),
            ("module", "contract"),
            ("action", "verifysourcecode"),
            ("contractaddress", address.as_str()),
            ("sourceCode", source.as_str()),
            ("codeformat", "solidity-standard-json-input"),
            ("contractname", self.config.contract_path.as_str()),
            ("compilerversion", self.config.compiler_version.as_str()),
            // Etherscan's spelling.
            ("constructorArguements", args.as_str()),
        ];

        let response: ApiResponse = self
            .client
            .post(self.config.api_url.as_str())
            .query(&self.chain_query())
            .form(&form)
            .send()
            .await
            .context("Failed to send verification request")?
            .error_for_status()
            .context("Explorer returned an HTTP error")?
            .json()
            .await
            .context("Failed to parse verification response")?;

        api::submission_guid(&response)
    }

    async fn check_status(&self, guid: &str) -> anyhow::Result<()> {
        let mut query = self.chain_query();
        query.extend([
            ("apikey", self.config.api_key.clone()),
            ("module", "contract".to_string()),
            ("action", "checkverifystatus".to_string()),
            ("guid", guid.to_string()),
        ]);

        let response: ApiResponse = self
            .client
            .get(self.config.api_url.as_str())
            .query(&query)
            .send()
            .await
            .context("Failed to query verification status")?
            .error_for_status()
            .context("Explorer returned an HTTP error")?
            .json()
            .await
            .context("Failed to parse verification status")?;

        match CheckStatus::from(&response) {
            CheckStatus::Verified => Ok(()),
            CheckStatus::Pending => Err(StillPending.into()),
            CheckStatus::Failed(reason) => anyhow::bail!("Explorer failed verification: {}", reason),
        }
    }
}

impl Verifier for EtherscanVerifier {
    async fn verify(&self, implementation: Address, constructor_args: &Bytes) -> anyhow::Result<()> {
        let guid = self.submit(implementation, constructor_args).await?;

        tracing::info!(
            implementation = %implementation,
            guid = %guid,
            "Verification submitted, waiting for explorer..."
        );

        let backoff = ConstantBuilder::default()
            .with_delay(Duration::from_secs(self.config.poll_interval_secs))
            .with_max_times(self.config.max_polls);

        (|| self.check_status(&guid))
            .retry(backoff)
            .when(|e| e.downcast_ref::<StillPending>().is_some())
            .notify(|_, after| {
                tracing::debug!(guid = %guid, retry_in = ?after, "Verification pending");
            })
            .await
            .with_context(|| format!("Verification of {} did not complete", implementation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config: VerificationConfig = toml::from_str(
            r#"
            api_url = "https://api.etherscan.io/v2/api"
            api_key = "KEY"
            standard_json = "build/Meeting.json"
            contract_path = "contracts/Meeting.sol:Meeting"
            compiler_version = "v0.8.17+commit.8df45f5f"
            "#,
        )
        .unwrap();

        assert_eq!(config.chain_id, None);
        assert_eq!(config.poll_interval_secs, DEFAULT_POLL_INTERVAL_SECS);
        assert_eq!(config.max_polls, DEFAULT_MAX_POLLS);
    }

    #[test]
    fn test_chain_query() {
        let mut config: VerificationConfig = toml::from_str(
            r#"
            api_url = "https://api.etherscan.io/v2/api"
            api_key = "KEY"
            standard_json = "build/Meeting.json"
            contract_path = "contracts/Meeting.sol:Meeting"
            compiler_version = "v0.8.17+commit.8df45f5f"
            "#,
        )
        .unwrap();

        let verifier = EtherscanVerifier::new(config.clone()).unwrap();
        assert!(verifier.chain_query().is_empty());

        config.chain_id = Some(1);
        let verifier = EtherscanVerifier::new(config).unwrap();
        assert_eq!(verifier.chain_query(), vec![("chainid", "1".to_string())]);
    }

    #[tokio::test]
    async fn test_missing_standard_json_is_rejected() {
        let config = VerificationConfig {
            api_url: "http://127.0.0.1:9/api".to_string(),
            api_key: "KEY".to_string(),
            chain_id: None,
            standard_json: PathBuf::from("/nonexistent/standard.json"),
            contract_path: "contracts/Meeting.sol:Meeting".to_string(),
            compiler_version: "v0.8.17+commit.8df45f5f".to_string(),
            poll_interval_secs: 0,
            max_polls: 1,
        };

        let verifier = EtherscanVerifier::new(config).unwrap();
        let err = verifier
            .verify(Address::with_last_byte(2), &Bytes::new())
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("standard JSON input"));
    }
}
