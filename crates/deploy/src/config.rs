//! Project configuration, read from `Proxup.toml`.
//!
//! Values are layered: built-in defaults, then the config file, then `PROXUP_*` environment
//! variables (`__` separates nested keys, e.g. `PROXUP_VERIFICATION__API_KEY`).

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use alloy_core::primitives::{Address, Bytes};
use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{
    orchestrator::{DEFAULT_SETTLE_DELAY, RunConfig},
    registry::{ContractRegistry, DEFAULT_REGISTRY_PATH},
    services::{ArtifactsConfig, VerificationConfig, erc1967::DEFAULT_PROXY_ARTIFACT},
};

/// Name of the config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILENAME: &str = "Proxup.toml";

/// Prefix of the environment variables merged over the config file.
pub const ENV_PREFIX: &str = "PROXUP_";

pub const DEFAULT_NETWORK: &str = "localhost";
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";

/// The contract managed by this project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractConfig {
    /// Registry key, e.g. `meeting`.
    pub name: String,
    /// Logic contract artifact name or path, e.g. `Meeting`.
    pub logic: String,
    /// ERC-1967 proxy artifact name or path.
    pub proxy: String,
    /// Root of the compiler output.
    pub artifacts_dir: PathBuf,
    /// Arguments of `initialize(address[])`, run once when the proxy is deployed.
    #[serde(default)]
    pub init_args: Vec<Address>,
    /// ABI-encoded constructor arguments of the implementation.
    #[serde(default, skip_serializing_if = "is_empty")]
    pub constructor_args: Bytes,
}

fn is_empty(bytes: &Bytes) -> bool {
    bytes.is_empty()
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            name: "meeting".to_string(),
            logic: "Meeting".to_string(),
            proxy: DEFAULT_PROXY_ARTIFACT.to_string(),
            artifacts_dir: PathBuf::from("artifacts"),
            init_args: Vec::new(),
            constructor_args: Bytes::new(),
        }
    }
}

impl ContractConfig {
    pub fn artifacts(&self) -> ArtifactsConfig {
        ArtifactsConfig {
            artifacts_dir: self.artifacts_dir.clone(),
            proxy: self.proxy.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxupConfig {
    /// Network name the registry records are kept under.
    pub network: String,
    /// JSON-RPC endpoint of a node that manages the signer account.
    pub rpc_url: String,
    /// Path of the contract registry file.
    pub registry: PathBuf,
    /// Account to deploy from. Defaults to the node's first account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<Address>,
    /// Wait between confirmation and verification, in seconds.
    pub settle_delay_secs: u64,
    pub contract: ContractConfig,
    /// Block explorer settings. Verification is skipped when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationConfig>,
}

impl Default for ProxupConfig {
    fn default() -> Self {
        Self {
            network: DEFAULT_NETWORK.to_string(),
            rpc_url: DEFAULT_RPC_URL.to_string(),
            registry: PathBuf::from(DEFAULT_REGISTRY_PATH),
            signer: None,
            settle_delay_secs: DEFAULT_SETTLE_DELAY.as_secs(),
            contract: ContractConfig::default(),
            verification: None,
        }
    }
}

impl ProxupConfig {
    /// Layer defaults, the TOML file at `path` (if present) and the environment.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load the configuration. A missing file leaves the defaults in place.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
        }

        let config: Self = Self::figment(path)
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

        tracing::debug!(path = %path.display(), network = %config.network, "Configuration loaded");
        Ok(config)
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    pub fn registry(&self) -> ContractRegistry {
        ContractRegistry::new(&self.registry)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    /// Parameters of a deploy or upgrade run of the configured contract.
    pub fn run_config(&self) -> RunConfig {
        RunConfig::new(&self.network, &self.contract.name, &self.contract.logic)
            .init_args(self.contract.init_args.iter().copied())
            .constructor_args(self.contract.constructor_args.clone())
            .settle_delay(self.settle_delay())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::address;
    use tempdir::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new("proxup-test").unwrap();
        let config = ProxupConfig::figment(&dir.path().join("Proxup.toml"))
            .extract::<ProxupConfig>()
            .unwrap();

        assert_eq!(config.rpc_url, DEFAULT_RPC_URL);
        assert_eq!(config.settle_delay_secs, 10);
        assert!(config.verification.is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = TempDir::new("proxup-test").unwrap();
        let path = dir.path().join("Proxup.toml");
        std::fs::write(
            &path,
            r#"
network = "mainnet"
rpc_url = "https://eth.example.org"
signer = "0x283DC6Ec6DFa11c87947bF6B26e66b6522Bf15Af"

[contract]
logic = "MeetingV2"
init_args = ["0x283DC6Ec6DFa11c87947bF6B26e66b6522Bf15Af"]

[verification]
api_url = "https://api.etherscan.io/v2/api"
api_key = "KEY"
chain_id = 1
standard_json = "build/Meeting.input.json"
contract_path = "contracts/Meeting.sol:Meeting"
compiler_version = "v0.8.17+commit.8df45f5f"
"#,
        )
        .unwrap();

        let config = ProxupConfig::figment(&path).extract::<ProxupConfig>().unwrap();
        let admin = address!("0x283DC6Ec6DFa11c87947bF6B26e66b6522Bf15Af");

        assert_eq!(config.network, "mainnet");
        assert_eq!(config.signer, Some(admin));
        // Keys absent from the file keep their defaults.
        assert_eq!(config.contract.name, "meeting");
        assert_eq!(config.contract.proxy, DEFAULT_PROXY_ARTIFACT);
        assert_eq!(config.contract.init_args, vec![admin]);

        let verification = config.verification.unwrap();
        assert_eq!(verification.chain_id, Some(1));
        assert_eq!(verification.poll_interval_secs, 5);
    }

    #[test]
    fn test_saved_config_loads_back() {
        let dir = TempDir::new("proxup-test").unwrap();
        let path = dir.path().join("Proxup.toml");

        let mut config = ProxupConfig::default();
        config.network = "sepolia".to_string();
        config.contract.init_args = vec![Address::with_last_byte(7)];
        config.save_to_file(&path).unwrap();

        let loaded = ProxupConfig::figment(&path).extract::<ProxupConfig>().unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_constructor_args_written_only_when_set() {
        let dir = TempDir::new("proxup-test").unwrap();
        let path = dir.path().join("Proxup.toml");

        let mut config = ProxupConfig::default();
        config.save_to_file(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("constructor_args"));

        config.contract.constructor_args = Bytes::from_static(&[0xca, 0xfe]);
        config.save_to_file(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("constructor_args = \"0xcafe\""));

        let loaded = ProxupConfig::figment(&path).extract::<ProxupConfig>().unwrap();
        assert_eq!(loaded.contract.constructor_args, config.contract.constructor_args);
    }

    #[test]
    fn test_run_config() {
        let mut config = ProxupConfig::default();
        config.network = "mainnet".to_string();
        config.settle_delay_secs = 3;

        let run = config.run_config();
        assert_eq!(run.network, "mainnet");
        assert_eq!(run.contract_name, "meeting");
        assert_eq!(run.logic, "Meeting");
        assert_eq!(run.settle_delay, Duration::from_secs(3));
    }
}
