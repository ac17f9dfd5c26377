//! ERC-1967 proxy deployments and UUPS upgrades.
//!
//! A deploy creates the logic contract, then an `ERC1967Proxy` whose constructor runs the
//! initializer through `delegatecall`, so the proxy is initialized in the same transaction
//! that creates it. An upgrade creates the new logic contract and calls
//! `upgradeToAndCall(newImplementation, "")` on the proxy.
//!
//! In both cases the implementation address reported back is read from the proxy's
//! ERC-1967 implementation slot after confirmation.

pub mod abi;

use std::path::PathBuf;

use alloy_core::primitives::{Address, Bytes};
use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{
    artifact::Artifact,
    services::node::{NodeClient, TransactionRequest},
    traits::{DeploymentResult, ProxyManager},
};

/// Default artifact name for the proxy contract.
pub const DEFAULT_PROXY_ARTIFACT: &str = "ERC1967Proxy";

/// Where to find compiled contracts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    /// Root of the compiler output (`artifacts` for Hardhat, `out` for Foundry).
    pub artifacts_dir: PathBuf,
    /// Artifact name or path of the ERC-1967 proxy contract.
    pub proxy: String,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from("artifacts"),
            proxy: DEFAULT_PROXY_ARTIFACT.to_string(),
        }
    }
}

/// [`ProxyManager`] for ERC-1967 proxies with UUPS upgrades.
#[derive(Debug, Clone)]
pub struct Erc1967Manager {
    node: NodeClient,
    artifacts: ArtifactsConfig,
}

impl Erc1967Manager {
    pub fn new(node: NodeClient, artifacts: ArtifactsConfig) -> Self {
        Self { node, artifacts }
    }

    fn artifact(&self, identifier: &str) -> anyhow::Result<Artifact> {
        Artifact::resolve(&self.artifacts.artifacts_dir, identifier)
    }

    /// Send a contract creation transaction and return the new contract's address.
    async fn create(&self, from: Address, code: Bytes, label: &str) -> anyhow::Result<Address> {
        let receipt = self
            .node
            .send_transaction(&TransactionRequest {
                from,
                to: None,
                data: code,
            })
            .await
            .with_context(|| format!("Failed to deploy {} contract", label))?;

        if !receipt.succeeded() {
            anyhow::bail!(
                "{} contract creation reverted (tx {})",
                label,
                receipt.transaction_hash
            );
        }

        let address = receipt.contract_address.with_context(|| {
            format!(
                "Receipt of {} contract creation has no contract address (tx {})",
                label, receipt.transaction_hash
            )
        })?;

        tracing::info!(contract = label, address = %address, "Contract created");
        Ok(address)
    }

    /// Read the implementation currently behind `proxy`.
    pub async fn implementation_of(&self, proxy: Address) -> anyhow::Result<Address> {
        let word = self
            .node
            .storage_at(proxy, abi::IMPLEMENTATION_SLOT)
            .await
            .context("Failed to read ERC-1967 implementation slot")?;
        Ok(abi::address_from_slot(word))
    }
}

impl ProxyManager for Erc1967Manager {
    async fn deploy_proxy(
        &self,
        deployer: Address,
        logic: &str,
        init_args: &[Address],
    ) -> anyhow::Result<DeploymentResult> {
        let logic_artifact = self.artifact(logic)?;
        let proxy_artifact = self.artifact(&self.artifacts.proxy)?;

        tracing::info!(
            logic = %logic_artifact.name,
            proxy = %proxy_artifact.name,
            init_args = ?init_args,
            "Deploying proxy..."
        );

        let logic_address = self
            .create(deployer, logic_artifact.bytecode.clone(), &logic_artifact.name)
            .await?;

        let init = abi::initialize_calldata(init_args);
        let code = abi::proxy_deploy_code(&proxy_artifact.bytecode, logic_address, init);
        let proxy_address = self.create(deployer, code, &proxy_artifact.name).await?;

        let implementation_address = self.implementation_of(proxy_address).await?;
        if implementation_address != logic_address {
            anyhow::bail!(
                "Proxy {} points at {} instead of the deployed logic contract {}",
                proxy_address,
                implementation_address,
                logic_address
            );
        }

        Ok(DeploymentResult {
            proxy_address,
            implementation_address,
        })
    }

    async fn upgrade_proxy(
        &self,
        deployer: Address,
        proxy: Address,
        logic: &str,
    ) -> anyhow::Result<DeploymentResult> {
        let current = self.implementation_of(proxy).await?;
        if current.is_zero() {
            anyhow::bail!("{} is not a recognized ERC-1967 proxy", proxy);
        }

        let logic_artifact = self.artifact(logic)?;

        tracing::info!(
            proxy = %proxy,
            current_implementation = %current,
            logic = %logic_artifact.name,
            "Upgrading proxy..."
        );

        let logic_address = self
            .create(deployer, logic_artifact.bytecode.clone(), &logic_artifact.name)
            .await?;

        let receipt = self
            .node
            .send_transaction(&TransactionRequest {
                from: deployer,
                to: Some(proxy),
                data: abi::upgrade_calldata(logic_address),
            })
            .await
            .context("Failed to send upgrade transaction")?;

        if !receipt.succeeded() {
            anyhow::bail!(
                "Upgrade of {} reverted (tx {}); is {} authorized to upgrade it?",
                proxy,
                receipt.transaction_hash,
                deployer
            );
        }

        let implementation_address = self.implementation_of(proxy).await?;
        if implementation_address != logic_address {
            anyhow::bail!(
                "Proxy {} still points at {} after upgrading to {}",
                proxy,
                implementation_address,
                logic_address
            );
        }

        Ok(DeploymentResult {
            proxy_address: proxy,
            implementation_address,
        })
    }
}
