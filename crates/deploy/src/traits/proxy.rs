//! Proxy lifecycle port.

use std::future::Future;

use alloy_core::primitives::Address;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Addresses produced by a deploy or an upgrade.
///
/// Only the proxy address is ever persisted. The implementation address is used for
/// verification and then dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub proxy_address: Address,
    pub implementation_address: Address,
}

/// Deploys proxies and upgrades their implementation.
///
/// Both operations return once the transactions are confirmed, not merely submitted.
pub trait ProxyManager: Send + Sync {
    /// Deploy the `logic` contract behind a new proxy and initialize it with `init_args`.
    ///
    /// The initializer runs exactly once, as part of the proxy deployment.
    fn deploy_proxy(
        &self,
        deployer: Address,
        logic: &str,
        init_args: &[Address],
    ) -> impl Future<Output = Result<DeploymentResult>> + Send;

    /// Point the existing `proxy` at a freshly deployed `logic` contract.
    ///
    /// Fails if `proxy` is not a recognized proxy or the upgrade reverts (for instance
    /// because `deployer` is not authorized to upgrade it).
    fn upgrade_proxy(
        &self,
        deployer: Address,
        proxy: Address,
        logic: &str,
    ) -> impl Future<Output = Result<DeploymentResult>> + Send;
}
