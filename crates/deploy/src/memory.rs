//! In-memory implementations of the capability ports.
//!
//! They are deterministic and record every call, so the orchestrator can be exercised
//! without a node or an explorer. Clones share state: keep a clone to inspect calls after
//! handing the original to an [`Orchestrator`](crate::Orchestrator).

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use alloy_core::primitives::{Address, Bytes, U256};
use anyhow::Result;

use crate::traits::{ChainClient, DeploymentResult, ProxyManager, Verifier};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Chain client with a fixed signer, balance and chain ID.
#[derive(Debug, Clone)]
pub struct MemoryChain {
    signer: Option<Address>,
    balance: U256,
    chain_id: u64,
}

impl MemoryChain {
    pub fn new(signer: Address) -> Self {
        Self {
            signer: Some(signer),
            balance: U256::from(10u128.pow(18)),
            chain_id: 31337,
        }
    }

    /// A chain with no account to sign from.
    pub fn without_signer() -> Self {
        Self {
            signer: None,
            balance: U256::ZERO,
            chain_id: 31337,
        }
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    pub fn with_balance(mut self, balance: U256) -> Self {
        self.balance = balance;
        self
    }
}

impl ChainClient for MemoryChain {
    async fn signer(&self) -> Result<Option<Address>> {
        Ok(self.signer)
    }

    async fn balance(&self, _account: Address) -> Result<U256> {
        Ok(self.balance)
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(self.chain_id)
    }
}

/// A call received by [`MemoryProxyManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyCall {
    Deploy {
        deployer: Address,
        logic: String,
        init_args: Vec<Address>,
    },
    Upgrade {
        deployer: Address,
        proxy: Address,
        logic: String,
    },
}

#[derive(Debug, Default)]
struct ProxyState {
    /// proxy -> implementation
    implementations: BTreeMap<Address, Address>,
    queued: VecDeque<Address>,
    counter: u64,
    calls: Vec<ProxyCall>,
    deploy_error: Option<String>,
    upgrade_error: Option<String>,
}

impl ProxyState {
    fn fresh_address(&mut self) -> Address {
        if let Some(address) = self.queued.pop_front() {
            return address;
        }

        self.counter += 1;
        let mut bytes = [0u8; 20];
        bytes[0] = 0xc0;
        bytes[12..].copy_from_slice(&self.counter.to_be_bytes());
        Address::from(bytes)
    }
}

/// Proxy manager that keeps proxies in a map.
///
/// New contracts get the queued addresses first (see [`MemoryProxyManager::with_addresses`]),
/// then sequential addresses.
#[derive(Debug, Clone, Default)]
pub struct MemoryProxyManager {
    state: Arc<Mutex<ProxyState>>,
}

impl MemoryProxyManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out `addresses`, in order, to the next contracts created.
    pub fn with_addresses(self, addresses: impl IntoIterator<Item = Address>) -> Self {
        lock(&self.state).queued.extend(addresses);
        self
    }

    /// Register an already deployed proxy.
    pub fn with_proxy(self, proxy: Address, implementation: Address) -> Self {
        lock(&self.state).implementations.insert(proxy, implementation);
        self
    }

    /// Make every deploy fail with `reason`, as an on-chain revert would.
    pub fn failing_deploys(self, reason: impl Into<String>) -> Self {
        lock(&self.state).deploy_error = Some(reason.into());
        self
    }

    /// Make every upgrade fail with `reason`, as a failed authorization check would.
    pub fn failing_upgrades(self, reason: impl Into<String>) -> Self {
        lock(&self.state).upgrade_error = Some(reason.into());
        self
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<ProxyCall> {
        lock(&self.state).calls.clone()
    }

    pub fn implementation_of(&self, proxy: Address) -> Option<Address> {
        lock(&self.state).implementations.get(&proxy).copied()
    }
}

impl ProxyManager for MemoryProxyManager {
    async fn deploy_proxy(
        &self,
        deployer: Address,
        logic: &str,
        init_args: &[Address],
    ) -> Result<DeploymentResult> {
        let mut state = lock(&self.state);
        state.calls.push(ProxyCall::Deploy {
            deployer,
            logic: logic.to_string(),
            init_args: init_args.to_vec(),
        });

        if let Some(reason) = &state.deploy_error {
            anyhow::bail!("{}", reason);
        }

        let proxy_address = state.fresh_address();
        let implementation_address = state.fresh_address();
        state
            .implementations
            .insert(proxy_address, implementation_address);

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
    ) -> Result<DeploymentResult> {
        let mut state = lock(&self.state);
        state.calls.push(ProxyCall::Upgrade {
            deployer,
            proxy,
            logic: logic.to_string(),
        });

        if let Some(reason) = &state.upgrade_error {
            anyhow::bail!("{}", reason);
        }

        if !state.implementations.contains_key(&proxy) {
            anyhow::bail!("{} is not a recognized proxy", proxy);
        }

        let implementation_address = state.fresh_address();
        state.implementations.insert(proxy, implementation_address);

        Ok(DeploymentResult {
            proxy_address: proxy,
            implementation_address,
        })
    }
}

/// A verification request received by [`MemoryVerifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationCall {
    pub implementation: Address,
    pub constructor_args: Bytes,
    /// When the request arrived, on tokio's clock.
    pub at: tokio::time::Instant,
}

#[derive(Debug, Default)]
struct VerifierState {
    calls: Vec<VerificationCall>,
    rejection: Option<String>,
}

/// Verifier that accepts (or rejects) every submission.
#[derive(Debug, Clone, Default)]
pub struct MemoryVerifier {
    state: Arc<Mutex<VerifierState>>,
}

impl MemoryVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every submission with `reason`.
    pub fn rejecting(self, reason: impl Into<String>) -> Self {
        lock(&self.state).rejection = Some(reason.into());
        self
    }

    pub fn calls(&self) -> Vec<VerificationCall> {
        lock(&self.state).calls.clone()
    }
}

impl Verifier for MemoryVerifier {
    async fn verify(&self, implementation: Address, constructor_args: &Bytes) -> Result<()> {
        let mut state = lock(&self.state);
        state.calls.push(VerificationCall {
            implementation,
            constructor_args: constructor_args.clone(),
            at: tokio::time::Instant::now(),
        });

        match &state.rejection {
            Some(reason) => anyhow::bail!("{}", reason),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_proxy_manager_tracks_implementations() {
        let deployer = Address::with_last_byte(1);
        let proxies = MemoryProxyManager::new();

        let deployed = proxies
            .deploy_proxy(deployer, "Meeting", &[deployer])
            .await
            .unwrap();
        assert_ne!(deployed.proxy_address, deployed.implementation_address);
        assert_eq!(
            proxies.implementation_of(deployed.proxy_address),
            Some(deployed.implementation_address)
        );

        let upgraded = proxies
            .upgrade_proxy(deployer, deployed.proxy_address, "MeetingV2")
            .await
            .unwrap();
        assert_eq!(upgraded.proxy_address, deployed.proxy_address);
        assert_ne!(upgraded.implementation_address, deployed.implementation_address);
        assert_eq!(proxies.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_upgrade_unknown_proxy_fails() {
        let proxies = MemoryProxyManager::new();
        let result = proxies
            .upgrade_proxy(Address::with_last_byte(1), Address::with_last_byte(9), "Meeting")
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_queued_addresses_come_first() {
        let proxy = Address::repeat_byte(0x11);
        let implementation = Address::repeat_byte(0x22);
        let proxies = MemoryProxyManager::new().with_addresses([proxy, implementation]);

        let deployed = proxies
            .deploy_proxy(Address::with_last_byte(1), "Meeting", &[])
            .await
            .unwrap();
        assert_eq!(deployed.proxy_address, proxy);
        assert_eq!(deployed.implementation_address, implementation);
    }

    #[tokio::test]
    async fn test_verifier_rejection() {
        let verifier = MemoryVerifier::new().rejecting("Already Verified");
        let result = verifier.verify(Address::with_last_byte(2), &Bytes::new()).await;
        assert!(result.is_err());
        assert_eq!(verifier.calls().len(), 1);
    }
}
