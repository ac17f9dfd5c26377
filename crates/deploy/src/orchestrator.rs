//! Deploy and upgrade workflows.
//!
//! ```text
//! Start -> AccountResolved -> Deployed|Upgraded -> Persisted
//!       -> SettlingDelay -> Verified|VerificationFailed -> Done
//! ```
//!
//! Preconditions (a signer, and for upgrades a recorded proxy) are checked before any
//! transaction is sent. Once a proxy is live its address is persisted before verification
//! starts, and a verification failure is only reported.

use std::{fmt, time::Duration};

use alloy_core::primitives::{Address, Bytes, utils::format_ether};

use crate::{
    DeployError,
    registry::ContractRegistry,
    traits::{ChainClient, DeploymentResult, ProxyManager, Verifier},
};

/// Default wait between confirmation and verification.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(10);

/// Workflow states, in the order they can be visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Stage {
    Start,
    AccountResolved,
    Deployed,
    Upgraded,
    Persisted,
    SettlingDelay,
    Verified,
    VerificationFailed,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Workflow {
    Deploy,
    Upgrade,
}

/// How the verification side action ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified,
    Failed(String),
    /// No verifier was configured.
    Skipped,
}

/// Parameters of a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Network the registry records are kept under.
    pub network: String,
    /// Registry key of the contract, e.g. `meeting`.
    pub contract_name: String,
    /// Logic contract to deploy, as understood by the [`ProxyManager`].
    pub logic: String,
    /// Arguments of the initializer run by the proxy constructor.
    pub init_args: Vec<Address>,
    /// ABI-encoded constructor arguments of the implementation, for verification.
    pub constructor_args: Bytes,
    /// Wait between confirmation and verification.
    pub settle_delay: Duration,
}

impl RunConfig {
    pub fn new(
        network: impl Into<String>,
        contract_name: impl Into<String>,
        logic: impl Into<String>,
    ) -> Self {
        Self {
            network: network.into(),
            contract_name: contract_name.into(),
            logic: logic.into(),
            init_args: Vec::new(),
            constructor_args: Bytes::new(),
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    pub fn init_args(mut self, init_args: impl IntoIterator<Item = Address>) -> Self {
        self.init_args = init_args.into_iter().collect();
        self
    }

    pub fn constructor_args(mut self, constructor_args: Bytes) -> Self {
        self.constructor_args = constructor_args;
        self
    }

    pub fn settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub workflow: Workflow,
    pub network: String,
    pub contract_name: String,
    pub account: Address,
    pub proxy_address: Address,
    pub implementation_address: Address,
    pub verification: VerificationOutcome,
    /// Every state visited, starting with [`Stage::Start`].
    pub stages: Vec<Stage>,
}

/// Records the state machine's path and logs each transition.
struct Progress {
    workflow: Workflow,
    stages: Vec<Stage>,
}

impl Progress {
    fn new(workflow: Workflow) -> Self {
        Self {
            workflow,
            stages: vec![Stage::Start],
        }
    }

    fn advance(&mut self, stage: Stage) {
        tracing::debug!(workflow = %self.workflow, stage = %stage, "Stage reached");
        self.stages.push(stage);
    }

    fn current(&self) -> Stage {
        self.stages.last().copied().unwrap_or(Stage::Start)
    }
}

/// Sequences account resolution, proxy deployment or upgrade, persistence and verification.
pub struct Orchestrator<C, P, V> {
    chain: C,
    proxies: P,
    verifier: Option<V>,
    registry: ContractRegistry,
    config: RunConfig,
}

impl<C, P, V> Orchestrator<C, P, V>
where
    C: ChainClient,
    P: ProxyManager,
    V: Verifier,
{
    /// Create an orchestrator. Without a `verifier` runs end after persisting.
    pub fn new(
        chain: C,
        proxies: P,
        verifier: Option<V>,
        registry: ContractRegistry,
        config: RunConfig,
    ) -> Self {
        Self {
            chain,
            proxies,
            verifier,
            registry,
            config,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn registry(&self) -> &ContractRegistry {
        &self.registry
    }

    /// Run `workflow` to completion.
    pub async fn run(&self, workflow: Workflow) -> Result<RunReport, DeployError> {
        let mut progress = Progress::new(workflow);

        let result = match workflow {
            Workflow::Deploy => self.deploy_inner(&mut progress).await,
            Workflow::Upgrade => self.upgrade_inner(&mut progress).await,
        };

        if let Err(e) = &result {
            tracing::error!(
                workflow = %workflow,
                network = %self.config.network,
                contract = %self.config.contract_name,
                last_stage = %progress.current(),
                error = %e,
                "Workflow aborted"
            );
        }

        result
    }

    /// Deploy a new proxy for the configured contract and record it.
    pub async fn deploy(&self) -> Result<RunReport, DeployError> {
        self.run(Workflow::Deploy).await
    }

    /// Upgrade the proxy recorded for the configured contract.
    pub async fn upgrade(&self) -> Result<RunReport, DeployError> {
        self.run(Workflow::Upgrade).await
    }

    /// Submit `implementation` for verification right away, without the settling delay.
    ///
    /// Used to retry a verification that failed during a deploy or upgrade.
    pub async fn verify_implementation(&self, implementation: Address) -> Result<(), DeployError> {
        let verifier = self.verifier.as_ref().ok_or_else(|| {
            DeployError::Verification("no block explorer is configured".to_string())
        })?;

        verifier
            .verify(implementation, &self.config.constructor_args)
            .await
            .map_err(|e| DeployError::Verification(DeployError::chain(&e)))?;

        tracing::info!(implementation = %implementation, "Implementation verified");
        Ok(())
    }

    async fn deploy_inner(&self, progress: &mut Progress) -> Result<RunReport, DeployError> {
        let account = self.resolve_account(progress).await?;

        let result = self
            .proxies
            .deploy_proxy(account, &self.config.logic, &self.config.init_args)
            .await
            .map_err(|e| DeployError::Deployment(DeployError::chain(&e)))?;
        progress.advance(Stage::Deployed);

        tracing::info!(
            contract = %self.config.contract_name,
            proxy = %result.proxy_address,
            implementation = %result.implementation_address,
            "Proxy deployed"
        );

        self.registry.save(
            &self.config.network,
            &self.config.contract_name,
            &result.proxy_address.to_string(),
        )?;
        progress.advance(Stage::Persisted);

        self.complete(progress, account, result).await
    }

    async fn upgrade_inner(&self, progress: &mut Progress) -> Result<RunReport, DeployError> {
        let account = self.resolve_account(progress).await?;

        let network = &self.config.network;
        let name = &self.config.contract_name;

        let records = self.registry.load(network)?;
        let recorded = records
            .address_of(name)
            .ok_or_else(|| DeployError::UnknownProxy {
                network: network.clone(),
                contract: name.clone(),
            })?;
        let proxy: Address = recorded.parse().map_err(|e| {
            DeployError::StoreIo(format!(
                "recorded address `{}` for `{}` on `{}` is invalid: {}",
                recorded, name, network, e
            ))
        })?;

        tracing::info!(contract = %name, proxy = %proxy, "Found recorded proxy");

        let result = self
            .proxies
            .upgrade_proxy(account, proxy, &self.config.logic)
            .await
            .map_err(|e| DeployError::Upgrade(DeployError::chain(&e)))?;
        progress.advance(Stage::Upgraded);

        tracing::info!(
            contract = %name,
            proxy = %result.proxy_address,
            implementation = %result.implementation_address,
            "Proxy upgraded"
        );

        // The proxy address does not change on upgrade; the record is rewritten as is.
        let address = if result.proxy_address == proxy {
            recorded.to_string()
        } else {
            tracing::warn!(
                recorded = %proxy,
                reported = %result.proxy_address,
                "Upgrade reported a different proxy address, recording the new one"
            );
            result.proxy_address.to_string()
        };
        self.registry.save(network, name, &address)?;
        progress.advance(Stage::Persisted);

        self.complete(progress, account, result).await
    }

    async fn resolve_account(&self, progress: &mut Progress) -> Result<Address, DeployError> {
        let account = self
            .chain
            .signer()
            .await
            .map_err(|e| DeployError::AccountResolution(DeployError::chain(&e)))?
            .ok_or_else(|| {
                DeployError::AccountResolution("no signer account is configured".to_string())
            })?;

        let balance = self
            .chain
            .balance(account)
            .await
            .map_err(|e| DeployError::AccountResolution(DeployError::chain(&e)))?;
        let chain_id = self
            .chain
            .chain_id()
            .await
            .map_err(|e| DeployError::AccountResolution(DeployError::chain(&e)))?;

        tracing::info!(
            account = %account,
            balance = %format_ether(balance),
            chain_id,
            network = %self.config.network,
            "Using deployer account"
        );

        progress.advance(Stage::AccountResolved);
        Ok(account)
    }

    /// Settle, verify and build the report. Nothing past this point can fail the run.
    async fn complete(
        &self,
        progress: &mut Progress,
        account: Address,
        result: DeploymentResult,
    ) -> Result<RunReport, DeployError> {
        let verification = match &self.verifier {
            Some(verifier) => {
                self.settle_and_verify(progress, verifier, result.implementation_address)
                    .await
            }
            None => {
                tracing::info!("No block explorer configured, skipping verification");
                VerificationOutcome::Skipped
            }
        };
        progress.advance(Stage::Done);

        let report = RunReport {
            workflow: progress.workflow,
            network: self.config.network.clone(),
            contract_name: self.config.contract_name.clone(),
            account,
            proxy_address: result.proxy_address,
            implementation_address: result.implementation_address,
            verification,
            stages: progress.stages.clone(),
        };

        tracing::info!("Completed!");
        Ok(report)
    }

    async fn settle_and_verify(
        &self,
        progress: &mut Progress,
        verifier: &V,
        implementation: Address,
    ) -> VerificationOutcome {
        progress.advance(Stage::SettlingDelay);
        tracing::info!(
            delay = ?self.config.settle_delay,
            "Waiting for the explorer to index the implementation..."
        );
        tokio::time::sleep(self.config.settle_delay).await;

        match verifier
            .verify(implementation, &self.config.constructor_args)
            .await
        {
            Ok(()) => {
                progress.advance(Stage::Verified);
                tracing::info!(implementation = %implementation, "Implementation verified");
                VerificationOutcome::Verified
            }
            Err(e) => {
                let err = DeployError::Verification(DeployError::chain(&e));
                progress.advance(Stage::VerificationFailed);
                tracing::warn!(
                    implementation = %implementation,
                    error = %err,
                    "Verification failed; the proxy is live and recorded, retry with `proxup verify`"
                );
                VerificationOutcome::Failed(err.to_string())
            }
        }
    }
}

impl fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationOutcome::Verified => write!(f, "verified"),
            VerificationOutcome::Failed(reason) => write!(f, "FAILED ({})", reason),
            VerificationOutcome::Skipped => write!(f, "skipped"),
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "=== {} {} on {} ===",
            self.workflow, self.contract_name, self.network
        )?;
        writeln!(f, "  Account:         {}", self.account)?;
        writeln!(f, "  Proxy:           {}", self.proxy_address)?;
        writeln!(f, "  Implementation:  {}", self.implementation_address)?;
        writeln!(f, "  Verification:    {}", self.verification)?;

        let path: Vec<String> = self.stages.iter().map(ToString::to_string).collect();
        write!(f, "  Stages:          {}", path.join(" -> "))
    }
}
