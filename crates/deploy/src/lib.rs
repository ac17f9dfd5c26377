//! proxup-deploy - Deploy and upgrade workflows for upgradeable proxy contracts.
//!
//! A deploy creates an ERC-1967 proxy in front of a fresh logic contract, records the proxy
//! address in the contract registry and submits the implementation to a block explorer for
//! source verification. An upgrade looks the proxy up in the registry, points it at a new
//! logic contract and verifies the new implementation.
//!
//! The [`Orchestrator`] only depends on the capability ports in [`traits`], so the same
//! workflows run against a node ([`services`]) or in memory ([`memory`]).

mod artifact;
pub use artifact::Artifact;

mod config;
pub use config::{
    ContractConfig, DEFAULT_CONFIG_FILENAME, DEFAULT_NETWORK, DEFAULT_RPC_URL, ENV_PREFIX,
    ProxupConfig,
};

mod error;
pub use error::DeployError;

pub mod memory;

mod orchestrator;
pub use orchestrator::{
    DEFAULT_SETTLE_DELAY, Orchestrator, RunConfig, RunReport, Stage, VerificationOutcome,
    Workflow,
};

mod registry;
pub use registry::{ContractRegistry, DEFAULT_REGISTRY_PATH, NetworkRegistry, RegistryFile};

pub mod rpc;
pub mod services;
pub use services::{
    ArtifactsConfig, Erc1967Manager, EtherscanVerifier, NodeClient, VerificationConfig,
};

pub mod traits;
pub use traits::{ChainClient, DeploymentResult, ProxyManager, Verifier};
