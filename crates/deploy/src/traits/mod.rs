//! Capability ports consumed by the [`Orchestrator`](crate::Orchestrator).
//!
//! The orchestrator never talks to a node or an explorer directly. It goes through these
//! traits, implemented over JSON-RPC and HTTP in [`crate::services`] and in memory in
//! [`crate::memory`].

mod chain;
mod proxy;
mod verifier;

pub use chain::ChainClient;
pub use proxy::{DeploymentResult, ProxyManager};
pub use verifier::Verifier;
