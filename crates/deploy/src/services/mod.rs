//! Backends for the capability ports.
//!
//! - `node` - JSON-RPC [`ChainClient`](crate::ChainClient) over node-managed accounts
//! - `erc1967` - [`ProxyManager`](crate::ProxyManager) for ERC-1967 proxies with UUPS upgrades
//! - `etherscan` - [`Verifier`](crate::Verifier) for Etherscan-compatible explorers

pub mod erc1967;
pub mod etherscan;
pub mod node;

pub use erc1967::{ArtifactsConfig, Erc1967Manager};
pub use etherscan::{EtherscanVerifier, VerificationConfig};
pub use node::{NodeClient, TransactionRequest};
