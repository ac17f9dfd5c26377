//! Chain client port.

use std::future::Future;

use alloy_core::primitives::{Address, U256};
use anyhow::Result;

/// Read access to the target chain plus the account that signs transactions.
pub trait ChainClient: Send + Sync {
    /// The account transactions are sent from, or `None` if no signer is available.
    fn signer(&self) -> impl Future<Output = Result<Option<Address>>> + Send;

    /// Balance of `account` in wei.
    fn balance(&self, account: Address) -> impl Future<Output = Result<U256>> + Send;

    /// The chain ID reported by the node.
    fn chain_id(&self) -> impl Future<Output = Result<u64>> + Send;
}
