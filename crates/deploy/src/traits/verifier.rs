//! Source verification port.

use std::future::Future;

use alloy_core::primitives::{Address, Bytes};
use anyhow::Result;

/// Submits a deployed implementation for source verification on a block explorer.
pub trait Verifier: Send + Sync {
    /// Verify the contract at `implementation`, deployed with ABI-encoded `constructor_args`.
    fn verify(
        &self,
        implementation: Address,
        constructor_args: &Bytes,
    ) -> impl Future<Output = Result<()>> + Send;
}
