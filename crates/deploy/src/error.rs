//! Error taxonomy for the deploy and upgrade workflows.

use thiserror::Error;

/// Failure of one workflow step.
///
/// Every variant except [`DeployError::Verification`] aborts the workflow.
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("account resolution failed: {0}")]
    AccountResolution(String),

    #[error("no proxy recorded for `{contract}` on network `{network}`; deploy it first")]
    UnknownProxy { network: String, contract: String },

    #[error("proxy deployment failed: {0}")]
    Deployment(String),

    #[error("proxy upgrade failed: {0}")]
    Upgrade(String),

    #[error("contract registry I/O failed: {0}")]
    StoreIo(String),

    #[error("implementation verification failed: {0}")]
    Verification(String),
}

impl DeployError {
    /// Whether this error aborts the workflow.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, DeployError::Verification(_))
    }

    /// Wrap an `anyhow` chain, keeping every context layer in the message.
    pub(crate) fn chain(err: &anyhow::Error) -> String {
        format!("{err:#}")
    }
}
