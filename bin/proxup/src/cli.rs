use std::path::PathBuf;

use alloy_core::primitives::Address;
use clap::{Args, Parser, Subcommand};
use proxup_deploy::DEFAULT_CONFIG_FILENAME;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "proxup")]
#[command(
    author,
    version,
    about = "Deploy, upgrade and verify ERC-1967 proxy contracts"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "PROXUP_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to the project configuration file.
    #[arg(long, alias = "conf", global = true, env = "PROXUP_CONFIG", default_value = DEFAULT_CONFIG_FILENAME)]
    pub config: PathBuf,

    /// The network to operate on. Overrides `network` from the configuration file.
    #[arg(short, long, global = true, env = "PROXUP_NETWORK")]
    pub network: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Write a configuration file with default values.
    Init {
        /// Overwrite an existing configuration file.
        #[arg(long)]
        force: bool,
    },

    /// Deploy a new proxy and record its address in the registry.
    Deploy(RunArgs),

    /// Upgrade the proxy recorded in the registry to a new implementation.
    Upgrade(RunArgs),

    /// Submit an implementation for verification again.
    ///
    /// Defaults to the implementation currently behind the recorded proxy.
    Verify {
        /// Implementation address to verify.
        #[arg(long)]
        implementation: Option<Address>,
    },

    /// Print the recorded proxy addresses.
    List {
        /// Include every network, not only the selected one.
        #[arg(long)]
        all: bool,
    },
}

/// Overrides shared by `deploy` and `upgrade`.
#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Logic contract artifact name or path. Overrides `contract.logic`.
    #[arg(long)]
    pub logic: Option<String>,

    /// Seconds to wait before submitting the implementation for verification.
    #[arg(long)]
    pub settle_delay: Option<u64>,

    /// Do not submit the implementation for verification.
    #[arg(long)]
    pub skip_verification: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_deploy() {
        let cli = Cli::try_parse_from([
            "proxup",
            "deploy",
            "--network",
            "mainnet",
            "--logic",
            "MeetingV2",
            "--settle-delay",
            "0",
        ])
        .unwrap();

        assert_eq!(cli.network.as_deref(), Some("mainnet"));
        match cli.command {
            Command::Deploy(args) => {
                assert_eq!(args.logic.as_deref(), Some("MeetingV2"));
                assert_eq!(args.settle_delay, Some(0));
                assert!(!args.skip_verification);
            }
            other => panic!("Expected deploy, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_verify_address() {
        let cli = Cli::try_parse_from([
            "proxup",
            "verify",
            "--implementation",
            "0x2222222222222222222222222222222222222222",
        ])
        .unwrap();

        match cli.command {
            Command::Verify { implementation } => {
                assert_eq!(implementation, Some(Address::repeat_byte(0x22)))
            }
            other => panic!("Expected verify, got {other:?}"),
        }

        assert!(Cli::try_parse_from(["proxup", "verify", "--implementation", "0x22"]).is_err());
    }
}
