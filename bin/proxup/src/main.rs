//! proxup deploys upgradeable ERC-1967 proxies, upgrades them and keeps track of their
//! addresses per network.

mod cli;

use std::path::Path;

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};

use cli::{Cli, Command, RunArgs};
use proxup_deploy::{
    DeployError, Erc1967Manager, EtherscanVerifier, NodeClient, Orchestrator, ProxupConfig,
    RegistryFile, Workflow,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    match cli.command {
        Command::Init { force } => init(&cli.config, cli.network, force),
        Command::Deploy(args) => {
            let config = load_config(&cli.config, cli.network)?;
            run(config, Workflow::Deploy, args).await
        }
        Command::Upgrade(args) => {
            let config = load_config(&cli.config, cli.network)?;
            run(config, Workflow::Upgrade, args).await
        }
        Command::Verify { implementation } => {
            let config = load_config(&cli.config, cli.network)?;
            verify(config, implementation).await
        }
        Command::List { all } => {
            let config = load_config(&cli.config, cli.network)?;
            list(&config, all)
        }
    }
}

fn load_config(path: &Path, network: Option<String>) -> Result<ProxupConfig> {
    let mut config = ProxupConfig::load(path)?;
    if let Some(network) = network {
        config.network = network;
    }
    Ok(config)
}

fn init(path: &Path, network: Option<String>, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists, pass --force to overwrite it",
            path.display()
        );
    }

    let mut config = ProxupConfig::default();
    if let Some(network) = network {
        config.network = network;
    }
    config.save_to_file(path)
}

async fn run(mut config: ProxupConfig, workflow: Workflow, args: RunArgs) -> Result<()> {
    if let Some(logic) = args.logic {
        config.contract.logic = logic;
    }
    if let Some(secs) = args.settle_delay {
        config.settle_delay_secs = secs;
    }

    let verifier = match &config.verification {
        Some(_) if args.skip_verification => {
            tracing::info!("Verification disabled from the command line");
            None
        }
        Some(verification) => Some(EtherscanVerifier::new(verification.clone())?),
        None => None,
    };

    tracing::info!(
        workflow = %workflow,
        network = %config.network,
        contract = %config.contract.name,
        logic = %config.contract.logic,
        rpc_url = %config.rpc_url,
        registry = %config.registry.display(),
        "Starting..."
    );

    let node = NodeClient::new(&config.rpc_url, config.signer)?;
    let proxies = Erc1967Manager::new(node.clone(), config.contract.artifacts());
    let orchestrator = Orchestrator::new(
        node,
        proxies,
        verifier,
        config.registry(),
        config.run_config(),
    );

    let report = orchestrator.run(workflow).await?;
    println!("{report}");

    Ok(())
}

async fn verify(config: ProxupConfig, implementation: Option<Address>) -> Result<()> {
    let verification = config
        .verification
        .clone()
        .context("No [verification] section in the configuration")?;

    let node = NodeClient::new(&config.rpc_url, config.signer)?;
    let proxies = Erc1967Manager::new(node.clone(), config.contract.artifacts());

    let implementation = match implementation {
        Some(implementation) => implementation,
        None => {
            let records = config.registry().load(&config.network)?;
            let recorded =
                records
                    .address_of(&config.contract.name)
                    .ok_or_else(|| DeployError::UnknownProxy {
                        network: config.network.clone(),
                        contract: config.contract.name.clone(),
                    })?;
            let proxy: Address = recorded
                .parse()
                .with_context(|| format!("Recorded address {} is invalid", recorded))?;
            proxies.implementation_of(proxy).await?
        }
    };

    tracing::info!(implementation = %implementation, "Submitting implementation for verification...");

    let orchestrator = Orchestrator::new(
        node,
        proxies,
        Some(EtherscanVerifier::new(verification)?),
        config.registry(),
        config.run_config(),
    );
    orchestrator.verify_implementation(implementation).await?;

    Ok(())
}

fn list(config: &ProxupConfig, all: bool) -> Result<()> {
    let registry = config.registry();
    let records: RegistryFile = if all {
        registry.load_all()?
    } else {
        RegistryFile::from([(config.network.clone(), registry.load(&config.network)?)])
    };

    if records.values().all(|contracts| contracts.is_empty()) {
        tracing::info!(registry = %registry.path().display(), "No contracts recorded");
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Network", "Contract", "Proxy"]);

    for (network, contracts) in &records {
        for (name, address) in contracts.iter() {
            table.add_row(vec![network.as_str(), name.as_str(), address.as_str()]);
        }
    }

    println!("{table}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = TempDir::new("proxup-test").unwrap();
        let path = dir.path().join("Proxup.toml");

        init(&path, Some("sepolia".to_string()), false).unwrap();
        let written = ProxupConfig::figment(&path).extract::<ProxupConfig>().unwrap();
        assert_eq!(written.network, "sepolia");

        assert!(init(&path, None, false).is_err());
        let unchanged = ProxupConfig::figment(&path).extract::<ProxupConfig>().unwrap();
        assert_eq!(unchanged.network, "sepolia");

        init(&path, None, true).unwrap();
        let overwritten = ProxupConfig::figment(&path).extract::<ProxupConfig>().unwrap();
        assert_eq!(overwritten, ProxupConfig::default());
    }
}
