//! Commit Protocol event ledger CLI.
//!
//! Fetches Commit Protocol event logs, maps each one to a record and stores
//! the records as Parquet files, one per event kind.
//!
//! # Usage
//!
//! ```bash
//! # Sync every known deployment using config.toml or the default public RPCs
//! commit-events sync --data-dir ./data
//!
//! # Sync Sepolia through a custom RPC endpoint
//! commit-events sync --data-dir ./data --chain 11155111 --rpc https://my-rpc.example.com
//!
//! # Print every CommitmentJoined record for commitment 7
//! commit-events query commitment_joined --commitment 7
//! ```

use std::path::{Path, PathBuf};

use alloy::primitives::U256;
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use commit_events::config::Config;
use commit_events::parquet::ParquetStore;
use commit_events::{deployments, fetcher};
use commit_protocol::EventKind;

/// Commit Protocol on-chain event ledger.
#[derive(Debug, Parser)]
#[command(name = "commit-events", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch new events from the contract and write records to Parquet.
    Sync {
        /// Output directory for chain data (e.g. `./data`).
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Sync only a specific chain by its EIP-155 chain ID.
        /// If omitted, every known deployment is synced.
        #[arg(long)]
        chain: Option<u64>,

        /// Use this RPC endpoint instead of the configured ones.
        /// Only valid when `--chain` is also specified.
        #[arg(long)]
        rpc: Option<String>,

        /// Path to the TOML config file; a missing file means defaults.
        #[arg(long, default_value = "config.toml")]
        config: PathBuf,

        /// First block to scan on a fresh sync.
        #[arg(long)]
        from_block: Option<u64>,

        /// Blocks to stay behind the chain tip.
        #[arg(long)]
        confirmations: Option<u64>,
    },

    /// List all known deployments.
    List,

    /// Print stored records of one kind as JSON lines.
    Query {
        /// Event kind, by event name (`CommitmentJoined`) or table name
        /// (`commitment_joined`, or `commitment-joined`).
        kind: EventKind,

        /// Chain whose records are read.
        #[arg(long, default_value_t = 11_155_111)]
        chain: u64,

        /// Only print records referencing this commitment.
        #[arg(long)]
        commitment: Option<U256>,

        /// Directory the records were synced into.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Sync {
            data_dir,
            chain,
            rpc,
            config,
            from_block,
            confirmations,
        } => {
            let overrides = SyncOverrides {
                chain,
                rpc,
                from_block,
                confirmations,
            };
            cmd_sync(&data_dir, &config, overrides).await
        }
        Command::List => {
            cmd_list();
            Ok(())
        }
        Command::Query {
            kind,
            chain,
            commitment,
            data_dir,
        } => cmd_query(&data_dir, chain, kind, commitment),
    }
}

/// Command-line settings layered over `config.toml`.
#[derive(Debug)]
struct SyncOverrides {
    chain: Option<u64>,
    rpc: Option<String>,
    from_block: Option<u64>,
    confirmations: Option<u64>,
}

/// Execute the `sync` subcommand.
async fn cmd_sync(data_dir: &Path, config_path: &Path, overrides: SyncOverrides) -> Result<()> {
    if overrides.rpc.is_some() && overrides.chain.is_none() {
        bail!("--rpc requires --chain to be specified");
    }

    let config = Config::load(config_path)?;

    let targets: Vec<&deployments::Deployment> = if let Some(id) = overrides.chain {
        let deployment =
            deployments::by_chain_id(id).with_context(|| format!("unknown chain ID {id}"))?;
        vec![deployment]
    } else {
        deployments::ALL.iter().collect()
    };

    tracing::info!(
        chains = targets.len(),
        data_dir = %data_dir.display(),
        "starting sync"
    );

    let mut success = 0u32;
    let mut failed = 0u32;

    for deployment in &targets {
        let mut plan = config.plan_for(deployment);
        if let Some(rpc) = &overrides.rpc {
            plan.rpcs = vec![rpc.clone()];
        }
        if let Some(block) = overrides.from_block {
            plan.start_block = block;
        }
        if let Some(depth) = overrides.confirmations {
            plan.confirmations = depth;
        }

        let chain_id = plan.chain_id;
        match fetcher::sync_chain(&plan, data_dir).await {
            Ok(report) => {
                success += 1;
                tracing::info!(
                    chain_id,
                    from = ?report.from_block,
                    to = report.to_block,
                    logs = report.logs,
                    created = report.ingest.created,
                    duplicates = report.ingest.duplicates,
                    "sync complete"
                );
            }
            Err(e) => {
                failed += 1;
                tracing::error!(chain_id, error = %e, "sync failed");
            }
        }
    }

    tracing::info!(success, failed, "sync finished");

    if failed > 0 {
        bail!("{failed} chain(s) failed to sync");
    }

    Ok(())
}

/// Execute the `list` subcommand.
#[allow(clippy::print_stdout)]
fn cmd_list() {
    println!(
        "{:<12} {:<18} {:<6} {:<44} {:<15} RPC",
        "Chain ID", "Network", "Type", "Contract", "Deploy Block"
    );
    println!("{}", "-".repeat(136));

    for deployment in deployments::ALL {
        let net_type = if deployment.network.is_testnet() { "test" } else { "main" };
        println!(
            "{:<12} {:<18} {:<6} {:<44} {:<15} {}",
            deployment.chain_id(),
            format!("{:?}", deployment.network),
            net_type,
            deployment.network.contract(),
            deployment.deployment_block,
            deployment.default_rpc,
        );
    }
}

/// Execute the `query` subcommand.
#[allow(clippy::print_stdout)]
fn cmd_query(
    data_dir: &Path,
    chain_id: u64,
    kind: EventKind,
    commitment: Option<U256>,
) -> Result<()> {
    let chain_dir = data_dir.join(chain_id.to_string());
    if !chain_dir.is_dir() {
        bail!("no data for chain {chain_id} in {}", data_dir.display());
    }

    let store = ParquetStore::open(&chain_dir)
        .with_context(|| format!("opening record tables in {}", chain_dir.display()))?;
    let records = store
        .load(kind)
        .with_context(|| format!("reading {} records", kind.table()))?;

    let mut printed = 0usize;
    for record in records
        .iter()
        .filter(|r| commitment.is_none_or(|id| r.commitment_id() == Some(id)))
    {
        let mut line = serde_json::to_value(record)?;
        if let (Some(obj), Some(time)) = (
            line.as_object_mut(),
            i64::try_from(record.block_timestamp)
                .ok()
                .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0)),
        ) {
            obj.insert("blockTime".into(), time.to_rfc3339().into());
        }
        println!("{line}");
        printed += 1;
    }

    tracing::info!(kind = %kind, records = printed, "query complete");
    Ok(())
}
