//! Runtime configuration loaded from `config.toml`.
//!
//! Per chain, the file may provide an ordered RPC fallback list and override
//! the contract address, the first block to index, and the number of
//! confirmations to stay behind the chain tip:
//!
//! ```toml
//! [chains.11155111]
//! rpcs = ["https://sepolia.example.org", "https://ethereum-sepolia-rpc.publicnode.com"]
//! contract = "0x15ef602D45B42c63402af795bD2A96742ee936a7"
//! start_block = 7000000
//! confirmations = 12
//! ```
//!
//! When no config file is present the built-in defaults from
//! [`crate::deployments::Deployment`] are used.

use std::collections::HashMap;
use std::path::Path;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::Deserialize;

use crate::deployments::Deployment;

/// Confirmations kept between the chain tip and the last indexed block when
/// neither the config file nor the CLI says otherwise.
pub const DEFAULT_CONFIRMATIONS: u64 = 12;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Per-chain overrides, keyed by decimal chain ID (TOML keys are strings).
    #[serde(default)]
    pub chains: HashMap<String, ChainOverrides>,
}

/// Overrides for a single chain.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChainOverrides {
    /// Ordered list of RPC URLs (best first).
    #[serde(default)]
    pub rpcs: Vec<String>,
    /// Contract to index instead of the known deployment.
    pub contract: Option<Address>,
    /// First block to index on a fresh sync.
    pub start_block: Option<u64>,
    /// Blocks to stay behind the tip.
    pub confirmations: Option<u64>,
}

/// Fully resolved sync parameters for one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    /// EIP-155 chain ID.
    pub chain_id: u64,
    /// Contract whose logs are indexed.
    pub contract: Address,
    /// First block of a fresh sync.
    pub start_block: u64,
    /// Blocks to stay behind the tip.
    pub confirmations: u64,
    /// RPC endpoints, tried in order.
    pub rpcs: Vec<String>,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Returns [`Config::default`] if the file does not exist,
    /// allowing the binary to work without any config.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Resolve the sync plan for `deployment`, layering this config over the
    /// built-in defaults.
    #[must_use]
    pub fn plan_for(&self, deployment: &Deployment) -> SyncPlan {
        let chain_id = deployment.chain_id();
        let overrides = self
            .chains
            .get(&chain_id.to_string())
            .cloned()
            .unwrap_or_default();
        let rpcs = if overrides.rpcs.is_empty() {
            vec![deployment.default_rpc.to_owned()]
        } else {
            overrides.rpcs
        };
        SyncPlan {
            chain_id,
            contract: overrides
                .contract
                .unwrap_or_else(|| deployment.network.contract()),
            start_block: overrides
                .start_block
                .unwrap_or(deployment.deployment_block),
            confirmations: overrides.confirmations.unwrap_or(DEFAULT_CONFIRMATIONS),
            rpcs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployments;

    fn sepolia() -> &'static Deployment {
        deployments::by_chain_id(11_155_111).expect("sepolia deployment")
    }

    #[test]
    fn defaults_without_overrides() {
        let plan = Config::default().plan_for(sepolia());
        assert_eq!(plan.contract, sepolia().network.contract(), "known contract");
        assert_eq!(plan.start_block, sepolia().deployment_block, "deployment block");
        assert_eq!(plan.confirmations, DEFAULT_CONFIRMATIONS, "confirmations");
        assert_eq!(plan.rpcs, vec![sepolia().default_rpc.to_owned()], "public rpc");
    }

    #[test]
    fn file_overrides_apply() {
        let config: Config = toml::from_str(
            r#"
            [chains.11155111]
            rpcs = ["https://a.example", "https://b.example"]
            contract = "0x0000000000000000000000000000000000000abc"
            start_block = 42
            confirmations = 0
            "#,
        )
        .expect("parses");

        let plan = config.plan_for(sepolia());
        assert_eq!(plan.rpcs.len(), 2, "fallback list");
        assert_eq!(
            plan.contract,
            "0x0000000000000000000000000000000000000abc"
                .parse::<Address>()
                .expect("address"),
            "contract override"
        );
        assert_eq!(plan.start_block, 42, "start override");
        assert_eq!(plan.confirmations, 0, "confirmation override");
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::load(&dir.path().join("config.toml")).expect("load");
        assert!(config.chains.is_empty(), "no overrides");
    }
}
