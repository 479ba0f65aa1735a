//! Static deployment table for the Commit Protocol contract.
//!
//! Each entry pairs a [`commit_protocol::Network`] variant with operational
//! metadata the bindings crate does not track: where to start scanning and
//! a default public RPC.

use commit_protocol::Network;

/// Operational metadata for a single Commit Protocol deployment.
#[derive(Debug, Clone, Copy)]
pub struct Deployment {
    /// The [`commit_protocol::Network`] variant (chain ID and contract address).
    pub network: Network,
    /// A block at or before the contract's deployment; fresh syncs start here.
    pub deployment_block: u64,
    /// Suggested public RPC endpoint.
    pub default_rpc: &'static str,
}

impl Deployment {
    /// Convenience: the EIP-155 chain ID.
    #[must_use]
    pub const fn chain_id(&self) -> u64 {
        self.network.chain_id()
    }
}

/// All known Commit Protocol deployments.
pub const ALL: &[Deployment] = &[Deployment {
    network: Network::EthereumSepolia,
    deployment_block: 6_000_000,
    default_rpc: "https://ethereum-sepolia-rpc.publicnode.com",
}];

/// Look up the [`Deployment`] of the network with EIP-155 `chain_id`.
#[must_use]
pub fn by_chain_id(chain_id: u64) -> Option<&'static Deployment> {
    let network = Network::from_chain_id(chain_id)?;
    ALL.iter().find(|d| d.network == network)
}
