//! Pre-configured network definitions with known contract addresses.
//!
//! The Commit Protocol is deployed behind an upgradeable proxy; the address
//! listed here is the proxy, which is also the emitter of every event.

use alloy::primitives::{Address, address};

/// Proxy address of the Ethereum Sepolia deployment.
const SEPOLIA_COMMIT_PROTOCOL: Address = address!("15ef602D45B42c63402af795bD2A96742ee936a7");

/// Pre-defined network deployments of the Commit Protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Network {
    /// Ethereum Sepolia testnet (chain ID 11155111).
    EthereumSepolia,
}

impl Network {
    /// All known Commit Protocol network variants.
    pub const ALL: &[Self] = &[Self::EthereumSepolia];

    /// Returns the Commit Protocol contract (proxy) address on this network.
    #[must_use]
    pub const fn contract(self) -> Address {
        match self {
            Self::EthereumSepolia => SEPOLIA_COMMIT_PROTOCOL,
        }
    }

    /// Returns the EIP-155 chain ID for this network.
    #[must_use]
    pub const fn chain_id(self) -> u64 {
        match self {
            Self::EthereumSepolia => 11_155_111,
        }
    }

    /// Whether this network is a testnet.
    #[must_use]
    pub const fn is_testnet(self) -> bool {
        match self {
            Self::EthereumSepolia => true,
        }
    }

    /// Look up a [`Network`] by its EIP-155 chain ID.
    ///
    /// Returns [`None`] if the chain ID is not a known deployment.
    #[must_use]
    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        Self::ALL.iter().find(|n| n.chain_id() == chain_id).copied()
    }
}
