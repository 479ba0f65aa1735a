//! Write-once ledger records, one per contract event occurrence.
//!
//! A [`Record`] carries the provenance shared by every kind (id, block,
//! timestamp, transaction) plus a [`RecordBody`] holding the kind-specific
//! fields. Field names serialize in the contract's camelCase, except that the
//! protocol's `id` parameter becomes `CommitProtocol_id` so it cannot be
//! confused with the record's own `id`.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::hex::FromHexError;
use alloy::primitives::{Address, B256, FixedBytes, U256};
use commit_protocol::EventKind;
use serde::{Deserialize, Serialize};

use crate::error::MapError;

/// Unique record identifier: the transaction hash followed by the log index
/// as a 4-byte little-endian `i32`.
///
/// Two occurrences share an id exactly when they share both transaction hash
/// and log index, so replaying an occurrence reproduces its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(FixedBytes<36>);

impl RecordId {
    /// Length of a record id in bytes.
    pub const LEN: usize = 36;

    /// Derive the id of the log at `log_index` within transaction `tx_hash`.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::LogIndexOverflow`] if `log_index` exceeds
    /// `i32::MAX`.
    pub fn new(tx_hash: B256, log_index: u64) -> Result<Self, MapError> {
        let index = i32::try_from(log_index).map_err(|_| MapError::LogIndexOverflow(log_index))?;
        Ok(Self(tx_hash.concat_const(FixedBytes(index.to_le_bytes()))))
    }

    /// The transaction hash prefix.
    #[must_use]
    pub fn transaction_hash(&self) -> B256 {
        let (hash, _) = self.0.0.split_at(32);
        B256::from_slice(hash)
    }

    /// The log index suffix.
    #[must_use]
    pub fn log_index(&self) -> u32 {
        let (_, index) = self.0.0.split_at(32);
        u32::from_le_bytes(index.try_into().unwrap_or_default())
    }

    /// The raw 36 bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 36] {
        &self.0.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// A persisted, immutable representation of one event occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Unique id derived from transaction hash and log index.
    pub id: RecordId,
    /// Block containing the originating transaction.
    pub block_number: u64,
    /// Chain-reported block timestamp (seconds since epoch).
    pub block_timestamp: u64,
    /// Hash of the originating transaction.
    pub transaction_hash: B256,
    /// Kind-specific fields.
    #[serde(flatten)]
    pub body: RecordBody,
}

impl Record {
    /// The event kind this record was produced from.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.body.kind()
    }

    /// The commitment referenced by this record, if its kind carries one.
    #[must_use]
    pub const fn commitment_id(&self) -> Option<U256> {
        self.body.commitment_id()
    }
}

/// Generates [`RecordBody`] and its per-kind JSON helpers.
macro_rules! record_body {
    ($($kind:ident($fields:ty)),+ $(,)?) => {
        /// Kind-specific record fields, tagged by [`EventKind`].
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(tag = "kind", content = "fields")]
        pub enum RecordBody {
            $(
                #[doc = concat!("Fields of a `", stringify!($kind), "` record.")]
                $kind($fields),
            )+
        }

        impl RecordBody {
            /// The event kind these fields belong to.
            #[must_use]
            pub const fn kind(&self) -> EventKind {
                match self {
                    $(Self::$kind(_) => EventKind::$kind,)+
                }
            }

            /// Serialize only the fields (without the kind tag) as JSON.
            ///
            /// # Errors
            ///
            /// Returns an error if serialization fails.
            pub fn fields_json(&self) -> serde_json::Result<String> {
                match self {
                    $(Self::$kind(fields) => serde_json::to_string(fields),)+
                }
            }

            /// Parse fields written by [`RecordBody::fields_json`] for `kind`.
            ///
            /// # Errors
            ///
            /// Returns an error if `json` does not match the kind's fields.
            pub fn from_fields_json(kind: EventKind, json: &str) -> serde_json::Result<Self> {
                match kind {
                    $(EventKind::$kind => serde_json::from_str(json).map(Self::$kind),)+
                }
            }
        }
    };
}

record_body! {
    ClientDeactivated(ClientDeactivatedFields),
    ClientRegistered(ClientRegisteredFields),
    CommitmentCancelled(CommitmentRefFields),
    CommitmentCreated(CommitmentCreatedFields),
    CommitmentEmergencyPaused(CommitmentRefFields),
    CommitmentEmergencyResolved(CommitmentRefFields),
    CommitmentJoined(CommitmentJoinedFields),
    CommitmentResolved(CommitmentResolvedFields),
    EmergencyWithdrawal(EmergencyWithdrawalFields),
    FeesClaimed(FeesClaimedFields),
    Initialized(InitializedFields),
    OwnershipTransferred(OwnershipTransferredFields),
    Paused(AccountFields),
    ProtocolFeeAddressUpdated(ProtocolFeeAddressUpdatedFields),
    RewardsClaimed(RewardsClaimedFields),
    TokenAllowanceUpdated(TokenAllowanceUpdatedFields),
    Unpaused(AccountFields),
    Upgraded(UpgradedFields),
}

impl RecordBody {
    /// The commitment referenced by these fields, if any.
    #[must_use]
    pub const fn commitment_id(&self) -> Option<U256> {
        match self {
            Self::CommitmentCancelled(f)
            | Self::CommitmentEmergencyPaused(f)
            | Self::CommitmentEmergencyResolved(f) => Some(f.commitment_id),
            Self::CommitmentCreated(f) => Some(f.commitment_id),
            Self::CommitmentJoined(f) => Some(f.commitment_id),
            Self::CommitmentResolved(f) => Some(f.commitment_id),
            Self::RewardsClaimed(f) => Some(f.commitment_id),
            _ => None,
        }
    }
}

/// Fields of a `ClientDeactivated` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDeactivatedFields {
    /// The client contract or wallet.
    pub client_address: Address,
}

/// Fields of a `ClientRegistered` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRegisteredFields {
    /// The client contract or wallet.
    pub client_address: Address,
    /// Where the client's fee share is paid.
    pub fee_address: Address,
    /// Client's share of join fees, in percent.
    pub fee_share: u8,
}

/// Fields of records that only reference a commitment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentRefFields {
    /// Commitment id assigned by the contract.
    #[serde(rename = "CommitProtocol_id")]
    pub commitment_id: U256,
}

/// Fields of a `CommitmentCreated` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitmentCreatedFields {
    /// Commitment id assigned by the contract.
    #[serde(rename = "CommitProtocol_id")]
    pub commitment_id: U256,
    /// Account that created the commitment.
    pub creator: Address,
    /// Client the commitment was created through.
    pub client: Address,
    /// ERC-20 token staked.
    pub token_address: Address,
    /// Stake in the token's smallest unit.
    pub stake_amount: U256,
    /// Fee paid by each participant on joining.
    pub join_fee: U256,
    /// Creator's share of join fees, in percent.
    pub creator_share: u8,
    /// Free-form description set by the creator.
    pub description: String,
}

/// Fields of a `CommitmentJoined` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentJoinedFields {
    /// Commitment id assigned by the contract.
    #[serde(rename = "CommitProtocol_id")]
    pub commitment_id: U256,
    /// Account that joined.
    pub participant: Address,
}

/// Fields of a `CommitmentResolved` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentResolvedFields {
    /// Commitment id assigned by the contract.
    #[serde(rename = "CommitProtocol_id")]
    pub commitment_id: U256,
    /// Winners exactly as emitted: order kept, duplicates kept.
    pub winners: Vec<Address>,
}

/// Fields of an `EmergencyWithdrawal` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyWithdrawalFields {
    /// ERC-20 token involved.
    pub token: Address,
    /// Amount in the token's smallest unit.
    pub amount: U256,
}

/// Fields of a `FeesClaimed` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeesClaimedFields {
    /// Account the fees were paid to.
    pub recipient: Address,
    /// ERC-20 token involved.
    pub token: Address,
    /// Amount in the token's smallest unit.
    pub amount: U256,
}

/// Fields of an `Initialized` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializedFields {
    /// Initializer version.
    pub version: u64,
}

/// Fields of an `OwnershipTransferred` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipTransferredFields {
    /// Owner before the transfer.
    pub previous_owner: Address,
    /// Owner after the transfer.
    pub new_owner: Address,
}

/// Fields of `Paused` and `Unpaused` records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountFields {
    /// Account that triggered the change.
    pub account: Address,
}

/// Fields of a `ProtocolFeeAddressUpdated` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolFeeAddressUpdatedFields {
    /// Previous fee recipient.
    pub old_address: Address,
    /// New fee recipient.
    pub new_address: Address,
}

/// Fields of a `RewardsClaimed` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardsClaimedFields {
    /// Commitment id assigned by the contract.
    #[serde(rename = "CommitProtocol_id")]
    pub commitment_id: U256,
    /// Winner who claimed.
    pub user: Address,
    /// ERC-20 token involved.
    pub token: Address,
    /// Amount in the token's smallest unit.
    pub amount: U256,
}

/// Fields of a `TokenAllowanceUpdated` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAllowanceUpdatedFields {
    /// ERC-20 token involved.
    pub token: Address,
    /// Whether the token may now be staked.
    pub allowed: bool,
}

/// Fields of an `Upgraded` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradedFields {
    /// New implementation contract.
    pub implementation: Address,
}
