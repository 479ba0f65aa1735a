//! Event definitions for the Commit Protocol contract.
//!
//! The contract emits eighteen distinct events. [`CommitEvent`] is the tagged
//! union over all of them, and [`EventKind`] is its payload-free discriminant
//! used to key record tables and build log filters.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{B256, LogData, U256};
use alloy::sol;
use alloy::sol_types::SolEvent;
use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, UnknownKind};

sol! {
    /// An integrating client was deactivated.
    #[derive(Debug, PartialEq, Eq)]
    event ClientDeactivated(address indexed clientAddress);

    /// An integrating client was registered with its fee share (percent).
    #[derive(Debug, PartialEq, Eq)]
    event ClientRegistered(address indexed clientAddress, address feeAddress, uint8 feeShare);

    /// A commitment was cancelled by its creator before anyone joined.
    #[derive(Debug, PartialEq, Eq)]
    event CommitmentCancelled(uint256 indexed id);

    /// A new commitment was created.
    #[derive(Debug, PartialEq, Eq)]
    event CommitmentCreated(
        uint256 indexed id,
        address indexed creator,
        address client,
        address tokenAddress,
        uint256 stakeAmount,
        uint256 joinFee,
        uint8 creatorShare,
        string description
    );

    /// A commitment was frozen by the protocol owner.
    #[derive(Debug, PartialEq, Eq)]
    event CommitmentEmergencyPaused(uint256 indexed id);

    /// A frozen commitment was settled by the protocol owner.
    #[derive(Debug, PartialEq, Eq)]
    event CommitmentEmergencyResolved(uint256 indexed id);

    /// A participant staked into a commitment.
    #[derive(Debug, PartialEq, Eq)]
    event CommitmentJoined(uint256 indexed id, address indexed participant);

    /// The creator resolved a commitment, naming the winners.
    #[derive(Debug, PartialEq, Eq)]
    event CommitmentResolved(uint256 indexed id, address[] winners);

    /// The owner withdrew tokens held by the contract.
    #[derive(Debug, PartialEq, Eq)]
    event EmergencyWithdrawal(address indexed token, uint256 amount);

    /// Accumulated creator, client or protocol fees were claimed.
    #[derive(Debug, PartialEq, Eq)]
    event FeesClaimed(address indexed recipient, address indexed token, uint256 amount);

    /// The proxy was initialized (or reinitialized) to `version`.
    #[derive(Debug, PartialEq, Eq)]
    event Initialized(uint64 version);

    /// Contract ownership moved to `newOwner`.
    #[derive(Debug, PartialEq, Eq)]
    event OwnershipTransferred(address indexed previousOwner, address indexed newOwner);

    /// The contract was paused by `account`.
    #[derive(Debug, PartialEq, Eq)]
    event Paused(address account);

    /// The protocol fee recipient changed.
    #[derive(Debug, PartialEq, Eq)]
    event ProtocolFeeAddressUpdated(address oldAddress, address newAddress);

    /// A winner claimed their share of a resolved commitment.
    #[derive(Debug, PartialEq, Eq)]
    event RewardsClaimed(
        uint256 indexed id,
        address indexed user,
        address indexed token,
        uint256 amount
    );

    /// A staking token was added to or removed from the allow-list.
    #[derive(Debug, PartialEq, Eq)]
    event TokenAllowanceUpdated(address indexed token, bool allowed);

    /// The contract was unpaused by `account`.
    #[derive(Debug, PartialEq, Eq)]
    event Unpaused(address account);

    /// The proxy implementation was upgraded.
    #[derive(Debug, PartialEq, Eq)]
    event Upgraded(address indexed implementation);
}

/// Generates [`EventKind`], [`CommitEvent`] and the dispatch between them
/// from a single `Name => "table_name"` list.
macro_rules! commit_events {
    ($($name:ident => $table:literal),+ $(,)?) => {
        /// The kind of a Commit Protocol event, without its payload.
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub enum EventKind {
            $(
                #[doc = concat!("The `", stringify!($name), "` event.")]
                $name,
            )+
        }

        impl EventKind {
            /// Every event kind, in declaration order.
            pub const ALL: &[Self] = &[$(Self::$name),+];

            /// The Solidity event name (e.g. `CommitmentCreated`).
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$name => stringify!($name),)+
                }
            }

            /// The `snake_case` table name used for on-disk storage.
            #[must_use]
            pub const fn table(self) -> &'static str {
                match self {
                    $(Self::$name => $table,)+
                }
            }

            /// The event selector (`topic0`): keccak-256 of the canonical signature.
            #[must_use]
            pub const fn selector(self) -> B256 {
                match self {
                    $(Self::$name => $name::SIGNATURE_HASH,)+
                }
            }
        }

        /// A decoded Commit Protocol event.
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum CommitEvent {
            $(
                #[doc = concat!("A decoded `", stringify!($name), "` event.")]
                $name($name),
            )+
        }

        impl CommitEvent {
            /// The kind of this event.
            #[must_use]
            pub const fn kind(&self) -> EventKind {
                match self {
                    $(Self::$name(_) => EventKind::$name,)+
                }
            }

            /// Decode raw log data emitted by the Commit Protocol contract.
            ///
            /// # Errors
            ///
            /// Returns [`DecodeError::NoTopics`] for anonymous logs,
            /// [`DecodeError::UnknownSelector`] if `topic0` is not a Commit
            /// Protocol event, and [`DecodeError::Abi`] if the topics or data
            /// do not match the event's ABI.
            pub fn decode(data: &LogData) -> Result<Self, DecodeError> {
                let selector = data.topics().first().ok_or(DecodeError::NoTopics)?;
                let kind = EventKind::from_selector(selector)
                    .ok_or(DecodeError::UnknownSelector(*selector))?;
                let decoded = match kind {
                    $(EventKind::$name => $name::decode_log_data(data).map(Self::$name),)+
                };
                decoded.map_err(|source| DecodeError::Abi { kind, source })
            }
        }

        $(
            impl From<$name> for CommitEvent {
                fn from(event: $name) -> Self {
                    Self::$name(event)
                }
            }
        )+
    };
}

commit_events! {
    ClientDeactivated => "client_deactivated",
    ClientRegistered => "client_registered",
    CommitmentCancelled => "commitment_cancelled",
    CommitmentCreated => "commitment_created",
    CommitmentEmergencyPaused => "commitment_emergency_paused",
    CommitmentEmergencyResolved => "commitment_emergency_resolved",
    CommitmentJoined => "commitment_joined",
    CommitmentResolved => "commitment_resolved",
    EmergencyWithdrawal => "emergency_withdrawal",
    FeesClaimed => "fees_claimed",
    Initialized => "initialized",
    OwnershipTransferred => "ownership_transferred",
    Paused => "paused",
    ProtocolFeeAddressUpdated => "protocol_fee_address_updated",
    RewardsClaimed => "rewards_claimed",
    TokenAllowanceUpdated => "token_allowance_updated",
    Unpaused => "unpaused",
    Upgraded => "upgraded",
}

impl EventKind {
    /// Look up the kind whose selector equals `selector`.
    #[must_use]
    pub fn from_selector(selector: &B256) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.selector() == *selector)
    }

    /// All event selectors, suitable for an `eth_getLogs` topic0 filter.
    #[must_use]
    pub fn selectors() -> Vec<B256> {
        Self::ALL.iter().map(|k| k.selector()).collect()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = UnknownKind;

    /// Accepts the event name or the table name, case-insensitively; the
    /// table name may use `-` in place of `_`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let table = s.replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.name().eq_ignore_ascii_case(s) || k.table().eq_ignore_ascii_case(&table))
            .ok_or_else(|| UnknownKind(s.to_owned()))
    }
}

impl CommitEvent {
    /// The commitment this event refers to, for the kinds that carry one.
    #[must_use]
    pub const fn commitment_id(&self) -> Option<U256> {
        match self {
            Self::CommitmentCancelled(e) => Some(e.id),
            Self::CommitmentCreated(e) => Some(e.id),
            Self::CommitmentEmergencyPaused(e) => Some(e.id),
            Self::CommitmentEmergencyResolved(e) => Some(e.id),
            Self::CommitmentJoined(e) => Some(e.id),
            Self::CommitmentResolved(e) => Some(e.id),
            Self::RewardsClaimed(e) => Some(e.id),
            _ => None,
        }
    }
}
