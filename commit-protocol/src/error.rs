//! Error types for decoding Commit Protocol logs.

use alloy::primitives::B256;

use crate::events::EventKind;

/// A log could not be decoded as a Commit Protocol event.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The log carries no topics, so it has no event selector.
    #[error("log has no topics")]
    NoTopics,

    /// `topic0` does not match any Commit Protocol event.
    #[error("unknown event selector {0}")]
    UnknownSelector(B256),

    /// The selector matched but the topics or data do not fit the ABI.
    #[error("malformed {kind} log: {source}")]
    Abi {
        /// The event the selector identified.
        kind: EventKind,
        /// The underlying ABI decoding error.
        #[source]
        source: alloy::sol_types::Error,
    },
}

/// A string did not name any [`EventKind`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event kind `{0}`")]
pub struct UnknownKind(pub String);
