//! Commit Protocol contract bindings.
//!
//! Provides the contract's event definitions (generated with
//! [`alloy::sol!`]), a tagged [`CommitEvent`] union with its [`EventKind`]
//! discriminant, and the table of known [`Network`] deployments.
//!
//! ```
//! use alloy::primitives::U256;
//! use alloy::sol_types::SolEvent;
//! use commit_protocol::{CommitEvent, CommitmentCancelled, EventKind};
//!
//! let log = CommitmentCancelled { id: U256::from(4) }.encode_log_data();
//! let event = CommitEvent::decode(&log).unwrap();
//! assert_eq!(event.kind(), EventKind::CommitmentCancelled);
//! ```

pub mod error;
pub mod events;
pub mod networks;

pub use error::{DecodeError, UnknownKind};
pub use events::*;
pub use networks::Network;
