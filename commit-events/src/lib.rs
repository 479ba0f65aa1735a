//! Commit Protocol event ledger.
//!
//! Maps every event the Commit Protocol contract emits to a write-once
//! [`record::Record`] keyed by transaction hash and log index, and archives
//! the records as one Parquet table per event kind.

pub mod config;
pub mod cursor;
pub mod deployments;
pub mod error;
pub mod fetcher;
pub mod mapper;
pub mod parquet;
pub mod record;
pub mod store;

pub use error::{HandleError, MapError, StoreError};
pub use mapper::{EventOccurrence, Provenance, handle, map};
pub use record::{Record, RecordBody, RecordId};
pub use store::{MemoryStore, RecordStore, WriteOutcome};
