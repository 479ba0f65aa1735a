//! Error types for the event ledger.
//!
//! Every error here is surfaced to the caller that delivered the event; none
//! is retried or swallowed inside the mapper or the stores. A duplicate
//! record id is not an error: see [`crate::store::WriteOutcome::Duplicate`].

use std::path::PathBuf;

use commit_protocol::DecodeError;

/// An event occurrence is missing provenance or carries malformed parameters.
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    /// A provenance field the record needs was absent from the log.
    #[error("log is missing `{0}`")]
    MissingField(&'static str),

    /// The log was retracted by a chain reorganization.
    #[error("log at block {block} was removed by a reorg")]
    RemovedLog {
        /// Block the retracted log belonged to.
        block: u64,
    },

    /// The log index does not fit the 4-byte suffix of a record id.
    #[error("log index {0} does not fit in an i32")]
    LogIndexOverflow(u64),

    /// The log's parameters could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// A record store failed to persist or read records.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Event fields could not be (de)serialized to JSON.
    #[error("serializing record fields: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem I/O failed.
    #[error("store I/O: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow rejected a record batch.
    #[error("arrow: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    /// The Parquet reader or writer failed.
    #[error("parquet: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// A stored file does not have the expected shape.
    #[error("corrupt table {}: {reason}", path.display())]
    Corrupt {
        /// The offending file.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },
}

/// Handling one event occurrence failed; nothing was written.
#[derive(Debug, thiserror::Error)]
pub enum HandleError {
    /// The occurrence could not be mapped to a record.
    #[error(transparent)]
    Map(#[from] MapError),

    /// The store rejected the write.
    #[error(transparent)]
    Store(#[from] StoreError),
}
