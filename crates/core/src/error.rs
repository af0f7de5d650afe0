//! Error surface of the store.
//!
//! Every recoverable failure flows through `StoreError`. Out-of-range slot
//! references are deliberately *not* represented here: passing one is a
//! programming error and panics at the slot table boundary, the same way
//! slice indexing does.

use thiserror::Error;

/// Result alias used across all quarry crates.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the storage engine.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The block's cursor reached its end and its recycle queue is empty.
    #[error("block '{block}' has no free slots")]
    BlockFull { block: String },

    /// No block with this name was configured at table construction.
    #[error("unknown block '{block}'")]
    UnknownBlock { block: String },

    /// An operation other than open/close was attempted on a closed log.
    #[error("decision log is closed")]
    LogClosed,

    /// A read-only request kind was handed to the sequencer.
    #[error("no decision needed for request kind {kind}")]
    NoDecisionNeeded { kind: String },

    /// No live record with this id exists.
    #[error("record '{id}' not found")]
    RecordNotFound { id: String },

    /// The persistence layer failed during flush, wipe, or range read.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// A record or decision could not be (de)serialized.
    #[error("serialization failure: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
