//! Datastore errors

use thiserror::Error;

/// Result type for datastore operations
pub type DatastoreResult<T> = Result<T, DatastoreError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DatastoreError {
    /// Index was dropped while in use
    #[error("Index {0} has been dropped")]
    IndexDropped(String),

    /// Scan vector ahead of what the index has applied
    #[error("Index {index} cannot satisfy scan vector at {required} (indexed through {indexed})")]
    VectorNotSatisfied {
        index: String,
        required: u64,
        indexed: u64,
    },

    /// Malformed data definition
    #[error("Invalid data definition: {0}")]
    InvalidData(String),
}
