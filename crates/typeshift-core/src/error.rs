//! Core error types.

use crate::catalog::SchemaError;
use thiserror::Error;

/// Storage and serialization errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// JSON input or output error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// File system error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored schema no longer validates.
    #[error("invalid stored schema: {0}")]
    InvalidSchema(#[from] SchemaError),

    /// A commit did not follow the current revision.
    #[error("revision conflict: expected revision {expected}, found {found}")]
    RevisionConflict {
        /// The revision the store expected next.
        expected: u64,
        /// The revision that was offered.
        found: u64,
    },

    /// Invalid data format.
    #[error("invalid data: {0}")]
    InvalidData(String),
}
