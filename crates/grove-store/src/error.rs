//! Error types for store operations.

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in a storage backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend is missing a required table or column
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Row encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// RocksDB reported an error
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// Any other backend failure
    #[error("Storage error: {0}")]
    Backend(String),
}

impl From<bincode::error::EncodeError> for StoreError {
    fn from(e: bincode::error::EncodeError) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for StoreError {
    fn from(e: bincode::error::DecodeError) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
