//! Error types for tree operations.

use grove_store::{StoreError, TreeSpecies};
use thiserror::Error;

use crate::value::ValueError;

/// Result type for tree operations
pub type TreeResult<T> = Result<T, TreeError>;

/// Errors that can occur while operating on a tree
#[derive(Debug, Error)]
pub enum TreeError {
    /// The append would exceed the tree's capacity
    #[error("{species} tree is full: index {index} + {appending} exceeds capacity {capacity}")]
    TreeFull {
        species: TreeSpecies,
        index: u64,
        appending: u64,
        capacity: u64,
    },

    /// A reconstructed proof did not verify, typically because the leaf's
    /// ancestor nodes were never retained
    #[error("Merkle proof unavailable: {0}")]
    ProofUnavailable(String),

    /// A persisted value failed to decode
    #[error(transparent)]
    Value(#[from] ValueError),

    /// A persisted metadata row is malformed
    #[error("Invalid tree metadata: {0}")]
    InvalidMetadata(String),

    /// A key does not fit the tree's key space
    #[error("Key out of range: {0}")]
    KeyOutOfRange(String),

    /// Storage backend failure
    #[error(transparent)]
    Store(#[from] StoreError),
}
