//! Error types surfaced by the grove.

use grove_merkle::TreeError;
use grove_store::StoreError;
use thiserror::Error;

/// Result type for grove operations
pub type GroveResult<T> = Result<T, GroveError>;

/// Errors surfaced to callers of the grove.
///
/// `TreeFull`, `ProofUnavailable` and `SchemaMismatch` arrive through the
/// transparent `Tree` and `Store` sources.
#[derive(Debug, Error)]
pub enum GroveError {
    /// Mutation or proof query before `init` or `apply_bootstrap`
    #[error("Grove is not initialized")]
    NotInitialized,

    /// A bootstrap proof failed the starting-leaf check
    #[error("Invalid bootstrap proof for the {0} tree")]
    InvalidBootstrapProof(grove_store::TreeSpecies),

    /// Proof query for a leaf the store has never seen
    #[error("Leaf not found: {0}")]
    LeafNotFound(String),

    /// The leaf is known but not yet part of a committed block
    #[error("Leaf {0} is not committed to any block yet")]
    LeafNotCommitted(String),

    /// Rejected configuration
    #[error("Invalid grove configuration: {0}")]
    Config(String),

    /// Encoding a persisted row failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
