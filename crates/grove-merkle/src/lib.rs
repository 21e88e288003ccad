//! # grove-merkle
//!
//! Merkle tree engines for the grove forest.
//!
//! This crate provides the tree machinery behind a zk-rollup's state
//! commitments:
//!
//! - [`tree::RollupTree`]: an append-only frontier engine that maintains
//!   the root of a tree with `2^D` leaf slots using only `O(D)` state
//! - [`nullifier::NullifierTree`]: a sparse Merkle tree of single-bit
//!   leaves keyed by 256-bit nullifier values
//! - [`proof::MerkleProof`]: inclusion proofs with a pure verifier and the
//!   starting-leaf check used to resume from a snapshot
//! - [`cache::TreeCache`]: the retained-node cache that makes proofs for
//!   observed leaves possible without materializing the tree
//!
//! ## Design
//!
//! Trees are parameterized over a [`hasher::MerkleHasher`] and its value
//! type, and monomorphize per species. The built-in hashers
//! ([`hasher::Sha256FieldHasher`], [`hasher::Keccak256Hasher`]) keep the
//! crate self-contained; a production deployment injects its own
//! circuit-friendly hasher through the same trait.
//!
//! Persistence goes through the `grove-store` contract. Appends stage
//! retained nodes into the caller's transaction and into the shared cache;
//! the caller commits the transaction atomically.

pub mod cache;
pub mod error;
pub mod hasher;
pub mod nullifier;
pub mod proof;
pub mod tree;
pub mod value;

pub use cache::TreeCache;
pub use error::{TreeError, TreeResult};
pub use hasher::{Keccak256Hasher, MerkleHasher, PreHashes, Sha256FieldHasher};
pub use nullifier::NullifierTree;
pub use proof::{starting_leaf_proof, verify_proof, MerkleProof};
pub use tree::{DryAppendResult, EngineLeaf, RollupTree, TreeOptions};
pub use value::{Fp, TreeValue, ValueError, U256};
