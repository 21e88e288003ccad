//! # grove
//!
//! A persistent, append-only forest of three sparse Merkle trees backing a
//! zk-rollup's state commitments:
//!
//! - a **UTXO tree** of note commitments in a ≈254-bit prime field,
//! - a **withdrawal tree** of withdrawal hashes in the 256-bit integer
//!   space,
//! - a **nullifier tree** mapping spent-note nullifiers to single bits.
//!
//! The forest advances in lock-step with on-chain block application: each
//! block contributes a [`GrovePatch`] that is padded to fixed sub-tree
//! quanta, appended, nullified and staged into a caller-provided store
//! transaction. Roots and frontiers are maintained incrementally with
//! `O(depth)` state per tree; inclusion proofs stay available for leaves
//! the node observes.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use grove::{
//!     Database, Fp, Grove, GrovePatch, MemoryStore, StandardGroveConfig, StoreTransaction,
//!     UtxoLeaf,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), grove::GroveError> {
//! let db = Arc::new(MemoryStore::new());
//! let grove = Grove::new(StandardGroveConfig::standard(31, 31), db.clone())?;
//! grove.init().await?;
//!
//! let patch = GrovePatch {
//!     utxos: vec![UtxoLeaf::new(Fp::from(1u64)).tracked()],
//!     ..Default::default()
//! };
//! let predicted = grove.dry_patch(&patch).await?;
//!
//! let mut tx = StoreTransaction::new();
//! grove.apply_grove_patch(&patch, &mut tx).await?;
//! db.commit(tx)?;
//!
//! assert_eq!(grove.get_snapshot().await?.utxo_tree_root, predicted.utxo_tree_root);
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! Single writer, many readers. Every mutating entry point and every dry
//! run takes one fair async lock; proof queries read the committed state
//! without it and are gated by proof verification instead.

pub mod config;
pub mod error;
pub mod grove;
pub mod patch;
pub mod species;

pub use config::{GroveConfig, StandardGroveConfig, DEFAULT_NULLIFIER_TREE_DEPTH, DEFAULT_SUB_TREE_SIZE};
pub use error::{GroveError, GroveResult};
pub use grove::Grove;
pub use patch::{
    BootstrapProofs, EthAddress, GrovePatch, GroveSnapshot, UtxoLeaf, WithdrawalLeaf, ZkAddress,
};
pub use species::{UtxoTree, WithdrawalTree};

pub use grove_merkle::{
    starting_leaf_proof, verify_proof, Fp, Keccak256Hasher, MerkleHasher, MerkleProof,
    NullifierTree, PreHashes, Sha256FieldHasher, TreeCache, TreeError, TreeValue, U256,
};
pub use grove_store::{
    Database, MemoryStore, RocksStore, RocksStoreConfig, StoreError, StoreTransaction,
};
