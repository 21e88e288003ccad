//! # grove-store
//!
//! Persistence contract and backends for the grove Merkle forest.
//!
//! The forest only ever talks to storage through the [`Database`] trait and
//! the staged [`StoreTransaction`] write batch. Two backends are provided:
//!
//! - [`MemoryStore`]: an in-memory implementation for tests and light
//!   deployments.
//! - [`RocksStore`]: a RocksDB-backed implementation with one column family
//!   per logical table.
//!
//! ## Tables
//!
//! ```text
//! light_trees   - Key: species               -> TreeMetadataRecord
//! tree_nodes    - Key: (tree_id, node_index) -> TreeNodeRecord
//! utxos         - Key: hash                  -> UtxoRecord
//! withdrawals   - Key: withdrawal_hash       -> WithdrawalRecord
//! bootstraps    - Key: block_hash            -> BootstrapRecord
//! blocks        - Key: hash                  -> BlockRecord
//! ```
//!
//! All value columns are canonical strings: base-10 for indices and field
//! elements, `0x`-prefixed hex for opaque hash bytes, JSON arrays of those
//! strings for sibling vectors. Keeping the rows stringly typed lets the
//! store stay agnostic of the tree value types.

pub mod batch;
pub mod db;
pub mod error;
pub mod memory;
pub mod records;
pub mod rocks;

pub use batch::{StoreTransaction, WriteOp};
pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use records::{
    BlockRecord, BootstrapRecord, TreeId, TreeMetadataRecord, TreeNodeRecord, TreeSpecies,
    UtxoRecord, WithdrawalRecord,
};
pub use rocks::{RocksStore, RocksStoreConfig};
