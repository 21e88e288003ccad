//! Staged write batches.
//!
//! A [`StoreTransaction`] accumulates writes without touching the backend;
//! [`crate::Database::commit`] applies all of them atomically. This keeps
//! the forest's in-memory state and persisted state moving in lock-step:
//! everything a patch produces is staged, then committed by the caller in
//! one shot.

use crate::records::{
    BlockRecord, BootstrapRecord, TreeMetadataRecord, TreeNodeRecord, UtxoRecord, WithdrawalRecord,
};

/// One staged write.
#[derive(Clone, Debug)]
pub enum WriteOp {
    /// Insert or replace the metadata row for a species.
    PutTreeMetadata(TreeMetadataRecord),
    /// Insert or replace a retained internal node.
    UpsertTreeNode(TreeNodeRecord),
    /// Insert or replace a UTXO leaf row.
    UpsertUtxo(UtxoRecord),
    /// Insert or replace a withdrawal leaf row.
    UpsertWithdrawal(WithdrawalRecord),
    /// Insert a bootstrap row; upserts by block hash when one is present.
    CreateBootstrap(BootstrapRecord),
    /// Make sure a block row exists.
    EnsureBlock(BlockRecord),
}

/// An ordered batch of staged writes.
#[derive(Debug, Default)]
pub struct StoreTransaction {
    ops: Vec<WriteOp>,
}

impl StoreTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_tree_metadata(&mut self, record: TreeMetadataRecord) {
        self.ops.push(WriteOp::PutTreeMetadata(record));
    }

    pub fn upsert_tree_node(&mut self, record: TreeNodeRecord) {
        self.ops.push(WriteOp::UpsertTreeNode(record));
    }

    pub fn upsert_utxo(&mut self, record: UtxoRecord) {
        self.ops.push(WriteOp::UpsertUtxo(record));
    }

    pub fn upsert_withdrawal(&mut self, record: WithdrawalRecord) {
        self.ops.push(WriteOp::UpsertWithdrawal(record));
    }

    pub fn create_bootstrap(&mut self, record: BootstrapRecord) {
        self.ops.push(WriteOp::CreateBootstrap(record));
    }

    pub fn ensure_block(&mut self, record: BlockRecord) {
        self.ops.push(WriteOp::EnsureBlock(record));
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
