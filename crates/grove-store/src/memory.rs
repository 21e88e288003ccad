//! In-memory implementation of the storage contract.
//!
//! Backs tests and light deployments. Cloning the store (or sharing it
//! through `Arc`) shares the underlying tables, which is what the
//! crash-restart tests rely on: drop the forest, keep the store, re-init.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::batch::{StoreTransaction, WriteOp};
use crate::db::Database;
use crate::error::StoreResult;
use crate::records::{
    BootstrapRecord, TreeId, TreeMetadataRecord, TreeNodeRecord, TreeSpecies, UtxoRecord,
    WithdrawalRecord,
};

#[derive(Default)]
struct Tables {
    metadata: HashMap<TreeSpecies, TreeMetadataRecord>,
    nodes: HashMap<(TreeId, String), String>,
    utxos: HashMap<String, UtxoRecord>,
    withdrawals: HashMap<String, WithdrawalRecord>,
    bootstraps: HashMap<String, BootstrapRecord>,
    anonymous_bootstraps: Vec<BootstrapRecord>,
    blocks: HashSet<String>,
}

/// An in-memory [`Database`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of retained tree nodes across all trees.
    pub fn node_count(&self) -> usize {
        self.tables.read().nodes.len()
    }

    /// Number of bootstrap rows, keyed and anonymous.
    pub fn bootstrap_count(&self) -> usize {
        let tables = self.tables.read();
        tables.bootstraps.len() + tables.anonymous_bootstraps.len()
    }
}

impl Database for MemoryStore {
    fn find_tree_metadata(&self, species: TreeSpecies) -> StoreResult<Option<TreeMetadataRecord>> {
        Ok(self.tables.read().metadata.get(&species).cloned())
    }

    fn find_tree_nodes(
        &self,
        tree_id: TreeId,
        node_indices: &[String],
    ) -> StoreResult<Vec<TreeNodeRecord>> {
        let tables = self.tables.read();
        Ok(node_indices
            .iter()
            .filter_map(|idx| {
                tables
                    .nodes
                    .get(&(tree_id, idx.clone()))
                    .map(|value| TreeNodeRecord {
                        tree_id,
                        node_index: idx.clone(),
                        value: value.clone(),
                    })
            })
            .collect())
    }

    fn find_utxo(&self, hash: &str) -> StoreResult<Option<UtxoRecord>> {
        Ok(self.tables.read().utxos.get(hash).cloned())
    }

    fn find_withdrawal(&self, withdrawal_hash: &str) -> StoreResult<Option<WithdrawalRecord>> {
        Ok(self.tables.read().withdrawals.get(withdrawal_hash).cloned())
    }

    fn find_utxos_owned_by(&self, owners: &[String]) -> StoreResult<Vec<UtxoRecord>> {
        let tables = self.tables.read();
        Ok(tables
            .utxos
            .values()
            .filter(|u| u.owner.as_ref().is_some_and(|o| owners.contains(o)))
            .cloned()
            .collect())
    }

    fn find_withdrawals_owned_by(
        &self,
        recipients: &[String],
    ) -> StoreResult<Vec<WithdrawalRecord>> {
        let tables = self.tables.read();
        Ok(tables
            .withdrawals
            .values()
            .filter(|w| w.recipient.as_ref().is_some_and(|r| recipients.contains(r)))
            .cloned()
            .collect())
    }

    fn find_bootstrap(&self, block_hash: &str) -> StoreResult<Option<BootstrapRecord>> {
        Ok(self.tables.read().bootstraps.get(block_hash).cloned())
    }

    fn commit(&self, tx: StoreTransaction) -> StoreResult<()> {
        let mut tables = self.tables.write();
        for op in tx.into_ops() {
            match op {
                WriteOp::PutTreeMetadata(record) => {
                    tables.metadata.insert(record.species, record);
                }
                WriteOp::UpsertTreeNode(record) => {
                    tables
                        .nodes
                        .insert((record.tree_id, record.node_index), record.value);
                }
                WriteOp::UpsertUtxo(record) => {
                    tables.utxos.insert(record.hash.clone(), record);
                }
                WriteOp::UpsertWithdrawal(record) => {
                    tables
                        .withdrawals
                        .insert(record.withdrawal_hash.clone(), record);
                }
                WriteOp::CreateBootstrap(record) => match &record.block_hash {
                    Some(hash) => {
                        tables.bootstraps.insert(hash.clone(), record);
                    }
                    None => tables.anonymous_bootstraps.push(record),
                },
                WriteOp::EnsureBlock(record) => {
                    tables.blocks.insert(record.hash);
                }
            }
        }
        Ok(())
    }
}
