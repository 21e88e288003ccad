//! The two append-only species: UTXO and withdrawal trees.
//!
//! Thin wrappers over the frontier engine that own the observation policy
//! and the leaf-row bookkeeping. The UTXO tree retains the path of any
//! leaf whose owner is an observed zk-address; the withdrawal tree keys
//! its policy by Ethereum-style recipient addresses.

use std::collections::HashSet;
use std::sync::Arc;

use grove_merkle::{
    DryAppendResult, EngineLeaf, Fp, MerkleHasher, MerkleProof, RollupTree, TreeCache, TreeError,
    TreeOptions, TreeValue, U256,
};
use grove_store::{
    Database, StoreTransaction, TreeMetadataRecord, TreeSpecies, UtxoRecord, WithdrawalRecord,
};

use crate::error::{GroveError, GroveResult};
use crate::patch::{EthAddress, UtxoLeaf, WithdrawalLeaf, ZkAddress};

fn parse_committed_index(value: &str) -> GroveResult<u64> {
    value
        .parse::<u64>()
        .map_err(|_| TreeError::InvalidMetadata(format!("bad leaf index {value:?}")).into())
}

/// The note commitment tree over the prime field.
pub struct UtxoTree<H: MerkleHasher<Value = Fp>> {
    engine: RollupTree<H>,
    observed: HashSet<String>,
}

impl<H: MerkleHasher<Value = Fp>> UtxoTree<H> {
    pub fn genesis(
        depth: u32,
        hasher: H,
        options: TreeOptions,
        cache: Arc<TreeCache>,
        observed: &[ZkAddress],
    ) -> Self {
        Self {
            engine: RollupTree::genesis(TreeSpecies::Utxo, depth, hasher, options, cache),
            observed: observed.iter().map(|a| a.as_str().to_string()).collect(),
        }
    }

    pub fn from_metadata(
        record: &TreeMetadataRecord,
        depth: u32,
        hasher: H,
        options: TreeOptions,
        cache: Arc<TreeCache>,
        observed: &[ZkAddress],
    ) -> GroveResult<Self> {
        Ok(Self {
            engine: RollupTree::from_metadata(record, depth, hasher, options, cache)?,
            observed: observed.iter().map(|a| a.as_str().to_string()).collect(),
        })
    }

    /// Resume from a verified starting-leaf proof.
    pub fn from_bootstrap(
        depth: u32,
        hasher: H,
        options: TreeOptions,
        cache: Arc<TreeCache>,
        observed: &[ZkAddress],
        proof: &MerkleProof<Fp>,
    ) -> Self {
        Self {
            engine: RollupTree::from_bootstrap(
                TreeSpecies::Utxo,
                depth,
                hasher,
                options,
                cache,
                proof.root,
                proof.index,
                proof.siblings.clone(),
            ),
            observed: observed.iter().map(|a| a.as_str().to_string()).collect(),
        }
    }

    pub fn engine(&self) -> &RollupTree<H> {
        &self.engine
    }

    fn observes(&self, leaf: &UtxoLeaf) -> bool {
        leaf.should_track
            || leaf
                .owner
                .as_ref()
                .is_some_and(|owner| self.observed.contains(owner.as_str()))
    }

    /// Replace the observation policy. Only future appends are affected;
    /// already-retained paths stay retained.
    pub fn update_pub_keys(&mut self, observed: &[ZkAddress]) {
        self.observed = observed.iter().map(|a| a.as_str().to_string()).collect();
    }

    pub fn observed_owners(&self) -> Vec<String> {
        self.observed.iter().cloned().collect()
    }

    /// Re-register committed leaves of observed owners after a restart.
    pub fn retain_committed(&self, rows: &[UtxoRecord]) -> GroveResult<()> {
        for row in rows {
            if let Some(index) = &row.index {
                self.engine.retain_leaf(parse_committed_index(index)?);
            }
        }
        Ok(())
    }

    /// Append a padded batch, staging leaf rows alongside the tree nodes.
    pub fn append(
        &mut self,
        db: &dyn Database,
        leaves: &[UtxoLeaf],
        tx: &mut StoreTransaction,
    ) -> GroveResult<()> {
        let start = self.engine.latest_leaf_index();
        let engine_leaves: Vec<EngineLeaf<Fp>> = leaves
            .iter()
            .map(|leaf| EngineLeaf {
                hash: leaf.hash,
                track: self.observes(leaf),
            })
            .collect();
        self.engine.append(&engine_leaves, tx)?;

        let force_update = self.engine.options().force_update;
        for (offset, leaf) in leaves.iter().enumerate() {
            if leaf.hash.is_zero() {
                // Padding slots get no leaf row.
                continue;
            }
            let repr = leaf.hash.to_repr();
            if !force_update {
                if let Some(row) = db.find_utxo(&repr)? {
                    if row.index.is_some() {
                        continue;
                    }
                }
            }
            tx.upsert_utxo(UtxoRecord {
                hash: repr,
                index: Some((start + offset as u64).to_string()),
                owner: leaf.owner.as_ref().map(|a| a.to_string()),
            });
        }
        Ok(())
    }

    pub fn dry_append(&self, leaves: &[UtxoLeaf]) -> GroveResult<DryAppendResult<Fp>> {
        let hashes: Vec<Fp> = leaves.iter().map(|leaf| leaf.hash).collect();
        Ok(self.engine.dry_append(&hashes)?)
    }

    /// Reconstruct the inclusion proof of a committed note commitment.
    pub fn merkle_proof(&self, db: &dyn Database, hash: Fp) -> GroveResult<MerkleProof<Fp>> {
        let repr = hash.to_repr();
        let row = db
            .find_utxo(&repr)?
            .ok_or_else(|| GroveError::LeafNotFound(repr.clone()))?;
        let index = row
            .index
            .ok_or_else(|| GroveError::LeafNotCommitted(repr.clone()))?;
        Ok(self
            .engine
            .restore_proof(db, hash, parse_committed_index(&index)?)?)
    }
}

/// The withdrawal hash tree over the 256-bit integer space.
pub struct WithdrawalTree<H: MerkleHasher<Value = U256>> {
    engine: RollupTree<H>,
    observed: HashSet<String>,
}

impl<H: MerkleHasher<Value = U256>> WithdrawalTree<H> {
    pub fn genesis(
        depth: u32,
        hasher: H,
        options: TreeOptions,
        cache: Arc<TreeCache>,
        observed: &[EthAddress],
    ) -> Self {
        Self {
            engine: RollupTree::genesis(TreeSpecies::Withdrawal, depth, hasher, options, cache),
            observed: observed.iter().map(|a| a.as_str().to_string()).collect(),
        }
    }

    pub fn from_metadata(
        record: &TreeMetadataRecord,
        depth: u32,
        hasher: H,
        options: TreeOptions,
        cache: Arc<TreeCache>,
        observed: &[EthAddress],
    ) -> GroveResult<Self> {
        Ok(Self {
            engine: RollupTree::from_metadata(record, depth, hasher, options, cache)?,
            observed: observed.iter().map(|a| a.as_str().to_string()).collect(),
        })
    }

    /// Resume from a verified starting-leaf proof.
    pub fn from_bootstrap(
        depth: u32,
        hasher: H,
        options: TreeOptions,
        cache: Arc<TreeCache>,
        observed: &[EthAddress],
        proof: &MerkleProof<U256>,
    ) -> Self {
        Self {
            engine: RollupTree::from_bootstrap(
                TreeSpecies::Withdrawal,
                depth,
                hasher,
                options,
                cache,
                proof.root,
                proof.index,
                proof.siblings.clone(),
            ),
            observed: observed.iter().map(|a| a.as_str().to_string()).collect(),
        }
    }

    pub fn engine(&self) -> &RollupTree<H> {
        &self.engine
    }

    fn observes(&self, leaf: &WithdrawalLeaf) -> bool {
        leaf.should_track
            || leaf
                .recipient
                .as_ref()
                .is_some_and(|recipient| self.observed.contains(recipient.as_str()))
    }

    /// Replace the observation policy for future appends.
    pub fn update_addresses(&mut self, observed: &[EthAddress]) {
        self.observed = observed.iter().map(|a| a.as_str().to_string()).collect();
    }

    pub fn observed_recipients(&self) -> Vec<String> {
        self.observed.iter().cloned().collect()
    }

    pub fn retain_committed(&self, rows: &[WithdrawalRecord]) -> GroveResult<()> {
        for row in rows {
            if let Some(index) = &row.index {
                self.engine.retain_leaf(parse_committed_index(index)?);
            }
        }
        Ok(())
    }

    pub fn append(
        &mut self,
        db: &dyn Database,
        leaves: &[WithdrawalLeaf],
        tx: &mut StoreTransaction,
    ) -> GroveResult<()> {
        let start = self.engine.latest_leaf_index();
        let engine_leaves: Vec<EngineLeaf<U256>> = leaves
            .iter()
            .map(|leaf| EngineLeaf {
                hash: leaf.withdrawal_hash,
                track: self.observes(leaf),
            })
            .collect();
        self.engine.append(&engine_leaves, tx)?;

        let force_update = self.engine.options().force_update;
        for (offset, leaf) in leaves.iter().enumerate() {
            if leaf.withdrawal_hash.is_zero() {
                continue;
            }
            let repr = leaf.withdrawal_hash.to_repr();
            if !force_update {
                if let Some(row) = db.find_withdrawal(&repr)? {
                    if row.index.is_some() {
                        continue;
                    }
                }
            }
            tx.upsert_withdrawal(WithdrawalRecord {
                withdrawal_hash: repr,
                index: Some((start + offset as u64).to_string()),
                recipient: leaf.recipient.as_ref().map(|a| a.to_string()),
            });
        }
        Ok(())
    }

    pub fn dry_append(&self, leaves: &[WithdrawalLeaf]) -> GroveResult<DryAppendResult<U256>> {
        let hashes: Vec<U256> = leaves.iter().map(|leaf| leaf.withdrawal_hash).collect();
        Ok(self.engine.dry_append(&hashes)?)
    }

    /// Reconstruct the proof of a committed withdrawal hash. An explicit
    /// `index` skips the row lookup, for callers that already know where
    /// the leaf landed.
    pub fn merkle_proof(
        &self,
        db: &dyn Database,
        withdrawal_hash: U256,
        index: Option<u64>,
    ) -> GroveResult<MerkleProof<U256>> {
        let index = match index {
            Some(index) => index,
            None => {
                let repr = withdrawal_hash.to_repr();
                let row = db
                    .find_withdrawal(&repr)?
                    .ok_or_else(|| GroveError::LeafNotFound(repr.clone()))?;
                let committed = row
                    .index
                    .ok_or_else(|| GroveError::LeafNotCommitted(repr.clone()))?;
                parse_committed_index(&committed)?
            }
        };
        Ok(self.engine.restore_proof(db, withdrawal_hash, index)?)
    }
}
