//! The grove: coordinator of the three-tree forest.
//!
//! One grove owns a UTXO tree, a withdrawal tree and (on full nodes) a
//! nullifier tree, all sharing one store handle and one retained-node
//! cache. Mutations are serialized by a single fair async lock and staged
//! into a caller-provided transaction; the caller commits atomically, so a
//! crash before commit leaves the persisted forest at its previous state
//! and the next `init` resumes from it.
//!
//! Proof queries deliberately skip the write lock: they read the committed
//! cache and store, and the final proof verification rejects any state
//! observed mid-append.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info};

use grove_merkle::{
    starting_leaf_proof, Fp, MerkleHasher, MerkleProof, NullifierTree, PreHashes, TreeCache, U256,
};
use grove_store::{BlockRecord, BootstrapRecord, Database, StoreTransaction, TreeSpecies};

use crate::config::GroveConfig;
use crate::error::{GroveError, GroveResult};
use crate::patch::{
    pad_leaves, BootstrapProofs, EthAddress, GrovePatch, GroveSnapshot, UtxoLeaf, WithdrawalLeaf,
    ZkAddress,
};
use crate::species::{UtxoTree, WithdrawalTree};

struct Forest<UH, WH, NH>
where
    UH: MerkleHasher<Value = Fp>,
    WH: MerkleHasher<Value = U256>,
    NH: MerkleHasher<Value = U256>,
{
    utxo: UtxoTree<UH>,
    withdrawal: WithdrawalTree<WH>,
    nullifier: Option<NullifierTree<NH>>,
}

/// The persistent Merkle forest.
pub struct Grove<UH, WH, NH>
where
    UH: MerkleHasher<Value = Fp> + Clone,
    WH: MerkleHasher<Value = U256> + Clone,
    NH: MerkleHasher<Value = U256> + Clone,
{
    config: GroveConfig<UH, WH, NH>,
    db: Arc<dyn Database>,
    cache: Arc<TreeCache>,
    write_lock: Mutex<()>,
    forest: RwLock<Option<Forest<UH, WH, NH>>>,
}

impl<UH, WH, NH> Grove<UH, WH, NH>
where
    UH: MerkleHasher<Value = Fp> + Clone,
    WH: MerkleHasher<Value = U256> + Clone,
    NH: MerkleHasher<Value = U256> + Clone,
{
    /// Create an uninitialized grove. Call [`Self::init`] or
    /// [`Self::apply_bootstrap`] before using it.
    pub fn new(config: GroveConfig<UH, WH, NH>, db: Arc<dyn Database>) -> GroveResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            db,
            cache: Arc::new(TreeCache::new()),
            write_lock: Mutex::new(()),
            forest: RwLock::new(None),
        })
    }

    /// Load the persisted trees, creating genesis metadata rows when the
    /// store is empty, and rebuild the retained-leaf index for the
    /// configured observers.
    pub async fn init(&self) -> GroveResult<()> {
        let _guard = self.write_lock.lock().await;
        let options = self.config.tree_options();

        let mut tx = StoreTransaction::new();
        let utxo = match self.db.find_tree_metadata(TreeSpecies::Utxo)? {
            Some(record) => UtxoTree::from_metadata(
                &record,
                self.config.utxo_tree_depth,
                self.config.utxo_hasher.clone(),
                options,
                self.cache.clone(),
                &self.config.zk_addresses_to_observe,
            )?,
            None => {
                let tree = UtxoTree::genesis(
                    self.config.utxo_tree_depth,
                    self.config.utxo_hasher.clone(),
                    options,
                    self.cache.clone(),
                    &self.config.zk_addresses_to_observe,
                );
                tx.put_tree_metadata(tree.engine().metadata_record()?);
                tree
            }
        };
        let withdrawal = match self.db.find_tree_metadata(TreeSpecies::Withdrawal)? {
            Some(record) => WithdrawalTree::from_metadata(
                &record,
                self.config.withdrawal_tree_depth,
                self.config.withdrawal_hasher.clone(),
                options,
                self.cache.clone(),
                &self.config.addresses_to_observe,
            )?,
            None => {
                let tree = WithdrawalTree::genesis(
                    self.config.withdrawal_tree_depth,
                    self.config.withdrawal_hasher.clone(),
                    options,
                    self.cache.clone(),
                    &self.config.addresses_to_observe,
                );
                tx.put_tree_metadata(tree.engine().metadata_record()?);
                tree
            }
        };
        if !tx.is_empty() {
            self.db.commit(tx)?;
        }

        let owners = utxo.observed_owners();
        if !owners.is_empty() {
            utxo.retain_committed(&self.db.find_utxos_owned_by(&owners)?)?;
        }
        let recipients = withdrawal.observed_recipients();
        if !recipients.is_empty() {
            withdrawal.retain_committed(&self.db.find_withdrawals_owned_by(&recipients)?)?;
        }

        let nullifier = self
            .config
            .nullifier_tree_depth
            .map(|depth| NullifierTree::new(depth, self.config.nullifier_hasher.clone()));

        info!(
            utxo_index = utxo.engine().latest_leaf_index(),
            withdrawal_index = withdrawal.engine().latest_leaf_index(),
            nullifier_tree = nullifier.is_some(),
            "grove initialized"
        );
        *self.forest.write() = Some(Forest {
            utxo,
            withdrawal,
            nullifier,
        });
        Ok(())
    }

    /// Resume both append-only trees from starting-leaf proofs supplied by
    /// a trusted peer.
    pub async fn apply_bootstrap(&self, proofs: &BootstrapProofs) -> GroveResult<()> {
        let _guard = self.write_lock.lock().await;
        let options = self.config.tree_options();

        let utxo_pre = PreHashes::new(&self.config.utxo_hasher, self.config.utxo_tree_depth);
        if proofs.utxo_proof.siblings.len() != self.config.utxo_tree_depth as usize
            || !starting_leaf_proof(&self.config.utxo_hasher, &utxo_pre, &proofs.utxo_proof)
        {
            return Err(GroveError::InvalidBootstrapProof(TreeSpecies::Utxo));
        }
        let withdrawal_pre = PreHashes::new(
            &self.config.withdrawal_hasher,
            self.config.withdrawal_tree_depth,
        );
        if proofs.withdrawal_proof.siblings.len() != self.config.withdrawal_tree_depth as usize
            || !starting_leaf_proof(
                &self.config.withdrawal_hasher,
                &withdrawal_pre,
                &proofs.withdrawal_proof,
            )
        {
            return Err(GroveError::InvalidBootstrapProof(TreeSpecies::Withdrawal));
        }

        let utxo = UtxoTree::from_bootstrap(
            self.config.utxo_tree_depth,
            self.config.utxo_hasher.clone(),
            options,
            self.cache.clone(),
            &self.config.zk_addresses_to_observe,
            &proofs.utxo_proof,
        );
        let withdrawal = WithdrawalTree::from_bootstrap(
            self.config.withdrawal_tree_depth,
            self.config.withdrawal_hasher.clone(),
            options,
            self.cache.clone(),
            &self.config.addresses_to_observe,
            &proofs.withdrawal_proof,
        );
        let nullifier = self
            .config
            .nullifier_tree_depth
            .map(|depth| NullifierTree::new(depth, self.config.nullifier_hasher.clone()));

        let mut tx = StoreTransaction::new();
        tx.put_tree_metadata(utxo.engine().metadata_record()?);
        tx.put_tree_metadata(withdrawal.engine().metadata_record()?);
        self.db.commit(tx)?;

        info!(
            utxo_index = proofs.utxo_proof.index,
            withdrawal_index = proofs.withdrawal_proof.index,
            "grove bootstrapped from snapshot proofs"
        );
        *self.forest.write() = Some(Forest {
            utxo,
            withdrawal,
            nullifier,
        });
        Ok(())
    }

    /// Apply one block's patch: pad both batches to their sub-tree
    /// quanta, append, nullify and (in full sync) record a bootstrap row.
    /// Everything is staged into `tx`; the caller commits.
    pub async fn apply_grove_patch(
        &self,
        patch: &GrovePatch,
        tx: &mut StoreTransaction,
    ) -> GroveResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut forest_slot = self.forest.write();
        let forest = forest_slot.as_mut().ok_or(GroveError::NotInitialized)?;

        let padded_utxos = pad_leaves(
            &patch.utxos,
            self.config.utxo_sub_tree_size,
            UtxoLeaf::empty(),
        );
        let padded_withdrawals = pad_leaves(
            &patch.withdrawals,
            self.config.withdrawal_sub_tree_size,
            WithdrawalLeaf::empty(),
        );
        // Reject oversized patches before any tree advances.
        forest.utxo.engine().check_capacity(padded_utxos.len() as u64)?;
        forest
            .withdrawal
            .engine()
            .check_capacity(padded_withdrawals.len() as u64)?;

        forest.utxo.append(self.db.as_ref(), &padded_utxos, tx)?;
        forest
            .withdrawal
            .append(self.db.as_ref(), &padded_withdrawals, tx)?;
        Self::mark_nullified(forest, self.db.as_ref(), &patch.nullifiers, tx)?;
        if self.config.full_sync {
            Self::stage_bootstrap(forest, tx, patch.header.as_deref())?;
        }

        debug!(
            utxos = patch.utxos.len(),
            padded_utxos = padded_utxos.len(),
            withdrawals = patch.withdrawals.len(),
            nullifiers = patch.nullifiers.len(),
            header = patch.header.as_deref().unwrap_or(""),
            "applied grove patch"
        );
        Ok(())
    }

    /// Set the leaf bits for spent nullifiers. A no-op on light nodes
    /// without a nullifier tree.
    pub async fn mark_as_nullified(
        &self,
        nullifiers: &[U256],
        tx: &mut StoreTransaction,
    ) -> GroveResult<()> {
        let _guard = self.write_lock.lock().await;
        let forest_slot = self.forest.read();
        let forest = forest_slot.as_ref().ok_or(GroveError::NotInitialized)?;
        Self::mark_nullified(forest, self.db.as_ref(), nullifiers, tx)
    }

    /// Record the current frontiers as a bootstrap row, keyed by the block
    /// header when one is given.
    pub async fn record_bootstrap(
        &self,
        tx: &mut StoreTransaction,
        header: Option<&str>,
    ) -> GroveResult<()> {
        let _guard = self.write_lock.lock().await;
        let forest_slot = self.forest.read();
        let forest = forest_slot.as_ref().ok_or(GroveError::NotInitialized)?;
        Self::stage_bootstrap(forest, tx, header)
    }

    /// Compute the prospective roots and indices of a patch without
    /// changing any state.
    ///
    /// The reported per-species index is the pre-batch index offset by the
    /// number of padding leaves the patch would introduce.
    pub async fn dry_patch(&self, patch: &GrovePatch) -> GroveResult<GroveSnapshot> {
        let _guard = self.write_lock.lock().await;
        let forest_slot = self.forest.read();
        let forest = forest_slot.as_ref().ok_or(GroveError::NotInitialized)?;

        let padded_utxos = pad_leaves(
            &patch.utxos,
            self.config.utxo_sub_tree_size,
            UtxoLeaf::empty(),
        );
        let padded_withdrawals = pad_leaves(
            &patch.withdrawals,
            self.config.withdrawal_sub_tree_size,
            WithdrawalLeaf::empty(),
        );
        let utxo_dry = forest.utxo.dry_append(&padded_utxos)?;
        let withdrawal_dry = forest.withdrawal.dry_append(&padded_withdrawals)?;
        let nullifier_tree_root = match &forest.nullifier {
            Some(tree) => Some(tree.dry_run_nullify(self.db.as_ref(), &patch.nullifiers)?),
            None => None,
        };

        Ok(GroveSnapshot {
            utxo_tree_index: utxo_dry.index - patch.utxos.len() as u64,
            utxo_tree_root: utxo_dry.root,
            withdrawal_tree_index: withdrawal_dry.index - patch.withdrawals.len() as u64,
            withdrawal_tree_root: withdrawal_dry.root,
            nullifier_tree_root,
        })
    }

    /// The current commitment summary.
    pub async fn get_snapshot(&self) -> GroveResult<GroveSnapshot> {
        self.dry_patch(&GrovePatch::default()).await
    }

    /// Inclusion proof for a committed, retained note commitment. Does not
    /// take the write lock.
    pub fn utxo_merkle_proof(&self, hash: Fp) -> GroveResult<MerkleProof<Fp>> {
        let forest_slot = self.forest.read();
        let forest = forest_slot.as_ref().ok_or(GroveError::NotInitialized)?;
        forest.utxo.merkle_proof(self.db.as_ref(), hash)
    }

    /// Inclusion proof for a committed withdrawal hash. Does not take the
    /// write lock.
    pub fn withdrawal_merkle_proof(
        &self,
        withdrawal_hash: U256,
        index: Option<u64>,
    ) -> GroveResult<MerkleProof<U256>> {
        let forest_slot = self.forest.read();
        let forest = forest_slot.as_ref().ok_or(GroveError::NotInitialized)?;
        forest
            .withdrawal
            .merkle_proof(self.db.as_ref(), withdrawal_hash, index)
    }

    /// Replace the zk-address observation policy. Affects future appends
    /// only; historical retention is immutable.
    pub async fn set_zk_addresses_to_observe(&self, addresses: Vec<ZkAddress>) -> GroveResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut forest_slot = self.forest.write();
        let forest = forest_slot.as_mut().ok_or(GroveError::NotInitialized)?;
        forest.utxo.update_pub_keys(&addresses);
        Ok(())
    }

    /// Replace the recipient-address observation policy for withdrawals.
    pub async fn set_addresses_to_observe(&self, addresses: Vec<EthAddress>) -> GroveResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut forest_slot = self.forest.write();
        let forest = forest_slot.as_mut().ok_or(GroveError::NotInitialized)?;
        forest.withdrawal.update_addresses(&addresses);
        Ok(())
    }

    fn mark_nullified(
        forest: &Forest<UH, WH, NH>,
        db: &dyn Database,
        nullifiers: &[U256],
        tx: &mut StoreTransaction,
    ) -> GroveResult<()> {
        if nullifiers.is_empty() {
            return Ok(());
        }
        if let Some(tree) = &forest.nullifier {
            tree.nullify(db, nullifiers, tx)?;
        }
        Ok(())
    }

    fn stage_bootstrap(
        forest: &Forest<UH, WH, NH>,
        tx: &mut StoreTransaction,
        header: Option<&str>,
    ) -> GroveResult<()> {
        let record = BootstrapRecord {
            block_hash: header.map(str::to_string),
            utxo_bootstrap: serde_json::to_string(&forest.utxo.engine().siblings_hex())?,
            withdrawal_bootstrap: serde_json::to_string(
                &forest.withdrawal.engine().siblings_hex(),
            )?,
        };
        if let Some(hash) = header {
            tx.ensure_block(BlockRecord {
                hash: hash.to_string(),
            });
        }
        tx.create_bootstrap(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StandardGroveConfig;
    use grove_store::MemoryStore;

    #[tokio::test]
    async fn test_uninitialized_grove_rejects_everything() {
        let grove = Grove::new(
            StandardGroveConfig::standard(4, 4),
            Arc::new(MemoryStore::new()),
        )
        .unwrap();

        assert!(matches!(
            grove.get_snapshot().await.unwrap_err(),
            GroveError::NotInitialized
        ));
        let mut tx = StoreTransaction::new();
        assert!(matches!(
            grove
                .apply_grove_patch(&GrovePatch::default(), &mut tx)
                .await
                .unwrap_err(),
            GroveError::NotInitialized
        ));
        assert!(matches!(
            grove.utxo_merkle_proof(Fp::from(1u64)).unwrap_err(),
            GroveError::NotInitialized
        ));
    }

    #[tokio::test]
    async fn test_light_mode_nullify_is_noop() {
        let mut config = StandardGroveConfig::standard(4, 4);
        config.nullifier_tree_depth = None;
        let db = Arc::new(MemoryStore::new());
        let grove = Grove::new(config, db.clone()).unwrap();
        grove.init().await.unwrap();

        let mut tx = StoreTransaction::new();
        grove
            .mark_as_nullified(&[U256::from(7)], &mut tx)
            .await
            .unwrap();
        assert!(tx.is_empty());

        let snapshot = grove.get_snapshot().await.unwrap();
        assert!(snapshot.nullifier_tree_root.is_none());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = StandardGroveConfig::standard(0, 4);
        assert!(Grove::new(config, Arc::new(MemoryStore::new())).is_err());
    }
}
