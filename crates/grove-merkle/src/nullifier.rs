//! Sparse nullifier tree.
//!
//! A fixed-depth sparse Merkle tree whose leaves are single bits, keyed by
//! the nullifier value itself: the leaf for key `k` sits at node index
//! `2^D + k` and is 1 iff `k` has been nullified. Empty subtrees are
//! represented by the pre-hash table, so only the paths touched by set
//! bits are ever persisted.
//!
//! The tree keeps no in-memory state. Its root is the persisted node at
//! index 1 (or the empty-tree root `Z[D]`); updates read the existing
//! path nodes with one batched store lookup, recompute top-down over the
//! sorted key batch and stage every updated node into the caller's
//! transaction. `dry_run_nullify` runs the same computation and stages
//! nothing.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use grove_store::{Database, StoreTransaction, TreeId, TreeNodeRecord};
use primitive_types::U256;

use crate::error::{TreeError, TreeResult};
use crate::hasher::{MerkleHasher, PreHashes};
use crate::value::TreeValue;

/// Leaf value of a nullified key.
fn set_bit() -> U256 {
    U256::one()
}

/// The sparse spent-note tree.
pub struct NullifierTree<H: MerkleHasher<Value = U256>> {
    depth: u32,
    hasher: H,
    pre_hashes: PreHashes<U256>,
}

impl<H: MerkleHasher<Value = U256>> NullifierTree<H> {
    pub fn new(depth: u32, hasher: H) -> Self {
        let pre_hashes = PreHashes::new(&hasher, depth);
        Self {
            depth,
            hasher,
            pre_hashes,
        }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Root of the tree with no nullifier set.
    pub fn genesis_root(&self) -> U256 {
        *self.pre_hashes.genesis_root()
    }

    /// The committed root, read from the persisted root node.
    pub fn root(&self, db: &dyn Database) -> TreeResult<U256> {
        let found = db.find_tree_nodes(TreeId::Nullifier, &["1".to_string()])?;
        match found.first() {
            Some(record) => Ok(U256::from_repr(&record.value)?),
            None => Ok(self.genesis_root()),
        }
    }

    /// Set the leaf bit for every key and stage each updated node into
    /// `tx`. Nullifying an already-set key is a no-op for the root and
    /// never errors.
    pub fn nullify(
        &self,
        db: &dyn Database,
        keys: &[U256],
        tx: &mut StoreTransaction,
    ) -> TreeResult<U256> {
        let (root, updated) = self.compute(db, keys)?;
        for (node_index, value) in &updated {
            tx.upsert_tree_node(TreeNodeRecord {
                tree_id: TreeId::Nullifier,
                node_index: node_index.to_string(),
                value: value.to_repr(),
            });
        }
        debug!(keys = keys.len(), nodes = updated.len(), "nullified keys");
        Ok(root)
    }

    /// The root the batch would produce, without staging anything.
    pub fn dry_run_nullify(&self, db: &dyn Database, keys: &[U256]) -> TreeResult<U256> {
        let (root, _) = self.compute(db, keys)?;
        Ok(root)
    }

    fn compute(&self, db: &dyn Database, keys: &[U256]) -> TreeResult<(U256, Vec<(U256, U256)>)> {
        let capacity = U256::one() << self.depth as usize;
        for key in keys {
            if *key >= capacity {
                return Err(TreeError::KeyOutOfRange(format!(
                    "nullifier {key} does not fit a depth-{} tree",
                    self.depth
                )));
            }
        }

        let mut sorted = keys.to_vec();
        sorted.sort();
        sorted.dedup();

        let existing = self.prefetch(db, &sorted)?;
        let mut updated = Vec::new();
        let root = self.update_node(U256::one(), self.depth, &sorted, &existing, &mut updated);
        Ok((root, updated))
    }

    /// One batched lookup of every node the walk can touch: the root plus
    /// the sibling of each path node.
    fn prefetch(&self, db: &dyn Database, keys: &[U256]) -> TreeResult<HashMap<U256, U256>> {
        let mut wanted = HashSet::new();
        wanted.insert(U256::one());
        for key in keys {
            let leaf_node = (U256::one() << self.depth as usize) | *key;
            for level in 0..self.depth as usize {
                wanted.insert((leaf_node >> level) ^ U256::one());
            }
        }
        let indices: Vec<String> = wanted.iter().map(|idx| idx.to_string()).collect();

        let mut existing = HashMap::with_capacity(indices.len());
        for record in db.find_tree_nodes(TreeId::Nullifier, &indices)? {
            let index = U256::from_dec_str(&record.node_index).map_err(|_| {
                TreeError::InvalidMetadata(format!("bad node index {:?}", record.node_index))
            })?;
            existing.insert(index, U256::from_repr(&record.value)?);
        }
        Ok(existing)
    }

    /// Post-order update of the subtree at `node_index` (height `level`)
    /// for the sorted keys that fall inside it.
    fn update_node(
        &self,
        node_index: U256,
        level: u32,
        keys: &[U256],
        existing: &HashMap<U256, U256>,
        updated: &mut Vec<(U256, U256)>,
    ) -> U256 {
        if keys.is_empty() {
            return existing
                .get(&node_index)
                .copied()
                .unwrap_or(self.pre_hashes[level as usize]);
        }
        if level == 0 {
            updated.push((node_index, set_bit()));
            return set_bit();
        }

        // Sorted keys split cleanly on the branch bit: within this subtree
        // all higher bits agree, so the zero-bit keys form a prefix.
        let bit = (level - 1) as usize;
        let split = keys.partition_point(|key| !key.bit(bit));
        let left = self.update_node(node_index << 1, level - 1, &keys[..split], existing, updated);
        let right = self.update_node(
            (node_index << 1) | U256::one(),
            level - 1,
            &keys[split..],
            existing,
            updated,
        );
        let parent = self.hasher.parent_of(&left, &right);
        updated.push((node_index, parent));
        parent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::Keccak256Hasher;
    use grove_store::MemoryStore;

    const DEPTH: u32 = 8;

    fn new_tree() -> NullifierTree<Keccak256Hasher> {
        NullifierTree::new(DEPTH, Keccak256Hasher)
    }

    fn nullify(tree: &NullifierTree<Keccak256Hasher>, db: &MemoryStore, keys: &[u64]) -> U256 {
        let keys: Vec<U256> = keys.iter().map(|k| U256::from(*k)).collect();
        let mut tx = StoreTransaction::new();
        let root = tree.nullify(db, &keys, &mut tx).unwrap();
        db.commit(tx).unwrap();
        root
    }

    /// Reference root: materialize all 2^DEPTH leaf bits and fold.
    fn reference_root(set_keys: &[u64]) -> U256 {
        let h = Keccak256Hasher;
        let mut level: Vec<U256> = (0..1u64 << DEPTH)
            .map(|i| {
                if set_keys.contains(&i) {
                    U256::one()
                } else {
                    U256::zero()
                }
            })
            .collect();
        while level.len() > 1 {
            level = level
                .chunks(2)
                .map(|pair| h.parent_of(&pair[0], &pair[1]))
                .collect();
        }
        level[0]
    }

    #[test]
    fn test_empty_root_is_genesis() {
        let tree = new_tree();
        let db = MemoryStore::new();
        assert_eq!(tree.root(&db).unwrap(), tree.genesis_root());
        assert_eq!(tree.genesis_root(), reference_root(&[]));
    }

    #[test]
    fn test_nullify_matches_reference() {
        let tree = new_tree();
        let db = MemoryStore::new();

        let root = nullify(&tree, &db, &[3, 200, 77]);
        assert_eq!(root, reference_root(&[3, 200, 77]));
        assert_eq!(tree.root(&db).unwrap(), root);

        let root = nullify(&tree, &db, &[5]);
        assert_eq!(root, reference_root(&[3, 5, 77, 200]));
    }

    #[test]
    fn test_nullify_is_idempotent() {
        let tree = new_tree();
        let db = MemoryStore::new();

        let first = nullify(&tree, &db, &[42, 17]);
        let again = nullify(&tree, &db, &[42]);
        assert_eq!(first, again);

        let changed = nullify(&tree, &db, &[43]);
        assert_ne!(first, changed);
    }

    #[test]
    fn test_batch_order_does_not_matter() {
        let tree = new_tree();
        let db_a = MemoryStore::new();
        let db_b = MemoryStore::new();

        let a = nullify(&tree, &db_a, &[9, 1, 200]);
        let b = nullify(&tree, &db_b, &[200, 9, 1]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_dry_run_is_pure() {
        let tree = new_tree();
        let db = MemoryStore::new();
        let committed = nullify(&tree, &db, &[11, 12]);

        // Dry run of an already-set key reports the current root.
        let dry = tree.dry_run_nullify(&db, &[U256::from(11)]).unwrap();
        assert_eq!(dry, committed);

        // Dry run of a fresh key predicts without committing.
        let predicted = tree.dry_run_nullify(&db, &[U256::from(99)]).unwrap();
        assert_eq!(predicted, reference_root(&[11, 12, 99]));
        assert_eq!(tree.root(&db).unwrap(), committed);
        assert_eq!(tree.dry_run_nullify(&db, &[]).unwrap(), committed);
    }

    #[test]
    fn test_key_out_of_range() {
        let tree = new_tree();
        let db = MemoryStore::new();
        let err = tree
            .dry_run_nullify(&db, &[U256::from(1u64 << DEPTH)])
            .unwrap_err();
        assert!(matches!(err, TreeError::KeyOutOfRange(_)));
    }
}
