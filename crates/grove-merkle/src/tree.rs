//! The append-only frontier engine.
//!
//! A [`RollupTree`] maintains the root of a depth-`D` Merkle tree holding
//! up to `2^D` leaves while keeping only `O(D)` state: the next free leaf
//! index and one "frontier" sibling per level. At level `k` the frontier
//! slot holds the most recent completed left subtree awaiting its right
//! sibling, or the empty-subtree root `Z[k]` once it has been consumed.
//!
//! Appends stage retained nodes through the shared [`TreeCache`] into the
//! caller's transaction; nothing is written to the store directly. The
//! metadata row (root, index, frontier) is staged once per batch so a
//! committed store always carries a resumable frontier.

use std::sync::Arc;

use tracing::debug;

use grove_store::{Database, StoreTransaction, TreeId, TreeMetadataRecord, TreeNodeRecord, TreeSpecies};
use primitive_types::U256;

use crate::cache::TreeCache;
use crate::error::{TreeError, TreeResult};
use crate::hasher::{MerkleHasher, PreHashes};
use crate::proof::{verify_proof, MerkleProof};
use crate::value::TreeValue;

/// Behavior switches shared by both species.
#[derive(Clone, Copy, Debug, Default)]
pub struct TreeOptions {
    /// Allow re-application of an already-seen leaf without diverging:
    /// leaf rows that already carry a committed index get overwritten
    /// instead of kept.
    pub force_update: bool,
    /// Persist every computed node, not just the retained paths, and
    /// record bootstrap rows per applied block.
    pub full_sync: bool,
}

/// A leaf as the engine sees it: the hash plus the retention decision the
/// species layer already made.
#[derive(Clone, Debug)]
pub struct EngineLeaf<T> {
    pub hash: T,
    pub track: bool,
}

/// Prospective result of appending a batch, computed without mutating
/// anything.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DryAppendResult<T> {
    pub root: T,
    pub index: u64,
}

/// In-memory frontier state, mirrored by the persisted metadata row.
#[derive(Clone, Debug)]
struct Frontier<T> {
    root: T,
    index: u64,
    siblings: Vec<T>,
    start: u64,
    end: u64,
}

/// The frontier engine for one append-only species.
pub struct RollupTree<H: MerkleHasher> {
    species: TreeSpecies,
    depth: u32,
    hasher: H,
    pre_hashes: PreHashes<H::Value>,
    frontier: Frontier<H::Value>,
    options: TreeOptions,
    cache: Arc<TreeCache>,
}

impl<H: MerkleHasher> RollupTree<H> {
    /// An empty tree: root `Z[D]`, index 0, frontier of empty-subtree
    /// roots.
    pub fn genesis(
        species: TreeSpecies,
        depth: u32,
        hasher: H,
        options: TreeOptions,
        cache: Arc<TreeCache>,
    ) -> Self {
        let pre_hashes = PreHashes::new(&hasher, depth);
        let frontier = Frontier {
            root: pre_hashes.genesis_root().clone(),
            index: 0,
            siblings: pre_hashes.frontier(),
            start: 0,
            end: 0,
        };
        Self {
            species,
            depth,
            hasher,
            pre_hashes,
            frontier,
            options,
            cache,
        }
    }

    /// Resume from a persisted metadata row.
    pub fn from_metadata(
        record: &TreeMetadataRecord,
        depth: u32,
        hasher: H,
        options: TreeOptions,
        cache: Arc<TreeCache>,
    ) -> TreeResult<Self> {
        let root = H::Value::from_repr(&record.root)?;
        let index = parse_index(&record.index)?;
        let start = parse_index(&record.start)?;
        let end = parse_index(&record.end)?;
        let sibling_strings: Vec<String> = serde_json::from_str(&record.siblings)
            .map_err(|e| TreeError::InvalidMetadata(format!("siblings column: {e}")))?;
        if sibling_strings.len() != depth as usize {
            return Err(TreeError::InvalidMetadata(format!(
                "expected {depth} siblings, found {}",
                sibling_strings.len()
            )));
        }
        let siblings = sibling_strings
            .iter()
            .map(|s| H::Value::from_repr(s))
            .collect::<Result<Vec<_>, _>>()?;

        let pre_hashes = PreHashes::new(&hasher, depth);
        Ok(Self {
            species: record.species,
            depth,
            hasher,
            pre_hashes,
            frontier: Frontier {
                root,
                index,
                siblings,
                start,
                end,
            },
            options,
            cache,
        })
    }

    /// Adopt a verified starting-leaf snapshot: the tree resumes at
    /// `index` with the supplied root and frontier.
    pub fn from_bootstrap(
        species: TreeSpecies,
        depth: u32,
        hasher: H,
        options: TreeOptions,
        cache: Arc<TreeCache>,
        root: H::Value,
        index: u64,
        siblings: Vec<H::Value>,
    ) -> Self {
        let pre_hashes = PreHashes::new(&hasher, depth);
        Self {
            species,
            depth,
            hasher,
            pre_hashes,
            frontier: Frontier {
                root,
                index,
                siblings,
                start: index,
                end: index,
            },
            options,
            cache,
        }
    }

    pub fn species(&self) -> TreeSpecies {
        self.species
    }

    pub fn tree_id(&self) -> TreeId {
        TreeId::from(self.species)
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn options(&self) -> TreeOptions {
        self.options
    }

    pub fn pre_hashes(&self) -> &PreHashes<H::Value> {
        &self.pre_hashes
    }

    pub fn root(&self) -> &H::Value {
        &self.frontier.root
    }

    /// The next free leaf index, i.e. the current leaf count.
    pub fn latest_leaf_index(&self) -> u64 {
        self.frontier.index
    }

    pub fn max_size(&self) -> u64 {
        1u64 << self.depth
    }

    /// The canonical frontier: at levels where bit `k` of the index is 0
    /// the right sibling subtree is still empty, so the persisted form
    /// carries `Z[k]` there instead of the slot's scratch value. The
    /// result doubles as the sibling vector of a starting-leaf proof at
    /// the current index.
    pub fn canonical_siblings(&self) -> Vec<H::Value> {
        self.frontier
            .siblings
            .iter()
            .enumerate()
            .map(|(level, slot)| {
                if (self.frontier.index >> level) & 1 == 1 {
                    slot.clone()
                } else {
                    self.pre_hashes[level].clone()
                }
            })
            .collect()
    }

    /// Canonical frontier in 0x-hex form, for bootstrap rows.
    pub fn siblings_hex(&self) -> Vec<String> {
        self.canonical_siblings()
            .iter()
            .map(TreeValue::to_hex)
            .collect()
    }

    /// Register an already-committed leaf as retained, so future appends
    /// keep its path provable.
    pub fn retain_leaf(&self, index: u64) {
        self.cache.retain_leaf(self.tree_id(), self.depth, index);
    }

    /// The persisted form of the current frontier.
    pub fn metadata_record(&self) -> TreeResult<TreeMetadataRecord> {
        let siblings: Vec<String> = self
            .canonical_siblings()
            .iter()
            .map(TreeValue::to_repr)
            .collect();
        let siblings = serde_json::to_string(&siblings)
            .map_err(|e| TreeError::InvalidMetadata(format!("siblings column: {e}")))?;
        Ok(TreeMetadataRecord {
            species: self.species,
            root: self.frontier.root.to_repr(),
            index: self.frontier.index.to_string(),
            siblings,
            start: self.frontier.start.to_string(),
            end: self.frontier.end.to_string(),
        })
    }

    /// Append a batch, staging retained nodes and the updated metadata row
    /// into `tx`. Fails with `TreeFull` before any mutation when the batch
    /// would exceed `2^D` leaves.
    pub fn append(
        &mut self,
        leaves: &[EngineLeaf<H::Value>],
        tx: &mut StoreTransaction,
    ) -> TreeResult<()> {
        self.check_capacity(leaves.len() as u64)?;

        for leaf in leaves {
            self.append_leaf(leaf, tx);
        }
        tx.put_tree_metadata(self.metadata_record()?);

        debug!(
            species = %self.species,
            appended = leaves.len(),
            index = self.frontier.index,
            "appended leaves"
        );
        Ok(())
    }

    /// `TreeFull` when appending `count` more leaves would overflow.
    pub fn check_capacity(&self, count: u64) -> TreeResult<()> {
        if self.frontier.index + count > self.max_size() {
            return Err(TreeError::TreeFull {
                species: self.species,
                index: self.frontier.index,
                appending: count,
                capacity: self.max_size(),
            });
        }
        Ok(())
    }

    fn append_leaf(&mut self, leaf: &EngineLeaf<H::Value>, tx: &mut StoreTransaction) {
        let index = self.frontier.index;
        let leaf_node_index = (U256::one() << self.depth as usize) + U256::from(index);
        if leaf.track {
            self.cache.retain_leaf(self.tree_id(), self.depth, index);
        }

        let mut node = leaf.hash.clone();
        for level in 0..self.depth as usize {
            let node_index = leaf_node_index >> level;
            let is_right = (index >> level) & 1 == 1;
            let sibling = if is_right {
                self.frontier.siblings[level].clone()
            } else {
                self.pre_hashes[level].clone()
            };

            self.stage_node(node_index, &node, tx);
            self.stage_node(node_index ^ U256::one(), &sibling, tx);

            node = if is_right {
                // The slot keeps the completed left subtree: later leaves
                // of this right subtree still pair against it.
                self.hasher.parent_of(&sibling, &node)
            } else {
                self.frontier.siblings[level] = node.clone();
                self.hasher.parent_of(&node, &sibling)
            };
        }
        self.stage_node(U256::one(), &node, tx);

        self.frontier.root = node;
        self.frontier.index = index + 1;
        self.frontier.end = index + 1;
    }

    fn stage_node(&self, node_index: U256, value: &H::Value, tx: &mut StoreTransaction) {
        let tree_id = self.tree_id();
        if !self.options.full_sync && !self.cache.is_of_interest(tree_id, node_index) {
            return;
        }
        let repr = value.to_repr();
        self.cache.put(tree_id, node_index, repr.clone());
        tx.upsert_tree_node(TreeNodeRecord {
            tree_id,
            node_index: node_index.to_string(),
            value: repr,
        });
    }

    /// Compute the root and next index the batch would produce, against a
    /// scratch copy of the frontier. Touches neither cache nor store.
    pub fn dry_append(&self, leaves: &[H::Value]) -> TreeResult<DryAppendResult<H::Value>> {
        self.check_capacity(leaves.len() as u64)?;

        let mut siblings = self.frontier.siblings.clone();
        let mut index = self.frontier.index;
        let mut root = self.frontier.root.clone();
        for leaf in leaves {
            let mut node = leaf.clone();
            for (level, slot) in siblings.iter_mut().enumerate() {
                let is_right = (index >> level) & 1 == 1;
                node = if is_right {
                    self.hasher.parent_of(slot, &node)
                } else {
                    *slot = node.clone();
                    self.hasher.parent_of(&node, &self.pre_hashes[level])
                };
            }
            root = node;
            index += 1;
        }
        Ok(DryAppendResult { root, index })
    }

    /// Rebuild the inclusion proof for a committed, retained leaf from the
    /// persisted nodes. Fails with `ProofUnavailable` when the path was
    /// not retained or the stored nodes are inconsistent.
    pub fn restore_proof(
        &self,
        db: &dyn Database,
        leaf: H::Value,
        index: u64,
    ) -> TreeResult<MerkleProof<H::Value>> {
        let mut siblings = self.pre_hashes.frontier();
        let mut root = None;
        for (node_index, value) in
            self.cache
                .get_cached_siblings(db, self.tree_id(), self.depth, index)?
        {
            let level = self.depth as usize + 1 - node_index.bits();
            let value = H::Value::from_repr(&value)?;
            if level == self.depth as usize {
                root = Some(value);
            } else {
                siblings[level] = value;
            }
        }

        let root = root.ok_or_else(|| {
            TreeError::ProofUnavailable(format!(
                "no committed root node for {} leaf {index}",
                self.species
            ))
        })?;
        let proof = MerkleProof {
            root,
            index,
            leaf,
            siblings,
        };
        if !verify_proof(&self.hasher, &proof) {
            return Err(TreeError::ProofUnavailable(format!(
                "retained nodes do not reproduce the {} root for leaf {index}",
                self.species
            )));
        }
        Ok(proof)
    }
}

fn parse_index(s: &str) -> TreeResult<u64> {
    s.parse::<u64>()
        .map_err(|_| TreeError::InvalidMetadata(format!("bad index string {s:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::Sha256FieldHasher;
    use crate::value::Fp;
    use grove_store::{Database, MemoryStore};

    fn new_tree(depth: u32) -> RollupTree<Sha256FieldHasher> {
        RollupTree::genesis(
            TreeSpecies::Utxo,
            depth,
            Sha256FieldHasher,
            TreeOptions::default(),
            Arc::new(TreeCache::new()),
        )
    }

    fn tracked(hash: u64) -> EngineLeaf<Fp> {
        EngineLeaf {
            hash: Fp::from(hash),
            track: true,
        }
    }

    fn untracked(hash: u64) -> EngineLeaf<Fp> {
        EngineLeaf {
            hash: Fp::from(hash),
            track: false,
        }
    }

    /// Reference root: hash the full 2^depth leaf layer.
    fn reference_root(depth: u32, leaves: &[Fp]) -> Fp {
        let h = Sha256FieldHasher;
        let mut level: Vec<Fp> = (0..1usize << depth)
            .map(|i| leaves.get(i).copied().unwrap_or(Fp::zero()))
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
    fn test_genesis_root_is_pre_hash() {
        let tree = new_tree(5);
        assert_eq!(*tree.root(), tree.pre_hashes()[5]);
        assert_eq!(tree.latest_leaf_index(), 0);
        assert_eq!(tree.max_size(), 32);
    }

    #[test]
    fn test_append_matches_reference() {
        let store = MemoryStore::new();
        let mut tree = new_tree(4);
        let leaves: Vec<Fp> = (1..=11u64).map(Fp::from).collect();

        let mut tx = grove_store::StoreTransaction::new();
        let engine_leaves: Vec<EngineLeaf<Fp>> = leaves
            .iter()
            .map(|h| EngineLeaf {
                hash: *h,
                track: false,
            })
            .collect();
        tree.append(&engine_leaves, &mut tx).unwrap();
        store.commit(tx).unwrap();

        assert_eq!(*tree.root(), reference_root(4, &leaves));
        assert_eq!(tree.latest_leaf_index(), 11);
    }

    #[test]
    fn test_dry_append_is_pure_and_exact() {
        let mut tree = new_tree(4);
        let leaves: Vec<Fp> = (1..=7u64).map(Fp::from).collect();

        let dry = tree.dry_append(&leaves).unwrap();
        assert_eq!(tree.latest_leaf_index(), 0, "dry run must not mutate");

        let mut tx = grove_store::StoreTransaction::new();
        let engine_leaves: Vec<EngineLeaf<Fp>> = leaves
            .iter()
            .map(|h| EngineLeaf {
                hash: *h,
                track: false,
            })
            .collect();
        tree.append(&engine_leaves, &mut tx).unwrap();

        assert_eq!(dry.root, *tree.root());
        assert_eq!(dry.index, tree.latest_leaf_index());
    }

    #[test]
    fn test_tree_full() {
        let mut tree = new_tree(2);
        let mut tx = grove_store::StoreTransaction::new();
        tree.append(&[tracked(1), tracked(2), tracked(3), tracked(4)], &mut tx)
            .unwrap();

        let err = tree.append(&[tracked(5)], &mut tx).unwrap_err();
        assert!(matches!(err, TreeError::TreeFull { index: 4, .. }));
        // The failed append must not have advanced the tree.
        assert_eq!(tree.latest_leaf_index(), 4);
        assert!(tree.dry_append(&[Fp::from(5u64)]).is_err());
    }

    #[test]
    fn test_metadata_roundtrip() {
        let store = MemoryStore::new();
        let mut tree = new_tree(6);
        let mut tx = grove_store::StoreTransaction::new();
        tree.append(&[untracked(9), untracked(8), untracked(7)], &mut tx)
            .unwrap();
        store.commit(tx).unwrap();

        let record = store
            .find_tree_metadata(TreeSpecies::Utxo)
            .unwrap()
            .unwrap();
        let restored = RollupTree::from_metadata(
            &record,
            6,
            Sha256FieldHasher,
            TreeOptions::default(),
            Arc::new(TreeCache::new()),
        )
        .unwrap();

        assert_eq!(restored.root(), tree.root());
        assert_eq!(restored.latest_leaf_index(), 3);

        // The restored frontier keeps producing the same roots.
        let a = tree.dry_append(&[Fp::from(1u64)]).unwrap();
        let b = restored.dry_append(&[Fp::from(1u64)]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_canonical_frontier_is_starting_leaf_proof() {
        use crate::proof::starting_leaf_proof;

        let mut tree = new_tree(4);
        let mut tx = grove_store::StoreTransaction::new();
        let leaves: Vec<EngineLeaf<Fp>> = (1..=5u64).map(untracked).collect();
        tree.append(&leaves, &mut tx).unwrap();

        // The persisted frontier proves that slot 5 and everything after
        // it is still empty.
        let proof = MerkleProof {
            root: tree.root().clone(),
            index: tree.latest_leaf_index(),
            leaf: Fp::zero(),
            siblings: tree.canonical_siblings(),
        };
        assert!(starting_leaf_proof(&Sha256FieldHasher, tree.pre_hashes(), &proof));
    }

    #[test]
    fn test_restore_proof_for_tracked_leaf() {
        let store = MemoryStore::new();
        let cache = Arc::new(TreeCache::new());
        let mut tree = RollupTree::genesis(
            TreeSpecies::Utxo,
            4,
            Sha256FieldHasher,
            TreeOptions::default(),
            cache,
        );

        // Track leaf 2; the rest are appended by other actors.
        let mut tx = grove_store::StoreTransaction::new();
        tree.append(
            &[untracked(10), untracked(11), tracked(12), untracked(13), untracked(14)],
            &mut tx,
        )
        .unwrap();
        store.commit(tx).unwrap();

        let proof = tree.restore_proof(&store, Fp::from(12u64), 2).unwrap();
        assert_eq!(proof.index, 2);
        assert_eq!(proof.root, *tree.root());
        assert!(verify_proof(&Sha256FieldHasher, &proof));
    }

    #[test]
    fn test_later_appends_keep_tracked_proof_valid() {
        let store = MemoryStore::new();
        let cache = Arc::new(TreeCache::new());
        let mut tree = RollupTree::genesis(
            TreeSpecies::Utxo,
            4,
            Sha256FieldHasher,
            TreeOptions::default(),
            cache,
        );

        let mut tx = grove_store::StoreTransaction::new();
        tree.append(&[tracked(21)], &mut tx).unwrap();
        store.commit(tx).unwrap();

        // Untracked neighbors land in the tracked leaf's sibling subtrees.
        let mut tx = grove_store::StoreTransaction::new();
        tree.append(&[untracked(22), untracked(23), untracked(24)], &mut tx)
            .unwrap();
        store.commit(tx).unwrap();

        let proof = tree.restore_proof(&store, Fp::from(21u64), 0).unwrap();
        assert_eq!(proof.root, *tree.root());
    }

    #[test]
    fn test_untracked_leaf_proof_unavailable() {
        let store = MemoryStore::new();
        let mut tree = new_tree(4);
        let mut tx = grove_store::StoreTransaction::new();
        tree.append(&[untracked(31), untracked(32)], &mut tx).unwrap();
        store.commit(tx).unwrap();

        let err = tree.restore_proof(&store, Fp::from(31u64), 0).unwrap_err();
        assert!(matches!(err, TreeError::ProofUnavailable(_)));
    }

    #[test]
    fn test_full_sync_persists_all_paths() {
        let store = MemoryStore::new();
        let cache = Arc::new(TreeCache::new());
        let mut tree = RollupTree::genesis(
            TreeSpecies::Utxo,
            3,
            Sha256FieldHasher,
            TreeOptions {
                force_update: false,
                full_sync: true,
            },
            cache,
        );

        let mut tx = grove_store::StoreTransaction::new();
        tree.append(&[untracked(41), untracked(42)], &mut tx).unwrap();
        store.commit(tx).unwrap();

        // Even untracked leaves stay provable under full sync.
        let proof = tree.restore_proof(&store, Fp::from(42u64), 1).unwrap();
        assert_eq!(proof.root, *tree.root());
    }
}
