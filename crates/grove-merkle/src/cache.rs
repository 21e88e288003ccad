//! Retained-node cache.
//!
//! The forest never materializes its trees. To still serve proofs for
//! leaves the node cares about, every append stages the internal nodes
//! that future proofs of those leaves will need — into this cache and into
//! the same transaction that appends the leaves.
//!
//! # Design
//!
//! For each retained leaf the cache records the set of node indices "of
//! interest": the leaf's ancestors and each ancestor's sibling. During an
//! append, a freshly computed node is staged iff its index is of interest;
//! this covers both the retained leaf's own path and later appends that
//! land in one of its sibling subtrees and would otherwise silently
//! invalidate the persisted siblings.
//!
//! Node values are held in their canonical string form so one cache can
//! serve trees over different value types. Lookups fall back to the store
//! with a single batched query for the misses.

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;
use grove_store::{Database, StoreResult, TreeId};
use parking_lot::RwLock;
use primitive_types::U256;

/// Shared cache of retained internal nodes, keyed by `(tree, node index)`.
#[derive(Default)]
pub struct TreeCache {
    nodes: DashMap<(TreeId, U256), String>,
    interest: RwLock<HashMap<TreeId, HashSet<U256>>>,
}

impl TreeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a leaf whose path must stay provable: marks its ancestors
    /// and their siblings as of interest for all future appends.
    pub fn retain_leaf(&self, tree_id: TreeId, depth: u32, leaf_index: u64) {
        let leaf_node = (U256::one() << depth as usize) + U256::from(leaf_index);
        let mut interest = self.interest.write();
        let set = interest.entry(tree_id).or_default();
        for level in 0..=depth as usize {
            let ancestor = leaf_node >> level;
            set.insert(ancestor);
            if level < depth as usize {
                set.insert(ancestor ^ U256::one());
            }
        }
    }

    /// Whether a node computed during an append must be staged.
    pub fn is_of_interest(&self, tree_id: TreeId, node_index: U256) -> bool {
        self.interest
            .read()
            .get(&tree_id)
            .is_some_and(|set| set.contains(&node_index))
    }

    /// Number of retained-leaf path nodes registered for a tree.
    pub fn interest_len(&self, tree_id: TreeId) -> usize {
        self.interest
            .read()
            .get(&tree_id)
            .map_or(0, |set| set.len())
    }

    pub fn put(&self, tree_id: TreeId, node_index: U256, value: String) {
        self.nodes.insert((tree_id, node_index), value);
    }

    pub fn get(&self, tree_id: TreeId, node_index: U256) -> Option<String> {
        self.nodes
            .get(&(tree_id, node_index))
            .map(|entry| entry.value().clone())
    }

    /// The sibling nodes needed to verify `leaf_index`, one per level,
    /// plus the root node (index 1) which carries the committed root.
    ///
    /// Draws from the cache first and falls back to one batched store
    /// lookup; indices with no retained node are simply absent from the
    /// result (their subtrees are empty).
    pub fn get_cached_siblings(
        &self,
        db: &dyn Database,
        tree_id: TreeId,
        depth: u32,
        leaf_index: u64,
    ) -> StoreResult<Vec<(U256, String)>> {
        let leaf_node = (U256::one() << depth as usize) + U256::from(leaf_index);
        let mut wanted: Vec<U256> = (0..depth as usize)
            .map(|level| (leaf_node >> level) ^ U256::one())
            .collect();
        wanted.push(U256::one());

        let mut found = Vec::with_capacity(wanted.len());
        let mut misses = Vec::new();
        for index in wanted {
            match self.get(tree_id, index) {
                Some(value) => found.push((index, value)),
                None => misses.push(index.to_string()),
            }
        }

        if !misses.is_empty() {
            for record in db.find_tree_nodes(tree_id, &misses)? {
                let index = U256::from_dec_str(&record.node_index).map_err(|_| {
                    grove_store::StoreError::Serialization(format!(
                        "bad node index {:?}",
                        record.node_index
                    ))
                })?;
                found.push((index, record.value));
            }
        }
        Ok(found)
    }
}
