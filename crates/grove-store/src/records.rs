//! Row types for the forest's persisted tables.
//!
//! Every value column is a canonical string (base-10 or `0x`-hex) so that
//! the store does not depend on the tree value types. The tree layer owns
//! encoding and decoding.

use serde::{Deserialize, Serialize};

/// The two append-only tree species persisted in the `light_trees` table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub enum TreeSpecies {
    Utxo,
    Withdrawal,
}

impl TreeSpecies {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Utxo => "UTXO",
            Self::Withdrawal => "WITHDRAWAL",
        }
    }
}

impl std::fmt::Display for TreeSpecies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies which tree a `tree_nodes` row belongs to.
///
/// The nullifier tree has no `light_trees` row; its root lives at node
/// index 1 of its own `tree_nodes` namespace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub enum TreeId {
    Utxo,
    Withdrawal,
    Nullifier,
}

impl TreeId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Utxo => "utxo",
            Self::Withdrawal => "withdrawal",
            Self::Nullifier => "nullifier",
        }
    }
}

impl From<TreeSpecies> for TreeId {
    fn from(species: TreeSpecies) -> Self {
        match species {
            TreeSpecies::Utxo => TreeId::Utxo,
            TreeSpecies::Withdrawal => TreeId::Withdrawal,
        }
    }
}

/// One row per species: the committed root, next free leaf index and the
/// frontier needed to resume appending.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TreeMetadataRecord {
    pub species: TreeSpecies,
    /// Canonical string form of the committed root.
    pub root: String,
    /// Next free leaf index (current leaf count), base-10.
    pub index: String,
    /// JSON array of canonical sibling strings, one per level.
    pub siblings: String,
    /// First leaf index resident in this row, base-10.
    pub start: String,
    /// One past the last appended leaf index, base-10.
    pub end: String,
}

/// A retained internal node. `node_index` is the heap-style index
/// (root = 1, children of n are 2n and 2n+1), base-10.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TreeNodeRecord {
    pub tree_id: TreeId,
    pub node_index: String,
    pub value: String,
}

/// A note commitment leaf. `index` is set once the leaf lands in a
/// committed block; `owner` carries the observing zk-address, when known.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct UtxoRecord {
    /// Base-10 string of the note commitment.
    pub hash: String,
    /// Committed leaf index, base-10.
    pub index: Option<String>,
    pub owner: Option<String>,
}

/// A withdrawal leaf, keyed by its 0x-hex withdrawal hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct WithdrawalRecord {
    pub withdrawal_hash: String,
    /// Committed leaf index, base-10.
    pub index: Option<String>,
    /// Recipient address (lowercased 0x-hex), when known.
    pub recipient: Option<String>,
}

/// Frontier snapshot recorded per applied block in full-sync mode, used to
/// hand a resume point to bootstrapping peers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct BootstrapRecord {
    pub block_hash: Option<String>,
    /// JSON array of hex sibling strings for the UTXO tree.
    pub utxo_bootstrap: String,
    /// JSON array of hex sibling strings for the withdrawal tree.
    pub withdrawal_bootstrap: String,
}

/// Minimal block row ensured alongside a keyed bootstrap record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct BlockRecord {
    pub hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_species_display() {
        assert_eq!(TreeSpecies::Utxo.to_string(), "UTXO");
        assert_eq!(TreeSpecies::Withdrawal.to_string(), "WITHDRAWAL");
    }

    #[test]
    fn test_tree_id_from_species() {
        assert_eq!(TreeId::from(TreeSpecies::Utxo), TreeId::Utxo);
        assert_eq!(TreeId::from(TreeSpecies::Withdrawal), TreeId::Withdrawal);
        assert_eq!(TreeId::Nullifier.as_str(), "nullifier");
    }
}
