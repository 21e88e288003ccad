//! Patch, snapshot and bootstrap value types.
//!
//! A [`GrovePatch`] is what one applied block contributes to the forest:
//! new note commitments, new withdrawal hashes and the nullifiers spent by
//! the block. A [`GroveSnapshot`] is the forest's commitment summary,
//! either of the current state or of a prospective patch.

use serde::{Deserialize, Serialize};

use grove_merkle::{Fp, MerkleProof, U256};

/// A shielded-pool address, in its canonical string encoding.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZkAddress(String);

impl ZkAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ZkAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An Ethereum-style address, normalized to lowercase hex.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EthAddress(String);

impl EthAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EthAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A note commitment entering the UTXO tree, with enough plaintext to
/// decide whether its path should be retained.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoLeaf {
    pub hash: Fp,
    pub owner: Option<ZkAddress>,
    /// Force retention regardless of the observation policy; set by the
    /// owning wallet for self-minted notes.
    pub should_track: bool,
}

impl UtxoLeaf {
    pub fn new(hash: Fp) -> Self {
        Self {
            hash,
            owner: None,
            should_track: false,
        }
    }

    /// A zero padding leaf.
    pub fn empty() -> Self {
        Self::new(Fp::zero())
    }

    pub fn owned_by(mut self, owner: ZkAddress) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn tracked(mut self) -> Self {
        self.should_track = true;
        self
    }
}

/// A withdrawal hash entering the withdrawal tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalLeaf {
    pub withdrawal_hash: U256,
    pub recipient: Option<EthAddress>,
    pub should_track: bool,
}

impl WithdrawalLeaf {
    pub fn new(withdrawal_hash: U256) -> Self {
        Self {
            withdrawal_hash,
            recipient: None,
            should_track: false,
        }
    }

    pub fn empty() -> Self {
        Self::new(U256::zero())
    }

    pub fn to_recipient(mut self, recipient: EthAddress) -> Self {
        self.recipient = Some(recipient);
        self
    }

    pub fn tracked(mut self) -> Self {
        self.should_track = true;
        self
    }
}

/// Everything one block contributes to the forest.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GrovePatch {
    /// Block hash of the header this patch came from, when known.
    pub header: Option<String>,
    pub utxos: Vec<UtxoLeaf>,
    pub withdrawals: Vec<WithdrawalLeaf>,
    pub nullifiers: Vec<U256>,
}

/// Commitment summary of the forest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroveSnapshot {
    pub utxo_tree_index: u64,
    pub utxo_tree_root: Fp,
    pub withdrawal_tree_index: u64,
    pub withdrawal_tree_root: U256,
    /// Absent on light nodes that keep no nullifier tree.
    pub nullifier_tree_root: Option<U256>,
}

/// Starting-leaf proofs handed over by a trusted peer to resume both
/// append-only trees from a snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BootstrapProofs {
    pub utxo_proof: MerkleProof<Fp>,
    pub withdrawal_proof: MerkleProof<U256>,
}

/// Pad a batch to the next multiple of `quantum` with `empty` leaves.
pub(crate) fn pad_leaves<L: Clone>(leaves: &[L], quantum: usize, empty: L) -> Vec<L> {
    let target = leaves.len().div_ceil(quantum) * quantum;
    let mut padded = leaves.to_vec();
    padded.resize(target, empty);
    padded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_leaves() {
        let padded = pad_leaves(&[1, 2, 3], 4, 0);
        assert_eq!(padded, vec![1, 2, 3, 0]);

        // Already aligned batches and empty batches stay as they are.
        assert_eq!(pad_leaves(&[1, 2, 3, 4], 4, 0).len(), 4);
        assert!(pad_leaves(&[] as &[i32], 4, 0).is_empty());
    }

    #[test]
    fn test_eth_address_normalized() {
        let addr = EthAddress::new("0xAbCd");
        assert_eq!(addr.as_str(), "0xabcd");
    }

    #[test]
    fn test_leaf_builders() {
        let leaf = UtxoLeaf::new(Fp::from(7u64))
            .owned_by(ZkAddress::new("zk1"))
            .tracked();
        assert!(leaf.should_track);
        assert_eq!(leaf.owner.unwrap().as_str(), "zk1");
        assert!(UtxoLeaf::empty().hash == Fp::zero());
    }
}
