//! Merkle inclusion proofs.
//!
//! A proof carries the committed root, the leaf index, the leaf value and
//! one sibling per level. [`verify_proof`] folds the leaf up through the
//! siblings, choosing sides by the bits of the index.
//! [`starting_leaf_proof`] additionally checks that every subtree to the
//! right of the index is still empty, which is what lets a node resume an
//! append-only tree from a trusted snapshot.

use serde::{Deserialize, Serialize};

use crate::hasher::{MerkleHasher, PreHashes};
use crate::value::TreeValue;

/// An inclusion proof for the leaf at `index`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof<T> {
    pub root: T,
    pub index: u64,
    pub leaf: T,
    /// One sibling per level, leaf level first.
    pub siblings: Vec<T>,
}

/// Fold the leaf against the siblings and compare with the root.
pub fn verify_proof<H: MerkleHasher>(hasher: &H, proof: &MerkleProof<H::Value>) -> bool {
    let mut node = proof.leaf.clone();
    for (level, sibling) in proof.siblings.iter().enumerate() {
        let is_right = (proof.index >> level) & 1 == 1;
        node = if is_right {
            hasher.parent_of(sibling, &node)
        } else {
            hasher.parent_of(&node, sibling)
        };
    }
    node == proof.root
}

/// Check that `proof` shows the leaf slot at `index` and every slot after
/// it to be empty: the leaf must be zero and, wherever bit `k` of the
/// index is 0, the sibling must be the empty-subtree root `Z[k]`.
pub fn starting_leaf_proof<H: MerkleHasher>(
    hasher: &H,
    pre_hashes: &PreHashes<H::Value>,
    proof: &MerkleProof<H::Value>,
) -> bool {
    if !proof.leaf.is_zero() {
        return false;
    }
    for (level, sibling) in proof.siblings.iter().enumerate() {
        let is_right = (proof.index >> level) & 1 == 1;
        if !is_right && *sibling != pre_hashes[level] {
            return false;
        }
    }
    verify_proof(hasher, proof)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::Sha256FieldHasher;
    use crate::value::Fp;

    fn hasher() -> Sha256FieldHasher {
        Sha256FieldHasher
    }

    /// Reference root for a depth-3 tree with the given leaves, the rest
    /// empty.
    fn reference_root(leaves: &[Fp]) -> Fp {
        let h = hasher();
        let mut level: Vec<Fp> = (0..8)
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

    fn proof_for(leaves: &[Fp], index: u64) -> MerkleProof<Fp> {
        let h = hasher();
        let mut nodes: Vec<Fp> = (0..8)
            .map(|i| leaves.get(i).copied().unwrap_or(Fp::zero()))
            .collect();
        let mut siblings = Vec::new();
        let mut idx = index as usize;
        while nodes.len() > 1 {
            siblings.push(nodes[idx ^ 1]);
            nodes = nodes
                .chunks(2)
                .map(|pair| h.parent_of(&pair[0], &pair[1]))
                .collect();
            idx /= 2;
        }
        MerkleProof {
            root: nodes[0],
            index,
            leaf: leaves.get(index as usize).copied().unwrap_or(Fp::zero()),
            siblings,
        }
    }

    #[test]
    fn test_verify_roundtrip() {
        let leaves: Vec<Fp> = (1..=5u64).map(Fp::from).collect();
        for index in 0..5 {
            let proof = proof_for(&leaves, index);
            assert_eq!(proof.root, reference_root(&leaves));
            assert!(verify_proof(&hasher(), &proof), "index {index}");
        }
    }

    #[test]
    fn test_verify_rejects_wrong_leaf() {
        let leaves: Vec<Fp> = (1..=4u64).map(Fp::from).collect();
        let mut proof = proof_for(&leaves, 2);
        proof.leaf = Fp::from(99u64);
        assert!(!verify_proof(&hasher(), &proof));
    }

    #[test]
    fn test_verify_rejects_wrong_index() {
        let leaves: Vec<Fp> = (1..=4u64).map(Fp::from).collect();
        let mut proof = proof_for(&leaves, 2);
        proof.index = 3;
        assert!(!verify_proof(&hasher(), &proof));
    }

    #[test]
    fn test_starting_leaf_proof_accepts_frontier() {
        let h = hasher();
        let pre = PreHashes::new(&h, 3);
        // Three leaves appended; slot 3 and everything after is empty.
        let leaves: Vec<Fp> = (1..=3u64).map(Fp::from).collect();
        let proof = proof_for(&leaves, 3);
        assert!(starting_leaf_proof(&h, &pre, &proof));
    }

    #[test]
    fn test_starting_leaf_proof_rejects_occupied_right_side() {
        let h = hasher();
        let pre = PreHashes::new(&h, 3);
        // Leaf 5 is occupied, so slot 3 does not start the empty region.
        let leaves: Vec<Fp> = (1..=6u64).map(Fp::from).collect();
        let mut proof = proof_for(&leaves, 3);
        proof.leaf = Fp::zero();
        assert!(!starting_leaf_proof(&h, &pre, &proof));
    }

    #[test]
    fn test_starting_leaf_proof_rejects_nonzero_leaf() {
        let h = hasher();
        let pre = PreHashes::new(&h, 3);
        let leaves: Vec<Fp> = (1..=4u64).map(Fp::from).collect();
        let proof = proof_for(&leaves, 3);
        // Slot 3 holds leaf value 4.
        assert!(!starting_leaf_proof(&h, &pre, &proof));
    }
}
