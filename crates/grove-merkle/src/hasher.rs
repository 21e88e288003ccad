//! Hashers and pre-hash tables.
//!
//! A [`MerkleHasher`] is a pure binary hash over a tree value type. The
//! [`PreHashes`] table holds the roots of empty subtrees of every height:
//! `Z[0]` is the zero value and `Z[k+1] = H(Z[k], Z[k])`, so `Z[D]` is the
//! genesis root of an empty depth-`D` tree.
//!
//! The built-in hashers keep the crate self-contained: a sha2-based field
//! hasher and a keccak256 hasher for the 256-bit integer space. A rollup
//! deployment swaps in its circuit hasher (e.g. Poseidon) through the same
//! trait.

use sha2::{Digest, Sha256};
use tiny_keccak::{Hasher as _, Keccak};

use crate::value::{Fp, TreeValue, U256};

/// A pure binary hash over the tree's value type.
pub trait MerkleHasher: Send + Sync {
    type Value: TreeValue;

    fn parent_of(&self, left: &Self::Value, right: &Self::Value) -> Self::Value;
}

/// Precomputed empty-subtree roots `Z[0..=depth]`.
#[derive(Clone, Debug)]
pub struct PreHashes<T> {
    values: Vec<T>,
}

impl<T: TreeValue> PreHashes<T> {
    /// Compute the table for a tree of the given depth.
    pub fn new<H: MerkleHasher<Value = T>>(hasher: &H, depth: u32) -> Self {
        let mut values = Vec::with_capacity(depth as usize + 1);
        values.push(T::zero());
        for level in 0..depth as usize {
            let parent = hasher.parent_of(&values[level], &values[level]);
            values.push(parent);
        }
        Self { values }
    }

    /// The root of an empty tree of the full depth.
    pub fn genesis_root(&self) -> &T {
        &self.values[self.values.len() - 1]
    }

    pub fn depth(&self) -> u32 {
        (self.values.len() - 1) as u32
    }

    /// Empty-subtree roots for levels `0..depth`, i.e. the initial frontier.
    pub fn frontier(&self) -> Vec<T> {
        self.values[..self.values.len() - 1].to_vec()
    }
}

impl<T> std::ops::Index<usize> for PreHashes<T> {
    type Output = T;

    fn index(&self, level: usize) -> &T {
        &self.values[level]
    }
}

fn be_bytes(value: &U256) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    bytes
}

/// SHA-256 compressed into the note commitment field.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256FieldHasher;

impl MerkleHasher for Sha256FieldHasher {
    type Value = Fp;

    fn parent_of(&self, left: &Fp, right: &Fp) -> Fp {
        let mut hasher = Sha256::new();
        hasher.update(left.to_be_bytes());
        hasher.update(right.to_be_bytes());
        let digest = hasher.finalize();
        Fp::new(U256::from_big_endian(&digest))
    }
}

/// Keccak256 over big-endian 256-bit words.
#[derive(Clone, Copy, Debug, Default)]
pub struct Keccak256Hasher;

impl MerkleHasher for Keccak256Hasher {
    type Value = U256;

    fn parent_of(&self, left: &U256, right: &U256) -> U256 {
        let mut hasher = Keccak::v256();
        hasher.update(&be_bytes(left));
        hasher.update(&be_bytes(right));
        let mut output = [0u8; 32];
        hasher.finalize(&mut output);
        U256::from_big_endian(&output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pre_hash_chain() {
        let hasher = Sha256FieldHasher;
        let pre = PreHashes::new(&hasher, 4);

        assert_eq!(pre.depth(), 4);
        assert_eq!(pre[0], Fp::zero());
        for level in 0..4 {
            assert_eq!(pre[level + 1], hasher.parent_of(&pre[level], &pre[level]));
        }
        assert_eq!(*pre.genesis_root(), pre[4]);
    }

    #[test]
    fn test_frontier_excludes_genesis_root() {
        let hasher = Keccak256Hasher;
        let pre = PreHashes::new(&hasher, 3);
        let frontier = pre.frontier();
        assert_eq!(frontier.len(), 3);
        assert_eq!(frontier[2], pre[2]);
    }

    #[test]
    fn test_field_hasher_stays_in_field() {
        let hasher = Sha256FieldHasher;
        let parent = hasher.parent_of(&Fp::from(1u64), &Fp::from(2u64));
        assert!(parent.into_u256() < Fp::modulus());
    }

    #[test]
    fn test_hashers_are_position_sensitive() {
        let hasher = Keccak256Hasher;
        let a = U256::from(1);
        let b = U256::from(2);
        assert_ne!(hasher.parent_of(&a, &b), hasher.parent_of(&b, &a));
    }
}
