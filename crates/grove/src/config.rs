//! Grove configuration.

use grove_merkle::{Keccak256Hasher, MerkleHasher, Sha256FieldHasher, TreeOptions};

use crate::error::{GroveError, GroveResult};
use crate::patch::{EthAddress, ZkAddress};

/// Default batching quantum for both append-only trees.
pub const DEFAULT_SUB_TREE_SIZE: usize = 32;

/// Default depth of the nullifier key space.
pub const DEFAULT_NULLIFIER_TREE_DEPTH: u32 = 254;

/// Rollup tree depths must keep leaf counts addressable as `u64`.
const MAX_ROLLUP_TREE_DEPTH: u32 = 62;

/// Configuration of a grove, parameterized over the three hashers so each
/// species monomorphizes against its own.
#[derive(Clone, Debug)]
pub struct GroveConfig<UH, WH, NH>
where
    UH: MerkleHasher,
    WH: MerkleHasher,
    NH: MerkleHasher,
{
    pub utxo_tree_depth: u32,
    pub withdrawal_tree_depth: u32,
    /// `None` runs a light node without a nullifier tree.
    pub nullifier_tree_depth: Option<u32>,
    /// Applied patches are padded to this many UTXO leaves.
    pub utxo_sub_tree_size: usize,
    pub withdrawal_sub_tree_size: usize,
    pub utxo_hasher: UH,
    pub withdrawal_hasher: WH,
    pub nullifier_hasher: NH,
    /// Record bootstrap rows and persist full node paths.
    pub full_sync: bool,
    /// Allow re-application of an already-seen patch without diverging.
    pub force_update: bool,
    pub zk_addresses_to_observe: Vec<ZkAddress>,
    pub addresses_to_observe: Vec<EthAddress>,
}

/// The configuration wired to the built-in hashers.
pub type StandardGroveConfig = GroveConfig<Sha256FieldHasher, Keccak256Hasher, Keccak256Hasher>;

impl StandardGroveConfig {
    /// A full-node configuration over the built-in hashers.
    pub fn standard(utxo_tree_depth: u32, withdrawal_tree_depth: u32) -> Self {
        Self {
            utxo_tree_depth,
            withdrawal_tree_depth,
            nullifier_tree_depth: Some(DEFAULT_NULLIFIER_TREE_DEPTH),
            utxo_sub_tree_size: DEFAULT_SUB_TREE_SIZE,
            withdrawal_sub_tree_size: DEFAULT_SUB_TREE_SIZE,
            utxo_hasher: Sha256FieldHasher,
            withdrawal_hasher: Keccak256Hasher,
            nullifier_hasher: Keccak256Hasher,
            full_sync: false,
            force_update: false,
            zk_addresses_to_observe: Vec::new(),
            addresses_to_observe: Vec::new(),
        }
    }
}

impl<UH, WH, NH> GroveConfig<UH, WH, NH>
where
    UH: MerkleHasher,
    WH: MerkleHasher,
    NH: MerkleHasher,
{
    pub fn validate(&self) -> GroveResult<()> {
        for (name, depth) in [
            ("utxo_tree_depth", self.utxo_tree_depth),
            ("withdrawal_tree_depth", self.withdrawal_tree_depth),
        ] {
            if depth == 0 || depth > MAX_ROLLUP_TREE_DEPTH {
                return Err(GroveError::Config(format!(
                    "{name} must be in 1..={MAX_ROLLUP_TREE_DEPTH}, got {depth}"
                )));
            }
        }
        if let Some(depth) = self.nullifier_tree_depth {
            if depth == 0 || depth > 255 {
                return Err(GroveError::Config(format!(
                    "nullifier_tree_depth must be in 1..=255, got {depth}"
                )));
            }
        }
        for (name, size, depth) in [
            ("utxo_sub_tree_size", self.utxo_sub_tree_size, self.utxo_tree_depth),
            (
                "withdrawal_sub_tree_size",
                self.withdrawal_sub_tree_size,
                self.withdrawal_tree_depth,
            ),
        ] {
            if size == 0 || !size.is_power_of_two() {
                return Err(GroveError::Config(format!(
                    "{name} must be a power of two, got {size}"
                )));
            }
            if size as u64 > 1u64 << depth {
                return Err(GroveError::Config(format!(
                    "{name} {size} exceeds the tree capacity 2^{depth}"
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn tree_options(&self) -> TreeOptions {
        TreeOptions {
            force_update: self.force_update,
            full_sync: self.full_sync,
        }
    }
}
