//! The storage contract consumed by the forest.

use crate::batch::StoreTransaction;
use crate::error::StoreResult;
use crate::records::{
    BootstrapRecord, TreeId, TreeMetadataRecord, TreeNodeRecord, TreeSpecies, UtxoRecord,
    WithdrawalRecord,
};

/// The only persistence interface the forest depends on.
///
/// Reads are point lookups or small batched lookups; every write goes
/// through [`StoreTransaction`] and lands atomically in [`Self::commit`].
/// Implementations must be safe to share across threads; the forest
/// serializes writers itself.
pub trait Database: Send + Sync {
    /// Metadata row for a species, if one has been persisted.
    fn find_tree_metadata(&self, species: TreeSpecies) -> StoreResult<Option<TreeMetadataRecord>>;

    /// Batched lookup of retained nodes by base-10 node index.
    ///
    /// Missing indices are simply absent from the result; the order of the
    /// returned rows is unspecified.
    fn find_tree_nodes(
        &self,
        tree_id: TreeId,
        node_indices: &[String],
    ) -> StoreResult<Vec<TreeNodeRecord>>;

    /// UTXO leaf row by base-10 commitment string.
    fn find_utxo(&self, hash: &str) -> StoreResult<Option<UtxoRecord>>;

    /// Withdrawal leaf row by 0x-hex withdrawal hash.
    fn find_withdrawal(&self, withdrawal_hash: &str) -> StoreResult<Option<WithdrawalRecord>>;

    /// All UTXO rows whose owner is in `owners`. Used to rebuild the
    /// retained-leaf index at startup.
    fn find_utxos_owned_by(&self, owners: &[String]) -> StoreResult<Vec<UtxoRecord>>;

    /// All withdrawal rows whose recipient is in `recipients`.
    fn find_withdrawals_owned_by(&self, recipients: &[String])
        -> StoreResult<Vec<WithdrawalRecord>>;

    /// Bootstrap row recorded for a block hash.
    fn find_bootstrap(&self, block_hash: &str) -> StoreResult<Option<BootstrapRecord>>;

    /// Apply a staged batch atomically. Either every op lands or none do.
    fn commit(&self, tx: StoreTransaction) -> StoreResult<()>;
}
