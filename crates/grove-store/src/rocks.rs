//! RocksDB implementation of the storage contract.
//!
//! One column family per logical table. Rows are bincode-encoded record
//! structs; keys are the natural unique key of each table. Batched writes
//! go through a single `WriteBatch` so a commit is atomic.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rocksdb::{IteratorMode, WriteBatch, DB};
use tracing::info;

use crate::batch::{StoreTransaction, WriteOp};
use crate::db::Database;
use crate::error::{StoreError, StoreResult};
use crate::records::{
    BootstrapRecord, TreeId, TreeMetadataRecord, TreeNodeRecord, TreeSpecies, UtxoRecord,
    WithdrawalRecord,
};

/// Key prefix for bootstrap rows recorded without a block hash.
const ANONYMOUS_BOOTSTRAP_PREFIX: &str = "anon/";

/// Column families used by the forest store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnFamily {
    LightTrees,
    TreeNodes,
    Utxos,
    Withdrawals,
    Bootstraps,
    Blocks,
}

impl ColumnFamily {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LightTrees => "light_trees",
            Self::TreeNodes => "tree_nodes",
            Self::Utxos => "utxos",
            Self::Withdrawals => "withdrawals",
            Self::Bootstraps => "bootstraps",
            Self::Blocks => "blocks",
        }
    }

    pub fn all() -> Vec<Self> {
        vec![
            Self::LightTrees,
            Self::TreeNodes,
            Self::Utxos,
            Self::Withdrawals,
            Self::Bootstraps,
            Self::Blocks,
        ]
    }

    pub fn descriptors() -> Vec<rocksdb::ColumnFamilyDescriptor> {
        Self::all()
            .into_iter()
            .map(|cf| {
                let mut opts = rocksdb::Options::default();
                if cf == Self::TreeNodes {
                    // The node table dominates both reads and writes.
                    opts.set_write_buffer_size(64 * 1024 * 1024);
                    opts.set_max_write_buffer_number(4);
                }
                rocksdb::ColumnFamilyDescriptor::new(cf.name(), opts)
            })
            .collect()
    }
}

/// Configuration for the RocksDB backend.
#[derive(Debug, Clone)]
pub struct RocksStoreConfig {
    /// Path to the RocksDB directory
    pub path: PathBuf,

    /// Maximum number of open files
    pub max_open_files: i32,

    /// Size of write buffer in bytes
    pub write_buffer_size: usize,
}

impl Default for RocksStoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./grove_db"),
            max_open_files: 10_000,
            write_buffer_size: 64 * 1024 * 1024,
        }
    }
}

impl RocksStoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    fn to_options(&self) -> rocksdb::Options {
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(self.max_open_files);
        opts.set_write_buffer_size(self.write_buffer_size);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }
}

/// A RocksDB-backed [`Database`].
pub struct RocksStore {
    db: Arc<DB>,
    anonymous_seq: AtomicU64,
}

impl RocksStore {
    /// Open or create a database at the configured path.
    pub fn open(config: RocksStoreConfig) -> StoreResult<Self> {
        let opts = config.to_options();
        let db = DB::open_cf_descriptors(&opts, &config.path, ColumnFamily::descriptors())?;
        let store = Self {
            db: Arc::new(db),
            anonymous_seq: AtomicU64::new(0),
        };
        let next = store.count_anonymous_bootstraps()?;
        store.anonymous_seq.store(next, Ordering::SeqCst);
        info!(path = %config.path.display(), "opened grove store");
        Ok(store)
    }

    /// Open with default options.
    pub fn open_default(path: impl Into<PathBuf>) -> StoreResult<Self> {
        Self::open(RocksStoreConfig::new(path))
    }

    fn cf(&self, cf: ColumnFamily) -> StoreResult<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(cf.name())
            .ok_or_else(|| StoreError::SchemaMismatch(format!("missing column family {}", cf.name())))
    }

    fn encode<V: bincode::Encode>(value: &V) -> StoreResult<Vec<u8>> {
        Ok(bincode::encode_to_vec(value, bincode::config::standard())?)
    }

    fn decode<V: bincode::Decode<()>>(bytes: &[u8]) -> StoreResult<V> {
        let (value, _) = bincode::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(value)
    }

    fn get_record<V: bincode::Decode<()>>(
        &self,
        cf: ColumnFamily,
        key: &[u8],
    ) -> StoreResult<Option<V>> {
        match self.db.get_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn node_key(tree_id: TreeId, node_index: &str) -> Vec<u8> {
        format!("{}/{}", tree_id.as_str(), node_index).into_bytes()
    }

    fn count_anonymous_bootstraps(&self) -> StoreResult<u64> {
        let cf = self.cf(ColumnFamily::Bootstraps)?;
        let mut count = 0u64;
        for item in self
            .db
            .prefix_iterator_cf(cf, ANONYMOUS_BOOTSTRAP_PREFIX.as_bytes())
        {
            let (key, _) = item?;
            if !key.starts_with(ANONYMOUS_BOOTSTRAP_PREFIX.as_bytes()) {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    fn scan_filter<V, F>(&self, cf: ColumnFamily, keep: F) -> StoreResult<Vec<V>>
    where
        V: bincode::Decode<()>,
        F: Fn(&V) -> bool,
    {
        let handle = self.cf(cf)?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(handle, IteratorMode::Start) {
            let (_, bytes) = item?;
            let record: V = Self::decode(&bytes)?;
            if keep(&record) {
                out.push(record);
            }
        }
        Ok(out)
    }
}

impl Database for RocksStore {
    fn find_tree_metadata(&self, species: TreeSpecies) -> StoreResult<Option<TreeMetadataRecord>> {
        self.get_record(ColumnFamily::LightTrees, species.as_str().as_bytes())
    }

    fn find_tree_nodes(
        &self,
        tree_id: TreeId,
        node_indices: &[String],
    ) -> StoreResult<Vec<TreeNodeRecord>> {
        let handle = self.cf(ColumnFamily::TreeNodes)?;
        let keys: Vec<Vec<u8>> = node_indices
            .iter()
            .map(|idx| Self::node_key(tree_id, idx))
            .collect();
        let results = self
            .db
            .multi_get_cf(keys.iter().map(|k| (handle, k.as_slice())));

        let mut found = Vec::new();
        for result in results {
            if let Some(bytes) = result? {
                found.push(Self::decode(&bytes)?);
            }
        }
        Ok(found)
    }

    fn find_utxo(&self, hash: &str) -> StoreResult<Option<UtxoRecord>> {
        self.get_record(ColumnFamily::Utxos, hash.as_bytes())
    }

    fn find_withdrawal(&self, withdrawal_hash: &str) -> StoreResult<Option<WithdrawalRecord>> {
        self.get_record(ColumnFamily::Withdrawals, withdrawal_hash.as_bytes())
    }

    fn find_utxos_owned_by(&self, owners: &[String]) -> StoreResult<Vec<UtxoRecord>> {
        self.scan_filter(ColumnFamily::Utxos, |u: &UtxoRecord| {
            u.owner.as_ref().is_some_and(|o| owners.contains(o))
        })
    }

    fn find_withdrawals_owned_by(
        &self,
        recipients: &[String],
    ) -> StoreResult<Vec<WithdrawalRecord>> {
        self.scan_filter(ColumnFamily::Withdrawals, |w: &WithdrawalRecord| {
            w.recipient.as_ref().is_some_and(|r| recipients.contains(r))
        })
    }

    fn find_bootstrap(&self, block_hash: &str) -> StoreResult<Option<BootstrapRecord>> {
        self.get_record(ColumnFamily::Bootstraps, block_hash.as_bytes())
    }

    fn commit(&self, tx: StoreTransaction) -> StoreResult<()> {
        let mut batch = WriteBatch::default();
        for op in tx.into_ops() {
            match op {
                WriteOp::PutTreeMetadata(record) => {
                    batch.put_cf(
                        self.cf(ColumnFamily::LightTrees)?,
                        record.species.as_str().as_bytes(),
                        Self::encode(&record)?,
                    );
                }
                WriteOp::UpsertTreeNode(record) => {
                    batch.put_cf(
                        self.cf(ColumnFamily::TreeNodes)?,
                        Self::node_key(record.tree_id, &record.node_index),
                        Self::encode(&record)?,
                    );
                }
                WriteOp::UpsertUtxo(record) => {
                    batch.put_cf(
                        self.cf(ColumnFamily::Utxos)?,
                        record.hash.as_bytes().to_vec(),
                        Self::encode(&record)?,
                    );
                }
                WriteOp::UpsertWithdrawal(record) => {
                    batch.put_cf(
                        self.cf(ColumnFamily::Withdrawals)?,
                        record.withdrawal_hash.as_bytes().to_vec(),
                        Self::encode(&record)?,
                    );
                }
                WriteOp::CreateBootstrap(record) => {
                    let key = match &record.block_hash {
                        Some(hash) => hash.as_bytes().to_vec(),
                        None => {
                            let seq = self.anonymous_seq.fetch_add(1, Ordering::SeqCst);
                            format!("{ANONYMOUS_BOOTSTRAP_PREFIX}{seq:020}").into_bytes()
                        }
                    };
                    batch.put_cf(self.cf(ColumnFamily::Bootstraps)?, key, Self::encode(&record)?);
                }
                WriteOp::EnsureBlock(record) => {
                    let bytes = Self::encode(&record)?;
                    batch.put_cf(
                        self.cf(ColumnFamily::Blocks)?,
                        record.hash.as_bytes(),
                        bytes,
                    );
                }
            }
        }
        self.db.write(batch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = RocksStore::open_default(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_metadata_roundtrip() {
        let (store, _temp_dir) = create_test_store();
        let record = TreeMetadataRecord {
            species: TreeSpecies::Utxo,
            root: "7".into(),
            index: "2".into(),
            siblings: "[\"1\",\"2\"]".into(),
            start: "0".into(),
            end: "2".into(),
        };

        let mut tx = StoreTransaction::new();
        tx.put_tree_metadata(record.clone());
        store.commit(tx).unwrap();

        assert_eq!(
            store.find_tree_metadata(TreeSpecies::Utxo).unwrap(),
            Some(record)
        );
        assert!(store
            .find_tree_metadata(TreeSpecies::Withdrawal)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_node_batch_lookup() {
        let (store, _temp_dir) = create_test_store();
        let mut tx = StoreTransaction::new();
        for (idx, value) in [("4", "40"), ("5", "50")] {
            tx.upsert_tree_node(TreeNodeRecord {
                tree_id: TreeId::Nullifier,
                node_index: idx.into(),
                value: value.into(),
            });
        }
        store.commit(tx).unwrap();

        let found = store
            .find_tree_nodes(TreeId::Nullifier, &["4".into(), "9".into(), "5".into()])
            .unwrap();
        assert_eq!(found.len(), 2);
        // The utxo tree namespace is disjoint.
        assert!(store
            .find_tree_nodes(TreeId::Utxo, &["4".into()])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_reopen_preserves_rows() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = RocksStore::open_default(temp_dir.path()).unwrap();
            let mut tx = StoreTransaction::new();
            tx.upsert_utxo(UtxoRecord {
                hash: "11".into(),
                index: Some("0".into()),
                owner: Some("alice".into()),
            });
            store.commit(tx).unwrap();
        }

        let store = RocksStore::open_default(temp_dir.path()).unwrap();
        let row = store.find_utxo("11").unwrap().unwrap();
        assert_eq!(row.index.as_deref(), Some("0"));
        assert_eq!(
            store.find_utxos_owned_by(&["alice".into()]).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_anonymous_bootstrap_sequence_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let record = BootstrapRecord {
            block_hash: None,
            utxo_bootstrap: "[]".into(),
            withdrawal_bootstrap: "[]".into(),
        };
        {
            let store = RocksStore::open_default(temp_dir.path()).unwrap();
            let mut tx = StoreTransaction::new();
            tx.create_bootstrap(record.clone());
            store.commit(tx).unwrap();
        }

        let store = RocksStore::open_default(temp_dir.path()).unwrap();
        assert_eq!(store.anonymous_seq.load(Ordering::SeqCst), 1);
        let mut tx = StoreTransaction::new();
        tx.create_bootstrap(record);
        store.commit(tx).unwrap();
        assert_eq!(store.count_anonymous_bootstraps().unwrap(), 2);
    }
}
