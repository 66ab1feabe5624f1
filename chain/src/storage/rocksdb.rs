//! RocksDB-backed state store.
//!
//! This implementation persists application state in a RocksDB instance
//! with dedicated column families:
//!
//! - `"state"`: raw state keys -> values, written by committed scopes,
//! - `"meta"`:  the last finalized height under a fixed key `"height"`.

use std::{path::Path, sync::Arc};

use rocksdb::{BoundColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::{Deserialize, Serialize};

use crate::types::Hash256;

use super::{ChangeSet, StateBackend, StateHasher, StateReader, StateStore, StorageError};

const CF_STATE: &str = "state";
const CF_META: &str = "meta";
const META_HEIGHT_KEY: &[u8] = b"height";

/// Configuration for [`RocksDbStateStore`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDbConfig {
    /// Filesystem path to the RocksDB database directory.
    pub path: String,
    /// Whether to create the database and missing column families if they
    /// do not yet exist.
    pub create_if_missing: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: "data/attest-state".to_string(),
            create_if_missing: true,
        }
    }
}

/// RocksDB-backed implementation of [`StateBackend`].
pub struct RocksDbStateStore {
    db: DB,
}

impl RocksDbStateStore {
    /// Opens (or creates) a RocksDB-backed state store at the given path.
    ///
    /// This sets up the `"state"` and `"meta"` column families. The
    /// `"default"` column family is also created to keep RocksDB happy,
    /// but it is not currently used.
    pub fn open(cfg: &RocksDbConfig) -> Result<Self, StorageError> {
        let path = Path::new(&cfg.path);

        let mut opts = Options::default();
        opts.create_if_missing(cfg.create_if_missing);
        opts.create_missing_column_families(cfg.create_if_missing);

        let cfs = vec![
            ColumnFamilyDescriptor::new("default", Options::default()),
            ColumnFamilyDescriptor::new(CF_STATE, Options::default()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, cfs)?;

        Ok(Self { db })
    }

    fn cf_state(&self) -> Result<Arc<BoundColumnFamily<'_>>, StorageError> {
        self.db
            .cf_handle(CF_STATE)
            .ok_or(StorageError::MissingColumnFamily(CF_STATE))
    }

    fn cf_meta(&self) -> Result<Arc<BoundColumnFamily<'_>>, StorageError> {
        self.db
            .cf_handle(CF_META)
            .ok_or(StorageError::MissingColumnFamily(CF_META))
    }
}

impl StateReader for RocksDbStateStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let cf = self.cf_state()?;
        Ok(self.db.get_cf(&cf, key)?)
    }
}

impl StateStore for RocksDbStateStore {
    /// Writes the whole change set as one atomic `WriteBatch`.
    fn apply_changes(&mut self, changes: ChangeSet) -> Result<(), StorageError> {
        let cf = self.cf_state()?;
        let mut batch = WriteBatch::default();
        for (key, value) in changes {
            match value {
                Some(v) => batch.put_cf(&cf, key, v),
                None => batch.delete_cf(&cf, key),
            }
        }
        self.db.write(batch)?;
        Ok(())
    }
}

impl StateBackend for RocksDbStateStore {
    fn state_hash(&self) -> Result<Hash256, StorageError> {
        let cf = self.cf_state()?;
        // Default comparator iterates keys in byte-wise ascending order.
        let mut hasher = StateHasher::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, value) = item?;
            hasher.update(&key, &value);
        }
        Ok(hasher.finalize())
    }

    fn last_height(&self) -> Result<Option<u64>, StorageError> {
        let cf_meta = self.cf_meta()?;
        match self.db.get_cf(&cf_meta, META_HEIGHT_KEY)? {
            None => Ok(None),
            Some(bytes) => {
                let arr: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| StorageError::CorruptedMeta("height length"))?;
                Ok(Some(u64::from_be_bytes(arr)))
            }
        }
    }

    /// State changes and the meta height go into one `WriteBatch`.
    fn commit_block(&mut self, changes: ChangeSet, height: u64) -> Result<(), StorageError> {
        let cf_state = self.cf_state()?;
        let cf_meta = self.cf_meta()?;
        let mut batch = WriteBatch::default();
        for (key, value) in changes {
            match value {
                Some(v) => batch.put_cf(&cf_state, key, v),
                None => batch.delete_cf(&cf_state, key),
            }
        }
        batch.put_cf(&cf_meta, META_HEIGHT_KEY, height.to_be_bytes());
        self.db.write(batch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryStateStore, StateView, cache::CacheTx};
    use tempfile::TempDir;

    fn open_tmp(tmp: &TempDir) -> RocksDbStateStore {
        let cfg = RocksDbConfig {
            path: tmp.path().to_string_lossy().to_string(),
            create_if_missing: true,
        };
        RocksDbStateStore::open(&cfg).expect("open RocksDB")
    }

    #[test]
    fn rocksdb_store_roundtrip_state_and_height() {
        let tmp = TempDir::new().expect("create temp dir");
        let mut store = open_tmp(&tmp);

        let mut changes = ChangeSet::new();
        changes.insert(b"k".to_vec(), Some(b"v".to_vec()));
        store.commit_block(changes, 42).expect("commit block");

        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.last_height().unwrap(), Some(42));
        drop(store);

        let reopened = open_tmp(&tmp);
        assert_eq!(reopened.get(b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(reopened.last_height().unwrap(), Some(42));
    }

    #[test]
    fn committed_scope_survives_reopen() {
        let tmp = TempDir::new().expect("create temp dir");
        {
            let mut store = open_tmp(&tmp);
            let mut tx = CacheTx::begin(&mut store);
            tx.set(b"balance/alice", 5u64.to_be_bytes().to_vec());
            tx.commit().expect("commit");

            let mut dropped = CacheTx::begin(&mut store);
            dropped.set(b"balance/bob", 9u64.to_be_bytes().to_vec());
        }

        let store = open_tmp(&tmp);
        assert!(store.get(b"balance/alice").unwrap().is_some());
        assert!(store.get(b"balance/bob").unwrap().is_none());
    }

    #[test]
    fn state_hash_matches_in_memory_backend() {
        let tmp = TempDir::new().expect("create temp dir");
        let mut rocks = open_tmp(&tmp);
        let mut mem = InMemoryStateStore::new();

        let mut changes = ChangeSet::new();
        changes.insert(b"b".to_vec(), Some(b"2".to_vec()));
        changes.insert(b"a".to_vec(), Some(b"1".to_vec()));
        changes.insert(b"c".to_vec(), None);

        rocks.apply_changes(changes.clone()).unwrap();
        mem.apply_changes(changes).unwrap();

        assert_eq!(rocks.state_hash().unwrap(), mem.state_hash().unwrap());
    }
}
