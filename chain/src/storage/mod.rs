//! Application state storage.
//!
//! The pipeline needs two things from storage: ordinary key/value reads and
//! writes for the ledger module, and an explicit scoped transaction so a
//! rejected attestation leaves no partial writes behind. The traits here
//! split those concerns:
//!
//! - [`StateReader`]: point reads,
//! - [`StateStore`]: applying a finished [`ChangeSet`] atomically,
//! - [`StateView`]: buffered writes made inside a scope,
//! - [`StateBackend`]: what a persistent backend adds on top (state hash,
//!   last finalized height, and committing a block's changes together with
//!   its height).
//!
//! Backends:
//!
//! - an in-memory store ([`mem::InMemoryStateStore`]) for tests and
//!   ephemeral devnets,
//! - a RocksDB-backed store ([`rocksdb::RocksDbStateStore`]) for persistent
//!   validator nodes.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::types::Hash256;

pub mod cache;
pub mod mem;
pub mod rocksdb;

pub use cache::CacheTx;
pub use mem::InMemoryStateStore;
pub use rocksdb::{RocksDbConfig, RocksDbStateStore};

/// Buffered writes keyed by state key; `None` marks a deletion.
///
/// A `BTreeMap` keeps the order of application deterministic.
pub type ChangeSet = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

/// Storage-level error type.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying RocksDB error.
    #[error("rocksdb error: {0}")]
    RocksDb(#[from] ::rocksdb::Error),
    /// Required column family was not found.
    #[error("missing column family {0:?}")]
    MissingColumnFamily(&'static str),
    /// Corrupted or malformed metadata (e.g. height with wrong length).
    #[error("corrupted metadata: {0}")]
    CorruptedMeta(&'static str),
}

/// Point reads against committed (or buffered) state.
pub trait StateReader {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;
}

/// A store that can absorb a finished change set in one step.
pub trait StateStore: StateReader {
    fn apply_changes(&mut self, changes: ChangeSet) -> Result<(), StorageError>;
}

/// Mutable view handed to the ledger module.
///
/// Writes are buffered by the implementor; nothing becomes visible outside
/// the scope until it is committed.
pub trait StateView: StateReader {
    fn set(&mut self, key: &[u8], value: Vec<u8>);
    fn delete(&mut self, key: &[u8]);
}

/// A backend that persists committed state across blocks.
pub trait StateBackend: StateStore {
    /// Deterministic digest of the full state contents.
    fn state_hash(&self) -> Result<Hash256, StorageError>;

    /// Height of the last block whose effects were committed, if any.
    fn last_height(&self) -> Result<Option<u64>, StorageError>;

    /// Applies a finished block's change set and records `height` as the
    /// last finalized height, atomically: either both are visible afterwards
    /// or neither is.
    fn commit_block(&mut self, changes: ChangeSet, height: u64) -> Result<(), StorageError>;
}

/// Incremental digest over key/value pairs fed in ascending key order.
///
/// Both backends feed this with the same ordering (byte-wise ascending), so
/// equal contents give equal hashes whatever the backend.
pub(crate) struct StateHasher(blake3::Hasher);

impl StateHasher {
    pub(crate) fn new() -> Self {
        Self(blake3::Hasher::new())
    }

    pub(crate) fn update(&mut self, key: &[u8], value: &[u8]) {
        self.0.update(&(key.len() as u64).to_le_bytes());
        self.0.update(key);
        self.0.update(&(value.len() as u64).to_le_bytes());
        self.0.update(value);
    }

    pub(crate) fn finalize(&self) -> Hash256 {
        Hash256(*self.0.finalize().as_bytes())
    }
}

/// Hashes key/value pairs supplied in ascending key order.
pub(crate) fn hash_entries<'a, I>(entries: I) -> Hash256
where
    I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
{
    let mut hasher = StateHasher::new();
    for (key, value) in entries {
        hasher.update(key, value);
    }
    hasher.finalize()
}
