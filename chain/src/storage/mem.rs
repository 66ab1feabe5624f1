//! In-memory state store.
//!
//! This implementation is useful for unit tests, benchmarks, and ephemeral
//! devnets. It keeps all entries in a `BTreeMap` so iteration (and thus the
//! state hash) follows byte-wise key order, matching RocksDB.

use std::collections::BTreeMap;

use crate::types::Hash256;

use super::{ChangeSet, StateBackend, StateReader, StateStore, StorageError, hash_entries};

/// In-memory implementation of [`StateBackend`].
#[derive(Clone, Debug, Default)]
pub struct InMemoryStateStore {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
    last_height: Option<u64>,
}

impl InMemoryStateStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of keys currently stored.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl StateReader for InMemoryStateStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }
}

impl StateStore for InMemoryStateStore {
    fn apply_changes(&mut self, changes: ChangeSet) -> Result<(), StorageError> {
        for (key, value) in changes {
            match value {
                Some(v) => {
                    self.entries.insert(key, v);
                }
                None => {
                    self.entries.remove(&key);
                }
            }
        }
        Ok(())
    }
}

impl StateBackend for InMemoryStateStore {
    fn state_hash(&self) -> Result<Hash256, StorageError> {
        Ok(hash_entries(
            self.entries
                .iter()
                .map(|(k, v)| (k.as_slice(), v.as_slice())),
        ))
    }

    fn last_height(&self) -> Result<Option<u64>, StorageError> {
        Ok(self.last_height)
    }

    fn commit_block(&mut self, changes: ChangeSet, height: u64) -> Result<(), StorageError> {
        self.apply_changes(changes)?;
        self.last_height = Some(height);
        Ok(())
    }
}
