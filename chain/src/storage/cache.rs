//! Scoped, rollback-capable state transactions.
//!
//! A [`CacheTx`] buffers writes over a parent [`StateStore`]. Reads see the
//! buffer first, then the parent. The scope ends in exactly one of two
//! ways: [`CacheTx::commit`] pushes the buffer into the parent as one change
//! set, while [`CacheTx::discard`] (or simply dropping the value) throws it
//! away and leaves the parent untouched.
//!
//! `CacheTx` is itself a [`StateStore`], so scopes nest: the applier opens
//! one scope per block and one per attestation inside it.

use super::{ChangeSet, StateReader, StateStore, StateView, StorageError};

/// Copy-on-write scope over a parent store.
pub struct CacheTx<'a, S: StateStore + ?Sized> {
    parent: &'a mut S,
    writes: ChangeSet,
}

impl<'a, S: StateStore + ?Sized> CacheTx<'a, S> {
    /// Opens a scope. The parent is exclusively borrowed until the scope
    /// ends, so no one else can observe or mutate it meanwhile.
    pub fn begin(parent: &'a mut S) -> Self {
        Self {
            parent,
            writes: ChangeSet::new(),
        }
    }

    /// Number of keys touched inside this scope.
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    /// Pushes all buffered writes into the parent.
    ///
    /// Returns the number of keys written.
    pub fn commit(self) -> Result<usize, StorageError> {
        let touched = self.writes.len();
        if touched > 0 {
            self.parent.apply_changes(self.writes)?;
        }
        Ok(touched)
    }

    /// Ends the scope, handing back the buffered writes instead of applying
    /// them, so the caller can commit them together with other data.
    pub fn into_changes(self) -> ChangeSet {
        self.writes
    }

    /// Drops all buffered writes.
    pub fn discard(self) {}
}

impl<S: StateStore + ?Sized> StateReader for CacheTx<'_, S> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        match self.writes.get(key) {
            Some(buffered) => Ok(buffered.clone()),
            None => self.parent.get(key),
        }
    }
}

impl<S: StateStore + ?Sized> StateStore for CacheTx<'_, S> {
    fn apply_changes(&mut self, changes: ChangeSet) -> Result<(), StorageError> {
        self.writes.extend(changes);
        Ok(())
    }
}

impl<S: StateStore + ?Sized> StateView for CacheTx<'_, S> {
    fn set(&mut self, key: &[u8], value: Vec<u8>) {
        self.writes.insert(key.to_vec(), Some(value));
    }

    fn delete(&mut self, key: &[u8]) {
        self.writes.insert(key.to_vec(), None);
    }
}
