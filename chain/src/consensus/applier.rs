//! Deterministic application of the injected attestation batch.
//!
//! This runs identically on every validator while a block is finalized.
//! The only input is the agreed block bytes; nothing here talks to the
//! sidecar or anything else outside the state handed in.
//!
//! Each attestation is applied in batch order inside its own [`CacheTx`]
//! scope. A rejected item's scope is discarded, so its partial writes are
//! never seen by later items or by the rest of the block.

use crate::ledger::{AttestationLedger, LedgerError};
use crate::storage::{CacheTx, StateStore};
use crate::types::{AttestationBatch, BatchLimits, Block, InjectedAttestationTx};

use super::error::ConsensusError;

/// Final state of one attestation within a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemStatus {
    Applied,
    Rejected { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemOutcome {
    /// Position in the injected batch.
    pub index: usize,
    pub status: ItemStatus,
}

/// Per-block summary of the apply step. There is no aggregate verdict.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplyTally {
    pub applied: usize,
    pub rejected: usize,
    pub outcomes: Vec<ItemOutcome>,
}

impl ApplyTally {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }
}

/// Applies injected batches against an [`AttestationLedger`].
pub struct DeterministicApplier<L> {
    ledger: L,
    limits: BatchLimits,
}

impl<L: AttestationLedger> DeterministicApplier<L> {
    pub fn new(ledger: L, limits: BatchLimits) -> Self {
        Self { ledger, limits }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Extracts the injected batch from transaction index 0.
    ///
    /// `Ok(None)` when the block is empty or its first transaction is an
    /// ordinary one. A marker-carrying transaction that does not decode is
    /// [`ConsensusError::MalformedInjectedTx`]; an agreed block must never
    /// contain one, so callers treat it as fatal.
    pub fn injected_batch(
        &self,
        height: u64,
        block: &Block,
    ) -> Result<Option<AttestationBatch>, ConsensusError> {
        let Some(first) = block.txs.first() else {
            return Ok(None);
        };

        InjectedAttestationTx::decode_with_limits(first, &self.limits)
            .map(|tx| tx.map(|tx| tx.batch))
            .map_err(|source| ConsensusError::MalformedInjectedTx { height, source })
    }

    /// Applies the injected batch of `block`, if any, to `state`.
    pub fn apply_block<S: StateStore + ?Sized>(
        &self,
        height: u64,
        block: &Block,
        state: &mut S,
    ) -> Result<ApplyTally, ConsensusError> {
        match self.injected_batch(height, block)? {
            Some(batch) => self.apply_batch(height, &batch, state),
            None => Ok(ApplyTally::default()),
        }
    }

    /// Applies every item of `batch` sequentially, each in its own scope.
    ///
    /// Business rejections by the ledger are recorded in the tally and never
    /// returned as errors. A storage failure aborts the whole call.
    pub fn apply_batch<S: StateStore + ?Sized>(
        &self,
        height: u64,
        batch: &AttestationBatch,
        state: &mut S,
    ) -> Result<ApplyTally, ConsensusError> {
        let mut tally = ApplyTally {
            outcomes: Vec::with_capacity(batch.len()),
            ..ApplyTally::default()
        };

        for (index, item) in batch.items.iter().enumerate() {
            let mut scope = CacheTx::begin(&mut *state);

            let status = match self.ledger.apply_attestation(&mut scope, item) {
                Ok(()) => {
                    scope.commit()?;
                    tally.applied += 1;
                    ItemStatus::Applied
                }
                Err(LedgerError::Storage(e)) => return Err(ConsensusError::Storage(e)),
                Err(e) => {
                    scope.discard();
                    tally.rejected += 1;
                    tracing::warn!(height, index, error = %e, "attestation rejected");
                    ItemStatus::Rejected {
                        reason: e.to_string(),
                    }
                }
            };

            tally.outcomes.push(ItemOutcome { index, status });
        }

        tracing::info!(
            height,
            applied = tally.applied,
            rejected = tally.rejected,
            "applied injected attestations"
        );

        Ok(tally)
    }
}
