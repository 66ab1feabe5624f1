//! Block proposal logic.
//!
//! The proposal builder assembles the transaction list of a candidate block
//! from two sources: the previous height's vote extensions (aggregated into
//! a single injected attestation transaction at index 0) and the ordinary
//! transaction pool.
//!
//! It also owns the [`LivenessGuard`]: every attempt at an injection height
//! either yields a usable batch or counts as a failed round.

use crate::types::{
    AttestationBatch, BatchLimits, ExtendedCommitInfo, ExtendedVoteInfo, InjectedAttestationTx,
    RawTx, ValidatorAddress, WireError,
};

use super::config::ConsensusConfig;
use super::error::ConsensusError;
use super::liveness::LivenessGuard;

/// Abstract transaction pool interface.
///
/// Consensus does not care how transactions are stored or gossiped; it only
/// needs a way to ask for a batch of transactions that fit into a block.
pub trait TxPool {
    /// Selects a batch of transactions for inclusion in a block.
    ///
    /// Implementations should respect the `max_txs` and `max_bytes` hints
    /// as soft limits (they may choose fewer transactions but should not
    /// exceed the size bound).
    fn select_for_block(&mut self, max_txs: usize, max_bytes: usize) -> Vec<RawTx>;
}

/// What the proposer injected, for logs and the node's status endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InjectionSummary {
    /// Validator whose extension was selected.
    pub source: ValidatorAddress,
    pub source_power: u64,
    pub attestations: usize,
    pub tx_bytes: usize,
}

/// Transaction list of a proposal, injected batch first.
#[derive(Clone, Debug)]
pub struct Proposal {
    pub height: u64,
    pub txs: Vec<RawTx>,
    pub injected: Option<InjectionSummary>,
}

/// Picks the extension to inject from the previous height's votes.
///
/// Only Commit votes with a non-empty payload are candidates. The highest
/// voting power wins; equal power goes to the smallest validator address,
/// so the choice does not depend on vote delivery order.
pub fn select_extension(commit: &ExtendedCommitInfo) -> Option<&ExtendedVoteInfo> {
    commit.extended_votes().min_by(|a, b| {
        b.validator
            .power
            .cmp(&a.validator.power)
            .then_with(|| a.validator.address.cmp(&b.validator.address))
    })
}

/// Stateful proposal builder.
///
/// Holds the block limits and the liveness counter. One instance lives for
/// the whole process; the consensus engine calls it on the single
/// proposal-building path, so no locking is needed.
#[derive(Clone, Debug)]
pub struct ProposalBuilder {
    pub max_block_txs: usize,
    pub max_block_size_bytes: usize,
    limits: BatchLimits,
    config: ConsensusConfig,
    liveness: LivenessGuard,
}

impl ProposalBuilder {
    /// Constructs a builder from a [`ConsensusConfig`].
    pub fn from_config(cfg: &ConsensusConfig) -> Self {
        Self {
            max_block_txs: cfg.max_block_txs,
            max_block_size_bytes: cfg.max_block_size_bytes,
            limits: cfg.batch_limits(),
            config: cfg.clone(),
            liveness: LivenessGuard::new(cfg.liveness_failure_threshold),
        }
    }

    pub fn liveness(&self) -> &LivenessGuard {
        &self.liveness
    }

    /// Builds the transaction list for a block at `height`, counting
    /// against this builder's own liveness guard.
    ///
    /// Before the injection height this only drains the pool. Afterwards it
    /// tries to aggregate `last_commit` into an injected transaction:
    ///
    /// - no votes at all (nothing is known about the previous height, e.g.
    ///   right after a restart): proposes user transactions only and leaves
    ///   the guard untouched;
    /// - no usable extension: the round counts as failed and the proposal
    ///   carries user transactions only;
    /// - the selected extension does not decode, or the resulting
    ///   transaction does not fit: the round counts as failed and this
    ///   attempt errors (non-fatal);
    /// - the failure that reaches the liveness threshold is returned as the
    ///   fatal [`ConsensusError::LivenessHalt`].
    pub fn build_proposal<P: TxPool>(
        &mut self,
        height: u64,
        last_commit: &ExtendedCommitInfo,
        tx_pool: &mut P,
    ) -> Result<Proposal, ConsensusError> {
        let mut liveness = std::mem::take(&mut self.liveness);
        let built = self.build_proposal_with(&mut liveness, height, last_commit, tx_pool);
        self.liveness = liveness;
        built
    }

    /// Same as [`ProposalBuilder::build_proposal`], but records the outcome
    /// on `liveness`.
    ///
    /// A host running several validators in one process passes a single
    /// guard here, so the process halts after `threshold` consecutive failed
    /// rounds whichever validator proposed them.
    pub fn build_proposal_with<P: TxPool>(
        &self,
        liveness: &mut LivenessGuard,
        height: u64,
        last_commit: &ExtendedCommitInfo,
        tx_pool: &mut P,
    ) -> Result<Proposal, ConsensusError> {
        if !self.config.injection_enabled(height) {
            return Ok(Proposal {
                height,
                txs: self.select_user_txs(tx_pool, self.max_block_txs, self.max_block_size_bytes),
                injected: None,
            });
        }

        if last_commit.votes.is_empty() {
            tracing::info!(height, "no extended commit available, proposing without injection");
            return Ok(Proposal {
                height,
                txs: self.select_user_txs(tx_pool, self.max_block_txs, self.max_block_size_bytes),
                injected: None,
            });
        }

        let Some(vote) = select_extension(last_commit) else {
            tracing::warn!(
                height,
                votes = last_commit.votes.len(),
                "no vote extension with attestation data, proposing without injection"
            );
            liveness.record_failure()?;
            return Ok(Proposal {
                height,
                txs: self.select_user_txs(tx_pool, self.max_block_txs, self.max_block_size_bytes),
                injected: None,
            });
        };

        let (injected_tx, attestations) = match self.injected_tx_from(vote) {
            Ok(built) => built,
            Err(e) => {
                tracing::warn!(height, error = %e, "failed to aggregate vote extension");
                liveness.record_failure()?;
                return Err(e);
            }
        };
        liveness.record_success();

        let summary = InjectionSummary {
            source: vote.validator.address,
            source_power: vote.validator.power,
            attestations,
            tx_bytes: injected_tx.len(),
        };

        let user_txs = self.select_user_txs(
            tx_pool,
            self.max_block_txs.saturating_sub(1),
            self.max_block_size_bytes.saturating_sub(summary.tx_bytes),
        );

        let mut txs = Vec::with_capacity(user_txs.len() + 1);
        txs.push(injected_tx);
        txs.extend(user_txs);

        tracing::info!(
            height,
            source = %summary.source,
            attestations = summary.attestations,
            user_txs = txs.len() - 1,
            "built proposal with injected attestations"
        );

        Ok(Proposal {
            height,
            txs,
            injected: Some(summary),
        })
    }

    /// Decodes the selected extension and re-serializes it as the injected
    /// transaction. Returns the transaction and its item count.
    fn injected_tx_from(&self, vote: &ExtendedVoteInfo) -> Result<(RawTx, usize), ConsensusError> {
        let batch = AttestationBatch::decode_with_limits(&vote.vote_extension, &self.limits)
            .map_err(|source| ConsensusError::MalformedExtension {
                validator: vote.validator.address.to_string(),
                source,
            })?;
        let items = batch.len();

        let tx = InjectedAttestationTx::new(batch)
            .encode()
            .map_err(ConsensusError::Injection)?;

        if self.max_block_txs == 0 || tx.len() > self.max_block_size_bytes {
            return Err(ConsensusError::Injection(WireError::PayloadTooLarge {
                len: tx.len(),
                max: self.max_block_size_bytes,
            }));
        }

        Ok((tx, items))
    }

    /// Draws user transactions, dropping any that carry the injection marker.
    fn select_user_txs<P: TxPool>(&self, tx_pool: &mut P, max_txs: usize, max_bytes: usize) -> Vec<RawTx> {
        let mut txs = tx_pool.select_for_block(max_txs, max_bytes);
        let before = txs.len();
        txs.retain(|tx| !tx.is_injected());
        if txs.len() < before {
            tracing::warn!(
                dropped = before - txs.len(),
                "dropped pool transactions carrying the injection marker"
            );
        }
        txs
    }
}
