//! In-process validator devnet.
//!
//! Stands in for the consensus engine: it runs every local validator's
//! pipeline through the steps of one height in the order a BFT engine
//! would call them.
//!
//! 1. The proposer (`(height + round) mod N`) prepares a block from the
//!    previous height's extended commit and the transaction pool. All local
//!    validators propose against one node-level liveness guard, so the node
//!    halts after `threshold` consecutive failed injection rounds no matter
//!    how many validators it hosts.
//! 2. Every validator processes the proposal; any rejection fails the
//!    round.
//! 3. Every validator finalizes the block. App hashes must agree.
//! 4. Every validator extends its vote; every peer verifies each extension.
//!    Extensions a peer rejects are carried forward without data.
//!
//! The loop is synchronous: the sidecar client blocks, so the node runs it
//! on a dedicated blocking thread.

use std::time::Instant;

use attest_chain::{
    ApplyTally, AttestationApp, AttestationLedger, BlockHash, BlockIdFlag, ConsensusError,
    ExtendedCommitInfo, ExtendedVoteInfo, HASH_LEN, Hash256, InjectionSummary, LivenessGuard,
    ProposalContext,
    SidecarClient, Signature, StateBackend, TxPool, ValidatorAddress, ValidatorInfo, VerifyStatus,
    VerifyVoteExtensionRequest,
};
use thiserror::Error;

/// One local validator and its pipeline.
pub struct DevnetValidator<C, L, S> {
    pub name: String,
    pub power: u64,
    pub app: AttestationApp<C, L, S>,
}

#[derive(Debug, Error)]
pub enum DevnetError {
    #[error("validator {validator}: {source}")]
    Consensus {
        validator: String,
        #[source]
        source: ConsensusError,
    },
    #[error("app hash divergence at height {height}: {validator} has {found}, expected {expected}")]
    AppHashDivergence {
        height: u64,
        validator: String,
        expected: Hash256,
        found: Hash256,
    },
    #[error("validators disagree on the last finalized height")]
    HeightMismatch,
    #[error("devnet has no validators")]
    NoValidators,
}

impl DevnetError {
    pub fn is_liveness_halt(&self) -> bool {
        matches!(
            self,
            DevnetError::Consensus {
                source: ConsensusError::LivenessHalt(_),
                ..
            }
        )
    }
}

/// What happened at one height.
#[derive(Clone, Debug)]
pub enum StepReport {
    Finalized(FinalizedHeight),
    /// The round failed without a fatal error; the height is retried.
    RoundFailed { height: u64, round: u32, reason: String },
}

#[derive(Clone, Debug)]
pub struct FinalizedHeight {
    pub height: u64,
    pub proposer: String,
    pub injected: Option<InjectionSummary>,
    pub tally: ApplyTally,
    pub app_hash: Hash256,
    pub finalize_secs: f64,
    /// Empty extensions produced at heights where extensions are enabled.
    pub empty_extensions: u64,
    pub rejected_extensions: u64,
}

pub struct Devnet<C, L, S> {
    validators: Vec<DevnetValidator<C, L, S>>,
    /// Empty until the first height finalized by this process.
    last_commit: ExtendedCommitInfo,
    last_block_hash: BlockHash,
    next_height: u64,
    round: u32,
    liveness: LivenessGuard,
}

impl<C, L, S> Devnet<C, L, S>
where
    C: SidecarClient,
    L: AttestationLedger,
    S: StateBackend,
{
    /// Resumes from the validators' common last finalized height.
    ///
    /// The previous height's extended commit is not persisted, so the first
    /// height after a resume is proposed without injection and is not
    /// counted against the liveness guard.
    pub fn new(validators: Vec<DevnetValidator<C, L, S>>) -> Result<Self, DevnetError> {
        if validators.is_empty() {
            return Err(DevnetError::NoValidators);
        }

        let mut heights = validators
            .iter()
            .map(|v| v.app.last_height().map_err(|source| consensus_err(v, source)));
        let first = match heights.next() {
            Some(h) => h?,
            None => None,
        };
        for h in heights {
            if h? != first {
                return Err(DevnetError::HeightMismatch);
            }
        }

        let next_height = first.map_or(1, |h| h + 1);
        let threshold = validators[0].app.config.liveness_failure_threshold;
        tracing::info!(
            validators = validators.len(),
            next_height,
            liveness_threshold = threshold,
            "devnet ready"
        );

        Ok(Self {
            validators,
            last_commit: ExtendedCommitInfo::default(),
            last_block_hash: BlockHash(Hash256([0u8; HASH_LEN])),
            next_height,
            round: 0,
            liveness: LivenessGuard::new(threshold),
        })
    }

    pub fn next_height(&self) -> u64 {
        self.next_height
    }

    pub fn validators(&self) -> &[DevnetValidator<C, L, S>] {
        &self.validators
    }

    /// Consecutive failed injection rounds, across all local proposers.
    pub fn liveness_failures(&self) -> u64 {
        self.liveness.consecutive_failures()
    }

    /// Runs one round of the current height.
    pub fn step<P: TxPool>(
        &mut self,
        tx_pool: &mut P,
        timestamp: u64,
    ) -> Result<StepReport, DevnetError> {
        let height = self.next_height;
        let round = self.round;
        let proposer_idx = ((height + u64::from(round)) % self.validators.len() as u64) as usize;

        // 1. PrepareProposal
        let ctx = ProposalContext {
            height,
            parent: self.last_block_hash,
            timestamp,
        };
        let proposer = &self.validators[proposer_idx];
        let prepared = match proposer.app.prepare_proposal_with(
            &mut self.liveness,
            ctx,
            &self.last_commit,
            tx_pool,
        ) {
            Ok(prepared) => prepared,
            Err(source) if !source.is_fatal() => {
                let reason = format!("{}: {source}", proposer.name);
                return Ok(self.fail_round(height, reason));
            }
            Err(source) => return Err(consensus_err(proposer, source)),
        };
        let proposer_name = proposer.name.clone();

        // 2. ProcessProposal
        let rejection = self.validators.iter().find_map(|v| {
            v.app
                .process_proposal(&prepared.block)
                .err()
                .map(|e| format!("{} rejected proposal: {e}", v.name))
        });
        if let Some(reason) = rejection {
            return Ok(self.fail_round(height, reason));
        }

        // 3. FinalizeBlock
        let mut finalized = Vec::with_capacity(self.validators.len());
        let mut finalize_secs = 0.0;
        for v in &mut self.validators {
            let started = Instant::now();
            let outcome = v
                .app
                .finalize_block(&prepared.block)
                .map_err(|source| consensus_err(v, source))?;
            finalize_secs = f64::max(finalize_secs, started.elapsed().as_secs_f64());
            finalized.push(outcome);
        }

        let reference = &finalized[0];
        for (v, outcome) in self.validators.iter().zip(&finalized).skip(1) {
            if outcome.app_hash != reference.app_hash {
                return Err(DevnetError::AppHashDivergence {
                    height,
                    validator: v.name.clone(),
                    expected: reference.app_hash,
                    found: outcome.app_hash,
                });
            }
        }

        // 4. ExtendVote / VerifyVoteExtension
        let (commit, empty_extensions, rejected_extensions) = self.collect_votes(height);

        let reference = finalized.swap_remove(0);
        self.last_commit = commit;
        self.last_block_hash = reference.block_hash;
        self.next_height += 1;
        self.round = 0;

        Ok(StepReport::Finalized(FinalizedHeight {
            height,
            proposer: proposer_name,
            injected: prepared.injected,
            tally: reference.tally,
            app_hash: reference.app_hash,
            finalize_secs,
            empty_extensions,
            rejected_extensions,
        }))
    }

    fn fail_round(&mut self, height: u64, reason: String) -> StepReport {
        tracing::warn!(height, round = self.round, %reason, "round failed");
        let report = StepReport::RoundFailed {
            height,
            round: self.round,
            reason,
        };
        self.round = self.round.saturating_add(1);
        report
    }

    /// Every validator extends its vote; an extension any peer rejects is
    /// recorded without data.
    fn collect_votes(&self, height: u64) -> (ExtendedCommitInfo, u64, u64) {
        let mut votes = Vec::with_capacity(self.validators.len());
        let mut empty = 0;
        let mut rejected = 0;

        for v in &self.validators {
            let mut ext = v.app.extend_vote(height);
            if ext.is_empty() && v.app.config.vote_extensions_enabled(height) {
                empty += 1;
            }

            let address = v.app.identity();
            let req = VerifyVoteExtensionRequest {
                height,
                validator: address,
                vote_extension: &ext,
            };
            let accepted = self
                .validators
                .iter()
                .filter(|peer| peer.app.identity() != address)
                .all(|peer| peer.app.verify_vote_extension(&req) == VerifyStatus::Accept);
            if !accepted {
                tracing::warn!(height, validator = %v.name, "vote extension rejected by a peer");
                rejected += 1;
                ext = Vec::new();
            }

            votes.push(ExtendedVoteInfo {
                validator: ValidatorInfo {
                    address,
                    power: v.power,
                },
                vote_extension: ext,
                extension_signature: Signature::default(),
                block_id_flag: BlockIdFlag::Commit,
            });
        }

        (
            ExtendedCommitInfo {
                round: self.round,
                votes,
            },
            empty,
            rejected,
        )
    }
}

fn consensus_err<C, L, S>(v: &DevnetValidator<C, L, S>, source: ConsensusError) -> DevnetError {
    DevnetError::Consensus {
        validator: v.name.clone(),
        source,
    }
}

/// Deterministic devnet identity derived from the validator's name.
pub fn validator_address(name: &str) -> ValidatorAddress {
    ValidatorAddress::from_public_key(name.as_bytes())
}
