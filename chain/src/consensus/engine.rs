//! High-level orchestration of the attestation pipeline.
//!
//! [`AttestationApp`] is what a consensus engine talks to. It wires
//! together:
//!
//! - a [`VoteExtensionProducer`] and [`VoteExtensionVerifier`] for the vote
//!   extension steps,
//! - a [`ProposalBuilder`] (which owns the liveness guard) for the
//!   proposer,
//! - a [`BlockValidator`] for checking proposals before voting, and
//! - a [`DeterministicApplier`] plus a [`StateBackend`] for finalization.
//!
//! The engine drives one height at a time and never calls two steps
//! concurrently, so all methods take `&self` or `&mut self` and there is no
//! interior locking.

use crate::ledger::AttestationLedger;
use crate::sidecar::SidecarClient;
use crate::storage::{CacheTx, StateBackend};
use crate::types::{Block, BlockHash, ExtendedCommitInfo, Hash256, Header, ValidatorAddress};
use crate::validation::{BaseValidity, InjectedTxValidity};

use super::applier::{ApplyTally, DeterministicApplier};
use super::config::ConsensusConfig;
use super::error::{ConsensusError, ValidationError};
use super::liveness::LivenessGuard;
use super::proposer::{InjectionSummary, Proposal, ProposalBuilder, TxPool};
use super::validator::{BlockValidator, CombinedValidator};
use super::vote_extension::{
    VerifyStatus, VerifyVoteExtensionRequest, VoteExtensionProducer, VoteExtensionVerifier,
};

/// Header fields the engine supplies when asking for a proposal.
#[derive(Clone, Copy, Debug)]
pub struct ProposalContext {
    pub height: u64,
    pub parent: BlockHash,
    pub timestamp: u64,
}

/// A proposed block together with what was injected into it.
#[derive(Clone, Debug)]
pub struct PreparedBlock {
    pub block: Block,
    pub injected: Option<InjectionSummary>,
}

/// Result of finalizing one block.
#[derive(Clone, Debug)]
pub struct FinalizeOutcome {
    pub height: u64,
    pub block_hash: BlockHash,
    pub tally: ApplyTally,
    /// Transactions left for the rest of the state machine.
    pub user_txs: usize,
    /// State digest after this block; equal on every honest validator.
    pub app_hash: Hash256,
}

/// Default validator stack: size limits plus injection placement.
pub type DefaultBlockValidator = CombinedValidator<BaseValidity, InjectedTxValidity>;

/// Attestation pipeline of one validator.
///
/// Generic over:
///
/// - `C`: sidecar client implementing [`SidecarClient`],
/// - `L`: ledger module implementing [`AttestationLedger`],
/// - `S`: state backend implementing [`StateBackend`].
pub struct AttestationApp<C, L, S> {
    pub config: ConsensusConfig,
    identity: ValidatorAddress,
    producer: VoteExtensionProducer<C>,
    verifier: VoteExtensionVerifier,
    builder: ProposalBuilder,
    validator: DefaultBlockValidator,
    applier: DeterministicApplier<L>,
    store: S,
}

impl<C, L, S> AttestationApp<C, L, S>
where
    C: SidecarClient,
    L: AttestationLedger,
    S: StateBackend,
{
    pub fn new(
        config: ConsensusConfig,
        identity: ValidatorAddress,
        sidecar: C,
        ledger: L,
        store: S,
    ) -> Self {
        let validator =
            CombinedValidator::new(BaseValidity::new(&config), InjectedTxValidity::new(&config));
        Self {
            identity,
            producer: VoteExtensionProducer::new(sidecar, &config),
            verifier: VoteExtensionVerifier::new(&config),
            builder: ProposalBuilder::from_config(&config),
            validator,
            applier: DeterministicApplier::new(ledger, config.batch_limits()),
            store,
            config,
        }
    }

    pub fn identity(&self) -> ValidatorAddress {
        self.identity
    }

    /// Returns a reference to the underlying state backend.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn liveness(&self) -> &LivenessGuard {
        self.builder.liveness()
    }

    /// Height of the last finalized block, if any.
    pub fn last_height(&self) -> Result<Option<u64>, ConsensusError> {
        Ok(self.store.last_height()?)
    }

    /// Current state digest.
    pub fn app_hash(&self) -> Result<Hash256, ConsensusError> {
        Ok(self.store.state_hash()?)
    }

    /// ExtendVote: this validator's extension for `height`.
    pub fn extend_vote(&self, height: u64) -> Vec<u8> {
        self.producer.extend_vote(height)
    }

    /// VerifyVoteExtension: structural check of a peer's extension.
    pub fn verify_vote_extension(&self, req: &VerifyVoteExtensionRequest<'_>) -> VerifyStatus {
        self.verifier.verify(req)
    }

    /// PrepareProposal: builds the next block when this validator proposes.
    pub fn prepare_proposal<P: TxPool>(
        &mut self,
        ctx: ProposalContext,
        last_commit: &ExtendedCommitInfo,
        tx_pool: &mut P,
    ) -> Result<PreparedBlock, ConsensusError> {
        let proposal = self
            .builder
            .build_proposal(ctx.height, last_commit, tx_pool)?;
        Ok(self.prepared_block(ctx, proposal))
    }

    /// PrepareProposal against a liveness guard held by the caller instead
    /// of this validator's own.
    pub fn prepare_proposal_with<P: TxPool>(
        &self,
        liveness: &mut LivenessGuard,
        ctx: ProposalContext,
        last_commit: &ExtendedCommitInfo,
        tx_pool: &mut P,
    ) -> Result<PreparedBlock, ConsensusError> {
        let proposal =
            self.builder
                .build_proposal_with(liveness, ctx.height, last_commit, tx_pool)?;
        Ok(self.prepared_block(ctx, proposal))
    }

    fn prepared_block(&self, ctx: ProposalContext, proposal: Proposal) -> PreparedBlock {
        let header = Header {
            parent: ctx.parent,
            height: ctx.height,
            timestamp: ctx.timestamp,
            proposer: self.identity,
        };

        PreparedBlock {
            block: Block {
                header,
                txs: proposal.txs,
            },
            injected: proposal.injected,
        }
    }

    /// ProcessProposal: whether this validator accepts a proposed block.
    pub fn process_proposal(&self, block: &Block) -> Result<(), ConsensusError> {
        self.validator.validate(block).map_err(|e| {
            tracing::warn!(
                height = block.header.height,
                proposer = %block.header.proposer,
                error = %e,
                "rejecting proposal"
            );
            ConsensusError::from(e)
        })
    }

    /// FinalizeBlock: applies the injected batch of an agreed block.
    ///
    /// All state writes of the block go through one block-level scope. Once
    /// every item has been processed its writes and the new height reach the
    /// backend in a single [`StateBackend::commit_block`], so a crash never
    /// leaves a block's effects recorded under the previous height.
    pub fn finalize_block(&mut self, block: &Block) -> Result<FinalizeOutcome, ConsensusError> {
        let height = block.header.height;

        if let Some(last) = self.store.last_height()? {
            if height <= last {
                return Err(ValidationError::Custom(format!(
                    "height {height} already finalized (last {last})"
                ))
                .into());
            }
        }

        let mut block_scope = CacheTx::begin(&mut self.store);
        let tally = self.applier.apply_block(height, block, &mut block_scope)?;
        let changes = block_scope.into_changes();

        self.store.commit_block(changes, height)?;
        let app_hash = self.store.state_hash()?;
        let block_hash = block.compute_hash();

        tracing::debug!(
            height,
            block_hash = %block_hash.0,
            app_hash = %app_hash,
            "finalized block"
        );

        Ok(FinalizeOutcome {
            height,
            block_hash,
            tally,
            user_txs: block.user_txs().len(),
            app_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{DepositAttestation, DepositLedger};
    use crate::sidecar::{PendingAttestations, SidecarError};
    use crate::storage::{
        ChangeSet, InMemoryStateStore, StateReader, StateStore, StorageError,
    };
    use crate::types::{
        Attestation, AttestationBatch, BlockIdFlag, ExtendedVoteInfo, HASH_LEN, RawTx, Signature,
        ValidatorInfo,
    };
    use std::sync::Mutex;

    /// Sidecar that replays a scripted sequence of responses.
    struct ScriptedSidecar {
        responses: Mutex<Vec<Option<Vec<Attestation>>>>,
    }

    impl ScriptedSidecar {
        fn new(mut responses: Vec<Option<Vec<Attestation>>>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    impl SidecarClient for ScriptedSidecar {
        fn fetch_pending_attestations(&self) -> Result<PendingAttestations, SidecarError> {
            let next = self.responses.lock().unwrap().pop().flatten();
            match next {
                Some(items) => Ok(PendingAttestations {
                    batch: AttestationBatch::new(items),
                    source_height: None,
                }),
                None => Err(SidecarError::Transport("connection refused".to_string())),
            }
        }
    }

    /// Minimal TxPool implementation for tests.
    struct TestTxPool {
        txs: Vec<RawTx>,
    }

    impl TxPool for TestTxPool {
        fn select_for_block(&mut self, max_txs: usize, _max_bytes: usize) -> Vec<RawTx> {
            let take = max_txs.min(self.txs.len());
            self.txs.drain(0..take).collect()
        }
    }

    type TestApp = AttestationApp<ScriptedSidecar, DepositLedger, InMemoryStateStore>;

    fn cfg(threshold: u64) -> ConsensusConfig {
        ConsensusConfig {
            vote_extensions_enable_height: 1,
            liveness_failure_threshold: threshold,
            ..ConsensusConfig::default()
        }
    }

    fn app(threshold: u64, responses: Vec<Option<Vec<Attestation>>>) -> TestApp {
        AttestationApp::new(
            cfg(threshold),
            ValidatorAddress(Hash256([1u8; HASH_LEN])),
            ScriptedSidecar::new(responses),
            DepositLedger::new(),
            InMemoryStateStore::new(),
        )
    }

    fn deposit(nonce: u64, recipient: &str, amount: u64) -> Attestation {
        DepositAttestation {
            source_chain: "ethereum".to_string(),
            nonce,
            recipient: recipient.to_string(),
            amount,
        }
        .to_attestation()
    }

    fn commit_from<S: StateBackend>(
        app: &AttestationApp<ScriptedSidecar, DepositLedger, S>,
        ext: Vec<u8>,
    ) -> ExtendedCommitInfo {
        ExtendedCommitInfo {
            round: 0,
            votes: vec![ExtendedVoteInfo {
                validator: ValidatorInfo {
                    address: app.identity(),
                    power: 10,
                },
                vote_extension: ext,
                extension_signature: Signature::default(),
                block_id_flag: BlockIdFlag::Commit,
            }],
        }
    }

    fn ctx(height: u64) -> ProposalContext {
        ProposalContext {
            height,
            parent: BlockHash(Hash256([0u8; HASH_LEN])),
            timestamp: 1_700_000_000 + height,
        }
    }

    #[test]
    fn sidecar_batch_flows_from_vote_to_state() {
        let mut app = app(
            10,
            vec![Some(vec![deposit(1, "alice", 100), deposit(2, "bob", 0)])],
        );

        // Height 1: votes carry extensions, nothing to inject yet.
        let ext = app.extend_vote(1);
        let req = VerifyVoteExtensionRequest {
            height: 1,
            validator: app.identity(),
            vote_extension: &ext,
        };
        assert_eq!(app.verify_vote_extension(&req), VerifyStatus::Accept);

        // Height 2: proposer injects the batch, everyone applies it.
        let commit = commit_from(&app, ext);
        let mut pool = TestTxPool {
            txs: vec![RawTx(b"user".to_vec())],
        };
        let prepared = app.prepare_proposal(ctx(2), &commit, &mut pool).unwrap();
        assert!(prepared.injected.is_some());
        app.process_proposal(&prepared.block).expect("valid proposal");

        let outcome = app.finalize_block(&prepared.block).expect("finalized");
        assert_eq!(outcome.tally.applied, 1);
        assert_eq!(outcome.tally.rejected, 1);
        assert_eq!(outcome.user_txs, 1);
        assert_eq!(DepositLedger::balance_of(app.store(), "alice").unwrap(), 100);
        assert_eq!(app.last_height().unwrap(), Some(2));
        assert_eq!(outcome.app_hash, app.app_hash().unwrap());
    }

    #[test]
    fn refinalizing_a_height_is_rejected() {
        let mut app = app(10, vec![]);
        let mut pool = TestTxPool { txs: vec![] };
        let prepared = app
            .prepare_proposal(ctx(1), &ExtendedCommitInfo::default(), &mut pool)
            .unwrap();

        app.finalize_block(&prepared.block).unwrap();
        let err = app.finalize_block(&prepared.block).unwrap_err();
        assert!(matches!(err, ConsensusError::Validation(_)));
    }

    #[test]
    fn recovers_after_threshold_minus_one_failures() {
        let threshold = 4;
        let mut responses: Vec<Option<Vec<Attestation>>> = vec![None; 3];
        responses.push(Some(vec![deposit(1, "carol", 5)]));
        let mut app = app(threshold, responses);
        let mut pool = TestTxPool { txs: vec![] };

        for height in 1..=4 {
            let ext = app.extend_vote(height);
            let commit = commit_from(&app, ext);
            let prepared = app
                .prepare_proposal(ctx(height + 1), &commit, &mut pool)
                .expect("no halt below threshold");
            app.finalize_block(&prepared.block).unwrap();
        }

        assert_eq!(app.liveness().consecutive_failures(), 0);
        assert_eq!(DepositLedger::balance_of(app.store(), "carol").unwrap(), 5);
    }

    #[test]
    fn halts_exactly_on_threshold_round() {
        let threshold = 3;
        let mut app = app(threshold, vec![None; 5]);
        let mut pool = TestTxPool { txs: vec![] };

        for height in 1..=threshold {
            let ext = app.extend_vote(height);
            assert!(ext.is_empty());
            let commit = commit_from(&app, ext);
            let result = app.prepare_proposal(ctx(height + 1), &commit, &mut pool);

            if height < threshold {
                let prepared = result.expect("still below threshold");
                app.finalize_block(&prepared.block).unwrap();
            } else {
                let err = result.unwrap_err();
                assert!(matches!(err, ConsensusError::LivenessHalt(_)));
                assert!(err.is_fatal());
            }
        }
    }

    #[test]
    fn process_proposal_rejects_forged_injection() {
        let app = app(10, vec![]);
        let mut garbage = crate::types::INJECTED_TX_PREFIX.to_vec();
        garbage.push(0xFF);
        let block = Block {
            header: Header {
                parent: BlockHash(Hash256([0u8; HASH_LEN])),
                height: 2,
                timestamp: 0,
                proposer: app.identity(),
            },
            txs: vec![RawTx(garbage)],
        };

        assert!(matches!(
            app.process_proposal(&block),
            Err(ConsensusError::Validation(_))
        ));
    }

    /// Backend whose block commits fail, as on a full disk.
    struct FullDiskStore(InMemoryStateStore);

    impl StateReader for FullDiskStore {
        fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
            self.0.get(key)
        }
    }

    impl StateStore for FullDiskStore {
        fn apply_changes(&mut self, changes: ChangeSet) -> Result<(), StorageError> {
            self.0.apply_changes(changes)
        }
    }

    impl StateBackend for FullDiskStore {
        fn state_hash(&self) -> Result<Hash256, StorageError> {
            self.0.state_hash()
        }

        fn last_height(&self) -> Result<Option<u64>, StorageError> {
            self.0.last_height()
        }

        fn commit_block(&mut self, _: ChangeSet, _: u64) -> Result<(), StorageError> {
            Err(StorageError::CorruptedMeta("disk full"))
        }
    }

    #[test]
    fn failed_block_commit_leaves_no_effects() {
        let mut app = AttestationApp::new(
            cfg(10),
            ValidatorAddress(Hash256([1u8; HASH_LEN])),
            ScriptedSidecar::new(vec![Some(vec![deposit(1, "alice", 5)])]),
            DepositLedger::new(),
            FullDiskStore(InMemoryStateStore::new()),
        );
        let mut pool = TestTxPool { txs: vec![] };

        let commit = commit_from(&app, app.extend_vote(1));
        let prepared = app.prepare_proposal(ctx(2), &commit, &mut pool).unwrap();
        assert!(prepared.injected.is_some());

        let err = app.finalize_block(&prepared.block).unwrap_err();
        assert!(matches!(err, ConsensusError::Storage(_)));
        assert!(err.is_fatal());
        assert_eq!(DepositLedger::balance_of(app.store(), "alice").unwrap(), 0);
        assert_eq!(app.last_height().unwrap(), None);
    }

    #[test]
    fn caller_held_guard_counts_instead_of_own() {
        let app = app(2, vec![None, None]);
        let mut guard = LivenessGuard::new(2);
        let mut pool = TestTxPool { txs: vec![] };

        let commit = commit_from(&app, app.extend_vote(1));
        app.prepare_proposal_with(&mut guard, ctx(2), &commit, &mut pool)
            .expect("below threshold");
        assert_eq!(guard.consecutive_failures(), 1);
        assert_eq!(app.liveness().consecutive_failures(), 0);

        let commit = commit_from(&app, app.extend_vote(2));
        let err = app
            .prepare_proposal_with(&mut guard, ctx(3), &commit, &mut pool)
            .unwrap_err();
        assert!(matches!(err, ConsensusError::LivenessHalt(_)));
    }
}
