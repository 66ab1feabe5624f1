//! Consensus-facing attestation pipeline.
//!
//! This module provides the pieces a consensus engine calls into, one per
//! step of a height:
//!
//! - configuration parameters ([`config::ConsensusConfig`]),
//! - vote extension production and verification ([`vote_extension`]),
//! - proposal building with extension aggregation ([`proposer`]),
//! - the liveness guard owned by the proposal builder ([`liveness`]),
//! - block validity predicates ([`validator`]),
//! - deterministic application of injected batches ([`applier`]),
//! - and the [`engine::AttestationApp`] that wires them together.

pub mod applier;
pub mod config;
pub mod engine;
pub mod error;
pub mod liveness;
pub mod proposer;
pub mod validator;
pub mod vote_extension;

pub use applier::{ApplyTally, DeterministicApplier, ItemOutcome, ItemStatus};
pub use config::ConsensusConfig;
pub use engine::{
    AttestationApp, DefaultBlockValidator, FinalizeOutcome, PreparedBlock, ProposalContext,
};
pub use error::{ConsensusError, ValidationError};
pub use liveness::{DEFAULT_LIVENESS_FAILURE_THRESHOLD, LivenessExceeded, LivenessGuard};
pub use proposer::{InjectionSummary, Proposal, ProposalBuilder, TxPool, select_extension};
pub use validator::{AcceptAllValidator, BlockValidator, CombinedValidator};
pub use vote_extension::{
    VerifyStatus, VerifyVoteExtensionRequest, VoteExtensionProducer, VoteExtensionVerifier,
};
