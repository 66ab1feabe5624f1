//! Attestation pipeline library crate.
//!
//! This crate provides the validator-side building blocks that carry
//! externally attested cross-chain messages into blocks:
//!
//! - strongly-typed domain and wire types (`types`),
//! - the sidecar client that fetches pending attestations (`sidecar`),
//! - the consensus-facing pipeline: vote extensions, proposal building,
//!   liveness guard and deterministic application (`consensus`),
//! - proposal validity predicates (`validation`),
//! - scoped state storage backends (`storage`),
//! - the ledger module interface and a reference deposit ledger (`ledger`),
//! - Prometheus-based metrics (`metrics`),
//! - and a top-level node configuration (`config`).
//!
//! Higher-level binaries compose these pieces to run validator nodes and
//! local devnets.

pub mod config;
pub mod consensus;
pub mod ledger;
pub mod metrics;
pub mod sidecar;
pub mod storage;
pub mod types;
pub mod validation;

// Re-export top-level configuration types.
pub use config::{
    ConfigError, DEFAULT_SIDECAR_ADDRESS, MetricsConfig, NodeConfig, SidecarConfig,
};

// Re-export "core" pipeline types and traits.
pub use consensus::{
    ApplyTally, AttestationApp, BlockValidator, CombinedValidator, ConsensusConfig,
    ConsensusError, DeterministicApplier, FinalizeOutcome, InjectionSummary, ItemOutcome,
    ItemStatus, LivenessExceeded, LivenessGuard, PreparedBlock, ProposalBuilder, ProposalContext,
    TxPool, ValidationError, VerifyStatus, VerifyVoteExtensionRequest, VoteExtensionProducer,
    VoteExtensionVerifier,
};

// Re-export storage backends.
pub use storage::{
    CacheTx, ChangeSet, InMemoryStateStore, RocksDbConfig, RocksDbStateStore, StateBackend, StateReader,
    StateStore, StateView, StorageError,
};

// Re-export the ledger interface and the sidecar client.
pub use ledger::{AttestationLedger, DepositAttestation, DepositLedger, LedgerError};
pub use sidecar::{HttpSidecarClient, PendingAttestations, SidecarClient, SidecarError};
pub use validation::{BaseValidity, InjectedTxValidity};

// Re-export metrics registry and pipeline metrics.
pub use metrics::{MetricsRegistry, PipelineMetrics, run_prometheus_http_server};

// Re-export domain types at the crate root for convenience.
pub use types::*;

/// Exit status a node uses when the liveness guard halts the pipeline.
pub const LIVENESS_HALT_EXIT_CODE: i32 = 3;

/// Type alias for the default pipeline stack used by a "typical" node.
///
/// This uses:
///
/// - [`HttpSidecarClient`] to reach the sidecar,
/// - [`DepositLedger`] as the ledger module,
/// - [`RocksDbStateStore`] for persistent state.
pub type DefaultAttestationApp = AttestationApp<HttpSidecarClient, DepositLedger, RocksDbStateStore>;
