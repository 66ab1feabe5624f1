use thiserror::Error;

use crate::storage::StorageError;
use crate::types::WireError;

use super::liveness::LivenessExceeded;

/// Error type returned when a proposed block fails validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Block is invalid according to a validity predicate.
    #[error("invalid block: {0}")]
    Invalid(&'static str),
    /// Block is invalid with a dynamic error message.
    #[error("invalid block: {0}")]
    Custom(String),
}

/// High-level errors that can occur in the consensus-facing pipeline.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// Underlying validation failure.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The selected vote extension did not decode. Fails this proposal
    /// attempt only.
    #[error("vote extension selected from {validator} is malformed: {source}")]
    MalformedExtension {
        validator: String,
        #[source]
        source: WireError,
    },

    /// The aggregated batch could not be serialized or does not fit.
    #[error("failed to build injected attestation transaction: {0}")]
    Injection(WireError),

    /// An agreed block carries an injected transaction that does not decode.
    #[error("block {height} carries a malformed injected attestation transaction: {source}")]
    MalformedInjectedTx {
        height: u64,
        #[source]
        source: WireError,
    },

    /// Storage-related failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The sidecar pipeline has been failing for too long.
    #[error(
        "attestation pipeline halted after {} consecutive failed rounds (threshold {})",
        .0.failures,
        .0.threshold
    )]
    LivenessHalt(LivenessExceeded),
}

impl From<LivenessExceeded> for ConsensusError {
    fn from(e: LivenessExceeded) -> Self {
        ConsensusError::LivenessHalt(e)
    }
}

impl ConsensusError {
    /// `true` when the node must stop rather than retry next round.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ConsensusError::LivenessHalt(_)
                | ConsensusError::MalformedInjectedTx { .. }
                | ConsensusError::Storage(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_halting_conditions_are_fatal() {
        let halt = ConsensusError::from(LivenessExceeded {
            failures: 3,
            threshold: 3,
        });
        assert!(halt.is_fatal());
        assert!(halt.to_string().contains("3 consecutive failed rounds"));

        let malformed = ConsensusError::MalformedExtension {
            validator: "abc".to_string(),
            source: WireError::Decode("eof".to_string()),
        };
        assert!(!malformed.is_fatal());

        let invalid = ConsensusError::from(ValidationError::Invalid("too big"));
        assert!(!invalid.is_fatal());
        assert_eq!(invalid.to_string(), "invalid block: too big");
    }
}
