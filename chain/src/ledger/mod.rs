//! Ledger module interface.
//!
//! The ledger module decides whether one attestation is acceptable and, if
//! so, records its effects. The pipeline treats it as a black box: it hands
//! over one item and a scoped [`StateView`], and only looks at whether the
//! call succeeded.
//!
//! [`deposit::DepositLedger`] is a reference implementation used by the
//! node binary and the tests.

use thiserror::Error;

use crate::storage::{StateView, StorageError};
use crate::types::Attestation;

pub mod deposit;

pub use deposit::{DepositAttestation, DepositLedger};

/// Why the ledger module did not apply an attestation.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The payload is well formed but the ledger declines it (replay,
    /// zero amount, overflow, ...).
    #[error("attestation rejected: {0}")]
    Rejected(String),

    /// The payload does not parse as anything the ledger understands.
    #[error("malformed attestation: {0}")]
    Malformed(String),

    /// The state backend failed underneath the ledger. Unlike the two
    /// variants above this is not a business outcome.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl LedgerError {
    /// `true` for outcomes that are part of normal operation.
    pub fn is_business_rejection(&self) -> bool {
        !matches!(self, LedgerError::Storage(_))
    }
}

/// Per-item apply entry point of the ledger module.
///
/// Implementations must be deterministic: the same attestation applied to
/// the same state must produce the same result and the same writes on every
/// validator. They must not perform I/O beyond `state`.
pub trait AttestationLedger {
    fn apply_attestation(
        &self,
        state: &mut dyn StateView,
        attestation: &Attestation,
    ) -> Result<(), LedgerError>;
}

impl<L: AttestationLedger + ?Sized> AttestationLedger for &L {
    fn apply_attestation(
        &self,
        state: &mut dyn StateView,
        attestation: &Attestation,
    ) -> Result<(), LedgerError> {
        (**self).apply_attestation(state, attestation)
    }
}
