//! Reference ledger: bridge deposits credited to local balances.
//!
//! Each attestation is a JSON document:
//!
//! ```json
//! {
//!   "source_chain": "ethereum",
//!   "nonce": 17,
//!   "recipient": "alice",
//!   "amount": 250
//! }
//! ```
//!
//! State layout:
//!
//! - `deposit/seen/<source_chain>/<nonce>` -> `[1]` once processed,
//! - `balance/<recipient>` -> big-endian `u64`.
//!
//! Authenticity of the deposit is out of scope here; a production ledger
//! would verify the attestation's signatures before touching state.

use serde::{Deserialize, Serialize};

use crate::storage::{StateReader, StateView, StorageError};
use crate::types::Attestation;

use super::{AttestationLedger, LedgerError};

/// Decoded deposit attestation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DepositAttestation {
    pub source_chain: String,
    pub nonce: u64,
    pub recipient: String,
    pub amount: u64,
}

impl DepositAttestation {
    /// JSON encoding as expected by [`DepositLedger`].
    pub fn to_attestation(&self) -> Attestation {
        // Serializing a struct of strings and integers cannot fail.
        Attestation(serde_json::to_vec(self).unwrap_or_default())
    }
}

/// Ledger that credits attested deposits exactly once.
#[derive(Clone, Debug, Default)]
pub struct DepositLedger;

impl DepositLedger {
    pub fn new() -> Self {
        Self
    }

    fn seen_key(source_chain: &str, nonce: u64) -> Vec<u8> {
        format!("deposit/seen/{source_chain}/{nonce}").into_bytes()
    }

    fn balance_key(recipient: &str) -> Vec<u8> {
        format!("balance/{recipient}").into_bytes()
    }

    /// Reads a recipient's balance (0 when never credited).
    pub fn balance_of<R: StateReader + ?Sized>(
        state: &R,
        recipient: &str,
    ) -> Result<u64, StorageError> {
        Ok(state
            .get(&Self::balance_key(recipient))?
            .and_then(|bytes| <[u8; 8]>::try_from(bytes.as_slice()).ok())
            .map(u64::from_be_bytes)
            .unwrap_or(0))
    }
}

impl AttestationLedger for DepositLedger {
    fn apply_attestation(
        &self,
        state: &mut dyn StateView,
        attestation: &Attestation,
    ) -> Result<(), LedgerError> {
        let deposit: DepositAttestation = serde_json::from_slice(attestation.as_bytes())
            .map_err(|e| LedgerError::Malformed(e.to_string()))?;

        if deposit.source_chain.is_empty() || deposit.recipient.is_empty() {
            return Err(LedgerError::Malformed(
                "source_chain and recipient must be non-empty".to_string(),
            ));
        }
        if deposit.amount == 0 {
            return Err(LedgerError::Rejected("zero-amount deposit".to_string()));
        }

        let seen_key = Self::seen_key(&deposit.source_chain, deposit.nonce);
        if state.get(&seen_key)?.is_some() {
            return Err(LedgerError::Rejected(format!(
                "deposit {}/{} already processed",
                deposit.source_chain, deposit.nonce
            )));
        }

        let balance = Self::balance_of(state, &deposit.recipient)?;
        let credited = balance.checked_add(deposit.amount).ok_or_else(|| {
            LedgerError::Rejected(format!("balance overflow for {}", deposit.recipient))
        })?;

        state.set(&seen_key, vec![1]);
        state.set(
            &Self::balance_key(&deposit.recipient),
            credited.to_be_bytes().to_vec(),
        );

        Ok(())
    }
}
