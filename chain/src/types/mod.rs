//! Core domain types used by the chain
//!
//! This module defines strongly-typed hashes, validator identifiers and
//! signatures shared across the pipeline, plus the wire types that move
//! attestations from vote extensions into blocks. The goal is to avoid
//! "naked" byte buffers in public APIs and instead use domain-specific
//! newtypes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Attestation batches and the injected pseudo-transaction.
pub mod attestation;
/// Blocks, headers and block hashing.
pub mod block;
/// Opaque block transactions.
pub mod tx;
/// Extended votes as delivered by the consensus engine.
pub mod vote;

pub use attestation::{
    Attestation, AttestationBatch, BatchLimits, INJECTED_TX_PREFIX, InjectedAttestationTx,
    WireError,
};
pub use block::{Block, BlockHash, Header};
pub use tx::RawTx;
pub use vote::{BlockIdFlag, ExtendedCommitInfo, ExtendedVoteInfo, ValidatorInfo};

/// Length in bytes of all 256-bit hash types used in this module.
pub const HASH_LEN: usize = 32;

/// Strongly-typed 256-bit hash wrapper (BLAKE3-256).
///
/// This type is used as the backing representation for all fixed-size hashes
/// in the chain (validator addresses, block hashes, state hashes). It is
/// always exactly [`HASH_LEN`] bytes long.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub struct Hash256(pub [u8; HASH_LEN]);

impl Hash256 {
    /// Computes a new [`Hash256`] as the BLAKE3-256 hash of `data`.
    ///
    /// The result is deterministic for a given byte slice and is suitable
    /// for use as an identifier or content hash, but it is **not**
    /// a password hash or KDF.
    pub fn compute(data: &[u8]) -> Self {
        let h = blake3::hash(data);
        Hash256(*h.as_bytes())
    }

    /// Returns the underlying 32-byte hash as a borrowed array.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Lower-case hex rendering, used in logs and the node API.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Validator identifier (hash of the validator's consensus public key).
///
/// Addresses are totally ordered by their bytes. Extension selection uses
/// this order to break voting-power ties, so every node picks the same
/// extension regardless of the order in which votes were delivered.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct ValidatorAddress(pub Hash256);

impl ValidatorAddress {
    /// Derives a [`ValidatorAddress`] from a consensus public key.
    ///
    /// The caller is responsible for passing the canonical byte encoding
    /// of the public key. Different encodings of the same key will result
    /// in different addresses.
    pub fn from_public_key(pk_bytes: &[u8]) -> Self {
        ValidatorAddress(Hash256::compute(pk_bytes))
    }

    /// Returns the underlying [`Hash256`] backing this address.
    pub fn as_hash(&self) -> &Hash256 {
        &self.0
    }
}

impl fmt::Display for ValidatorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell validators apart in logs.
        f.write_str(&self.0.to_hex()[..12])
    }
}

/// Signature bytes attached to a vote extension by the consensus engine.
///
/// This pipeline never signs or verifies these; they are carried so that
/// extended votes keep the shape the engine hands over.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Signature(pub Vec<u8>);

impl Signature {
    /// Returns the raw signature bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}
