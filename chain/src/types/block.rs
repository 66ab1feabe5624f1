// chain/src/types/block.rs

//! Block types and hashing.
//!
//! This module defines the block data structures handed to the pipeline
//! by the consensus engine, together with a canonical hashing routine.
//!
//! Serialization is done with **bincode 2** using the `serde` integration
//! (`bincode::serde::encode_to_vec`) and an explicit `standard()` config.
//! The same canonical encoding is used everywhere we need block bytes.

use serde::{Deserialize, Serialize};

use super::{Hash256, RawTx, ValidatorAddress};

/// Strongly-typed block hash.
///
/// This is the content hash of a [`Block`], computed as a BLAKE3-256
/// digest over the canonical bincode-2 serialization of the block.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BlockHash(pub Hash256);

/// Block header: minimal consensus fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Header {
    /// Hash of the parent block in the canonical chain.
    pub parent: BlockHash,

    /// Height of this block.
    pub height: u64,

    /// Wall-clock timestamp of the block, in seconds since Unix epoch.
    ///
    /// Never read by the deterministic apply step.
    pub timestamp: u64,

    /// Validator that proposed this block.
    pub proposer: ValidatorAddress,
}

/// Block = header + ordered list of opaque transactions.
///
/// At injection heights the transaction at index 0 may be the injected
/// attestation batch; every other transaction is a user transaction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    /// Header containing linking, ordering, and proposer information.
    pub header: Header,
    /// Ordered list of transactions included in this block.
    pub txs: Vec<RawTx>,
}

impl Block {
    /// Returns the canonical byte representation of this block.
    ///
    /// This uses **bincode 2** with the `standard()` configuration and
    /// the `serde` integration. All hashing that depends on a "canonical"
    /// form should go through this method to avoid format drift.
    ///
    /// # Panics
    ///
    /// Panics if encoding fails. This is considered a programming
    /// error, because all fields are plain bytes and integers.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let cfg = bincode::config::standard();
        bincode::serde::encode_to_vec(self, cfg)
            .expect("Block should always be serializable with bincode 2 + serde")
    }

    /// Computes a canonical BLAKE3-256 hash for this block.
    pub fn compute_hash(&self) -> BlockHash {
        let bytes = self.canonical_bytes();
        BlockHash(Hash256::compute(&bytes))
    }

    /// Number of transactions carrying the injected-attestation marker.
    pub fn injected_tx_count(&self) -> usize {
        self.txs.iter().filter(|tx| tx.is_injected()).count()
    }

    /// Transactions the broader state machine executes (everything but a
    /// leading injected batch).
    pub fn user_txs(&self) -> &[RawTx] {
        match self.txs.first() {
            Some(first) if first.is_injected() => &self.txs[1..],
            _ => &self.txs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Attestation, AttestationBatch, HASH_LEN, InjectedAttestationTx};

    fn header(height: u64) -> Header {
        Header {
            parent: BlockHash(Hash256([1u8; HASH_LEN])),
            height,
            timestamp: 1_700_000_000,
            proposer: ValidatorAddress(Hash256([2u8; HASH_LEN])),
        }
    }

    #[test]
    fn block_hash_is_deterministic() {
        let block = Block {
            header: header(1),
            txs: vec![RawTx(b"tx-1".to_vec())],
        };

        let h1 = block.compute_hash();
        let h2 = block.clone().compute_hash();

        assert_eq!(h1, h2);
    }

    #[test]
    fn user_txs_skip_leading_injected_batch() {
        let injected = InjectedAttestationTx::new(AttestationBatch::new(vec![Attestation(
            b"a".to_vec(),
        )]))
        .encode()
        .expect("encode");

        let block = Block {
            header: header(3),
            txs: vec![injected, RawTx(b"u1".to_vec()), RawTx(b"u2".to_vec())],
        };

        assert_eq!(block.user_txs().len(), 2);
        assert_eq!(block.injected_tx_count(), 1);

        let plain = Block {
            header: header(3),
            txs: vec![RawTx(b"u1".to_vec())],
        };
        assert_eq!(plain.user_txs().len(), 1);
        assert_eq!(plain.injected_tx_count(), 0);
    }
}
