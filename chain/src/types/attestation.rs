//! Attestation batches and their two wire forms.
//!
//! A batch travels twice through consensus: first as the payload of a
//! validator's vote extension, then (after aggregation) as the injected
//! pseudo-transaction at index 0 of a block. Both forms share one encoding,
//! **bincode 2** with the `standard()` configuration and a hard size limit.
//! The injected form is the same bytes behind a fixed marker so that it can
//! never be mistaken for a user transaction.

use bincode::config::{self, Config};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::RawTx;

/// Upper bound on any encoded batch, in bytes.
///
/// Decoding refuses larger inputs before touching them and the bincode
/// limit stops length prefixes from claiming more than this.
pub const MAX_WIRE_BYTES: usize = 8 * 1024 * 1024;

/// Marker that opens every injected attestation transaction.
///
/// The first byte is outside the printable range so that ordinary JSON or
/// text transactions can never start with it by accident.
pub const INJECTED_TX_PREFIX: &[u8; 8] = b"\xA7ATTEST\x01";

fn wire_config() -> impl Config {
    config::standard().with_limit::<MAX_WIRE_BYTES>()
}

/// Errors raised while encoding, decoding or structurally checking batches.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("failed to encode attestation batch: {0}")]
    Encode(String),

    #[error("failed to decode attestation batch: {0}")]
    Decode(String),

    #[error("attestation batch has {trailing} trailing bytes after {consumed} decoded bytes")]
    TrailingBytes { consumed: usize, trailing: usize },

    #[error("payload of {len} bytes exceeds limit of {max} bytes")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("attestation batch has {count} items, limit is {max}")]
    TooManyItems { count: usize, max: usize },

    #[error("attestation at index {index} is empty")]
    EmptyItem { index: usize },

    #[error("attestation at index {index} is {len} bytes, limit is {max}")]
    ItemTooLarge { index: usize, len: usize, max: usize },
}

/// Structural schema limits for a batch.
///
/// These are the only properties checked before a batch reaches the ledger
/// module; whether an attestation is genuine is the ledger's business.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_items: usize,
    pub max_item_bytes: usize,
}

/// One opaque attestation as produced by the sidecar.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Attestation(pub Vec<u8>);

impl Attestation {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Attestation {
    fn from(bytes: Vec<u8>) -> Self {
        Attestation(bytes)
    }
}

/// Ordered sequence of attestations fetched for one round.
///
/// Order is significant: every validator applies items in exactly this
/// order, and later items may observe the effects of earlier ones.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct AttestationBatch {
    pub items: Vec<Attestation>,
}

impl AttestationBatch {
    pub fn new(items: Vec<Attestation>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Encodes the batch into its canonical wire form.
    ///
    /// An empty batch still encodes to a non-empty byte string, which keeps
    /// "the sidecar had nothing" distinguishable from "no payload at all".
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let bytes = bincode::serde::encode_to_vec(self, wire_config())
            .map_err(|e| WireError::Encode(e.to_string()))?;
        if bytes.len() > MAX_WIRE_BYTES {
            return Err(WireError::PayloadTooLarge {
                len: bytes.len(),
                max: MAX_WIRE_BYTES,
            });
        }
        Ok(bytes)
    }

    /// Decodes a batch, rejecting oversized input and trailing bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() > MAX_WIRE_BYTES {
            return Err(WireError::PayloadTooLarge {
                len: bytes.len(),
                max: MAX_WIRE_BYTES,
            });
        }

        let (batch, consumed): (AttestationBatch, usize) =
            bincode::serde::decode_from_slice(bytes, wire_config())
                .map_err(|e| WireError::Decode(e.to_string()))?;

        if consumed != bytes.len() {
            return Err(WireError::TrailingBytes {
                consumed,
                trailing: bytes.len() - consumed,
            });
        }

        Ok(batch)
    }

    /// Checks the batch against the structural schema.
    pub fn validate(&self, limits: &BatchLimits) -> Result<(), WireError> {
        if self.items.len() > limits.max_items {
            return Err(WireError::TooManyItems {
                count: self.items.len(),
                max: limits.max_items,
            });
        }

        for (index, item) in self.items.iter().enumerate() {
            if item.is_empty() {
                return Err(WireError::EmptyItem { index });
            }
            if item.len() > limits.max_item_bytes {
                return Err(WireError::ItemTooLarge {
                    index,
                    len: item.len(),
                    max: limits.max_item_bytes,
                });
            }
        }

        Ok(())
    }

    /// [`decode`](Self::decode) followed by [`validate`](Self::validate).
    pub fn decode_with_limits(bytes: &[u8], limits: &BatchLimits) -> Result<Self, WireError> {
        let batch = Self::decode(bytes)?;
        batch.validate(limits)?;
        Ok(batch)
    }
}

/// The aggregated batch as it sits at index 0 of a block.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InjectedAttestationTx {
    pub batch: AttestationBatch,
}

impl InjectedAttestationTx {
    pub fn new(batch: AttestationBatch) -> Self {
        Self { batch }
    }

    /// Serializes into a block transaction: marker followed by the batch.
    pub fn encode(&self) -> Result<RawTx, WireError> {
        let body = self.batch.encode()?;
        let mut bytes = Vec::with_capacity(INJECTED_TX_PREFIX.len() + body.len());
        bytes.extend_from_slice(INJECTED_TX_PREFIX);
        bytes.extend_from_slice(&body);
        Ok(RawTx(bytes))
    }

    /// Interprets a block transaction as an injected batch.
    ///
    /// Returns `Ok(None)` for ordinary transactions (no marker) and an error
    /// when the marker is present but the body does not decode.
    pub fn decode(tx: &RawTx) -> Result<Option<Self>, WireError> {
        match tx.as_bytes().strip_prefix(INJECTED_TX_PREFIX.as_slice()) {
            None => Ok(None),
            Some(body) => AttestationBatch::decode(body).map(|batch| Some(Self { batch })),
        }
    }

    /// Like [`decode`](Self::decode), additionally enforcing `limits`.
    pub fn decode_with_limits(tx: &RawTx, limits: &BatchLimits) -> Result<Option<Self>, WireError> {
        match Self::decode(tx)? {
            None => Ok(None),
            Some(injected) => {
                injected.batch.validate(limits)?;
                Ok(Some(injected))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn batch_of(items: &[&[u8]]) -> AttestationBatch {
        AttestationBatch::new(items.iter().map(|i| Attestation(i.to_vec())).collect())
    }

    const LIMITS: BatchLimits = BatchLimits {
        max_items: 4,
        max_item_bytes: 16,
    };

    #[test]
    fn empty_batch_encodes_to_non_empty_bytes() {
        let bytes = AttestationBatch::default().encode().expect("encode");
        assert!(!bytes.is_empty());
        assert!(AttestationBatch::decode(&bytes).expect("decode").is_empty());
    }

    #[test]
    fn decode_rejects_empty_input() {
        assert!(matches!(
            AttestationBatch::decode(&[]),
            Err(WireError::Decode(_))
        ));
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let mut bytes = batch_of(&[b"a"]).encode().expect("encode");
        bytes.push(0xFF);
        let err = AttestationBatch::decode(&bytes).unwrap_err();
        assert!(matches!(err, WireError::TrailingBytes { trailing: 1, .. }));
    }

    #[test]
    fn decode_rejects_truncated_payload() {
        let bytes = batch_of(&[b"hello", b"world"]).encode().expect("encode");
        let err = AttestationBatch::decode(&bytes[..bytes.len() - 2]).unwrap_err();
        assert!(matches!(err, WireError::Decode(_)));
    }

    #[test]
    fn decode_rejects_absurd_length_prefix() {
        // varint marker 0xFD announces a u64 length; claim u64::MAX items.
        let mut bytes = vec![0xFD];
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());
        assert!(AttestationBatch::decode(&bytes).is_err());
    }

    #[test]
    fn validate_enforces_schema() {
        assert!(batch_of(&[b"ok", b"fine"]).validate(&LIMITS).is_ok());

        let too_many = batch_of(&[b"1", b"2", b"3", b"4", b"5"]);
        assert_eq!(
            too_many.validate(&LIMITS),
            Err(WireError::TooManyItems { count: 5, max: 4 })
        );

        let with_empty = batch_of(&[b"x", b""]);
        assert_eq!(
            with_empty.validate(&LIMITS),
            Err(WireError::EmptyItem { index: 1 })
        );

        let oversized = batch_of(&[&[7u8; 17]]);
        assert_eq!(
            oversized.validate(&LIMITS),
            Err(WireError::ItemTooLarge {
                index: 0,
                len: 17,
                max: 16
            })
        );
    }

    #[test]
    fn injected_tx_is_marker_plus_vote_extension_bytes() {
        let batch = batch_of(&[b"deposit-1", b"deposit-2"]);
        let tx = InjectedAttestationTx::new(batch.clone())
            .encode()
            .expect("encode");

        assert!(tx.as_bytes().starts_with(INJECTED_TX_PREFIX));
        assert_eq!(
            &tx.as_bytes()[INJECTED_TX_PREFIX.len()..],
            batch.encode().expect("encode").as_slice()
        );
    }

    #[test]
    fn ordinary_tx_is_not_injected() {
        let tx = RawTx(b"{\"transfer\":1}".to_vec());
        assert_eq!(InjectedAttestationTx::decode(&tx), Ok(None));
    }

    #[test]
    fn marker_with_garbage_body_is_an_error() {
        let mut bytes = INJECTED_TX_PREFIX.to_vec();
        bytes.extend_from_slice(&[0x05, 0x01]);
        assert!(InjectedAttestationTx::decode(&RawTx(bytes)).is_err());
    }

    #[test]
    fn injected_decode_with_limits_checks_schema() {
        let tx = InjectedAttestationTx::new(batch_of(&[b"a", b""]))
            .encode()
            .expect("encode");
        assert_eq!(
            InjectedAttestationTx::decode_with_limits(&tx, &LIMITS),
            Err(WireError::EmptyItem { index: 1 })
        );
    }

    proptest! {
        #[test]
        fn both_wire_forms_preserve_items_byte_for_byte(
            items in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..64), 0..16)
        ) {
            let batch = AttestationBatch::new(items.into_iter().map(Attestation).collect());

            let ext = batch.encode().expect("encode");
            prop_assert_eq!(&AttestationBatch::decode(&ext).expect("decode"), &batch);

            let tx = InjectedAttestationTx::new(batch.clone()).encode().expect("encode");
            let injected = InjectedAttestationTx::decode(&tx).expect("decode").expect("marker");
            prop_assert_eq!(injected.batch, batch);
        }
    }
}
