//! Vote extension production and verification.
//!
//! Producing an extension is the only step of the pipeline that reaches
//! outside the node: it asks the sidecar for pending attestations and
//! packs them into the vote. Whatever the sidecar does, a vote is always
//! produced; the worst case is an empty extension.
//!
//! Verification runs on every peer extension before it can be aggregated.
//! It checks structure only (decodes and respects the batch limits);
//! whether an attestation is genuine is left to the ledger module.

use crate::sidecar::SidecarClient;
use crate::types::{Attestation, AttestationBatch, BatchLimits, ValidatorAddress};

use super::config::ConsensusConfig;

/// Outcome of verifying one peer's extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerifyStatus {
    Accept,
    Reject,
}

/// A peer extension as handed over by the consensus engine.
#[derive(Clone, Debug)]
pub struct VerifyVoteExtensionRequest<'a> {
    pub height: u64,
    pub validator: ValidatorAddress,
    pub vote_extension: &'a [u8],
}

/// Builds this validator's vote extension from the sidecar's response.
pub struct VoteExtensionProducer<C> {
    client: C,
    enable_height: u64,
    limits: BatchLimits,
}

impl<C: SidecarClient> VoteExtensionProducer<C> {
    pub fn new(client: C, cfg: &ConsensusConfig) -> Self {
        Self {
            client,
            enable_height: cfg.vote_extensions_enable_height,
            limits: cfg.batch_limits(),
        }
    }

    fn enabled(&self, height: u64) -> bool {
        self.enable_height != 0 && height >= self.enable_height
    }

    /// Returns the extension payload for our vote at `height`.
    ///
    /// Never fails: sidecar or encoding problems are logged and produce an
    /// empty payload, which peers read as "no data from this validator".
    pub fn extend_vote(&self, height: u64) -> Vec<u8> {
        if !self.enabled(height) {
            return Vec::new();
        }

        let pending = match self.client.fetch_pending_attestations() {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!(height, error = %e, "sidecar unavailable, extending vote without attestations");
                return Vec::new();
            }
        };

        let batch = self.fit_to_limits(height, pending.batch);
        match batch.encode() {
            Ok(bytes) => {
                tracing::debug!(
                    height,
                    attestations = batch.len(),
                    source_height = ?pending.source_height,
                    bytes = bytes.len(),
                    "extended vote"
                );
                bytes
            }
            Err(e) => {
                tracing::error!(height, error = %e, "failed to encode vote extension");
                Vec::new()
            }
        }
    }

    /// Drops items peers would reject and truncates to the item limit, so
    /// our own extension always passes verification.
    fn fit_to_limits(&self, height: u64, batch: AttestationBatch) -> AttestationBatch {
        let received = batch.len();
        let items: Vec<Attestation> = batch
            .items
            .into_iter()
            .enumerate()
            .filter(|(index, item)| {
                let keep = !item.is_empty() && item.len() <= self.limits.max_item_bytes;
                if !keep {
                    tracing::warn!(height, index, len = item.len(), "dropping unusable attestation from sidecar");
                }
                keep
            })
            .map(|(_, item)| item)
            .take(self.limits.max_items)
            .collect();

        if items.len() < received {
            tracing::info!(
                height,
                received,
                kept = items.len(),
                "trimmed sidecar batch to structural limits"
            );
        }

        AttestationBatch::new(items)
    }
}

/// Structural checks on peer extensions.
#[derive(Clone, Debug)]
pub struct VoteExtensionVerifier {
    enable_height: u64,
    limits: BatchLimits,
}

impl VoteExtensionVerifier {
    pub fn new(cfg: &ConsensusConfig) -> Self {
        Self {
            enable_height: cfg.vote_extensions_enable_height,
            limits: cfg.batch_limits(),
        }
    }

    pub fn verify(&self, req: &VerifyVoteExtensionRequest<'_>) -> VerifyStatus {
        let enabled = self.enable_height != 0 && req.height >= self.enable_height;

        if req.vote_extension.is_empty() {
            return VerifyStatus::Accept;
        }
        if !enabled {
            tracing::warn!(
                height = req.height,
                validator = %req.validator,
                "rejecting vote extension before activation height"
            );
            return VerifyStatus::Reject;
        }

        match AttestationBatch::decode_with_limits(req.vote_extension, &self.limits) {
            Ok(_) => VerifyStatus::Accept,
            Err(e) => {
                tracing::warn!(
                    height = req.height,
                    validator = %req.validator,
                    error = %e,
                    "rejecting structurally invalid vote extension"
                );
                VerifyStatus::Reject
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sidecar::{PendingAttestations, SidecarError};
    use crate::types::{HASH_LEN, Hash256};

    struct FixedSidecar(Option<Vec<Vec<u8>>>);

    impl SidecarClient for FixedSidecar {
        fn fetch_pending_attestations(&self) -> Result<PendingAttestations, SidecarError> {
            match &self.0 {
                Some(items) => Ok(PendingAttestations {
                    batch: AttestationBatch::new(
                        items.iter().cloned().map(Attestation).collect(),
                    ),
                    source_height: None,
                }),
                None => Err(SidecarError::Transport("connection refused".to_string())),
            }
        }
    }

    fn cfg() -> ConsensusConfig {
        ConsensusConfig {
            vote_extensions_enable_height: 5,
            max_attestations_per_batch: 3,
            max_attestation_bytes: 8,
            ..ConsensusConfig::default()
        }
    }

    fn request(height: u64, ext: &[u8]) -> VerifyVoteExtensionRequest<'_> {
        VerifyVoteExtensionRequest {
            height,
            validator: ValidatorAddress(Hash256([3u8; HASH_LEN])),
            vote_extension: ext,
        }
    }

    #[test]
    fn no_extension_before_activation() {
        let producer = VoteExtensionProducer::new(FixedSidecar(Some(vec![b"a".to_vec()])), &cfg());
        assert!(producer.extend_vote(4).is_empty());
    }

    #[test]
    fn sidecar_success_is_encoded_batch() {
        let producer = VoteExtensionProducer::new(
            FixedSidecar(Some(vec![b"a".to_vec(), b"b".to_vec()])),
            &cfg(),
        );
        let ext = producer.extend_vote(5);
        let batch = AttestationBatch::decode(&ext).expect("decodes");
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn empty_sidecar_batch_differs_from_failure() {
        let empty = VoteExtensionProducer::new(FixedSidecar(Some(vec![])), &cfg());
        let failing = VoteExtensionProducer::new(FixedSidecar(None), &cfg());

        let ext = empty.extend_vote(6);
        assert!(!ext.is_empty());
        assert!(AttestationBatch::decode(&ext).expect("decodes").is_empty());

        assert!(failing.extend_vote(6).is_empty());
    }

    #[test]
    fn producer_output_always_passes_verification() {
        let producer = VoteExtensionProducer::new(
            FixedSidecar(Some(vec![
                b"ok".to_vec(),
                Vec::new(),
                b"way-too-long".to_vec(),
                b"x".to_vec(),
                b"y".to_vec(),
                b"z".to_vec(),
            ])),
            &cfg(),
        );
        let ext = producer.extend_vote(7);
        let batch = AttestationBatch::decode(&ext).expect("decodes");
        let kept: Vec<&[u8]> = batch.items.iter().map(|a| a.as_bytes()).collect();
        assert_eq!(kept, vec![b"ok".as_slice(), b"x".as_slice(), b"y".as_slice()]);

        let verifier = VoteExtensionVerifier::new(&cfg());
        assert_eq!(verifier.verify(&request(7, &ext)), VerifyStatus::Accept);
    }

    #[test]
    fn verifier_rejects_garbage_without_panicking() {
        let verifier = VoteExtensionVerifier::new(&cfg());
        for garbage in [&[0xFFu8, 0xFF, 0xFF][..], &[0x02, 0x01], &[0x00, 0x00]] {
            assert_eq!(verifier.verify(&request(9, garbage)), VerifyStatus::Reject);
        }
    }

    #[test]
    fn verifier_enforces_limits_and_activation() {
        let verifier = VoteExtensionVerifier::new(&cfg());

        let too_many = AttestationBatch::new(
            (0..4u8).map(|i| Attestation(vec![i])).collect(),
        )
        .encode()
        .unwrap();
        assert_eq!(verifier.verify(&request(9, &too_many)), VerifyStatus::Reject);

        let fine = AttestationBatch::new(vec![Attestation(b"a".to_vec())])
            .encode()
            .unwrap();
        assert_eq!(verifier.verify(&request(4, &fine)), VerifyStatus::Reject);
        assert_eq!(verifier.verify(&request(5, &fine)), VerifyStatus::Accept);

        // A peer whose sidecar was down sends nothing; that is fine.
        assert_eq!(verifier.verify(&request(9, &[])), VerifyStatus::Accept);
    }
}
