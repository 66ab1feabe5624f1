use serde::{Deserialize, Serialize};

use crate::types::BatchLimits;

use super::liveness::DEFAULT_LIVENESS_FAILURE_THRESHOLD;

/// Consensus-facing configuration of the attestation pipeline.
///
/// This includes both protocol-level knobs (activation height, liveness
/// threshold) and implementation-level limits (block and batch sizes).
/// Every validator must run with the same protocol-level values.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Target block time in seconds for the devnet driver.
    pub block_time_secs: u64,
    /// Hard limit on the number of transactions per block.
    pub max_block_txs: usize,
    /// Hard limit on the total serialized size of a block, in bytes.
    pub max_block_size_bytes: usize,
    /// First height whose votes carry extensions; `0` disables the
    /// pipeline entirely.
    pub vote_extensions_enable_height: u64,
    /// Consecutive failed rounds after which the node halts.
    pub liveness_failure_threshold: u64,
    /// Structural limit on attestations per batch.
    pub max_attestations_per_batch: usize,
    /// Structural limit on a single attestation, in bytes.
    pub max_attestation_bytes: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            block_time_secs: 5,
            max_block_txs: 10_000,
            max_block_size_bytes: 4_000_000,
            vote_extensions_enable_height: 1,
            liveness_failure_threshold: DEFAULT_LIVENESS_FAILURE_THRESHOLD,
            max_attestations_per_batch: 256,
            max_attestation_bytes: 4_096,
        }
    }
}

impl ConsensusConfig {
    /// Whether votes for `height` carry extensions.
    pub fn vote_extensions_enabled(&self, height: u64) -> bool {
        self.vote_extensions_enable_height != 0 && height >= self.vote_extensions_enable_height
    }

    /// Whether a block at `height` may carry an injected batch.
    ///
    /// Injection consumes the extensions of the previous height's votes, so
    /// it starts one height after extensions do.
    pub fn injection_enabled(&self, height: u64) -> bool {
        height > 0 && self.vote_extensions_enabled(height - 1)
    }

    /// Structural schema enforced on every batch.
    pub fn batch_limits(&self) -> BatchLimits {
        BatchLimits {
            max_items: self.max_attestations_per_batch,
            max_item_bytes: self.max_attestation_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_heights() {
        let cfg = ConsensusConfig {
            vote_extensions_enable_height: 10,
            ..ConsensusConfig::default()
        };

        assert!(!cfg.vote_extensions_enabled(9));
        assert!(cfg.vote_extensions_enabled(10));

        assert!(!cfg.injection_enabled(10));
        assert!(cfg.injection_enabled(11));
    }

    #[test]
    fn zero_enable_height_disables_everything() {
        let cfg = ConsensusConfig {
            vote_extensions_enable_height: 0,
            ..ConsensusConfig::default()
        };

        assert!(!cfg.vote_extensions_enabled(0));
        assert!(!cfg.vote_extensions_enabled(u64::MAX));
        assert!(!cfg.injection_enabled(0));
        assert!(!cfg.injection_enabled(1_000));
    }

    #[test]
    fn batch_limits_mirror_config() {
        let cfg = ConsensusConfig::default();
        let limits = cfg.batch_limits();
        assert_eq!(limits.max_items, cfg.max_attestations_per_batch);
        assert_eq!(limits.max_item_bytes, cfg.max_attestation_bytes);
    }
}
