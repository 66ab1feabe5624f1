//! Injection validity predicate for blocks.
//!
//! Only the proposer may place an injected attestation batch, only at
//! index 0, and only at heights where injection is active. Peers check
//! this before voting, so a block that reaches finalization never carries
//! an undecodable or misplaced batch.

use crate::consensus::config::ConsensusConfig;
use crate::consensus::error::ValidationError;
use crate::consensus::validator::BlockValidator;
use crate::types::{BatchLimits, Block, InjectedAttestationTx};

#[derive(Clone, Debug)]
pub struct InjectedTxValidity {
    config: ConsensusConfig,
    limits: BatchLimits,
}

impl InjectedTxValidity {
    pub fn new(cfg: &ConsensusConfig) -> Self {
        Self {
            config: cfg.clone(),
            limits: cfg.batch_limits(),
        }
    }
}

impl BlockValidator for InjectedTxValidity {
    fn validate(&self, block: &Block) -> Result<(), ValidationError> {
        let height = block.header.height;

        if let Some(pos) = block.txs.iter().skip(1).position(|tx| tx.is_injected()) {
            return Err(ValidationError::Custom(format!(
                "injected attestation transaction at index {}",
                pos + 1
            )));
        }

        let Some(first) = block.txs.first() else {
            return Ok(());
        };
        if !first.is_injected() {
            return Ok(());
        }

        if !self.config.injection_enabled(height) {
            return Err(ValidationError::Custom(format!(
                "injected attestation transaction before injection height (height {height})"
            )));
        }

        InjectedAttestationTx::decode_with_limits(first, &self.limits)
            .map_err(|e| ValidationError::Custom(format!("malformed injected transaction: {e}")))?;

        Ok(())
    }
}
