//! Base validity predicate for blocks.
//!
//! This validator enforces cheap, deterministic invariants that do not
//! require access to external services:
//!
//! - block size and transaction count limits,
//! - no empty transactions.

use crate::consensus::config::ConsensusConfig;
use crate::consensus::error::ValidationError;
use crate::consensus::validator::BlockValidator;
use crate::types::Block;

/// Base validity predicate for blocks.
///
/// This struct is configured using [`ConsensusConfig`] and performs
/// purely block-local checks that are inexpensive to run.
#[derive(Clone, Debug)]
pub struct BaseValidity {
    max_block_txs: usize,
    max_block_size_bytes: usize,
}

impl BaseValidity {
    /// Constructs a new `BaseValidity` from the consensus configuration.
    pub fn new(cfg: &ConsensusConfig) -> Self {
        Self {
            max_block_txs: cfg.max_block_txs,
            max_block_size_bytes: cfg.max_block_size_bytes,
        }
    }

    fn check_tx_count(&self, block: &Block) -> Result<(), ValidationError> {
        let tx_count = block.txs.len();
        if tx_count > self.max_block_txs {
            return Err(ValidationError::Custom(format!(
                "block has {} txs, exceeds max_block_txs={}",
                tx_count, self.max_block_txs
            )));
        }
        Ok(())
    }

    fn check_block_size(&self, block: &Block) -> Result<(), ValidationError> {
        // Only transaction bytes count towards the budget the proposer
        // fills; header and framing overhead is ignored.
        let size: usize = block.txs.iter().map(|tx| tx.len()).sum();
        if size > self.max_block_size_bytes {
            return Err(ValidationError::Custom(format!(
                "block size {} bytes exceeds max_block_size_bytes={}",
                size, self.max_block_size_bytes
            )));
        }
        Ok(())
    }

    fn check_empty_txs(&self, block: &Block) -> Result<(), ValidationError> {
        if block.txs.iter().any(|tx| tx.is_empty()) {
            return Err(ValidationError::Invalid("block contains an empty transaction"));
        }
        Ok(())
    }
}

impl BlockValidator for BaseValidity {
    fn validate(&self, block: &Block) -> Result<(), ValidationError> {
        self.check_tx_count(block)?;
        self.check_block_size(block)?;
        self.check_empty_txs(block)?;
        Ok(())
    }
}
