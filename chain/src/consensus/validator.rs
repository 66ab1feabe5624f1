//! Block validity predicates used by consensus.

use crate::types::Block;

use super::error::ValidationError;

/// Pluggable validity predicate for proposed blocks.
///
/// Implementations should be deterministic and side-effect free. They can
/// encapsulate base validity (size and count limits) as well as injection
/// validity by composing multiple checks into a single call.
pub trait BlockValidator {
    fn validate(&self, block: &Block) -> Result<(), ValidationError>;
}

/// A trivial validator that accepts every block.
///
/// Useful for tests and for isolating the pipeline from block checks.
pub struct AcceptAllValidator;

impl BlockValidator for AcceptAllValidator {
    fn validate(&self, _block: &Block) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// A validator that composes two other validators.
///
/// `CombinedValidator { base, injection }` runs `base.validate` and then
/// `injection.validate`, failing fast on the first error.
pub struct CombinedValidator<B, I> {
    pub base: B,
    pub injection: I,
}

impl<B, I> CombinedValidator<B, I> {
    pub fn new(base: B, injection: I) -> Self {
        Self { base, injection }
    }
}

impl<B, I> BlockValidator for CombinedValidator<B, I>
where
    B: BlockValidator,
    I: BlockValidator,
{
    fn validate(&self, block: &Block) -> Result<(), ValidationError> {
        self.base.validate(block)?;
        self.injection.validate(block)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlockHash, HASH_LEN, Hash256, Header, ValidatorAddress};

    struct RejectAll;

    impl BlockValidator for RejectAll {
        fn validate(&self, _block: &Block) -> Result<(), ValidationError> {
            Err(ValidationError::Invalid("rejected"))
        }
    }

    fn empty_block() -> Block {
        Block {
            header: Header {
                parent: BlockHash(Hash256([0u8; HASH_LEN])),
                height: 1,
                timestamp: 0,
                proposer: ValidatorAddress(Hash256([1u8; HASH_LEN])),
            },
            txs: vec![],
        }
    }

    #[test]
    fn combined_fails_if_either_side_fails() {
        let block = empty_block();

        assert!(CombinedValidator::new(AcceptAllValidator, AcceptAllValidator)
            .validate(&block)
            .is_ok());
        assert!(CombinedValidator::new(RejectAll, AcceptAllValidator)
            .validate(&block)
            .is_err());
        assert!(CombinedValidator::new(AcceptAllValidator, RejectAll)
            .validate(&block)
            .is_err());
    }
}
