//! Extended votes as delivered by the consensus engine.
//!
//! The engine owns signing, gossip and commit bookkeeping. What reaches the
//! application is the previous height's commit with each validator's
//! voting power and (possibly empty) vote extension.

use serde::{Deserialize, Serialize};

use super::{Signature, ValidatorAddress};

/// How a validator took part in the previous height's commit.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum BlockIdFlag {
    /// No vote received.
    Absent,
    /// Precommit for the committed block.
    Commit,
    /// Precommit for nil.
    Nil,
}

/// Validator identity and voting power at the voted height.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ValidatorInfo {
    pub address: ValidatorAddress,
    pub power: u64,
}

/// One validator's vote as seen by the next proposer.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExtendedVoteInfo {
    pub validator: ValidatorInfo,
    /// Opaque extension payload; empty when the validator had nothing to
    /// contribute (for example, its sidecar was unreachable).
    pub vote_extension: Vec<u8>,
    pub extension_signature: Signature,
    pub block_id_flag: BlockIdFlag,
}

impl ExtendedVoteInfo {
    /// A vote counts for aggregation only if it committed the block and
    /// actually carries payload bytes.
    pub fn has_extension(&self) -> bool {
        self.block_id_flag == BlockIdFlag::Commit && !self.vote_extension.is_empty()
    }
}

/// The previous height's commit, including vote extensions.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExtendedCommitInfo {
    pub round: u32,
    pub votes: Vec<ExtendedVoteInfo>,
}

impl ExtendedCommitInfo {
    /// Votes eligible for aggregation, in delivery order.
    pub fn extended_votes(&self) -> impl Iterator<Item = &ExtendedVoteInfo> {
        self.votes.iter().filter(|v| v.has_extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HASH_LEN, Hash256};

    fn vote(flag: BlockIdFlag, ext: &[u8]) -> ExtendedVoteInfo {
        ExtendedVoteInfo {
            validator: ValidatorInfo {
                address: ValidatorAddress(Hash256([9u8; HASH_LEN])),
                power: 10,
            },
            vote_extension: ext.to_vec(),
            extension_signature: Signature::default(),
            block_id_flag: flag,
        }
    }

    #[test]
    fn only_commit_votes_with_payload_count() {
        assert!(vote(BlockIdFlag::Commit, b"x").has_extension());
        assert!(!vote(BlockIdFlag::Commit, b"").has_extension());
        assert!(!vote(BlockIdFlag::Nil, b"x").has_extension());
        assert!(!vote(BlockIdFlag::Absent, b"x").has_extension());

        let commit = ExtendedCommitInfo {
            round: 0,
            votes: vec![
                vote(BlockIdFlag::Commit, b"x"),
                vote(BlockIdFlag::Absent, b""),
            ],
        };
        assert_eq!(commit.extended_votes().count(), 1);
    }
}
