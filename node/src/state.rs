//! Shared application state and transaction pool implementation.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use attest_chain::{ApplyTally, MetricsRegistry, RawTx, TxPool};

/// Why the pool refused a transaction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("transaction of {len} bytes exceeds the block size limit of {max} bytes")]
    TooLarge { len: usize, max: usize },
    #[error("transaction pool is full ({0} pending)")]
    Full(usize),
}

/// Bounded in-memory transaction pool backed by a FIFO queue.
///
/// HTTP handlers push transactions into the queue; the devnet loop drains
/// them when the proposer builds a block.
pub struct QueuedTxPool {
    queue: VecDeque<RawTx>,
    max_tx_bytes: usize,
    capacity: usize,
}

impl QueuedTxPool {
    /// `max_tx_bytes` is normally the block size limit: a larger
    /// transaction could never be proposed.
    pub fn new(max_tx_bytes: usize, capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            max_tx_bytes,
            capacity,
        }
    }

    /// Enqueues a new transaction to be included in a future block.
    pub fn push(&mut self, tx: RawTx) -> Result<(), PoolError> {
        if tx.len() > self.max_tx_bytes {
            return Err(PoolError::TooLarge {
                len: tx.len(),
                max: self.max_tx_bytes,
            });
        }
        if self.queue.len() >= self.capacity {
            return Err(PoolError::Full(self.queue.len()));
        }
        self.queue.push_back(tx);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

impl TxPool for QueuedTxPool {
    /// Takes transactions in arrival order while the budgets allow. One that
    /// does not fit the remaining bytes stays queued for a later block
    /// without holding back the ones behind it.
    fn select_for_block(&mut self, max_txs: usize, max_bytes: usize) -> Vec<RawTx> {
        let mut selected = Vec::new();
        let mut kept = VecDeque::with_capacity(self.queue.len());
        let mut bytes = 0usize;

        while let Some(tx) = self.queue.pop_front() {
            if selected.len() < max_txs && bytes + tx.len() <= max_bytes {
                bytes += tx.len();
                selected.push(tx);
            } else {
                kept.push_back(tx);
            }
        }

        self.queue = kept;
        selected
    }
}

/// Last finalization tally, as shown by `/status`.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TallyView {
    pub applied: usize,
    pub rejected: usize,
    pub rejections: Vec<RejectionView>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RejectionView {
    pub index: usize,
    pub reason: String,
}

impl From<&ApplyTally> for TallyView {
    fn from(tally: &ApplyTally) -> Self {
        let rejections = tally
            .outcomes
            .iter()
            .filter_map(|o| match &o.status {
                attest_chain::ItemStatus::Rejected { reason } => Some(RejectionView {
                    index: o.index,
                    reason: reason.clone(),
                }),
                attest_chain::ItemStatus::Applied => None,
            })
            .collect();

        Self {
            applied: tally.applied,
            rejected: tally.rejected,
            rejections,
        }
    }
}

/// Devnet progress as seen by the status API.
#[derive(Clone, Debug, Default, Serialize)]
pub struct NodeStatus {
    /// Last finalized height (0 before the first block).
    pub height: u64,
    pub app_hash: Option<String>,
    pub last_proposer: Option<String>,
    pub validators: usize,
    /// Consecutive failed injection rounds on this node.
    pub liveness_failures: u64,
    pub liveness_threshold: u64,
    pub last_tally: Option<TallyView>,
    pub pending_txs: usize,
    /// Set once the devnet loop stopped on a fatal error.
    pub halted: Option<String>,
}

/// Shared state held by the API and background tasks.
///
/// This is wrapped in an [`Arc`] and passed to request handlers via Axum's
/// `State` extractor. The devnet loop runs on a blocking thread and uses
/// `blocking_lock`; handlers use `lock().await`.
pub struct AppState {
    /// Transaction pool feeding the proposer.
    pub tx_pool: Mutex<QueuedTxPool>,
    pub status: Mutex<NodeStatus>,
    /// Metrics registry shared between the devnet loop and the API.
    pub metrics: Arc<MetricsRegistry>,
}

/// Thread-safe alias for `AppState`.
pub type SharedState = Arc<AppState>;

#[cfg(test)]
mod tests {
    use super::*;
    use attest_chain::{ItemOutcome, ItemStatus};

    #[test]
    fn pool_respects_both_budgets() {
        let mut pool = QueuedTxPool::new(100, 10);
        for len in [4, 4, 4, 4] {
            pool.push(RawTx(vec![1u8; len])).unwrap();
        }

        assert_eq!(pool.select_for_block(10, 9).len(), 2);
        assert_eq!(pool.select_for_block(1, 100).len(), 1);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.select_for_block(0, 100).len(), 0);
    }

    #[test]
    fn pool_refuses_oversized_txs_and_overflow() {
        let mut pool = QueuedTxPool::new(8, 2);

        assert_eq!(
            pool.push(RawTx(vec![0u8; 9])),
            Err(PoolError::TooLarge { len: 9, max: 8 })
        );
        pool.push(RawTx(vec![0u8; 8])).unwrap();
        pool.push(RawTx(vec![0u8; 1])).unwrap();
        assert_eq!(pool.push(RawTx(vec![0u8; 1])), Err(PoolError::Full(2)));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn tx_that_does_not_fit_keeps_its_place_without_blocking() {
        let mut pool = QueuedTxPool::new(100, 10);
        pool.push(RawTx(b"large-tx".to_vec())).unwrap();
        pool.push(RawTx(b"a".to_vec())).unwrap();
        pool.push(RawTx(b"b".to_vec())).unwrap();

        // An injected tx took most of this block's bytes.
        let picked = pool.select_for_block(10, 4);
        assert_eq!(picked, vec![RawTx(b"a".to_vec()), RawTx(b"b".to_vec())]);

        let next = pool.select_for_block(10, 100);
        assert_eq!(next, vec![RawTx(b"large-tx".to_vec())]);
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn tally_view_lists_rejections_only() {
        let tally = ApplyTally {
            applied: 1,
            rejected: 1,
            outcomes: vec![
                ItemOutcome {
                    index: 0,
                    status: ItemStatus::Applied,
                },
                ItemOutcome {
                    index: 1,
                    status: ItemStatus::Rejected {
                        reason: "replay".to_string(),
                    },
                },
            ],
        };

        let view = TallyView::from(&tally);
        assert_eq!(view.rejections.len(), 1);
        assert_eq!(view.rejections[0].index, 1);
    }

    #[test]
    fn status_serializes_for_the_api() {
        let status = NodeStatus {
            height: 7,
            app_hash: Some("ab".repeat(32)),
            validators: 3,
            liveness_threshold: 100,
            ..NodeStatus::default()
        };

        let json = serde_json::to_value(&status).expect("serialize");
        assert_eq!(json["height"], 7);
        assert_eq!(json["validators"], 3);
        assert!(json["halted"].is_null());
        assert!(json["last_tally"].is_null());
    }
}
