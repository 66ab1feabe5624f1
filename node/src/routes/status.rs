use axum::{Json, extract::State};

use crate::state::{NodeStatus, SharedState};

/// `GET /status`
///
/// Current height, app hash, liveness counter and the last apply tally.
pub async fn status(State(state): State<SharedState>) -> Json<NodeStatus> {
    let pending_txs = state.tx_pool.lock().await.len();
    let mut status = state.status.lock().await.clone();
    status.pending_txs = pending_txs;
    Json(status)
}
