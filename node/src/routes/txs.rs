use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

use attest_chain::RawTx;

use crate::state::{PoolError, SharedState};

/// Request body for `POST /txs`.
#[derive(Debug, Deserialize)]
pub struct SubmitTxRequest {
    /// Hex-encoded opaque transaction bytes.
    pub tx_hex: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitTxResponse {
    pub status: &'static str,
    pub bytes: usize,
}

/// `POST /txs`
///
/// Queues an ordinary transaction for the next proposals. Transactions
/// carrying the injected-attestation marker are refused: only the proposer
/// may place one, at index 0. So are transactions larger than a block
/// (`413`) and anything beyond the pool capacity (`503`).
pub async fn submit_tx(
    State(state): State<SharedState>,
    Json(body): Json<SubmitTxRequest>,
) -> Result<(StatusCode, Json<SubmitTxResponse>), (StatusCode, String)> {
    let bytes = hex::decode(body.tx_hex.trim())
        .map_err(|_| as_bad_request("invalid hex encoding"))?;
    let tx = RawTx(bytes);

    if tx.is_empty() {
        return Err(as_bad_request("empty transaction"));
    }
    if tx.is_injected() {
        return Err(as_bad_request("reserved transaction prefix"));
    }

    let len = tx.len();
    state.tx_pool.lock().await.push(tx).map_err(|e| {
        let code = match e {
            PoolError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            PoolError::Full(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (code, e.to_string())
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitTxResponse {
            status: "queued",
            bytes: len,
        }),
    ))
}

fn as_bad_request(msg: &'static str) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, msg.to_string())
}
