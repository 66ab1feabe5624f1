//! HTTP-based sidecar client.
//!
//! This implementation of [`SidecarClient`] talks to the attestation
//! sidecar over HTTP. It assumes the service exposes a JSON API of the
//! form:
//!
//! ```json
//! GET /v1/attestations/pending
//!
//! Response:
//! {
//!   "attestations": ["hex-encoded-attestation", "..."],
//!   "height": 19023311,
//!   "pending": 2
//! }
//! ```
//!
//! `height` and `pending` are informational and may be omitted.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;

use crate::types::{Attestation, AttestationBatch};

use super::{PendingAttestations, SidecarClient, SidecarError};

const PENDING_PATH: &str = "/v1/attestations/pending";

/// HTTP-based sidecar client.
///
/// This client is thread-safe (`Send + Sync`). It uses the blocking
/// `reqwest` client internally with a per-request timeout, so a call never
/// outlives the configured deadline. Async callers should run it on a
/// blocking thread.
pub struct HttpSidecarClient {
    base_url: String,
    client: Client,
    timeout: Duration,
}

impl HttpSidecarClient {
    /// Constructs a new client for the sidecar at `address`.
    ///
    /// `address` is either `host:port` (plain HTTP is assumed) or a full
    /// base URL such as `"https://sidecar.local:8090"`.
    pub fn new(address: &str, timeout: Duration) -> Result<Self, SidecarError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| SidecarError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url_for(address),
            client,
            timeout,
        })
    }

    /// Deadline applied to every request.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn endpoint(&self, path: &str) -> String {
        // Avoid accidental double slashes.
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn base_url_for(address: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}

/// Internal response payload returned by the sidecar.
#[derive(Debug, Deserialize)]
struct PendingResponse {
    attestations: Vec<String>,
    #[serde(default)]
    height: Option<u64>,
    #[serde(default)]
    pending: Option<u64>,
}

impl PendingResponse {
    fn into_pending(self) -> Result<PendingAttestations, SidecarError> {
        let items = self
            .attestations
            .iter()
            .enumerate()
            .map(|(i, s)| {
                hex::decode(s).map(Attestation).map_err(|e| {
                    SidecarError::Protocol(format!("attestation {i} is not valid hex: {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(pending) = self.pending {
            if pending < items.len() as u64 {
                tracing::debug!(
                    pending,
                    returned = items.len(),
                    "sidecar reported fewer pending attestations than it returned"
                );
            }
        }

        Ok(PendingAttestations {
            batch: AttestationBatch::new(items),
            source_height: self.height,
        })
    }
}

impl SidecarClient for HttpSidecarClient {
    fn fetch_pending_attestations(&self) -> Result<PendingAttestations, SidecarError> {
        let url = self.endpoint(PENDING_PATH);

        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|e| SidecarError::Transport(format!("HTTP GET {url} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SidecarError::Status(status.as_u16()));
        }

        let body = resp
            .json::<PendingResponse>()
            .map_err(|e| SidecarError::Protocol(format!("failed to parse JSON response: {e}")))?;

        body.into_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Instant;

    /// Serves exactly one connection with a canned HTTP response.
    fn one_shot_server(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();

        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                let resp = format!(
                    "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(resp.as_bytes());
            }
        });

        addr
    }

    #[test]
    fn address_without_scheme_defaults_to_http() {
        assert_eq!(base_url_for("127.0.0.1:8090"), "http://127.0.0.1:8090");
        assert_eq!(base_url_for("https://sidecar:1"), "https://sidecar:1");
    }

    #[test]
    fn pending_response_can_be_deserialized() {
        let json = r#"{ "attestations": ["0a0b", "ff"], "height": 12 }"#;
        let resp: PendingResponse = serde_json::from_str(json).expect("parse");
        let pending = resp.into_pending().expect("hex");

        assert_eq!(pending.source_height, Some(12));
        assert_eq!(pending.batch.items[0].as_bytes(), &[0x0a, 0x0b]);
        assert_eq!(pending.batch.items[1].as_bytes(), &[0xff]);
    }

    #[test]
    fn bad_hex_is_a_protocol_error() {
        let resp: PendingResponse =
            serde_json::from_str(r#"{ "attestations": ["zz"] }"#).expect("parse");
        assert!(matches!(
            resp.into_pending(),
            Err(SidecarError::Protocol(_))
        ));
    }

    #[test]
    fn fetches_batch_over_http() {
        let addr = one_shot_server(
            "HTTP/1.1 200 OK",
            r#"{"attestations":["deadbeef"],"pending":1}"#,
        );
        let client = HttpSidecarClient::new(&addr, Duration::from_secs(2)).expect("client");

        let pending = client.fetch_pending_attestations().expect("fetch");
        assert_eq!(pending.batch.len(), 1);
        assert_eq!(pending.batch.items[0].as_bytes(), &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn empty_batch_is_success() {
        let addr = one_shot_server("HTTP/1.1 200 OK", r#"{"attestations":[]}"#);
        let client = HttpSidecarClient::new(&addr, Duration::from_secs(2)).expect("client");

        let pending = client.fetch_pending_attestations().expect("fetch");
        assert!(pending.batch.is_empty());
    }

    #[test]
    fn non_success_status_is_reported() {
        let addr = one_shot_server("HTTP/1.1 503 Service Unavailable", "{}");
        let client = HttpSidecarClient::new(&addr, Duration::from_secs(2)).expect("client");

        assert!(matches!(
            client.fetch_pending_attestations(),
            Err(SidecarError::Status(503))
        ));
    }

    #[test]
    fn unreachable_sidecar_is_transport_error() {
        // Bind then drop to obtain a port nobody listens on.
        let addr = {
            let l = TcpListener::bind("127.0.0.1:0").expect("bind");
            l.local_addr().expect("addr").to_string()
        };
        let client = HttpSidecarClient::new(&addr, Duration::from_millis(500)).expect("client");

        assert!(matches!(
            client.fetch_pending_attestations(),
            Err(SidecarError::Transport(_))
        ));
    }

    #[test]
    fn silent_sidecar_hits_the_deadline() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        let _holder = thread::spawn(move || {
            // Accept and hold the connection open without answering.
            let conn = listener.accept();
            thread::sleep(Duration::from_secs(3));
            drop(conn);
        });

        let client = HttpSidecarClient::new(&addr, Duration::from_millis(200)).expect("client");
        let started = Instant::now();
        let result = client.fetch_pending_attestations();

        assert!(matches!(result, Err(SidecarError::Transport(_))));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
