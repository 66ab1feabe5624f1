//! Client side of the attestation sidecar.
//!
//! The sidecar is a local, out-of-process service that watches external
//! chains and hands out attestations that are waiting to be brought on
//! chain. This module defines the [`SidecarClient`] trait the vote
//! extension producer talks to, and an HTTP implementation.
//!
//! The sidecar is only ever consulted while extending a vote. The apply
//! step works exclusively on agreed block bytes and has no access to it.

use std::sync::Arc;

use thiserror::Error;

use crate::types::AttestationBatch;

pub mod http;

pub use http::HttpSidecarClient;

/// Result of one successful fetch.
///
/// An empty batch is a normal outcome: the sidecar is healthy and simply
/// has nothing pending.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingAttestations {
    pub batch: AttestationBatch,
    /// External chain height the sidecar has observed, if it reports one.
    pub source_height: Option<u64>,
}

/// Errors that can occur while contacting the sidecar.
///
/// Every variant means "no usable response this round".
#[derive(Debug, Error)]
pub enum SidecarError {
    /// Transport-level error (connection refused, deadline exceeded, ...).
    #[error("sidecar transport error: {0}")]
    Transport(String),
    /// The sidecar answered with a non-success HTTP status.
    #[error("sidecar returned HTTP status {0}")]
    Status(u16),
    /// The sidecar returned a malformed or unexpected response.
    #[error("sidecar protocol error: {0}")]
    Protocol(String),
}

/// Fetches the batch of attestations currently pending at the sidecar.
///
/// Implementations must return within the deadline they were configured
/// with; a slow sidecar is reported as an error, never waited on.
pub trait SidecarClient: Send + Sync {
    fn fetch_pending_attestations(&self) -> Result<PendingAttestations, SidecarError>;
}

impl<T: SidecarClient + ?Sized> SidecarClient for Arc<T> {
    fn fetch_pending_attestations(&self) -> Result<PendingAttestations, SidecarError> {
        (**self).fetch_pending_attestations()
    }
}
