// chain/src/types/tx.rs

//! Opaque block transactions.
//!
//! The pipeline never interprets user transactions; the broader state
//! machine does. The only structure it cares about is whether a transaction
//! carries the injected-attestation marker.

use serde::{Deserialize, Serialize};

use super::attestation::INJECTED_TX_PREFIX;

/// Raw transaction bytes as they appear in a block.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RawTx(pub Vec<u8>);

impl RawTx {
    /// Returns the raw transaction bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Size of the transaction in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `true` if the bytes start with the injected-attestation marker.
    ///
    /// This does not mean the transaction decodes; see
    /// [`InjectedAttestationTx::decode`](super::InjectedAttestationTx::decode).
    pub fn is_injected(&self) -> bool {
        self.0.starts_with(INJECTED_TX_PREFIX)
    }
}

impl From<Vec<u8>> for RawTx {
    fn from(bytes: Vec<u8>) -> Self {
        RawTx(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_detection_is_prefix_only() {
        let mut marked = INJECTED_TX_PREFIX.to_vec();
        marked.push(0);
        assert!(RawTx(marked).is_injected());

        let short = RawTx(INJECTED_TX_PREFIX[..4].to_vec());
        assert!(!short.is_injected());
        assert!(!RawTx(b"transfer".to_vec()).is_injected());
    }
}
