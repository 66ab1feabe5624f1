//! Top-level configuration for a validator node.
//!
//! This module aggregates configuration for:
//!
//! - consensus parameters (`ConsensusConfig`),
//! - storage (RocksDB path and creation flags),
//! - the attestation sidecar client (address + request deadline),
//! - metrics exporter (enable flag + listen address).
//!
//! Every section has serde defaults, so a config file only needs to list
//! what it changes. Binaries can construct a `NodeConfig` from defaults, a
//! TOML file, or command-line overrides as needed, and should call
//! [`NodeConfig::validate`] before wiring anything up.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consensus::ConsensusConfig;
use crate::storage::RocksDbConfig;

/// Default sidecar address, a fixed local port.
pub const DEFAULT_SIDECAR_ADDRESS: &str = "127.0.0.1:8090";

/// Configuration for the attestation sidecar client.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SidecarConfig {
    /// `host:port` or full base URL of the sidecar.
    pub address: String,
    /// Deadline for one fetch, in milliseconds.
    pub timeout_ms: u64,
}

impl SidecarConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_SIDECAR_ADDRESS.to_string(),
            timeout_ms: 1_000,
        }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to run a `/metrics` HTTP exporter.
    pub enabled: bool,
    /// Address to bind the metrics HTTP server to.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 9898)),
        }
    }
}

/// Rejected configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("sidecar address must not be empty")]
    EmptySidecarAddress,
    #[error(
        "sidecar timeout ({timeout_ms} ms) must be shorter than the block time ({block_time_ms} ms)"
    )]
    SidecarTimeoutTooLong { timeout_ms: u64, block_time_ms: u64 },
}

/// Top-level configuration for a validator node.
///
/// This aggregates all the sub-configs needed to wire up a typical node:
///
/// - consensus tuning (`consensus`),
/// - persistent storage (`storage`),
/// - sidecar client (`sidecar`),
/// - Prometheus metrics exporter (`metrics`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub consensus: ConsensusConfig,
    pub storage: RocksDbConfig,
    pub sidecar: SidecarConfig,
    pub metrics: MetricsConfig,
}

impl NodeConfig {
    /// Checks values that would make the pipeline misbehave at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.consensus;
        if c.block_time_secs == 0 {
            return Err(ConfigError::Zero("consensus.block_time_secs"));
        }
        if c.max_block_txs == 0 {
            return Err(ConfigError::Zero("consensus.max_block_txs"));
        }
        if c.max_block_size_bytes == 0 {
            return Err(ConfigError::Zero("consensus.max_block_size_bytes"));
        }
        if c.liveness_failure_threshold == 0 {
            return Err(ConfigError::Zero("consensus.liveness_failure_threshold"));
        }
        if c.max_attestations_per_batch == 0 {
            return Err(ConfigError::Zero("consensus.max_attestations_per_batch"));
        }
        if c.max_attestation_bytes == 0 {
            return Err(ConfigError::Zero("consensus.max_attestation_bytes"));
        }

        if self.sidecar.address.trim().is_empty() {
            return Err(ConfigError::EmptySidecarAddress);
        }
        if self.sidecar.timeout_ms == 0 {
            return Err(ConfigError::Zero("sidecar.timeout_ms"));
        }
        let block_time_ms = c.block_time_secs.saturating_mul(1_000);
        if self.sidecar.timeout_ms >= block_time_ms {
            return Err(ConfigError::SidecarTimeoutTooLong {
                timeout_ms: self.sidecar.timeout_ms,
                block_time_ms,
            });
        }

        Ok(())
    }
}
