//! Node configuration: command-line flags and the TOML config file.
//!
//! The file holds the library's [`NodeConfig`] sections (`[consensus]`,
//! `[storage]`, `[sidecar]`, `[metrics]`) plus node-only sections for the
//! HTTP API and the devnet validator set:
//!
//! ```toml
//! [sidecar]
//! address = "127.0.0.1:8090"
//! timeout_ms = 800
//!
//! [api]
//! listen_addr = "127.0.0.1:8081"
//! max_pending_txs = 10000
//!
//! [[devnet.validators]]
//! name = "val-a"
//! power = 10
//!
//! [[devnet.validators]]
//! name = "val-b"
//! power = 5
//! sidecar_address = "127.0.0.1:8091"
//! ```
//!
//! Flags override file values; everything missing falls back to defaults.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use attest_chain::NodeConfig;
use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

/// Attestation pipeline devnet node.
#[derive(Parser, Debug, Default)]
#[command(name = "attest-node")]
#[command(about = "Runs in-process validators that inject sidecar attestations into blocks")]
pub struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Sidecar address (`host:port` or URL), default 127.0.0.1:8090
    #[arg(long)]
    pub sidecar_address: Option<String>,

    /// Directory holding per-validator RocksDB state
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Address for the status API
    #[arg(long)]
    pub listen_addr: Option<SocketAddr>,

    /// Keep state in memory only
    #[arg(long)]
    pub ephemeral: bool,
}

/// Configuration for the node's HTTP API.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Address to bind the HTTP server to.
    pub listen_addr: SocketAddr,
    /// Transactions `POST /txs` may queue before refusing more.
    pub max_pending_txs: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8081)),
            max_pending_txs: 10_000,
        }
    }
}

/// One in-process validator.
#[derive(Clone, Debug, Deserialize)]
pub struct ValidatorConfig {
    pub name: String,
    pub power: u64,
    /// Per-validator sidecar; defaults to `[sidecar].address`.
    #[serde(default)]
    pub sidecar_address: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DevnetConfig {
    pub validators: Vec<ValidatorConfig>,
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            validators: vec![ValidatorConfig {
                name: "validator-0".to_string(),
                power: 10,
                sidecar_address: None,
            }],
        }
    }
}

/// Everything the node reads from its config file.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    #[serde(flatten)]
    pub node: NodeConfig,
    pub api: ApiConfig,
    pub devnet: DevnetConfig,
    /// Set by `--ephemeral`; never read from the file.
    #[serde(skip)]
    pub ephemeral: bool,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Invalid(#[from] attest_chain::ConfigError),
    #[error("devnet needs at least one validator")]
    NoValidators,
    #[error("duplicate devnet validator name {0:?}")]
    DuplicateValidator(String),
    #[error("devnet validator {0:?} has zero voting power")]
    ZeroPower(String),
    #[error("api.max_pending_txs must be greater than zero")]
    ZeroPoolCapacity,
}

impl FileConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, LoadError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Reads the file named by `--config` (if any), applies the remaining
    /// flags and validates the result.
    pub fn load(cli: &Cli) -> Result<Self, LoadError> {
        let mut cfg = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        cfg.apply_overrides(cli);
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(address) = &cli.sidecar_address {
            self.node.sidecar.address = address.clone();
        }
        if let Some(dir) = &cli.data_dir {
            self.node.storage.path = dir.display().to_string();
        }
        if let Some(addr) = cli.listen_addr {
            self.api.listen_addr = addr;
        }
        self.ephemeral |= cli.ephemeral;
    }

    pub fn validate(&self) -> Result<(), LoadError> {
        self.node.validate()?;

        if self.api.max_pending_txs == 0 {
            return Err(LoadError::ZeroPoolCapacity);
        }
        if self.devnet.validators.is_empty() {
            return Err(LoadError::NoValidators);
        }
        let mut seen = HashSet::new();
        for v in &self.devnet.validators {
            if !seen.insert(v.name.as_str()) {
                return Err(LoadError::DuplicateValidator(v.name.clone()));
            }
            if v.power == 0 {
                return Err(LoadError::ZeroPower(v.name.clone()));
            }
        }
        Ok(())
    }

    /// Sidecar address for `validator`.
    pub fn sidecar_address_for<'a>(&'a self, validator: &'a ValidatorConfig) -> &'a str {
        validator
            .sidecar_address
            .as_deref()
            .unwrap_or(&self.node.sidecar.address)
    }
}
