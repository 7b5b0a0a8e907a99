// ABOUTME: Configuration loading and validation for the logtap binary and server.
// ABOUTME: Reads LOGTAP_* environment variables, applying defaults and rejecting malformed values.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use logtap_core::IngestConfig;
use logtap_core::extract::DEFAULT_MAX_BUFFER_BYTES;
use thiserror::Error;

use crate::app_state::QueryLimits;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("LOGTAP_BIND is not a valid socket address: {0}")]
    InvalidBind(String),

    #[error("LOGTAP_STORE must be one of memory, jsonl, sqlite; got {0:?}")]
    InvalidStore(String),

    #[error("{var} must be a non-negative integer; got {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("LOGTAP_DEFAULT_LIMIT ({default}) must be between 1 and LOGTAP_MAX_LIMIT ({max})")]
    InvalidLimits { default: usize, max: usize },
}

/// Which RecordStore backend holds ingested records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreKind {
    #[default]
    Memory,
    Jsonl,
    Sqlite,
}

impl FromStr for StoreKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "jsonl" => Ok(Self::Jsonl),
            "sqlite" => Ok(Self::Sqlite),
            _ => Err(ConfigError::InvalidStore(s.to_string())),
        }
    }
}

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct LogtapConfig {
    pub source: PathBuf,
    pub bind: SocketAddr,
    pub store: StoreKind,
    pub data_dir: PathBuf,
    pub poll_interval: Duration,
    pub pace: Duration,
    pub max_buffer_bytes: usize,
    pub default_limit: usize,
    pub max_limit: usize,
}

impl LogtapConfig {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Environment variables:
    /// - LOGTAP_SOURCE: file to tail (default: out.txt)
    /// - LOGTAP_BIND: socket address to bind (default: 127.0.0.1:8000)
    /// - LOGTAP_STORE: memory, jsonl or sqlite (default: memory)
    /// - LOGTAP_DATA_DIR: directory for durable stores (default: ~/.logtap)
    /// - LOGTAP_POLL_MS: idle poll interval of the tail (default: 100)
    /// - LOGTAP_PACE_MS: delay after each stored record (default: 0)
    /// - LOGTAP_MAX_BUFFER_BYTES: extraction buffer cap, 0 for none (default: 1048576)
    /// - LOGTAP_DEFAULT_LIMIT: snapshot size when none is requested (default: 100)
    /// - LOGTAP_MAX_LIMIT: largest snapshot a client may request (default: 1000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its
    /// value. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let source = var("LOGTAP_SOURCE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("out.txt"));

        let bind_str = var("LOGTAP_BIND").unwrap_or_else(|| "127.0.0.1:8000".to_string());
        let bind: SocketAddr = bind_str
            .parse()
            .map_err(|_| ConfigError::InvalidBind(bind_str))?;

        let store = match var("LOGTAP_STORE") {
            Some(kind) => kind.parse()?,
            None => StoreKind::default(),
        };

        let data_dir = var("LOGTAP_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                lookup("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".logtap")
            });

        let number = |key: &'static str, default: u64| -> Result<u64, ConfigError> {
            match var(key) {
                Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
                    var: key,
                    value,
                }),
                None => Ok(default),
            }
        };

        let poll_interval = Duration::from_millis(number("LOGTAP_POLL_MS", 100)?);
        let pace = Duration::from_millis(number("LOGTAP_PACE_MS", 0)?);
        let max_buffer_bytes =
            number("LOGTAP_MAX_BUFFER_BYTES", DEFAULT_MAX_BUFFER_BYTES as u64)? as usize;
        let default_limit = number("LOGTAP_DEFAULT_LIMIT", 100)? as usize;
        let max_limit = number("LOGTAP_MAX_LIMIT", 1000)? as usize;

        if default_limit == 0 || default_limit > max_limit {
            return Err(ConfigError::InvalidLimits {
                default: default_limit,
                max: max_limit,
            });
        }

        Ok(Self {
            source,
            bind,
            store,
            data_dir,
            poll_interval,
            pace,
            max_buffer_bytes,
            default_limit,
            max_limit,
        })
    }

    /// Settings for the ingestion task.
    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            source: self.source.clone(),
            poll_interval: self.poll_interval,
            pace: self.pace,
            max_buffer_bytes: self.max_buffer_bytes,
        }
    }

    pub fn limits(&self) -> QueryLimits {
        QueryLimits {
            default_limit: self.default_limit,
            max_limit: self.max_limit,
        }
    }
}
