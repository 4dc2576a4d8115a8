//! Error taxonomy shared across the analyzer crates.

use std::path::PathBuf;

use thiserror::Error;

/// Invalid configuration discovered at startup. Fatal: the analyzer does
/// not run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("projectId must not be empty")]
    EmptyProjectId,

    #[error("supportedExtensions must not be empty")]
    NoExtensions,

    #[error("batchSize must be at least 1 (got {0})")]
    ZeroBatchSize(usize),

    #[error("maxWorkers must be at least 1 (got {0})")]
    ZeroWorkers(usize),

    #[error("invalid ignore pattern {pattern:?}: {message}")]
    BadIgnorePattern { pattern: String, message: String },

    #[error("cannot read config file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Unparsable {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Failure talking to the entity-map document.
#[derive(Debug, Error)]
pub enum EntityMapError {
    #[error("entity map io failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("entity map at {path} is not valid JSON: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("entity map serialization failed: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
}

/// Failure reported by a graph store while applying a mutation batch.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The batch may succeed if re-sent; the driver owns the retry budget.
    #[error("retryable store failure: {0}")]
    Retryable(String),

    #[error("store rejected the batch: {0}")]
    Fatal(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Retryable(_))
    }
}

/// Top-level failure of a driver entry point.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("emit failed after {attempts} attempt(s): {source}")]
    Emit {
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    EntityMap(#[from] EntityMapError),

    #[error("io failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no frontend for language of {0}")]
    UnsupportedFile(PathBuf),

    #[error("analysis cancelled")]
    Cancelled,

    #[error("conversion worker panicked: {0}")]
    WorkerLost(String),
}
