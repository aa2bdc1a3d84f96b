use thiserror::Error;
use std::path::PathBuf;

/// Storage related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Cannot open database {path:?}: {reason}")]
    Connection { path: PathBuf, reason: String },

    #[error("Query failed: {details}")]
    Query { details: String },

    #[error("Transaction failed: {details}")]
    Transaction { details: String },

    #[error("IO error: {source}")]
    IO {
        #[from]
        source: std::io::Error,
    },
}

impl StorageError {
    /// Whether this error means the store is unusable
    pub fn is_fatal(&self) -> bool {
        matches!(self, StorageError::Connection { .. })
    }
}

/// Schema upgrade related errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum UpgradeError {
    #[error("Upgrade step {version} failed: {reason}")]
    Step { version: u32, reason: String },
}

/// Configuration related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No user data directory available on this platform")]
    NoDataDir,

    #[error("Cannot read configuration {path:?}: {source}")]
    IO {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {source}")]
    Parse {
        #[from]
        source: serde_json::Error,
    },
}

/// Main error type for the history store
#[derive(Debug, Error)]
pub enum EolieError {
    #[error("Storage error: {source}")]
    Storage {
        #[from]
        source: StorageError,
    },

    #[error("Upgrade error: {source}")]
    Upgrade {
        #[from]
        source: UpgradeError,
    },

    #[error("Configuration error: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },
}

impl EolieError {
    pub fn is_fatal(&self) -> bool {
        match self {
            EolieError::Storage { source } => source.is_fatal(),
            _ => false,
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, EolieError>;
