//! Store configuration passed explicitly to every database handle

use crate::errors::ConfigError;
use crate::types::DatabaseKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How long a connection waits on a locked database file
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(600);

/// Where and how the browser databases are opened
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding one file per logical database
    pub data_dir: PathBuf,

    /// SQLite busy timeout
    pub busy_timeout: Duration,
}

impl StoreConfig {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// Configuration rooted in the per-user data directory
    pub fn from_user_data_dir() -> std::result::Result<Self, ConfigError> {
        Ok(Self::new(Self::default_data_dir()?))
    }

    /// `<user data dir>/eolie`
    pub fn default_data_dir() -> std::result::Result<PathBuf, ConfigError> {
        dirs::data_dir()
            .map(|dir| dir.join("eolie"))
            .ok_or(ConfigError::NoDataDir)
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Database file for `kind`
    pub fn path_for(&self, kind: DatabaseKind) -> PathBuf {
        self.data_dir.join(kind.file_name())
    }
}
