/// Integration module for the Eolie history store
///
/// This module wires configuration, logging and the browser databases
/// together for the application.

use data_access::{Database, HistoryStore};
use eolie_core::errors::{ConfigError, Result};
use eolie_core::{DatabaseKind, StoreConfig, DEFAULT_BUSY_TIMEOUT};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub mod logger;

pub use logger::{LoggerConfig, UnifiedLogger};

/// Application configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding the databases, the user data directory when unset
    pub data_dir: Option<PathBuf>,

    /// SQLite busy timeout in seconds
    pub busy_timeout_secs: u64,

    /// Log level
    pub log_level: String,

    /// Keep every database in memory
    pub in_memory: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            busy_timeout_secs: DEFAULT_BUSY_TIMEOUT.as_secs(),
            log_level: "info".to_string(),
            in_memory: false,
        }
    }
}

impl AppConfig {
    /// Load a configuration from a JSON file, missing keys take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::IO {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Store configuration derived from this application configuration
    pub fn store_config(&self) -> std::result::Result<StoreConfig, ConfigError> {
        let data_dir = match &self.data_dir {
            Some(dir) => dir.clone(),
            None => StoreConfig::default_data_dir()?,
        };
        Ok(StoreConfig::new(data_dir).with_busy_timeout(Duration::from_secs(self.busy_timeout_secs)))
    }

    pub fn logger_config(&self) -> LoggerConfig {
        LoggerConfig {
            level: self.log_level.clone(),
            ..LoggerConfig::default()
        }
    }
}

/// Application context that holds the opened databases
pub struct AppContext {
    /// Browsing history
    pub history: Arc<HistoryStore>,

    /// Bookmarks database, only schema managed here
    pub bookmarks: Database,

    /// Per-site settings database, only schema managed here
    pub settings: Database,

    /// Application configuration
    pub config: AppConfig,
}

impl AppContext {
    /// Open every database, exiting the process on any failure of `try_new`
    pub fn new(config: AppConfig) -> Self {
        match Self::try_new(config) {
            Ok(context) => context,
            Err(e) => {
                error!("Cannot open browser databases: {}", e);
                std::process::exit(-1);
            }
        }
    }

    /// Open every database, returning the failure instead of exiting
    pub fn try_new(config: AppConfig) -> Result<Self> {
        info!("Initializing application context");

        let (history, bookmarks, settings) = if config.in_memory {
            (
                HistoryStore::in_memory()?,
                Database::in_memory(DatabaseKind::Bookmarks)?,
                Database::in_memory(DatabaseKind::Settings)?,
            )
        } else {
            let store_config = config.store_config()?;
            info!("Opening databases in {}", store_config.data_dir.display());
            (
                HistoryStore::open(&store_config)?,
                Database::open(&store_config, DatabaseKind::Bookmarks)?,
                Database::open(&store_config, DatabaseKind::Settings)?,
            )
        };

        info!("Application context initialized successfully");

        Ok(Self {
            history: Arc::new(history),
            bookmarks,
            settings,
            config,
        })
    }

    /// Load the configuration at `path`, install logging and open the databases
    pub fn bootstrap<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        use anyhow::Context;

        let path = path.as_ref();
        let config = AppConfig::from_json_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?;
        UnifiedLogger::init(config.logger_config()).context("installing the logger")?;
        let context = Self::try_new(config)?;
        Ok(context)
    }

    /// Schema versions of every database
    pub fn versions(&self) -> Result<Vec<(DatabaseKind, u32)>> {
        Ok(vec![
            (DatabaseKind::History, self.history.database().version()?),
            (DatabaseKind::Bookmarks, self.bookmarks.version()?),
            (DatabaseKind::Settings, self.settings.version()?),
        ])
    }
}
