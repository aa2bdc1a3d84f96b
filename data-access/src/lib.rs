//! Data Access Layer for the Eolie history store
//!
//! This module provides the versioned SQLite databases of the browser:
//! connection and transaction handling, schema creation and upgrades, and
//! the history store built on top of them.

pub mod collation;
pub mod cursor;
pub mod history;
pub mod schema;
pub mod upgrade;

pub use cursor::{SqlCursor, StoreResult};
pub use history::HistoryStore;
pub use upgrade::{DatabaseUpgrade, UpgradeReport, UpgradeStep};

use eolie_core::{DatabaseKind, StorageError, StoreConfig};
use std::path::Path;
use tracing::{error, info};

/// One logical database (history, bookmarks or settings)
pub struct Database {
    kind: DatabaseKind,
    cursor: SqlCursor,
}

impl Database {
    /// Open the database of `kind` under the configured data directory.
    ///
    /// A missing file is created with the latest schema, an existing one is
    /// upgraded. Only a connection failure is reported as an error.
    pub fn open(config: &StoreConfig, kind: DatabaseKind) -> StoreResult<Self> {
        let path = config.path_for(kind);
        let fresh = !path.is_file();
        if fresh {
            std::fs::create_dir_all(&config.data_dir).map_err(|e| StorageError::Connection {
                path: path.clone(),
                reason: format!("cannot create {}: {}", config.data_dir.display(), e),
            })?;
        }

        let cursor = SqlCursor::open(&path, config.busy_timeout)?;
        let database = Self { kind, cursor };
        database.prepare(fresh);
        Ok(database)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory(kind: DatabaseKind) -> StoreResult<Self> {
        let database = Self {
            kind,
            cursor: SqlCursor::open_in_memory()?,
        };
        database.prepare(true);
        Ok(database)
    }

    fn prepare(&self, fresh: bool) {
        let upgrade = DatabaseUpgrade::new(self.kind);
        if fresh {
            let created = self.cursor.with_cursor(true, |conn| {
                schema::create(conn, self.kind, upgrade.version()).map_err(cursor::query_error)
            });
            match created {
                Ok(()) => info!("Created {} database (version {})", self.kind, upgrade.version()),
                Err(e) => error!("Cannot create {} database: {}", self.kind, e),
            }
        } else {
            match upgrade.upgrade(&self.cursor) {
                Ok(report) if !report.is_noop() => info!(
                    "{} database upgraded from {} to {} ({} step(s) skipped)",
                    self.kind,
                    report.from,
                    report.to,
                    report.failed.len()
                ),
                Ok(_) => {}
                Err(e) => error!("Cannot upgrade {} database: {}", self.kind, e),
            }
        }
    }

    pub fn kind(&self) -> DatabaseKind {
        self.kind
    }

    /// Backing file, `None` for in-memory databases
    pub fn path(&self) -> Option<&Path> {
        self.cursor.path()
    }

    /// Get the cursor for store operations
    pub fn cursor(&self) -> &SqlCursor {
        &self.cursor
    }

    /// Schema version recorded in the database
    pub fn version(&self) -> StoreResult<u32> {
        self.cursor.with_cursor(false, |conn| {
            upgrade::read_version(conn).map_err(cursor::query_error)
        })
    }
}
