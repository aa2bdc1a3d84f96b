//! Scoped, reentrant access to one SQLite connection
//!
//! Every statement against a store goes through [`SqlCursor::with_cursor`].
//! The per-store lock is reentrant, so an operation may call another one
//! while already holding the cursor. Only the outermost scope opens and ends
//! the transaction: it commits if any scope asked for writing and rolls back
//! otherwise, or when the scope failed or panicked. An outermost writing
//! scope starts with `BEGIN IMMEDIATE`.

use crate::collation;
use eolie_core::{StorageError, DEFAULT_BUSY_TIMEOUT};
use parking_lot::ReentrantMutex;
use rusqlite::Connection;
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error};

/// Result type for statement level work
pub type StoreResult<T> = std::result::Result<T, StorageError>;

/// Convert a rusqlite failure into a query error
pub fn query_error(e: rusqlite::Error) -> StorageError {
    StorageError::Query {
        details: e.to_string(),
    }
}

fn transaction_error(e: rusqlite::Error) -> StorageError {
    StorageError::Transaction {
        details: e.to_string(),
    }
}

struct CursorState {
    conn: Connection,
    depth: Cell<u32>,
    writing: Cell<bool>,
}

/// Serialized access to a single store connection
pub struct SqlCursor {
    path: Option<PathBuf>,
    state: ReentrantMutex<CursorState>,
}

impl SqlCursor {
    /// Open (or create) the database file at `path`
    pub fn open(path: &Path, busy_timeout: Duration) -> StoreResult<Self> {
        let conn = Connection::open(path).map_err(|e| StorageError::Connection {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_connection(conn, Some(path.to_path_buf()), busy_timeout)
    }

    /// Private in-memory database (for testing)
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| StorageError::Connection {
            path: PathBuf::from(":memory:"),
            reason: e.to_string(),
        })?;
        Self::from_connection(conn, None, DEFAULT_BUSY_TIMEOUT)
    }

    fn from_connection(
        conn: Connection,
        path: Option<PathBuf>,
        busy_timeout: Duration,
    ) -> StoreResult<Self> {
        // Reading the schema fails on a file that is not a database
        let setup = conn
            .busy_timeout(busy_timeout)
            .and_then(|_| collation::register(&conn))
            .and_then(|_| {
                conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| {
                    row.get::<_, i64>(0)
                })
            });
        if let Err(e) = setup {
            return Err(StorageError::Connection {
                path: path.unwrap_or_else(|| PathBuf::from(":memory:")),
                reason: e.to_string(),
            });
        }

        Ok(Self {
            path,
            state: ReentrantMutex::new(CursorState {
                conn,
                depth: Cell::new(0),
                writing: Cell::new(false),
            }),
        })
    }

    /// Backing file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` with exclusive access to the connection.
    ///
    /// Blocks while another thread holds the cursor. Nested calls from the
    /// same thread share the enclosing transaction.
    pub fn with_cursor<T, F>(&self, writing: bool, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let state = self.state.lock();
        let scope = Scope::enter(&state, writing)?;
        let result = f(&state.conn);
        let ended = scope.exit(result.is_ok());
        match (result, ended) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), _) => Err(e),
        }
    }

    /// Current nesting depth on the calling thread (0 when idle)
    pub fn depth(&self) -> u32 {
        self.state.lock().depth.get()
    }
}

/// Depth-counted transaction scope
struct Scope<'a> {
    state: &'a CursorState,
    closed: bool,
}

impl<'a> Scope<'a> {
    fn enter(state: &'a CursorState, writing: bool) -> StoreResult<Self> {
        if state.depth.get() == 0 {
            // Take the write lock up front so another handle on the same file
            // waits on the busy timeout instead of deadlocking on upgrade
            let begin = if writing { "BEGIN IMMEDIATE" } else { "BEGIN" };
            state.conn.execute_batch(begin).map_err(transaction_error)?;
            state.writing.set(false);
        }
        state.depth.set(state.depth.get() + 1);
        if writing {
            state.writing.set(true);
        }
        Ok(Self {
            state,
            closed: false,
        })
    }

    fn exit(mut self, success: bool) -> StoreResult<()> {
        self.closed = true;
        self.leave(success)
    }

    fn leave(&self, success: bool) -> StoreResult<()> {
        let depth = self.state.depth.get().saturating_sub(1);
        self.state.depth.set(depth);
        if depth > 0 {
            return Ok(());
        }

        if success && self.state.writing.get() {
            debug!("Committing transaction");
            if let Err(e) = self.state.conn.execute_batch("COMMIT") {
                // A failed COMMIT may leave the transaction open
                let _ = self.state.conn.execute_batch("ROLLBACK");
                return Err(transaction_error(e));
            }
            Ok(())
        } else {
            self.state
                .conn
                .execute_batch("ROLLBACK")
                .map_err(transaction_error)
        }
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.leave(false) {
                error!("Rollback after aborted scope failed: {}", e);
            }
        }
    }
}
