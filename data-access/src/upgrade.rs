//! Ordered schema upgrades, versioned through `PRAGMA user_version`

use crate::cursor::{query_error, SqlCursor, StoreResult};
use crate::schema;
use eolie_core::{DatabaseKind, UpgradeError};
use rusqlite::Connection;
use tracing::{debug, info, warn};

/// Procedural upgrade run against the open connection
pub type ProcedureFn = fn(&Connection) -> rusqlite::Result<()>;

/// One migration
#[derive(Clone)]
pub enum UpgradeStep {
    /// A single schema altering statement
    Statement(&'static str),
    /// Multi statement work such as a table rebuild
    Procedure {
        description: &'static str,
        run: ProcedureFn,
    },
}

impl UpgradeStep {
    fn apply(&self, conn: &Connection) -> rusqlite::Result<()> {
        match self {
            UpgradeStep::Statement(sql) => conn.execute_batch(sql),
            UpgradeStep::Procedure { run, .. } => run(conn),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            UpgradeStep::Statement(sql) => sql,
            UpgradeStep::Procedure { description, .. } => description,
        }
    }
}

impl std::fmt::Debug for UpgradeStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpgradeStep::Statement(sql) => f.debug_tuple("Statement").field(sql).finish(),
            UpgradeStep::Procedure { description, .. } => {
                f.debug_struct("Procedure").field("description", description).finish()
            }
        }
    }
}

/// Outcome of one upgrade run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpgradeReport {
    /// Version found on disk
    pub from: u32,
    /// Version recorded after the run
    pub to: u32,
    /// Steps that succeeded
    pub applied: Vec<u32>,
    /// Steps that failed and were skipped
    pub failed: Vec<UpgradeError>,
}

impl UpgradeReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty() && self.failed.is_empty()
    }
}

/// Schema upgrade engine for one logical database
#[derive(Debug, Clone)]
pub struct DatabaseUpgrade {
    kind: DatabaseKind,
    steps: Vec<UpgradeStep>,
}

impl DatabaseUpgrade {
    pub fn new(kind: DatabaseKind) -> Self {
        Self::with_steps(kind, schema::upgrades(kind))
    }

    /// Engine with a custom step list
    pub fn with_steps(kind: DatabaseKind, steps: Vec<UpgradeStep>) -> Self {
        Self { kind, steps }
    }

    pub fn kind(&self) -> DatabaseKind {
        self.kind
    }

    /// Latest known version: the number of registered steps
    pub fn version(&self) -> u32 {
        self.steps.len() as u32
    }

    /// Bring the store up to [`version`](Self::version).
    ///
    /// A failing step is logged and skipped: later steps still run and the
    /// latest version is recorded anyway, so a skipped step is never retried.
    pub fn upgrade(&self, cursor: &SqlCursor) -> StoreResult<UpgradeReport> {
        let target = self.version();
        let current = cursor.with_cursor(false, |conn| Ok(self.current_version(conn)))?;
        if current >= target {
            debug!("{} schema is up to date (version {})", self.kind, current);
            return Ok(UpgradeReport {
                from: current,
                to: current,
                ..Default::default()
            });
        }

        // Another handle may have upgraded the file since the check above
        cursor.with_cursor(true, |conn| {
            let current = self.current_version(conn);
            let mut report = UpgradeReport {
                from: current,
                to: current,
                ..Default::default()
            };
            if current >= target {
                return Ok(report);
            }

            info!("Upgrading {} schema from {} to {}", self.kind, current, target);
            for version in current + 1..=target {
                let step = &self.steps[(version - 1) as usize];
                match step.apply(conn) {
                    Ok(()) => {
                        debug!("{} upgrade {} applied: {}", self.kind, version, step.describe());
                        report.applied.push(version);
                    }
                    Err(e) => {
                        warn!("{} upgrade {} failed: {}", self.kind, version, e);
                        report.failed.push(UpgradeError::Step {
                            version,
                            reason: e.to_string(),
                        });
                    }
                }
            }
            write_version(conn, target).map_err(query_error)?;
            report.to = target;
            Ok(report)
        })
    }

    fn current_version(&self, conn: &Connection) -> u32 {
        match read_version(conn) {
            Ok(version) => version,
            Err(e) => {
                warn!("Cannot read {} schema version, assuming 0: {}", self.kind, e);
                0
            }
        }
    }
}

/// Version stored in the database header
pub fn read_version(conn: &Connection) -> rusqlite::Result<u32> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(u32::try_from(version).unwrap_or(0))
}

pub fn write_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.pragma_update(None, "user_version", version)
}
