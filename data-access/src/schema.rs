//! Database schema definitions and migrations
//!
//! Each logical database has a creation schema and an ordered list of
//! upgrade steps. Creating a store from scratch must produce the same schema
//! as upgrading the oldest on-disk layout through every step.

use crate::upgrade::UpgradeStep;
use eolie_core::DatabaseKind;
use rusqlite::Connection;

// `id INTEGER PRIMARY KEY` aliases the rowid, so VACUUM keeps ids stable
pub const CREATE_HISTORY: &str = r#"
CREATE TABLE history (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    uri TEXT NOT NULL,
    netloc TEXT NOT NULL DEFAULT '',
    guid TEXT NOT NULL,
    mtime REAL NOT NULL,
    opened INT NOT NULL DEFAULT 0,
    popularity INT NOT NULL
)"#;

pub const CREATE_HISTORY_ATIME: &str = r#"
CREATE TABLE history_atime (
    history_id INT NOT NULL,
    atime REAL NOT NULL
)"#;

pub const CREATE_HISTORY_ORDERBY_IDX: &str =
    "CREATE INDEX idx_orderby ON history(mtime, popularity)";

pub const CREATE_HISTORY_WHERE_IDX: &str = "CREATE INDEX idx_where ON history(uri, title)";

/// Bookmarks layout after the column cleanup of upgrade 1
const CREATE_BOOKMARKS_V1: &str = r#"
CREATE TABLE bookmarks (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    uri TEXT NOT NULL,
    popularity INT NOT NULL,
    atime REAL NOT NULL,
    guid TEXT NOT NULL,
    mtime REAL NOT NULL,
    position INT DEFAULT 0
)"#;

pub const CREATE_BOOKMARKS: &str = r#"
CREATE TABLE bookmarks (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    uri TEXT NOT NULL,
    popularity INT NOT NULL,
    atime REAL NOT NULL,
    guid TEXT NOT NULL,
    mtime REAL NOT NULL,
    position INT DEFAULT 0,
    startup INT NOT NULL DEFAULT 0
)"#;

pub const CREATE_SETTINGS: &str = r#"
CREATE TABLE settings (
    id INTEGER PRIMARY KEY,
    uri TEXT NOT NULL,
    zoom INT,
    user_agent TEXT,
    audio INT NOT NULL DEFAULT 1
)"#;

const HISTORY_SCHEMA: &[&str] = &[
    CREATE_HISTORY,
    CREATE_HISTORY_ATIME,
    CREATE_HISTORY_ORDERBY_IDX,
    CREATE_HISTORY_WHERE_IDX,
];

const BOOKMARKS_SCHEMA: &[&str] = &[CREATE_BOOKMARKS];

const SETTINGS_SCHEMA: &[&str] = &[CREATE_SETTINGS];

/// Statements creating the latest schema of `kind`
pub fn create_statements(kind: DatabaseKind) -> &'static [&'static str] {
    match kind {
        DatabaseKind::History => HISTORY_SCHEMA,
        DatabaseKind::Bookmarks => BOOKMARKS_SCHEMA,
        DatabaseKind::Settings => SETTINGS_SCHEMA,
    }
}

/// Upgrade steps of `kind`, step N brings the store to version N
pub fn upgrades(kind: DatabaseKind) -> Vec<UpgradeStep> {
    match kind {
        DatabaseKind::History => vec![
            UpgradeStep::Statement("ALTER TABLE history ADD opened INT NOT NULL DEFAULT 0"),
            UpgradeStep::Statement("ALTER TABLE history ADD netloc TEXT NOT NULL DEFAULT ''"),
            UpgradeStep::Statement("DELETE FROM history WHERE popularity=0"),
            UpgradeStep::Statement(
                "DELETE FROM history_atime WHERE NOT EXISTS \
                 (SELECT * FROM history WHERE history.rowid=history_atime.history_id)",
            ),
            UpgradeStep::Statement(CREATE_HISTORY_ORDERBY_IDX),
            UpgradeStep::Statement(CREATE_HISTORY_WHERE_IDX),
        ],
        DatabaseKind::Bookmarks => vec![
            UpgradeStep::Procedure {
                description: "rebuild bookmarks without the del column",
                run: rebuild_bookmarks,
            },
            UpgradeStep::Statement("ALTER TABLE bookmarks ADD startup INT NOT NULL DEFAULT 0"),
        ],
        DatabaseKind::Settings => vec![UpgradeStep::Statement(
            "ALTER TABLE settings ADD audio INT NOT NULL DEFAULT 1",
        )],
    }
}

/// Recreate the bookmarks table, keeping every column still in use
fn rebuild_bookmarks(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("ALTER TABLE bookmarks RENAME TO _bookmarks")?;
    conn.execute_batch(CREATE_BOOKMARKS_V1)?;
    conn.execute_batch(
        "INSERT INTO bookmarks (id, title, uri, popularity, atime, guid, mtime, position) \
         SELECT id, title, uri, popularity, atime, guid, mtime, position FROM _bookmarks",
    )?;
    conn.execute_batch("DROP TABLE _bookmarks")?;
    Ok(())
}

/// Create the latest schema of `kind` and stamp it with `version`
pub fn create(conn: &Connection, kind: DatabaseKind, version: u32) -> rusqlite::Result<()> {
    for statement in create_statements(kind) {
        conn.execute_batch(statement)?;
    }
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}
