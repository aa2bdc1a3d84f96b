use serde::{Deserialize, Serialize};
use chrono::{DateTime, TimeZone, Utc};

/// Seconds in one history day view
pub const ONE_DAY: f64 = 86400.0;

/// Identity of a history entry (SQLite rowid)
pub type HistoryId = i64;

/// The logical databases owned by the browser, each versioned on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseKind {
    History,
    Bookmarks,
    Settings,
}

impl DatabaseKind {
    pub const ALL: [DatabaseKind; 3] = [
        DatabaseKind::History,
        DatabaseKind::Bookmarks,
        DatabaseKind::Settings,
    ];

    /// File name of this database inside the data directory
    pub fn file_name(&self) -> &'static str {
        match self {
            DatabaseKind::History => "history.db",
            DatabaseKind::Bookmarks => "bookmarks.db",
            DatabaseKind::Settings => "settings.db",
        }
    }
}

impl std::fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DatabaseKind::History => "history",
            DatabaseKind::Bookmarks => "bookmarks",
            DatabaseKind::Settings => "settings",
        };
        f.write_str(name)
    }
}

/// A full history row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: HistoryId,
    pub title: String,
    pub uri: String,
    pub netloc: String,
    pub guid: String,
    pub mtime: f64,
    pub opened: bool,
    pub popularity: u32,
}

/// One visit of a day view: `get()` results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryVisit {
    pub id: HistoryId,
    pub title: String,
    pub uri: String,
    pub atime: f64,
}

/// Search, popularity and autocomplete result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: HistoryId,
    pub title: String,
    pub uri: String,
}

/// Popular site, either one URI or a whole netloc
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopularSite {
    /// Representative entry
    pub id: HistoryId,
    pub uri: String,
    /// URI for a per-host listing, netloc for the aggregated listing
    pub key: String,
    pub title: String,
    /// Number of URIs behind this item
    pub count: u32,
}

/// A page that was open when the previous session ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenedPage {
    pub uri: String,
    pub title: String,
}

/// Current time as a floating point unix timestamp
pub fn now_timestamp() -> f64 {
    to_timestamp(&Utc::now())
}

pub fn to_timestamp(dt: &DateTime<Utc>) -> f64 {
    dt.timestamp_millis() as f64 / 1000.0
}

/// Start of the UTC day containing `timestamp`, suitable for `get()`
pub fn day_start(timestamp: f64) -> f64 {
    let secs = timestamp.floor() as i64;
    match Utc.timestamp_opt(secs, 0).single() {
        Some(dt) => {
            let midnight = dt.date_naive().and_hms_opt(0, 0, 0).map(|n| n.and_utc());
            midnight.map(|m| m.timestamp() as f64).unwrap_or(timestamp)
        }
        None => timestamp,
    }
}
