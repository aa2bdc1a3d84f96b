//! Browsing history store
//!
//! Entries are keyed by canonical URI (no trailing slash) and carry a
//! popularity counter bumped on every revisit. Each visit is kept as an
//! access time in `history_atime`. Query failures are logged and turned into
//! empty results; callers never see storage errors after the store opened.

use crate::collation::fold;
use crate::cursor::{query_error, SqlCursor, StoreResult};
use crate::Database;
use eolie_core::{
    DatabaseKind, HistoryEntry, HistoryId, HistoryItem, HistoryVisit, OpenedPage, PopularSite,
    StoreConfig, ONE_DAY,
};
use rand::distributions::Alphanumeric;
use rand::Rng;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::{debug, error};
use url::Url;

/// Length of generated sync identifiers
pub const GUID_LENGTH: usize = 12;

/// Strip trailing slashes: `http://x.com/` and `http://x.com` are one entry
pub fn canonical_uri(uri: &str) -> &str {
    uri.trim_end_matches('/')
}

/// Host (and explicit port) of `uri`, empty when it has none
pub fn netloc(uri: &str) -> String {
    match Url::parse(uri) {
        Ok(url) => match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            _ => String::new(),
        },
        Err(_) => String::new(),
    }
}

/// Bring a bare host typed by the user (`Example.COM`, `bücher.de:8080`) to
/// the lowercase ASCII form stored in `netloc`
pub fn normalize_netloc(host: &str) -> String {
    let (name, port) = match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => {
            (name, Some(port))
        }
        _ => (host, None),
    };
    let name = match url::Host::parse(name) {
        Ok(parsed) => parsed.to_string(),
        Err(_) => name.to_string(),
    };
    match port {
        Some(port) => format!("{}:{}", name, port),
        None => name,
    }
}

/// Whether `uri` starts with a scheme (`https://a.org/b`) rather than being
/// a bare host (`a.org`, `a.org:8080`)
pub fn has_scheme(uri: &str) -> bool {
    if Url::parse(uri).is_err() {
        return false;
    }
    match uri.split_once(':') {
        Some((_, rest)) => !(rest.chars().all(|c| c.is_ascii_digit()) && !rest.is_empty()),
        None => false,
    }
}

/// Random alphanumeric sync identifier
pub fn random_guid() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GUID_LENGTH)
        .map(char::from)
        .collect()
}

/// Escape LIKE wildcards in caller input, for use with `ESCAPE '\'`
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Log a failed query and fall back to an empty result
fn absorb<T: Default>(operation: &str, result: StoreResult<T>) -> T {
    result.unwrap_or_else(|e| {
        error!("HistoryStore::{}(): {}", operation, e);
        T::default()
    })
}

fn row_to_item(row: &Row) -> rusqlite::Result<HistoryItem> {
    Ok(HistoryItem {
        id: row.get(0)?,
        title: row.get(1)?,
        uri: row.get(2)?,
    })
}

fn row_to_entry(row: &Row) -> rusqlite::Result<HistoryEntry> {
    let opened: i64 = row.get(6)?;
    let popularity: i64 = row.get(7)?;
    Ok(HistoryEntry {
        id: row.get(0)?,
        title: row.get(1)?,
        uri: row.get(2)?,
        netloc: row.get(3)?,
        guid: row.get(4)?,
        mtime: row.get(5)?,
        opened: opened != 0,
        popularity: u32::try_from(popularity).unwrap_or(0),
    })
}

fn row_to_site(row: &Row) -> rusqlite::Result<PopularSite> {
    let count: i64 = row.get(4)?;
    Ok(PopularSite {
        id: row.get(0)?,
        uri: row.get(1)?,
        key: row.get(2)?,
        title: row.get(3)?,
        count: u32::try_from(count).unwrap_or(0),
    })
}

fn collect_ids(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> StoreResult<Vec<HistoryId>> {
    let mut stmt = conn.prepare(sql).map_err(query_error)?;
    let ids = stmt
        .query_map(params, |row| row.get(0))
        .map_err(query_error)?
        .collect::<rusqlite::Result<Vec<HistoryId>>>()
        .map_err(query_error)?;
    Ok(ids)
}

/// Eolie history database
pub struct HistoryStore {
    db: Database,
}

impl HistoryStore {
    /// Open `history.db` under the configured data directory
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        Ok(Self {
            db: Database::open(config, DatabaseKind::History)?,
        })
    }

    /// Create an in-memory history (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        Ok(Self {
            db: Database::in_memory(DatabaseKind::History)?,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn cursor(&self) -> &SqlCursor {
        self.db.cursor()
    }

    /// Add a visit to `uri`, updating the entry if the URI is known.
    ///
    /// A known entry gets the new title and mtime and one more point of
    /// popularity, its guid is kept. A new entry starts at popularity 0 with
    /// `guid` or a fresh unique one. `atimes` (or `[mtime]` when empty) are
    /// recorded unless already present. Returns `None` for an empty URI.
    pub fn add(
        &self,
        title: &str,
        uri: &str,
        mtime: f64,
        guid: Option<&str>,
        atimes: &[f64],
    ) -> Option<HistoryId> {
        absorb("add", self.try_add(title, uri, mtime, guid, atimes))
    }

    fn try_add(
        &self,
        title: &str,
        uri: &str,
        mtime: f64,
        guid: Option<&str>,
        atimes: &[f64],
    ) -> StoreResult<Option<HistoryId>> {
        let uri = canonical_uri(uri);
        if uri.is_empty() {
            return Ok(None);
        }
        let netloc = netloc(uri);

        self.cursor().with_cursor(true, |conn| {
            let existing: Option<HistoryId> = conn
                .query_row("SELECT rowid FROM history WHERE uri=?1", [uri], |row| row.get(0))
                .optional()
                .map_err(query_error)?;

            let history_id = match existing {
                Some(history_id) => {
                    conn.execute(
                        "UPDATE history SET netloc=?1, mtime=?2, title=?3, popularity=popularity+1 \
                         WHERE rowid=?4",
                        params![netloc, mtime, title, history_id],
                    )
                    .map_err(query_error)?;
                    history_id
                }
                None => {
                    let guid = match guid {
                        Some(guid) => guid.to_string(),
                        None => self.unique_guid()?,
                    };
                    conn.execute(
                        "INSERT INTO history (title, uri, netloc, mtime, popularity, guid) \
                         VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                        params![title, uri, netloc, mtime, guid],
                    )
                    .map_err(query_error)?;
                    conn.last_insert_rowid()
                }
            };

            if atimes.is_empty() {
                self.insert_atimes(conn, history_id, &[mtime])?;
            } else {
                self.insert_atimes(conn, history_id, atimes)?;
            }
            debug!("History entry {} updated for {}", history_id, uri);
            Ok(Some(history_id))
        })
    }

    fn unique_guid(&self) -> StoreResult<String> {
        loop {
            let guid = random_guid();
            if !self.try_exists_guid(&guid)? {
                return Ok(guid);
            }
        }
    }

    fn insert_atimes(&self, conn: &Connection, history_id: HistoryId, atimes: &[f64]) -> StoreResult<()> {
        let mut known = self.try_get_atimes(history_id)?;
        for &atime in atimes {
            if known.contains(&atime) {
                continue;
            }
            conn.execute(
                "INSERT INTO history_atime (history_id, atime) VALUES (?1, ?2)",
                params![history_id, atime],
            )
            .map_err(query_error)?;
            known.push(atime);
        }
        Ok(())
    }

    /// Delete an entry and all of its access times
    pub fn remove(&self, history_id: HistoryId) {
        let result = self.cursor().with_cursor(true, |conn| {
            conn.execute("DELETE FROM history WHERE rowid=?1", [history_id])
                .map_err(query_error)?;
            conn.execute("DELETE FROM history_atime WHERE history_id=?1", [history_id])
                .map_err(query_error)?;
            Ok(())
        });
        absorb("remove", result)
    }

    /// Delete every access time at or after `atime`
    pub fn clear_from(&self, atime: f64) {
        absorb("clear_from", self.execute("DELETE FROM history_atime WHERE atime >= ?1", params![atime]));
    }

    /// Delete every access time at or before `atime`
    pub fn clear_to(&self, atime: f64) {
        absorb("clear_to", self.execute("DELETE FROM history_atime WHERE atime <= ?1", params![atime]));
    }

    fn execute(&self, sql: &str, params: impl rusqlite::Params) -> StoreResult<usize> {
        self.cursor()
            .with_cursor(true, |conn| conn.execute(sql, params).map_err(query_error))
    }

    /// Ids of entries visited at or after `atime`
    pub fn get_from_atime(&self, atime: f64) -> Vec<HistoryId> {
        let result = self.cursor().with_cursor(false, |conn| {
            collect_ids(
                conn,
                "SELECT DISTINCT history.rowid FROM history, history_atime \
                 WHERE history_atime.history_id=history.rowid AND atime >= ?1",
                [atime],
            )
        });
        absorb("get_from_atime", result)
    }

    /// Ids of entries without any access time
    pub fn get_empties(&self) -> Vec<HistoryId> {
        let result = self.cursor().with_cursor(false, |conn| {
            collect_ids(
                conn,
                "SELECT history.rowid FROM history WHERE NOT EXISTS \
                 (SELECT rowid FROM history_atime AS ha WHERE ha.history_id=history.rowid)",
                [],
            )
        });
        absorb("get_empties", result)
    }

    /// Delete entries without any access time, returns how many went away
    pub fn remove_empties(&self) -> usize {
        absorb(
            "remove_empties",
            self.execute(
                "DELETE FROM history WHERE NOT EXISTS \
                 (SELECT rowid FROM history_atime AS ha WHERE ha.history_id=history.rowid)",
                [],
            ),
        )
    }

    /// Visits of the day starting at `atime`, most recent first
    pub fn get(&self, atime: f64) -> Vec<HistoryVisit> {
        let result = self.cursor().with_cursor(false, |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT history.rowid, title, uri, atime FROM history, history_atime \
                     WHERE history.rowid=history_atime.history_id \
                     AND atime >= ?1 AND atime < ?2 \
                     ORDER BY atime DESC",
                )
                .map_err(query_error)?;
            let visits = stmt
                .query_map(params![atime, atime + ONE_DAY], |row| {
                    Ok(HistoryVisit {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        uri: row.get(2)?,
                        atime: row.get(3)?,
                    })
                })
                .map_err(query_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(query_error)?;
            Ok(visits)
        });
        absorb("get", result)
    }

    /// Full row for `history_id`
    pub fn get_entry(&self, history_id: HistoryId) -> Option<HistoryEntry> {
        let result = self.cursor().with_cursor(false, |conn| {
            conn.query_row(
                "SELECT rowid, title, uri, netloc, guid, mtime, opened, popularity \
                 FROM history WHERE rowid=?1",
                [history_id],
                row_to_entry,
            )
            .optional()
            .map_err(query_error)
        });
        absorb("get_entry", result)
    }

    pub fn get_id(&self, uri: &str) -> Option<HistoryId> {
        let uri = canonical_uri(uri);
        absorb("get_id", self.get_value("SELECT rowid FROM history WHERE uri=?1", uri))
    }

    /// Title of `history_id`, empty if unknown
    pub fn get_title(&self, history_id: HistoryId) -> String {
        absorb("get_title", self.get_value("SELECT title FROM history WHERE rowid=?1", history_id))
            .unwrap_or_default()
    }

    /// URI of `history_id`, empty if unknown
    pub fn get_uri(&self, history_id: HistoryId) -> String {
        absorb("get_uri", self.get_value("SELECT uri FROM history WHERE rowid=?1", history_id))
            .unwrap_or_default()
    }

    pub fn get_guid(&self, history_id: HistoryId) -> Option<String> {
        absorb("get_guid", self.get_value("SELECT guid FROM history WHERE rowid=?1", history_id))
    }

    /// Modification time of `history_id`, 0 if unknown
    pub fn get_mtime(&self, history_id: HistoryId) -> f64 {
        absorb("get_mtime", self.get_value("SELECT mtime FROM history WHERE rowid=?1", history_id))
            .unwrap_or(0.0)
    }

    pub fn get_atimes(&self, history_id: HistoryId) -> Vec<f64> {
        absorb("get_atimes", self.try_get_atimes(history_id))
    }

    fn try_get_atimes(&self, history_id: HistoryId) -> StoreResult<Vec<f64>> {
        self.cursor().with_cursor(false, |conn| {
            let mut stmt = conn
                .prepare("SELECT atime FROM history_atime WHERE history_id=?1 ORDER BY atime")
                .map_err(query_error)?;
            let atimes = stmt
                .query_map([history_id], |row| row.get(0))
                .map_err(query_error)?
                .collect::<rusqlite::Result<Vec<f64>>>()
                .map_err(query_error)?;
            Ok(atimes)
        })
    }

    pub fn get_id_by_guid(&self, guid: &str) -> Option<HistoryId> {
        absorb("get_id_by_guid", self.get_value("SELECT rowid FROM history WHERE guid=?1", guid))
    }

    /// Ids modified after `mtime`, for incremental sync
    pub fn get_ids_for_mtime(&self, mtime: f64) -> Vec<HistoryId> {
        let result = self.cursor().with_cursor(false, |conn| {
            collect_ids(conn, "SELECT rowid FROM history WHERE mtime > ?1", [mtime])
        });
        absorb("get_ids_for_mtime", result)
    }

    fn get_value<T, P>(&self, sql: &str, param: P) -> StoreResult<Option<T>>
    where
        T: rusqlite::types::FromSql,
        P: rusqlite::ToSql,
    {
        self.cursor().with_cursor(false, |conn| {
            conn.query_row(sql, [param], |row| row.get(0))
                .optional()
                .map_err(query_error)
        })
    }

    /// Shortest stored URI containing `uri`, restricted to https when
    /// `ssl_force` is set
    pub fn get_match(&self, uri: &str, ssl_force: bool) -> Option<String> {
        let pattern = if ssl_force {
            format!("https://%{}%", escape_like(uri))
        } else {
            format!("http%://%{}%", escape_like(uri))
        };
        let result = self.cursor().with_cursor(false, |conn| {
            conn.query_row(
                "SELECT uri FROM history WHERE uri LIKE ?1 ESCAPE '\\' \
                 ORDER BY length(uri) ASC LIMIT 1",
                [pattern],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_error)
        });
        absorb("get_match", result)
    }

    pub fn set_title(&self, history_id: HistoryId, title: &str) {
        absorb(
            "set_title",
            self.execute("UPDATE history SET title=?1 WHERE rowid=?2", params![title, history_id]),
        );
    }

    pub fn set_mtime(&self, history_id: HistoryId, mtime: f64) {
        absorb(
            "set_mtime",
            self.execute("UPDATE history SET mtime=?1 WHERE rowid=?2", params![mtime, history_id]),
        );
    }

    /// Record access times not yet known for `history_id`
    pub fn set_atimes(&self, history_id: HistoryId, atimes: &[f64]) {
        let result = self
            .cursor()
            .with_cursor(true, |conn| self.insert_atimes(conn, history_id, atimes));
        absorb("set_atimes", result)
    }

    /// Most popular entries, most recently modified first on ties
    pub fn get_populars(&self, limit: usize) -> Vec<HistoryItem> {
        let result = self.cursor().with_cursor(false, |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT rowid, title, uri FROM history \
                     ORDER BY popularity DESC, mtime DESC LIMIT ?1",
                )
                .map_err(query_error)?;
            let items = stmt
                .query_map([limit as i64], row_to_item)
                .map_err(query_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(query_error)?;
            Ok(items)
        });
        absorb("get_populars", result)
    }

    /// Popular pages of `netloc`, or popular netlocs when `netloc` is empty.
    ///
    /// A netloc is ranked by its most popular page, which also represents it.
    pub fn get_populars_by_netloc(&self, netloc: &str, limit: usize) -> Vec<PopularSite> {
        let result = self.cursor().with_cursor(false, |conn| {
            let sites = if netloc.is_empty() {
                let mut stmt = conn
                    .prepare(
                        "SELECT rowid, uri, netloc, netloc, COUNT(uri), MAX(popularity) AS score \
                         FROM history GROUP BY netloc \
                         ORDER BY score DESC, mtime DESC LIMIT ?1",
                    )
                    .map_err(query_error)?;
                let rows = stmt
                    .query_map([limit as i64], row_to_site)
                    .map_err(query_error)?
                    .collect::<rusqlite::Result<Vec<_>>>();
                rows
            } else {
                let mut stmt = conn
                    .prepare(
                        "SELECT rowid, uri, uri, title, 1 FROM history \
                         WHERE netloc=?1 AND popularity!=0 \
                         ORDER BY popularity DESC, mtime DESC LIMIT ?2",
                    )
                    .map_err(query_error)?;
                let rows = stmt
                    .query_map(params![normalize_netloc(netloc), limit as i64], row_to_site)
                    .map_err(query_error)?
                    .collect::<rusqlite::Result<Vec<_>>>();
                rows
            };
            sites.map_err(query_error)
        });
        absorb("get_populars_by_netloc", result)
    }

    /// Pages marked opened by the previous session.
    ///
    /// Reading clears every opened flag, so this only answers once.
    pub fn get_opened_pages(&self) -> Vec<OpenedPage> {
        let result = self.cursor().with_cursor(true, |conn| {
            let pages = Self::read_opened(conn);
            conn.execute("UPDATE history SET opened=0 WHERE opened=1", [])
                .map_err(query_error)?;
            pages
        });
        absorb("get_opened_pages", result)
    }

    fn read_opened(conn: &Connection) -> StoreResult<Vec<OpenedPage>> {
        let mut stmt = conn
            .prepare("SELECT uri, title FROM history WHERE opened=1")
            .map_err(query_error)?;
        let pages = stmt
            .query_map([], |row| {
                Ok(OpenedPage {
                    uri: row.get(0)?,
                    title: row.get(1)?,
                })
            })
            .map_err(query_error)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(query_error)?;
        Ok(pages)
    }

    /// Mark the entry of `uri` with modification time `mtime` as opened, or
    /// clear its opened flag when `mtime` is `None`
    pub fn set_page_state(&self, uri: &str, mtime: Option<f64>) {
        let uri = canonical_uri(uri);
        let result = match mtime {
            None => self.execute(
                "UPDATE history SET opened=0 WHERE uri=?1 AND opened=1",
                params![uri],
            ),
            Some(mtime) => self.execute(
                "UPDATE history SET opened=1 WHERE uri=?1 AND mtime=?2",
                params![uri, mtime],
            ),
        };
        absorb("set_page_state", result);
    }

    /// Entries whose title or URI contains every word of `search`, shortest
    /// URIs first. Matching ignores case and accents.
    pub fn search(&self, search: &str, limit: usize) -> Vec<HistoryItem> {
        absorb("search", self.try_search(search, limit))
    }

    fn try_search(&self, search: &str, limit: usize) -> StoreResult<Vec<HistoryItem>> {
        let words: Vec<String> = search.split_whitespace().map(fold).collect();

        let mut request = String::from("SELECT rowid, title, uri FROM history");
        let mut filters: Vec<Value> = Vec::with_capacity(words.len() * 2 + 1);
        if !words.is_empty() {
            let clauses = vec![
                "(fold(title) LIKE ? ESCAPE '\\' OR fold(uri) LIKE ? ESCAPE '\\')";
                words.len()
            ];
            request.push_str(" WHERE ");
            request.push_str(&clauses.join(" AND "));
            for word in &words {
                let pattern = format!("%{}%", escape_like(word));
                filters.push(Value::Text(pattern.clone()));
                filters.push(Value::Text(pattern));
            }
        }
        request.push_str(" ORDER BY length(uri) ASC, title COLLATE LOCALIZED LIMIT ?");
        filters.push(Value::Integer(limit as i64));

        self.cursor().with_cursor(false, |conn| {
            let mut stmt = conn.prepare(&request).map_err(query_error)?;
            let items = stmt
                .query_map(params_from_iter(filters), row_to_item)
                .map_err(query_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(query_error)?;
            Ok(items)
        })
    }

    /// Zero the popularity of one URI, or of a whole host when given a bare
    /// netloc
    pub fn reset_popularity(&self, uri: &str) {
        let result = if has_scheme(uri) {
            self.execute(
                "UPDATE history SET popularity=0 WHERE uri=?1",
                params![canonical_uri(uri)],
            )
        } else {
            self.execute(
                "UPDATE history SET popularity=0 WHERE netloc=?1",
                params![normalize_netloc(uri)],
            )
        };
        absorb("reset_popularity", result);
    }

    pub fn exists_guid(&self, guid: &str) -> bool {
        absorb("exists_guid", self.try_exists_guid(guid))
    }

    fn try_exists_guid(&self, guid: &str) -> StoreResult<bool> {
        let found: Option<String> =
            self.get_value("SELECT guid FROM history WHERE guid=?1", guid)?;
        Ok(found.is_some())
    }

    /// Number of history entries
    pub fn count(&self) -> usize {
        let result = self.cursor().with_cursor(false, |conn| {
            conn.query_row("SELECT COUNT(*) FROM history", [], |row| row.get::<_, i64>(0))
                .map_err(query_error)
        });
        absorb("count", result) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> HistoryStore {
        HistoryStore::in_memory().unwrap()
    }

    #[test]
    fn test_canonical_uri() {
        assert_eq!(canonical_uri("http://x.com/"), "http://x.com");
        assert_eq!(canonical_uri("http://x.com//"), "http://x.com");
        assert_eq!(canonical_uri("http://x.com/a"), "http://x.com/a");
    }

    #[test]
    fn test_netloc() {
        assert_eq!(netloc("https://www.example.com/path?q=1"), "www.example.com");
        assert_eq!(netloc("http://localhost:8080/app"), "localhost:8080");
        assert_eq!(netloc("https://example.com:443/"), "example.com");
        assert_eq!(netloc("file:///home/user/index.html"), "");
        assert_eq!(netloc("not a uri"), "");
    }

    #[test]
    fn test_normalize_netloc_matches_stored_form() {
        assert_eq!(normalize_netloc("Example.COM"), netloc("https://example.com/a"));
        assert_eq!(normalize_netloc("bücher.de"), netloc("https://bücher.de/a"));
        assert_eq!(normalize_netloc("bücher.de"), "xn--bcher-kva.de");
        assert_eq!(normalize_netloc("LocalHost:8080"), "localhost:8080");
        assert_eq!(normalize_netloc("[::1]:631"), "[::1]:631");
    }

    #[test]
    fn test_has_scheme() {
        assert!(has_scheme("http://example.com/path"));
        assert!(has_scheme("about:blank"));
        assert!(!has_scheme("example.com"));
        assert!(!has_scheme("localhost:8080"));
        assert!(!has_scheme(""));
    }

    #[test]
    fn test_random_guid() {
        let guid = random_guid();
        assert_eq!(guid.len(), GUID_LENGTH);
        assert!(guid.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%_done\\"), "100\\%\\_done\\\\");
    }

    #[test]
    fn test_add_creates_then_updates() {
        let history = store();
        let id = history.add("First", "https://rust-lang.org/", 100.0, None, &[]).unwrap();
        let entry = history.get_entry(id).unwrap();
        assert_eq!(entry.uri, "https://rust-lang.org");
        assert_eq!(entry.netloc, "rust-lang.org");
        assert_eq!(entry.popularity, 0);
        assert_eq!(entry.guid.len(), GUID_LENGTH);
        assert!(!entry.opened);

        let again = history.add("Second", "https://rust-lang.org", 200.0, None, &[]).unwrap();
        assert_eq!(again, id);
        let updated = history.get_entry(id).unwrap();
        assert_eq!(updated.title, "Second");
        assert_eq!(updated.mtime, 200.0);
        assert_eq!(updated.popularity, 1);
        assert_eq!(updated.guid, entry.guid);
        assert_eq!(history.get_atimes(id), vec![100.0, 200.0]);
    }

    #[test]
    fn test_add_empty_uri_is_noop() {
        let history = store();
        assert_eq!(history.add("Nothing", "", 1.0, None, &[]), None);
        assert_eq!(history.add("Nothing", "/", 1.0, None, &[]), None);
        assert_eq!(history.count(), 0);
    }

    #[test]
    fn test_add_keeps_given_guid_for_new_entry() {
        let history = store();
        let id = history
            .add("Synced", "https://sync.example.org", 5.0, Some("abcdefABCDEF"), &[])
            .unwrap();
        assert_eq!(history.get_guid(id).as_deref(), Some("abcdefABCDEF"));
        assert_eq!(history.get_id_by_guid("abcdefABCDEF"), Some(id));
        assert!(history.exists_guid("abcdefABCDEF"));
        assert!(!history.exists_guid("zzzzzzzzzzzz"));
    }

    #[test]
    fn test_add_deduplicates_atimes() {
        let history = store();
        let id = history
            .add("T", "https://a.org", 10.0, None, &[1.0, 2.0, 2.0])
            .unwrap();
        history.add("T", "https://a.org", 11.0, None, &[2.0, 3.0]);
        let mut atimes = history.get_atimes(id);
        atimes.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(atimes, vec![1.0, 2.0, 3.0]);

        history.set_atimes(id, &[3.0, 4.0]);
        assert_eq!(history.get_atimes(id).len(), 4);
    }

    #[test]
    fn test_remove() {
        let history = store();
        let id = history.add("T", "https://a.org", 10.0, None, &[]).unwrap();
        history.remove(id);
        assert_eq!(history.get_entry(id), None);
        assert!(history.get_atimes(id).is_empty());
        // removing twice is harmless
        history.remove(id);
        history.remove(9999);
    }

    #[test]
    fn test_clear_ranges_leave_empties() {
        let history = store();
        let a = history.add("A", "https://a.org", 10.0, None, &[10.0, 20.0]).unwrap();
        let b = history.add("B", "https://b.org", 30.0, None, &[30.0]).unwrap();
        let c = history.add("C", "https://c.org", 40.0, None, &[5.0]).unwrap();

        history.clear_from(30.0);
        assert_eq!(history.get_atimes(b), Vec::<f64>::new());
        assert_eq!(history.get_empties(), vec![b]);

        history.clear_to(10.0);
        assert_eq!(history.get_atimes(a), vec![20.0]);
        let mut empties = history.get_empties();
        empties.sort();
        assert_eq!(empties, vec![b, c]);

        // already empty ranges
        history.clear_from(1000.0);
        history.clear_to(0.0);

        assert_eq!(history.remove_empties(), 2);
        assert_eq!(history.count(), 1);
        assert!(history.get_empties().is_empty());
    }

    #[test]
    fn test_get_day_window() {
        let history = store();
        let day = 1_600_000_000.0;
        let id = history
            .add("Day", "https://day.org", day, None, &[day - 1.0, day, day + 100.0, day + ONE_DAY])
            .unwrap();
        let visits = history.get(day);
        let atimes: Vec<f64> = visits.iter().map(|v| v.atime).collect();
        assert_eq!(atimes, vec![day + 100.0, day]);
        assert!(visits.iter().all(|v| v.id == id && v.title == "Day"));
    }

    #[test]
    fn test_get_from_atime_is_distinct() {
        let history = store();
        let id = history.add("A", "https://a.org", 10.0, None, &[10.0, 20.0, 30.0]).unwrap();
        history.add("B", "https://b.org", 5.0, None, &[5.0]);
        assert_eq!(history.get_from_atime(15.0), vec![id]);
    }

    #[test]
    fn test_getters_on_missing_entry() {
        let history = store();
        assert_eq!(history.get_title(1), "");
        assert_eq!(history.get_uri(1), "");
        assert_eq!(history.get_guid(1), None);
        assert_eq!(history.get_mtime(1), 0.0);
        assert_eq!(history.get_id("https://nowhere.org"), None);
    }

    #[test]
    fn test_setters() {
        let history = store();
        let id = history.add("Old", "https://a.org/page/", 10.0, None, &[]).unwrap();
        history.set_title(id, "New");
        history.set_mtime(id, 42.5);
        assert_eq!(history.get_title(id), "New");
        assert_eq!(history.get_mtime(id), 42.5);
        assert_eq!(history.get_uri(id), "https://a.org/page");
        assert_eq!(history.get_id("https://a.org/page/"), Some(id));
    }

    #[test]
    fn test_get_ids_for_mtime() {
        let history = store();
        history.add("A", "https://a.org", 10.0, None, &[]);
        let b = history.add("B", "https://b.org", 20.0, None, &[]).unwrap();
        assert_eq!(history.get_ids_for_mtime(10.0), vec![b]);
        assert!(history.get_ids_for_mtime(20.0).is_empty());
    }

    #[test]
    fn test_get_match() {
        let history = store();
        history.add("Long", "http://www.example.com/a/long/path", 1.0, None, &[]);
        history.add("Short", "http://www.example.com", 1.0, None, &[]);
        history.add("Secure", "https://secure.example.com/login", 1.0, None, &[]);

        assert_eq!(
            history.get_match("example", false).as_deref(),
            Some("http://www.example.com")
        );
        assert_eq!(
            history.get_match("example", true).as_deref(),
            Some("https://secure.example.com/login")
        );
        assert_eq!(history.get_match("nothing-like-this", false), None);
        assert_eq!(history.get_match("100%", false), None);
    }

    #[test]
    fn test_search_and_semantics() {
        let history = store();
        history.add("Rust Programming Language", "https://rust-lang.org", 1.0, None, &[]);
        history.add("Rust Book", "https://doc.rust-lang.org/book", 1.0, None, &[]);
        history.add("Python", "https://python.org", 1.0, None, &[]);

        let results = history.search("RUST book", 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].uri, "https://doc.rust-lang.org/book");

        let results = history.search("rust", 10);
        let uris: Vec<&str> = results.iter().map(|r| r.uri.as_str()).collect();
        assert_eq!(uris, vec!["https://rust-lang.org", "https://doc.rust-lang.org/book"]);

        assert_eq!(history.search("rust", 1).len(), 1);
        assert_eq!(history.search("", 10).len(), 3);
        assert!(history.search("missing", 10).is_empty());
    }

    #[test]
    fn test_search_ignores_accents() {
        let history = store();
        history.add("Crème brûlée recipe", "https://food.example.com/creme", 1.0, None, &[]);
        assert_eq!(history.search("brulee", 10).len(), 1);
        assert_eq!(history.search("crème", 10).len(), 1);
    }

    #[test]
    fn test_search_ignores_case_beyond_ascii() {
        let history = store();
        history.add("Привет Мир", "https://example.ru/privet", 1.0, None, &[]);
        history.add("ΑΘΗΝΑ Guide", "https://example.gr/athens", 1.0, None, &[]);
        history.add("STRASSE ÖL", "https://example.de/oel", 1.0, None, &[]);

        assert_eq!(history.search("привет", 10).len(), 1);
        assert_eq!(history.search("Привет", 10).len(), 1);
        assert_eq!(history.search("ПРИВЕТ мир", 10).len(), 1);
        assert_eq!(history.search("αθηνα", 10).len(), 1);
        assert_eq!(history.search("öl", 10).len(), 1);
    }

    #[test]
    fn test_search_treats_wildcards_literally() {
        let history = store();
        history.add("Progress", "https://a.org/100_percent", 1.0, None, &[]);
        history.add("Other", "https://a.org/100Xpercent", 1.0, None, &[]);
        let results = history.search("100_", 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Progress");
        assert!(history.search("%", 10).is_empty());
    }

    #[test]
    fn test_get_populars() {
        let history = store();
        history.add("A", "https://a.org", 1.0, None, &[]);
        for mtime in [2.0, 3.0, 4.0] {
            history.add("B", "https://b.org", mtime, None, &[]);
        }
        history.add("C", "https://c.org", 5.0, None, &[]);

        let populars = history.get_populars(2);
        let titles: Vec<&str> = populars.iter().map(|p| p.title.as_str()).collect();
        // B is most popular, then C wins the tie with A on mtime
        assert_eq!(titles, vec!["B", "C"]);
    }

    #[test]
    fn test_get_populars_by_netloc() {
        let history = store();
        history.add("Home", "https://a.org", 1.0, None, &[]);
        history.add("Home", "https://a.org", 2.0, None, &[]);
        history.add("Docs", "https://a.org/docs", 3.0, None, &[]);
        history.add("Docs", "https://a.org/docs", 4.0, None, &[]);
        history.add("Docs", "https://a.org/docs", 5.0, None, &[]);
        history.add("Never again", "https://a.org/once", 6.0, None, &[]);
        history.add("B", "https://b.org", 7.0, None, &[]);

        let pages = history.get_populars_by_netloc("a.org", 10);
        let uris: Vec<&str> = pages.iter().map(|p| p.uri.as_str()).collect();
        assert_eq!(uris, vec!["https://a.org/docs", "https://a.org"]);
        assert!(pages.iter().all(|p| p.count == 1 && p.key == p.uri));

        let sites = history.get_populars_by_netloc("", 10);
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].key, "a.org");
        assert_eq!(sites[0].title, "a.org");
        assert_eq!(sites[0].count, 3);
        assert_eq!(sites[0].uri, "https://a.org/docs");
        assert_eq!(sites[1].key, "b.org");
        assert_eq!(sites[1].count, 1);
    }

    #[test]
    fn test_opened_pages_read_and_clear() {
        let history = store();
        history.add("A", "https://a.org", 10.0, None, &[]);
        history.add("B", "https://b.org", 20.0, None, &[]);

        history.set_page_state("https://a.org/", Some(10.0));
        history.set_page_state("https://b.org", Some(999.0));
        let opened = history.get_opened_pages();
        assert_eq!(
            opened,
            vec![OpenedPage {
                uri: "https://a.org".to_string(),
                title: "A".to_string()
            }]
        );
        assert!(history.get_opened_pages().is_empty());

        history.set_page_state("https://b.org", Some(20.0));
        history.set_page_state("https://b.org", None);
        assert!(history.get_opened_pages().is_empty());
    }

    #[test]
    fn test_reset_popularity_scope() {
        let history = store();
        for _ in 0..3 {
            history.add("Path", "http://example.com/path", 1.0, None, &[]);
            history.add("Root", "http://example.com", 1.0, None, &[]);
            history.add("Other", "http://other.org", 1.0, None, &[]);
        }
        let path = history.get_id("http://example.com/path").unwrap();
        let root = history.get_id("http://example.com").unwrap();
        let other = history.get_id("http://other.org").unwrap();

        history.reset_popularity("http://example.com/path");
        assert_eq!(history.get_entry(path).unwrap().popularity, 0);
        assert_eq!(history.get_entry(root).unwrap().popularity, 2);

        history.reset_popularity("example.com");
        assert_eq!(history.get_entry(root).unwrap().popularity, 0);
        assert_eq!(history.get_entry(other).unwrap().popularity, 2);
    }

    #[test]
    fn test_bare_host_is_normalized_like_stored_netlocs() {
        let history = store();
        for _ in 0..2 {
            history.add("Books", "https://bücher.de/shelf", 1.0, None, &[]);
            history.add("Mixed", "https://Example.COM/page", 1.0, None, &[]);
        }
        let books = history.get_id("https://bücher.de/shelf").unwrap();
        let mixed = history.get_id("https://Example.COM/page").unwrap();

        assert_eq!(history.get_populars_by_netloc("BÜCHER.de", 10).len(), 1);

        history.reset_popularity("EXAMPLE.com");
        assert_eq!(history.get_entry(mixed).unwrap().popularity, 0);
        assert_eq!(history.get_entry(books).unwrap().popularity, 1);

        history.reset_popularity("bücher.de");
        assert_eq!(history.get_entry(books).unwrap().popularity, 0);
    }

    #[test]
    fn test_errors_are_absorbed() {
        let history = store();
        history.add("A", "https://a.org", 1.0, None, &[]);
        history
            .cursor()
            .with_cursor(true, |conn| {
                conn.execute_batch("DROP TABLE history_atime").map_err(query_error)
            })
            .unwrap();
        assert!(history.get(0.0).is_empty());
        assert!(history.get_atimes(1).is_empty());
        assert_eq!(history.add("B", "https://b.org", 1.0, None, &[]), None);
        // the failed add was rolled back
        assert_eq!(history.get_id("https://b.org"), None);
        assert_eq!(history.count(), 1);
    }
}
