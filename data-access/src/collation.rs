//! String collation and normalization registered on every connection

use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use std::cmp::Ordering;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Collation name usable in `ORDER BY ... COLLATE LOCALIZED`
pub const LOCALIZED: &str = "LOCALIZED";

/// Scalar function name usable in predicates: `noaccents(title)`
pub const NOACCENTS: &str = "noaccents";

/// Scalar function name for case and accent insensitive matching: `fold(title)`
pub const FOLD: &str = "fold";

/// Strip diacritics: NFKD decomposition without combining marks
pub fn noaccents(text: &str) -> String {
    text.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Accent stripping plus Unicode lowercasing, the form search compares in
pub fn fold(text: &str) -> String {
    noaccents(text).to_lowercase()
}

/// Natural-language comparison: "été" sorts next to "ete", "Zoo" after "apple".
///
/// Falls back to the raw strings so that distinct inputs never compare equal.
pub fn localized_cmp(a: &str, b: &str) -> Ordering {
    fold(a).cmp(&fold(b)).then_with(|| a.cmp(b))
}

/// Register `LOCALIZED`, `noaccents` and `fold` on a freshly opened connection
pub fn register(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_collation(LOCALIZED, localized_cmp)?;
    register_text_function(conn, NOACCENTS, noaccents)?;
    register_text_function(conn, FOLD, fold)?;
    Ok(())
}

fn register_text_function(
    conn: &Connection,
    name: &str,
    transform: fn(&str) -> String,
) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        name,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        move |ctx| {
            let text = ctx.get::<Option<String>>(0)?;
            Ok(text.map(|t| transform(&t)))
        },
    )
}
