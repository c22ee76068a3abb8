//! Key/value and list primitives. No business logic lives here, and no
//! atomicity is offered across keys: callers tolerate partial multi-key
//! updates.

use rusqlite::Connection;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::{Database, Error, Result};

pub trait Store: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Pushes onto the head of the list: the newest entry is read first.
    fn list_push(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Inclusive range over the list, newest first. Negative indexes count
    /// back from the oldest entry (`-1` is the last element).
    fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<Vec<u8>>>;

    /// Record keys starting with `prefix`, in key order. Lists are not included.
    fn scan_keys(&self, prefix: &str) -> Result<Vec<String>>;
}

// -- Logical keys --

pub fn user_key(id: Uuid) -> String {
    format!("user:{}", id)
}

pub fn conversation_key(id: Uuid) -> String {
    format!("conversation:{}", id)
}

pub fn messages_key(conversation_id: Uuid) -> String {
    format!("conversation:{}:messages", conversation_id)
}

// -- Record codec --

pub(crate) fn load<T, S>(store: &S, key: &str) -> Result<Option<T>>
where
    T: DeserializeOwned,
    S: Store + ?Sized,
{
    match store.get(key)? {
        Some(bytes) => decode(key, &bytes).map(Some),
        None => Ok(None),
    }
}

pub(crate) fn save<T, S>(store: &S, key: &str, value: &T) -> Result<()>
where
    T: Serialize,
    S: Store + ?Sized,
{
    let bytes = serde_json::to_vec(value).map_err(Error::Encode)?;
    store.set(key, &bytes)
}

pub(crate) fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|source| Error::CorruptData {
        key: key.to_string(),
        source,
    })
}

// -- SQLite implementation --

impl Store for Database {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
                .optional()
        })
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                rusqlite::params![key, value],
            )?;
            Ok(())
        })
    }

    fn list_push(&self, key: &str, value: &[u8]) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO list_items (key, seq, value)
                 SELECT ?1, COALESCE(MAX(seq), 0) + 1, ?2 FROM list_items WHERE key = ?1",
                rusqlite::params![key, value],
            )?;
            Ok(())
        })
    }

    fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<Vec<u8>>> {
        self.with_conn(|conn| query_list_range(conn, key, start, stop))
    }

    fn scan_keys(&self, prefix: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT key FROM kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
            )?;
            let keys = stmt
                .query_map([prefix], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(keys)
        })
    }
}

fn query_list_range(conn: &Connection, key: &str, start: i64, stop: i64) -> Result<Vec<Vec<u8>>> {
    let len: i64 = conn.query_row(
        "SELECT COUNT(*) FROM list_items WHERE key = ?1",
        [key],
        |row| row.get(0),
    )?;

    let Some((offset, count)) = resolve_range(len, start, stop) else {
        return Ok(vec![]);
    };

    let mut stmt = conn.prepare(
        "SELECT value FROM list_items WHERE key = ?1 ORDER BY seq DESC LIMIT ?2 OFFSET ?3",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![key, count, offset], |row| row.get(0))?
        .collect::<std::result::Result<Vec<Vec<u8>>, _>>()?;

    Ok(rows)
}

/// Maps an inclusive `start..=stop` (negative = from the end) onto
/// `(offset, count)` for a list of `len` entries.
fn resolve_range(len: i64, start: i64, stop: i64) -> Option<(i64, i64)> {
    let start = (if start < 0 { len.saturating_add(start) } else { start }).max(0);
    let stop = (if stop < 0 { len.saturating_add(stop) } else { stop }).min(len - 1);

    if len == 0 || start > stop {
        return None;
    }
    Some((start, stop - start + 1))
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(rows: Vec<Vec<u8>>) -> Vec<String> {
        rows.into_iter().map(|r| String::from_utf8(r).unwrap()).collect()
    }

    #[test]
    fn get_set_overwrites() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.get("a").unwrap(), None);

        db.set("a", b"one").unwrap();
        db.set("a", b"two").unwrap();
        assert_eq!(db.get("a").unwrap().as_deref(), Some(&b"two"[..]));
    }

    #[test]
    fn list_push_is_newest_first() {
        let db = Database::open_in_memory().unwrap();
        for v in ["a", "b", "c", "d"] {
            db.list_push("l", v.as_bytes()).unwrap();
        }

        assert_eq!(strings(db.list_range("l", 0, -1).unwrap()), ["d", "c", "b", "a"]);
        assert_eq!(strings(db.list_range("l", 1, 2).unwrap()), ["c", "b"]);
        assert_eq!(strings(db.list_range("l", -2, -1).unwrap()), ["b", "a"]);
        assert_eq!(strings(db.list_range("l", 3, 10).unwrap()), ["a"]);
        assert!(db.list_range("l", 4, 10).unwrap().is_empty());
        assert!(db.list_range("l", 2, 1).unwrap().is_empty());
        assert!(db.list_range("missing", 0, -1).unwrap().is_empty());
    }

    #[test]
    fn lists_are_independent() {
        let db = Database::open_in_memory().unwrap();
        db.list_push("x", b"1").unwrap();
        db.list_push("y", b"2").unwrap();
        db.list_push("x", b"3").unwrap();

        assert_eq!(strings(db.list_range("x", 0, -1).unwrap()), ["3", "1"]);
        assert_eq!(strings(db.list_range("y", 0, -1).unwrap()), ["2"]);
    }

    #[test]
    fn scan_keys_matches_prefix_only() {
        let db = Database::open_in_memory().unwrap();
        db.set("user:1", b"{}").unwrap();
        db.set("user:2", b"{}").unwrap();
        db.set("conversation:1", b"{}").unwrap();
        db.list_push("user:1:log", b"{}").unwrap();

        assert_eq!(db.scan_keys("user:").unwrap(), ["user:1", "user:2"]);
        assert_eq!(db.scan_keys("nothing:").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn resolve_range_clamps() {
        assert_eq!(resolve_range(5, 0, 49), Some((0, 5)));
        assert_eq!(resolve_range(5, -100, 1), Some((0, 2)));
        assert_eq!(resolve_range(0, 0, -1), None);
        assert_eq!(resolve_range(5, 7, 9), None);
        assert_eq!(resolve_range(5, i64::MIN, i64::MAX), Some((0, 5)));
        assert_eq!(resolve_range(5, i64::MAX, i64::MAX), None);
    }

    #[test]
    fn decode_reports_key() {
        let err = decode::<serde_json::Value>("user:x", b"not json").unwrap_err();
        assert!(matches!(err, Error::CorruptData { key, .. } if key == "user:x"));
    }
}
