//! SQLite-backed cache store.
//!
//! Concurrent writers for the same key are resolved by the
//! `UNIQUE(organization_id, document_id)` constraint plus an upsert: the last
//! writer wins and no duplicate rows can appear.

use super::{CacheKey, CacheRow, CacheStore};
use crate::error::CacheError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS parse_cache (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id     INTEGER NOT NULL,
    organization_id INTEGER NOT NULL,
    format_version  INTEGER NOT NULL,
    payload         TEXT NOT NULL,
    parsing_method  TEXT NOT NULL,
    parsed_at       TEXT NOT NULL,
    UNIQUE(organization_id, document_id)
);
";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A [`CacheStore`] persisting rows in a `parse_cache` SQLite table.
#[derive(Debug)]
pub struct SqliteCacheStore {
    conn: Mutex<Connection>,
}

impl SqliteCacheStore {
    /// Open or create the cache database at `path`.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        conn.execute_batch(SCHEMA)?;
        debug!("Opened parse cache at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open in-memory database (for testing)
    pub fn in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl CacheStore for SqliteCacheStore {
    fn load(&self, key: CacheKey) -> Result<Option<CacheRow>, CacheError> {
        let conn = self.conn.lock().map_err(|_| CacheError::LockPoisoned)?;
        let raw = conn
            .query_row(
                "SELECT format_version, payload, parsing_method, parsed_at
                 FROM parse_cache
                 WHERE organization_id = ?1 AND document_id = ?2",
                params![key.organization_id, key.document_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((format_version, payload, parsing_method, parsed_at)) = raw else {
            return Ok(None);
        };
        let parsed_at = DateTime::parse_from_rfc3339(&parsed_at)
            .map_err(|e| CacheError::UnknownShape(format!("bad parsed_at '{parsed_at}': {e}")))?
            .with_timezone(&Utc);

        Ok(Some(CacheRow {
            format_version,
            payload,
            parsing_method,
            parsed_at,
        }))
    }

    fn store(&self, key: CacheKey, row: &CacheRow) -> Result<(), CacheError> {
        let conn = self.conn.lock().map_err(|_| CacheError::LockPoisoned)?;
        conn.execute(
            "INSERT INTO parse_cache
                 (document_id, organization_id, format_version, payload, parsing_method, parsed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(organization_id, document_id) DO UPDATE SET
                 format_version = excluded.format_version,
                 payload = excluded.payload,
                 parsing_method = excluded.parsing_method,
                 parsed_at = excluded.parsed_at",
            params![
                key.document_id,
                key.organization_id,
                row.format_version,
                row.payload,
                row.parsing_method,
                row.parsed_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn delete(&self, key: CacheKey) -> Result<bool, CacheError> {
        let conn = self.conn.lock().map_err(|_| CacheError::LockPoisoned)?;
        let removed = conn.execute(
            "DELETE FROM parse_cache WHERE organization_id = ?1 AND document_id = ?2",
            params![key.organization_id, key.document_id],
        )?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ParseCache;
    use crate::output::{ExtractionMethod, ParsedPage};
    use std::sync::Arc;

    fn row(payload: &str) -> CacheRow {
        CacheRow {
            format_version: 2,
            payload: payload.to_string(),
            parsing_method: "primary".to_string(),
            parsed_at: Utc::now(),
        }
    }

    #[test]
    fn store_replaces_existing_row() {
        let store = SqliteCacheStore::in_memory().unwrap();
        let key = CacheKey::new(1, 7);
        store.store(key, &row("first")).unwrap();
        store.store(key, &row("second")).unwrap();

        assert_eq!(store.load(key).unwrap().unwrap().payload, "second");
        let conn = store.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM parse_cache", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn keys_are_tenant_scoped() {
        let store = SqliteCacheStore::in_memory().unwrap();
        store.store(CacheKey::new(1, 7), &row("a")).unwrap();
        assert!(store.load(CacheKey::new(1, 8)).unwrap().is_none());
        assert!(!store.delete(CacheKey::new(1, 8)).unwrap());
        assert!(store.delete(CacheKey::new(1, 7)).unwrap());
    }

    #[test]
    fn timestamp_survives_round_trip() {
        let store = SqliteCacheStore::in_memory().unwrap();
        let written = row("x");
        store.store(CacheKey::new(3, 3), &written).unwrap();
        let read = store.load(CacheKey::new(3, 3)).unwrap().unwrap();
        assert_eq!(read.parsed_at, written.parsed_at);
    }

    #[test]
    fn file_backed_cache_persists_across_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cache.db");
        {
            let cache = ParseCache::new(Arc::new(SqliteCacheStore::open(&path).unwrap()));
            cache
                .put(9, 2, &[ParsedPage::new(1, "kept")], &[], ExtractionMethod::Primary)
                .unwrap();
        }
        let cache = ParseCache::new(Arc::new(SqliteCacheStore::open(&path).unwrap()));
        let hit = cache.get(9, 2).unwrap().unwrap();
        assert_eq!(hit.pages[0].text, "kept");
    }
}
