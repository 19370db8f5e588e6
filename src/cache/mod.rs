//! Tenant-scoped, format-versioned cache of parse results.
//!
//! ## Layers
//!
//! * [`CacheStore`]: dumb row storage keyed by [`CacheKey`]. Shipped
//!   implementations: [`SqliteCacheStore`] and [`MemoryCacheStore`].
//! * [`ParseCache`]: the typed view over a store. It encodes results in the
//!   current payload format, decodes every historical format, and deletes
//!   rows it cannot decode so they are re-parsed on the next request.
//!
//! Every lookup is keyed by organisation as well as document, so a row
//! written for one tenant is invisible to another: a tenant mismatch looks
//! exactly like a cold cache.

pub mod memory;
pub mod payload;
pub mod sqlite;

pub use memory::MemoryCacheStore;
pub use payload::{StoredPayload, CURRENT_FORMAT_VERSION};
pub use sqlite::SqliteCacheStore;

use crate::error::CacheError;
use crate::output::{ExtractedTable, ExtractionMethod, ParseResult, ParsedPage};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

/// Identifies one cache row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub document_id: i64,
    pub organization_id: i64,
}

impl CacheKey {
    pub fn new(document_id: i64, organization_id: i64) -> Self {
        Self {
            document_id,
            organization_id,
        }
    }
}

/// One stored cache row, exactly as persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRow {
    pub format_version: i64,
    /// JSON text in one of the [`StoredPayload`] formats.
    pub payload: String,
    /// [`ExtractionMethod`] wire name.
    pub parsing_method: String,
    pub parsed_at: DateTime<Utc>,
}

/// Row storage for the parse cache.
///
/// At most one row exists per key; `store` replaces any existing row.
pub trait CacheStore: Send + Sync {
    fn load(&self, key: CacheKey) -> Result<Option<CacheRow>, CacheError>;

    fn store(&self, key: CacheKey, row: &CacheRow) -> Result<(), CacheError>;

    /// Remove a row; returns whether one existed.
    fn delete(&self, key: CacheKey) -> Result<bool, CacheError>;
}

/// Typed access to cached parse results.
#[derive(Clone)]
pub struct ParseCache {
    store: Arc<dyn CacheStore>,
}

impl std::fmt::Debug for ParseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParseCache").finish_non_exhaustive()
    }
}

impl ParseCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Look up a cached result for this tenant's document.
    ///
    /// Returns `Ok(None)` on a miss, including when the stored row was
    /// unreadable and has just been deleted. The returned result has
    /// `cached = true`.
    pub fn get(
        &self,
        document_id: i64,
        organization_id: i64,
    ) -> Result<Option<ParseResult>, CacheError> {
        let key = CacheKey::new(document_id, organization_id);
        let Some(row) = self.store.load(key)? else {
            return Ok(None);
        };

        let method = match row.parsing_method.parse::<ExtractionMethod>() {
            Ok(method) => method,
            Err(e) => {
                self.discard(key, &e);
                return Ok(None);
            }
        };

        let payload = match StoredPayload::decode(&row.payload) {
            Ok(payload) => payload,
            Err(e) => {
                self.discard(key, &e);
                return Ok(None);
            }
        };

        if payload.version() != row.format_version {
            debug!(
                "Cache row for document {} declares format {} but holds format {}",
                document_id,
                row.format_version,
                payload.version()
            );
        }

        let (pages, tables) = payload.into_parts();
        Ok(Some(ParseResult {
            document_id,
            pages,
            tables,
            method,
            cached: true,
        }))
    }

    /// Store a result in the current format, replacing any previous row.
    pub fn put(
        &self,
        document_id: i64,
        organization_id: i64,
        pages: &[ParsedPage],
        tables: &[ExtractedTable],
        method: ExtractionMethod,
    ) -> Result<(), CacheError> {
        let row = CacheRow {
            format_version: CURRENT_FORMAT_VERSION,
            payload: StoredPayload::encode(pages, tables)?,
            parsing_method: method.as_str().to_string(),
            parsed_at: Utc::now(),
        };
        self.store
            .store(CacheKey::new(document_id, organization_id), &row)
    }

    /// Drop the cached result for this tenant's document, if any.
    pub fn invalidate(&self, document_id: i64, organization_id: i64) -> Result<bool, CacheError> {
        self.store
            .delete(CacheKey::new(document_id, organization_id))
    }

    fn discard(&self, key: CacheKey, reason: &dyn std::fmt::Display) {
        warn!(
            document_id = key.document_id,
            organization_id = key.organization_id,
            "Discarding unreadable cache row: {}",
            reason
        );
        if let Err(e) = self.store.delete(key) {
            warn!(
                document_id = key.document_id,
                organization_id = key.organization_id,
                "Could not delete unreadable cache row: {}",
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> (ParseCache, Arc<MemoryCacheStore>) {
        let store = Arc::new(MemoryCacheStore::new());
        (ParseCache::new(store.clone()), store)
    }

    fn raw_row(payload: &str, method: &str, version: i64) -> CacheRow {
        CacheRow {
            format_version: version,
            payload: payload.to_string(),
            parsing_method: method.to_string(),
            parsed_at: Utc::now(),
        }
    }

    #[test]
    fn put_then_get() {
        let (cache, _) = cache();
        let pages = vec![ParsedPage::new(1, "hello")];
        cache
            .put(10, 1, &pages, &[], ExtractionMethod::Fallback)
            .unwrap();

        let hit = cache.get(10, 1).unwrap().unwrap();
        assert!(hit.cached);
        assert_eq!(hit.document_id, 10);
        assert_eq!(hit.pages, pages);
        assert_eq!(hit.method, ExtractionMethod::Fallback);
    }

    #[test]
    fn tenants_are_isolated() {
        let (cache, _) = cache();
        cache
            .put(10, 1, &[ParsedPage::new(1, "tenant one")], &[], ExtractionMethod::Primary)
            .unwrap();
        assert!(cache.get(10, 2).unwrap().is_none());
        assert!(cache.get(10, 1).unwrap().is_some());
    }

    #[test]
    fn legacy_rows_are_readable() {
        let (cache, store) = cache();
        let key = CacheKey::new(5, 1);
        store
            .store(key, &raw_row(r#"[{"page_number": 1, "text": "old"}]"#, "primary", 0))
            .unwrap();
        let hit = cache.get(5, 1).unwrap().unwrap();
        assert_eq!(hit.pages[0].text, "old");
        assert!(hit.tables.is_empty());
    }

    #[test]
    fn unversioned_and_versioned_rows_read_identically() {
        let (cache, store) = cache();
        let body = r#""pages": [{"page_number": 1, "text": "t", "section": "Intro"}],
                      "tables": [{"page": 1, "table_index": 0, "columns": ["a"],
                                  "rows": [{"a": "1"}], "row_count": 1}]"#;
        store
            .store(CacheKey::new(1, 1), &raw_row(&format!("{{{body}}}"), "primary", 1))
            .unwrap();
        store
            .store(
                CacheKey::new(2, 1),
                &raw_row(&format!("{{\"version\": 2, {body}}}"), "primary", 2),
            )
            .unwrap();

        let v1 = cache.get(1, 1).unwrap().unwrap();
        let v2 = cache.get(2, 1).unwrap().unwrap();
        assert_eq!(v1.pages, v2.pages);
        assert_eq!(v1.tables, v2.tables);
        assert_eq!(v1.method, v2.method);
    }

    #[test]
    fn unreadable_rows_are_deleted() {
        let (cache, store) = cache();
        let cases = [
            raw_row(r#"{"version": 7, "pages": []}"#, "primary", 7),
            raw_row("{not json", "primary", 2),
            raw_row(r#"{"version": 2, "pages": []}"#, "pdfplumber", 2),
        ];
        for (i, row) in cases.iter().enumerate() {
            let key = CacheKey::new(i as i64, 1);
            store.store(key, row).unwrap();
            assert!(cache.get(key.document_id, 1).unwrap().is_none(), "case {i}");
            assert!(store.load(key).unwrap().is_none(), "case {i} not deleted");
        }
    }

    #[test]
    fn invalidate_reports_presence() {
        let (cache, _) = cache();
        cache.put(1, 1, &[], &[], ExtractionMethod::Ocr).unwrap();
        assert!(cache.invalidate(1, 1).unwrap());
        assert!(!cache.invalidate(1, 1).unwrap());
        assert!(cache.get(1, 1).unwrap().is_none());
    }
}
