//! On-disk payload formats of the parse cache.
//!
//! Three generations of payload coexist in long-lived caches:
//!
//! | version | JSON shape                                   |
//! |---------|----------------------------------------------|
//! | 2       | `{"version": 2, "pages": [...], "tables": [...]}` |
//! | 1       | `{"pages": [...], "tables": [...]}`          |
//! | 0       | `[ {page}, {page}, ... ]`                    |
//!
//! The shape of the JSON itself is authoritative; the row's
//! `format_version` column only mirrors it. Writes always produce version 2.

use crate::error::CacheError;
use crate::output::{ExtractedTable, ParsedPage};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The version every write produces.
pub const CURRENT_FORMAT_VERSION: i64 = 2;

/// A decoded cache payload, whatever generation it was written in.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredPayload {
    Versioned {
        pages: Vec<ParsedPage>,
        tables: Vec<ExtractedTable>,
    },
    Unversioned {
        pages: Vec<ParsedPage>,
        tables: Vec<ExtractedTable>,
    },
    Legacy(Vec<ParsedPage>),
}

#[derive(Serialize)]
struct VersionedOut<'a> {
    version: i64,
    pages: &'a [ParsedPage],
    tables: &'a [ExtractedTable],
}

#[derive(Deserialize)]
struct PagesAndTables {
    pages: Vec<ParsedPage>,
    #[serde(default)]
    tables: Vec<ExtractedTable>,
}

impl StoredPayload {
    /// Decode any known payload generation.
    ///
    /// # Errors
    /// - [`CacheError::Serde`] when the text is not valid JSON or a known
    ///   shape holds malformed pages/tables
    /// - [`CacheError::UnknownVersion`] for a `version` this crate does not
    ///   understand
    /// - [`CacheError::UnknownShape`] for any other JSON
    pub fn decode(json: &str) -> Result<Self, CacheError> {
        let value: Value = serde_json::from_str(json)?;
        match value {
            Value::Array(_) => Ok(StoredPayload::Legacy(serde_json::from_value(value)?)),
            Value::Object(ref map) => match map.get("version") {
                Some(v) => match v.as_i64() {
                    Some(2) => {
                        let PagesAndTables { pages, tables } = serde_json::from_value(value)?;
                        Ok(StoredPayload::Versioned { pages, tables })
                    }
                    Some(1) => {
                        let PagesAndTables { pages, tables } = serde_json::from_value(value)?;
                        Ok(StoredPayload::Unversioned { pages, tables })
                    }
                    Some(other) => Err(CacheError::UnknownVersion(other)),
                    None => Err(CacheError::UnknownShape(format!("non-integer version {v}"))),
                },
                None if map.contains_key("pages") => {
                    let PagesAndTables { pages, tables } = serde_json::from_value(value)?;
                    Ok(StoredPayload::Unversioned { pages, tables })
                }
                None => Err(CacheError::UnknownShape(
                    "object without pages or version".into(),
                )),
            },
            other => Err(CacheError::UnknownShape(format!(
                "expected an object or array, got {}",
                json_type(&other)
            ))),
        }
    }

    /// Serialise pages and tables in the current format.
    pub fn encode(pages: &[ParsedPage], tables: &[ExtractedTable]) -> Result<String, CacheError> {
        Ok(serde_json::to_string(&VersionedOut {
            version: CURRENT_FORMAT_VERSION,
            pages,
            tables,
        })?)
    }

    /// The format generation this payload was written in.
    pub fn version(&self) -> i64 {
        match self {
            StoredPayload::Versioned { .. } => 2,
            StoredPayload::Unversioned { .. } => 1,
            StoredPayload::Legacy(_) => 0,
        }
    }

    pub fn into_parts(self) -> (Vec<ParsedPage>, Vec<ExtractedTable>) {
        match self {
            StoredPayload::Versioned { pages, tables }
            | StoredPayload::Unversioned { pages, tables } => (pages, tables),
            StoredPayload::Legacy(pages) => (pages, Vec::new()),
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_all_three_generations() {
        let v2 = r#"{"version": 2, "pages": [{"page_number": 1, "text": "a", "section": "S"}],
                     "tables": [{"page": 1, "table_index": 0, "columns": ["c"],
                                 "rows": [{"c": "x"}], "row_count": 1}]}"#;
        let v1 = r#"{"pages": [{"page_number": 1, "text": "a"}], "tables": []}"#;
        let v0 = r#"[{"page_number": 1, "text": "a"}, {"page_number": 2}]"#;

        let p2 = StoredPayload::decode(v2).unwrap();
        assert_eq!(p2.version(), 2);
        let (pages, tables) = p2.into_parts();
        assert_eq!(pages[0].section.as_deref(), Some("S"));
        assert_eq!(tables[0].rows[0]["c"], "x");

        assert_eq!(StoredPayload::decode(v1).unwrap().version(), 1);

        let p0 = StoredPayload::decode(v0).unwrap();
        assert_eq!(p0.version(), 0);
        let (pages, tables) = p0.into_parts();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].text, "");
        assert!(tables.is_empty());
    }

    #[test]
    fn v1_without_tables_key() {
        let p = StoredPayload::decode(r#"{"pages": []}"#).unwrap();
        assert_eq!(p, StoredPayload::Unversioned { pages: vec![], tables: vec![] });
    }

    #[test]
    fn rejects_unknown_and_malformed() {
        assert!(matches!(
            StoredPayload::decode(r#"{"version": 99, "pages": []}"#),
            Err(CacheError::UnknownVersion(99))
        ));
        assert!(matches!(
            StoredPayload::decode(r#"{"version": "two"}"#),
            Err(CacheError::UnknownShape(_))
        ));
        assert!(matches!(
            StoredPayload::decode(r#"{"something": "else"}"#),
            Err(CacheError::UnknownShape(_))
        ));
        assert!(matches!(
            StoredPayload::decode("42"),
            Err(CacheError::UnknownShape(_))
        ));
        assert!(matches!(
            StoredPayload::decode("{truncated"),
            Err(CacheError::Serde(_))
        ));
        assert!(matches!(
            StoredPayload::decode(r#"[{"text": "no page number"}]"#),
            Err(CacheError::Serde(_))
        ));
    }

    #[test]
    fn writes_current_version() {
        let json = StoredPayload::encode(&[ParsedPage::new(1, "hi")], &[]).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"], 2);
        assert_eq!(StoredPayload::decode(&json).unwrap().version(), CURRENT_FORMAT_VERSION);
    }
}
