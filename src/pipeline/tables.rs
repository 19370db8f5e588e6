//! Table detection and extraction via tabula-java.
//!
//! Starting a JVM costs a second or more, so a cheap text filter runs first:
//! tables are only extracted when the leading pages look tabular, unless the
//! caller forces extraction.
//!
//! tabula is invoked once per page so every table carries an exact page
//! number. A page that fails is logged and skipped; the remaining pages are
//! still extracted.

use crate::capabilities::Capabilities;
use crate::config::ParserConfig;
use crate::error::ParseError;
use crate::output::{ExtractedTable, ParsedPage};
use crate::pipeline::probe::check_page_limit;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

static RE_TABULAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\t|\||   ").unwrap());

// `version "1.8.0_292"`, `version "17.0.2"`, `version "21"`
static RE_JAVA_QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"version\s+"(\d+)(?:\.(\d+))?"#).unwrap());

// `version 11.0.2`
static RE_JAVA_UNQUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"version\s+(\d+)(?:\.(\d+))?").unwrap());

// `21.0.1`
static RE_JAVA_TRIPLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d+)\.(\d+)\.(\d+)\b").unwrap());

/// Whether the first `probe_pages` pages contain table-like layout: a tab,
/// a pipe, or a run of three or more spaces.
pub fn tables_likely(pages: &[ParsedPage], probe_pages: usize) -> bool {
    pages
        .iter()
        .take(probe_pages)
        .any(|p| RE_TABULAR.is_match(&p.text))
}

/// Extract the Java major version from `java -version` output.
///
/// Legacy `1.x` versions map to `x`. Returns `None` for anything
/// unrecognised.
pub fn parse_java_major_version(output: &str) -> Option<u32> {
    let caps = RE_JAVA_QUOTED
        .captures(output)
        .or_else(|| RE_JAVA_UNQUOTED.captures(output))
        .or_else(|| RE_JAVA_TRIPLE.captures(output))?;

    let major: u32 = caps.get(1)?.as_str().parse().ok()?;
    if major == 1 {
        caps.get(2)?.as_str().parse().ok()
    } else {
        Some(major)
    }
}

/// Run `java -version` and parse the major version.
pub fn java_major_version(java_cmd: &str) -> Option<u32> {
    let output = Command::new(java_cmd).arg("-version").output().ok()?;
    // The JDK prints its banner to stderr.
    let banner = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stderr),
        String::from_utf8_lossy(&output.stdout)
    );
    let version = parse_java_major_version(&banner);
    if version.is_none() {
        debug!("Unrecognised java -version output: {}", banner.trim());
    }
    version
}

/// Finds tables in a document.
pub trait TableBackend: Send + Sync {
    /// Extract tables from pages `1..=page_count`.
    ///
    /// `table_index` runs across the whole document.
    fn extract_tables(&self, path: &Path, page_count: usize)
        -> Result<Vec<ExtractedTable>, ParseError>;
}

/// tabula-java driven through the `java` CLI.
#[derive(Debug, Clone)]
pub struct TabulaTables {
    java_cmd: String,
    jar: Option<PathBuf>,
    max_pages: usize,
    available: bool,
}

impl TabulaTables {
    pub fn new(config: &ParserConfig, capabilities: &Capabilities) -> Self {
        Self {
            java_cmd: config.java_cmd.clone(),
            jar: config.tabula_jar.clone(),
            max_pages: config.max_pages,
            available: capabilities.tables,
        }
    }

    fn run_page(&self, jar: &Path, path: &Path, page: usize) -> Result<String, String> {
        let output = Command::new(&self.java_cmd)
            .arg("-jar")
            .arg(jar)
            .args(["--pages", &page.to_string(), "--format", "JSON", "--silent"])
            .arg(path)
            .output()
            .map_err(|e| e.to_string())?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(format!(
                "tabula exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))
        }
    }
}

impl TableBackend for TabulaTables {
    fn extract_tables(
        &self,
        path: &Path,
        page_count: usize,
    ) -> Result<Vec<ExtractedTable>, ParseError> {
        check_page_limit(page_count, self.max_pages, "table extraction")?;
        let jar = match (&self.jar, self.available) {
            (Some(jar), true) => jar,
            _ => {
                return Err(ParseError::Parsing(
                    "table extraction is not available: no usable Java runtime or tabula jar"
                        .into(),
                ))
            }
        };

        let mut tables = Vec::new();
        for page in 1..=page_count {
            if tables.len() >= self.max_pages {
                warn!("Table limit of {} reached; stopping", self.max_pages);
                break;
            }
            let json = match self.run_page(jar, path, page) {
                Ok(json) => json,
                Err(e) => {
                    warn!("Table extraction failed on page {}: {}", page, e);
                    continue;
                }
            };
            match tables_from_tabula_json(&json, page, tables.len()) {
                Ok(found) => {
                    let room = self.max_pages - tables.len();
                    tables.extend(found.into_iter().take(room));
                }
                Err(e) => warn!("Unreadable tabula output on page {}: {}", page, e),
            }
        }

        info!("Extracted {} tables from {} pages", tables.len(), page_count);
        Ok(tables)
    }
}

// ── tabula JSON ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TabulaTable {
    #[serde(default)]
    data: Vec<Vec<TabulaCell>>,
}

#[derive(Debug, Deserialize)]
struct TabulaCell {
    #[serde(default)]
    text: String,
}

/// Convert one page of tabula JSON output into tables.
///
/// Indices are assigned from `first_index` upward. Tables whose cells are
/// all blank are dropped without consuming an index.
pub fn tables_from_tabula_json(
    json: &str,
    page: usize,
    first_index: usize,
) -> Result<Vec<ExtractedTable>, serde_json::Error> {
    let raw: Vec<TabulaTable> = if json.trim().is_empty() {
        Vec::new()
    } else {
        serde_json::from_str(json)?
    };

    let mut out = Vec::new();
    for table in raw {
        let cells: Vec<Vec<String>> = table
            .data
            .into_iter()
            .map(|row| row.into_iter().map(|c| c.text.trim().to_string()).collect())
            .collect();
        if let Some(t) = build_table(cells, page, first_index + out.len()) {
            out.push(t);
        }
    }
    Ok(out)
}

fn build_table(cells: Vec<Vec<String>>, page: usize, table_index: usize) -> Option<ExtractedTable> {
    if cells.iter().flatten().all(|c| c.is_empty()) {
        return None;
    }

    let width = cells.iter().map(Vec::len).max().unwrap_or(0);
    let mut rows = cells.into_iter();
    let header = rows.next().unwrap_or_default();
    let columns = normalise_headers(header, width);

    let rows: Vec<BTreeMap<String, String>> = rows
        .map(|row| {
            let mut row = row.into_iter();
            columns
                .iter()
                .map(|col| (col.clone(), row.next().unwrap_or_default()))
                .collect()
        })
        .collect();

    Some(ExtractedTable {
        page,
        table_index,
        row_count: rows.len(),
        columns,
        rows,
    })
}

/// Pad the header to `width`, name blank columns `column_N` (1-indexed), and
/// suffix repeats with `_N`.
fn normalise_headers(header: Vec<String>, width: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut header = header.into_iter();

    (0..width)
        .map(|i| {
            let name = match header.next() {
                Some(h) if !h.is_empty() => h,
                _ => format!("column_{}", i + 1),
            };
            let mut unique = name.clone();
            let mut n = 1;
            while !seen.insert(unique.clone()) {
                unique = format!("{name}_{n}");
                n += 1;
            }
            unique
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tabular_layout_is_detected() {
        let pages = vec![
            ParsedPage::new(1, "plain prose"),
            ParsedPage::new(2, "Name   Qty   Price"),
        ];
        assert!(tables_likely(&pages, 5));
        assert!(tables_likely(&[ParsedPage::new(1, "a\tb")], 5));
        assert!(tables_likely(&[ParsedPage::new(1, "| a | b |")], 5));
        assert!(!tables_likely(&[ParsedPage::new(1, "two  spaces only")], 5));
    }

    #[test]
    fn only_leading_pages_are_probed() {
        let mut pages: Vec<ParsedPage> = (1..=5).map(|n| ParsedPage::new(n, "prose")).collect();
        pages.push(ParsedPage::new(6, "a\tb"));
        assert!(!tables_likely(&pages, 5));
        assert!(tables_likely(&pages, 6));
    }

    #[test]
    fn oversized_document_is_refused_before_any_jvm_starts() {
        let config = ParserConfig::builder()
            .java_cmd("/nonexistent/java")
            .tabula_jar("/nonexistent/tabula.jar")
            .build()
            .unwrap();
        let tabula = TabulaTables::new(&config, &Capabilities::all());

        let err = tabula
            .extract_tables(Path::new("/unused.pdf"), config.max_pages + 1)
            .unwrap_err();
        assert!(err.to_string().contains("table extraction is limited to"), "got: {err}");
    }

    #[test]
    fn java_versions() {
        assert_eq!(
            parse_java_major_version(r#"java version "1.8.0_292""#),
            Some(8)
        );
        assert_eq!(
            parse_java_major_version(r#"openjdk version "17.0.2" 2022-01-18"#),
            Some(17)
        );
        assert_eq!(parse_java_major_version(r#"openjdk version "21" 2023-09-19"#), Some(21));
        assert_eq!(parse_java_major_version("java version 11.0.2"), Some(11));
        assert_eq!(parse_java_major_version("Runtime 21.0.1 (build 12)"), Some(21));
        assert_eq!(parse_java_major_version("command not found"), None);
        assert_eq!(parse_java_major_version(""), None);
    }

    #[test]
    fn tabula_output_is_normalised() {
        let json = r#"[{"data": [
            [{"text": "Name"}, {"text": ""}, {"text": "Name"}],
            [{"text": "bolt"}, {"text": "4"}, {"text": "steel"}],
            [{"text": "nut"}]
        ]}]"#;
        let tables = tables_from_tabula_json(json, 3, 7).unwrap();
        assert_eq!(tables.len(), 1);
        let t = &tables[0];
        assert_eq!(t.page, 3);
        assert_eq!(t.table_index, 7);
        assert_eq!(t.columns, vec!["Name", "column_2", "Name_1"]);
        assert_eq!(t.row_count, 2);
        assert_eq!(t.rows[0]["column_2"], "4");
        assert_eq!(t.rows[1]["Name"], "nut");
        assert_eq!(t.rows[1]["Name_1"], "");
    }

    #[test]
    fn empty_tables_are_skipped_without_consuming_an_index() {
        let json = r#"[
            {"data": [[{"text": " "}, {"text": ""}]]},
            {"data": []},
            {"data": [[{"text": "A"}], [{"text": "1"}]]}
        ]"#;
        let tables = tables_from_tabula_json(json, 1, 0).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].table_index, 0);
        assert_eq!(tables[0].columns, vec!["A"]);
    }

    #[test]
    fn blank_output_means_no_tables() {
        assert!(tables_from_tabula_json("  \n", 1, 0).unwrap().is_empty());
        assert!(tables_from_tabula_json("not json", 1, 0).is_err());
    }

    #[test]
    fn unavailable_backend_fails_with_parsing_error() {
        let tabula = TabulaTables::new(&ParserConfig::default(), &Capabilities::none());
        let err = tabula.extract_tables(Path::new("/tmp/x.pdf"), 3).unwrap_err();
        assert!(matches!(err, ParseError::Parsing(_)));
    }
}
