//! Configuration types for the parse pipeline.
//!
//! Two structs with two lifetimes:
//!
//! * [`ParserConfig`]: process-wide knobs (resource ceilings, external tool
//!   locations, heuristics thresholds). Built once at startup via
//!   [`ParserConfigBuilder`] and shared by every parse.
//! * [`ParseOptions`]: per-call options supplied with each document.
//!
//! # Design choice: builder over constructor
//! Most callers only touch one or two fields. The builder lets them set those
//! and rely on documented defaults for the rest, and gives a single place to
//! validate cross-field constraints.

use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable pointing at the tabula-java jar.
pub const TABULA_JAR_ENV: &str = "TABULA_JAR_PATH";

/// Thresholds for the scanned-document heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanThresholds {
    /// Below this many trimmed characters across all pages, the document is
    /// treated as scanned. Default: 100.
    pub min_total_chars: usize,
    /// A page "has text" when it holds more than this many trimmed
    /// characters. Default: 20.
    pub min_page_chars: usize,
    /// Minimum share of pages that must have text. Default: 0.5.
    pub min_text_page_ratio: f64,
}

impl Default for ScanThresholds {
    fn default() -> Self {
        Self {
            min_total_chars: 100,
            min_page_chars: 20,
            min_text_page_ratio: 0.5,
        }
    }
}

/// Process-wide configuration for the parse pipeline.
///
/// # Example
/// ```rust
/// use pdf_ingest::ParserConfig;
///
/// let config = ParserConfig::builder()
///     .ocr_dpi(200)
///     .max_pages(2_000)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParserConfig {
    /// OCR rasterisation DPI when memory allows it. Range: 72–600. Default: 300.
    ///
    /// Tesseract accuracy drops sharply below ~200 DPI on body text; 300 is
    /// its documented sweet spot.
    pub ocr_dpi: u32,

    /// DPI used instead of `ocr_dpi` when the estimated raster memory for the
    /// whole document exceeds what the host has available. Default: 150.
    pub ocr_low_dpi: u32,

    /// Hard page ceiling for OCR and table extraction. Default: 10 000.
    ///
    /// Anything above is treated as a resource-exhaustion attempt and
    /// rejected rather than attempted.
    pub max_pages: usize,

    /// Longest accepted custom section pattern, in characters. Default: 1000.
    pub max_pattern_len: usize,

    /// Most custom section patterns accepted per call. Default: 100.
    pub max_patterns: usize,

    /// Scanned-document heuristic thresholds.
    pub scan: ScanThresholds,

    /// How many leading pages the table-likelihood filter looks at. Default: 5.
    pub table_probe_pages: usize,

    /// Tesseract executable name or path. Default: `tesseract`.
    pub tesseract_cmd: String,

    /// Java executable name or path. Default: `java`.
    pub java_cmd: String,

    /// Location of the tabula-java jar. Default: `$TABULA_JAR_PATH`, if set.
    pub tabula_jar: Option<PathBuf>,

    /// Oldest Java major version tabula is run on. Default: 8.
    pub min_java_version: u32,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            ocr_dpi: 300,
            ocr_low_dpi: 150,
            max_pages: 10_000,
            max_pattern_len: 1000,
            max_patterns: 100,
            scan: ScanThresholds::default(),
            table_probe_pages: 5,
            tesseract_cmd: "tesseract".to_string(),
            java_cmd: "java".to_string(),
            tabula_jar: std::env::var_os(TABULA_JAR_ENV).map(PathBuf::from),
            min_java_version: 8,
        }
    }
}

impl ParserConfig {
    /// Create a new builder for `ParserConfig`.
    pub fn builder() -> ParserConfigBuilder {
        ParserConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ParserConfig`].
#[derive(Debug)]
pub struct ParserConfigBuilder {
    config: ParserConfig,
}

impl ParserConfigBuilder {
    pub fn ocr_dpi(mut self, dpi: u32) -> Self {
        self.config.ocr_dpi = dpi.clamp(72, 600);
        self
    }

    pub fn ocr_low_dpi(mut self, dpi: u32) -> Self {
        self.config.ocr_low_dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n;
        self
    }

    pub fn max_pattern_len(mut self, n: usize) -> Self {
        self.config.max_pattern_len = n;
        self
    }

    pub fn max_patterns(mut self, n: usize) -> Self {
        self.config.max_patterns = n;
        self
    }

    pub fn scan_thresholds(mut self, scan: ScanThresholds) -> Self {
        self.config.scan = scan;
        self
    }

    pub fn table_probe_pages(mut self, n: usize) -> Self {
        self.config.table_probe_pages = n;
        self
    }

    pub fn tesseract_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.config.tesseract_cmd = cmd.into();
        self
    }

    pub fn java_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.config.java_cmd = cmd.into();
        self
    }

    pub fn tabula_jar(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tabula_jar = Some(path.into());
        self
    }

    pub fn min_java_version(mut self, major: u32) -> Self {
        self.config.min_java_version = major;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ParserConfig, ParseError> {
        let c = &self.config;
        if c.ocr_low_dpi > c.ocr_dpi {
            return Err(ParseError::InvalidConfig(format!(
                "ocr_low_dpi ({}) must not exceed ocr_dpi ({})",
                c.ocr_low_dpi, c.ocr_dpi
            )));
        }
        if c.max_pages == 0 || c.max_patterns == 0 || c.max_pattern_len == 0 {
            return Err(ParseError::InvalidConfig(
                "max_pages, max_patterns and max_pattern_len must be ≥ 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&c.scan.min_text_page_ratio) {
            return Err(ParseError::InvalidConfig(format!(
                "min_text_page_ratio must be within 0–1, got {}",
                c.scan.min_text_page_ratio
            )));
        }
        Ok(self.config)
    }
}

/// Per-call parse options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseOptions {
    /// Caller-supplied section patterns. `None` selects the built-in set;
    /// `Some(vec![])` is rejected.
    pub custom_section_patterns: Option<Vec<String>>,
    /// Re-extract scanned-looking documents with OCR. Default: true.
    pub enable_ocr: bool,
    /// Run table extraction when tables look likely. Default: true.
    pub enable_tables: bool,
    /// Extract pages concurrently with the primary strategy. Default: true.
    pub enable_parallel: bool,
    /// Tesseract language code. Default: `eng`.
    pub ocr_language: String,
    /// Run table extraction even when the likelihood filter says no.
    /// Default: false.
    pub force_tables: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            custom_section_patterns: None,
            enable_ocr: true,
            enable_tables: true,
            enable_parallel: true,
            ocr_language: "eng".to_string(),
            force_tables: false,
        }
    }
}

impl ParseOptions {
    pub fn section_patterns(mut self, patterns: Vec<String>) -> Self {
        self.custom_section_patterns = Some(patterns);
        self
    }

    pub fn enable_ocr(mut self, v: bool) -> Self {
        self.enable_ocr = v;
        self
    }

    pub fn enable_tables(mut self, v: bool) -> Self {
        self.enable_tables = v;
        self
    }

    pub fn enable_parallel(mut self, v: bool) -> Self {
        self.enable_parallel = v;
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.ocr_language = lang.into();
        self
    }

    pub fn force_tables(mut self, v: bool) -> Self {
        self.force_tables = v;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ParserConfig::builder().build().unwrap();
        assert_eq!(c.ocr_dpi, 300);
        assert_eq!(c.ocr_low_dpi, 150);
        assert_eq!(c.max_pages, 10_000);
        assert_eq!(c.max_pattern_len, 1000);
        assert_eq!(c.max_patterns, 100);
        assert_eq!(c.table_probe_pages, 5);
        assert_eq!(c.min_java_version, 8);

        let o = ParseOptions::default();
        assert!(o.enable_ocr && o.enable_tables && o.enable_parallel);
        assert!(!o.force_tables);
        assert_eq!(o.ocr_language, "eng");
        assert!(o.custom_section_patterns.is_none());
    }

    #[test]
    fn dpi_is_clamped() {
        let c = ParserConfig::builder().ocr_dpi(5000).build().unwrap();
        assert_eq!(c.ocr_dpi, 600);
    }

    #[test]
    fn low_dpi_above_dpi_is_rejected() {
        let err = ParserConfig::builder()
            .ocr_dpi(100)
            .ocr_low_dpi(200)
            .build()
            .unwrap_err();
        assert!(matches!(err, ParseError::InvalidConfig(_)));
    }

    #[test]
    fn zero_limits_are_rejected() {
        assert!(ParserConfig::builder().max_pages(0).build().is_err());
        assert!(ParserConfig::builder().max_patterns(0).build().is_err());
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let o: ParseOptions = serde_json::from_str(
            r#"{"custom_section_patterns": null, "enable_ocr": false, "enable_tables": true,
                "enable_parallel": false, "ocr_language": "deu", "force_tables": false}"#,
        )
        .unwrap();
        assert!(!o.enable_ocr);
        assert_eq!(o.ocr_language, "deu");
    }
}
