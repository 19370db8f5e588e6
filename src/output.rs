//! Output types: the structured representation of a parsed document.
//!
//! [`ParseResult`] is both what callers receive and (minus the `cached`
//! flag) what the parse cache persists. Pages and tables are plain data so
//! an HTTP layer can serialise them straight to JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Marker prefix written into a page whose text extraction failed.
pub const EXTRACTION_ERROR_MARKER: &str = "[Error extracting page";

/// Marker prefix written into a page whose OCR failed.
pub const OCR_ERROR_MARKER: &str = "[OCR error on page";

/// One extracted page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedPage {
    /// 1-indexed page number; pages in a result are dense and contiguous.
    pub page_number: usize,
    /// Extracted text. Empty when the page carries no text, never absent.
    #[serde(default)]
    pub text: String,
    /// Section label assigned by the section detector.
    #[serde(default)]
    pub section: Option<String>,
}

impl ParsedPage {
    pub fn new(page_number: usize, text: impl Into<String>) -> Self {
        Self {
            page_number,
            text: text.into(),
            section: None,
        }
    }

    /// A stand-in page for one that could not be read.
    ///
    /// The text reads `"{marker} {page_number}: {message}]"` so both humans
    /// and [`ParsedPage::is_placeholder`] can recognise it.
    pub fn placeholder(page_number: usize, marker: &str, message: impl fmt::Display) -> Self {
        Self::new(page_number, format!("{marker} {page_number}: {message}]"))
    }

    /// Whether this page is an error placeholder rather than real text.
    pub fn is_placeholder(&self) -> bool {
        self.text.starts_with(EXTRACTION_ERROR_MARKER) || self.text.starts_with(OCR_ERROR_MARKER)
    }
}

/// One table detected on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedTable {
    /// 1-indexed page the table was found on.
    pub page: usize,
    /// 0-indexed position of the table within the whole parse result.
    pub table_index: usize,
    pub columns: Vec<String>,
    pub rows: Vec<BTreeMap<String, String>>,
    pub row_count: usize,
}

/// Which strategy produced the page text of a [`ParseResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionMethod {
    /// pdfium, page by page.
    Primary,
    /// pdfium, all pages concurrently.
    PrimaryParallel,
    /// lopdf, after the primary strategy failed.
    Fallback,
    /// Tesseract over rasterised pages.
    Ocr,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Primary => "primary",
            ExtractionMethod::PrimaryParallel => "primary-parallel",
            ExtractionMethod::Fallback => "fallback",
            ExtractionMethod::Ocr => "ocr",
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtractionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(ExtractionMethod::Primary),
            "primary-parallel" => Ok(ExtractionMethod::PrimaryParallel),
            "fallback" => Ok(ExtractionMethod::Fallback),
            "ocr" => Ok(ExtractionMethod::Ocr),
            other => Err(format!("unknown extraction method '{other}'")),
        }
    }
}

/// The result of parsing one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    pub document_id: i64,
    pub pages: Vec<ParsedPage>,
    /// Empty when table extraction was disabled, skipped or failed.
    pub tables: Vec<ExtractedTable>,
    pub method: ExtractionMethod,
    /// `true` only when served from the parse cache.
    pub cached: bool,
}

impl ParseResult {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// All page text joined with blank lines, in page order.
    pub fn full_text(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_recognised() {
        let page = ParsedPage::placeholder(3, EXTRACTION_ERROR_MARKER, "broken content stream");
        assert_eq!(page.page_number, 3);
        assert_eq!(
            page.text,
            "[Error extracting page 3: broken content stream]"
        );
        assert!(page.is_placeholder());
        assert!(ParsedPage::placeholder(1, OCR_ERROR_MARKER, "x").is_placeholder());
        assert!(!ParsedPage::new(1, "Introduction").is_placeholder());
    }

    #[test]
    fn method_wire_names() {
        for method in [
            ExtractionMethod::Primary,
            ExtractionMethod::PrimaryParallel,
            ExtractionMethod::Fallback,
            ExtractionMethod::Ocr,
        ] {
            let json = serde_json::to_string(&method).unwrap();
            assert_eq!(json, format!("\"{}\"", method.as_str()));
            assert_eq!(method.as_str().parse::<ExtractionMethod>().unwrap(), method);
        }
        assert!("pdfplumber".parse::<ExtractionMethod>().is_err());
    }

    #[test]
    fn page_defaults_when_fields_missing() {
        let page: ParsedPage = serde_json::from_str(r#"{"page_number": 2}"#).unwrap();
        assert_eq!(page.text, "");
        assert_eq!(page.section, None);
    }

    #[test]
    fn full_text_joins_pages() {
        let result = ParseResult {
            document_id: 1,
            pages: vec![ParsedPage::new(1, "a"), ParsedPage::new(2, "b")],
            tables: vec![],
            method: ExtractionMethod::Primary,
            cached: false,
        };
        assert_eq!(result.full_text(), "a\n\nb");
        assert_eq!(result.page_count(), 2);
    }
}
