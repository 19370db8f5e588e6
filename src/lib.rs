//! # pdf-ingest
//!
//! Turn untrusted PDF documents into pages, section labels and tables, with
//! a tenant-scoped cache in front.
//!
//! ## Why this crate?
//!
//! Documents arriving in a multi-tenant system are a mix of born-digital
//! reports, phone scans and spreadsheets printed to PDF. No single library
//! reads all of them: pdfium chokes on some malformed files that lopdf opens,
//! scans have no text layer at all, and tables come out as whitespace soup.
//! This crate layers the tools so each document gets the best reading
//! available, and degrades page by page instead of failing whole documents.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Patterns  validate caller section regexes (ReDoS screen)
//!  ├─ 2. Cache     (document, organisation) lookup; hit returns immediately
//!  ├─ 3. Probe     canonical path, header, encryption
//!  ├─ 4. Extract   pdfium (sequential or page-parallel) → lopdf fallback
//!  ├─ 5. OCR       tesseract, only when the text layer looks scanned
//!  ├─ 6. Tables    tabula-java, only when the text looks tabular
//!  ├─ 7. Sections  heading detection, carried forward across pages
//!  └─ 8. Cache     versioned payload write
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_ingest::{
//!     Capabilities, MemoryCacheStore, ParseOptions, ParsePipeline, ParseRequest, ParserConfig,
//! };
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ParserConfig::builder().ocr_dpi(200).build()?;
//!     let capabilities = Capabilities::probe(&config);
//!     let pipeline = ParsePipeline::new(config, capabilities, Arc::new(MemoryCacheStore::new()));
//!
//!     let request = ParseRequest::new(42, 7, "/srv/documents/report.pdf")
//!         .with_options(ParseOptions::default().enable_parallel(false));
//!     let result = pipeline.parse(&request)?;
//!     for page in &result.pages {
//!         println!("{} [{:?}]", page.page_number, page.section);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Native dependencies
//!
//! | Tool | Needed for | Missing means |
//! |------|------------|---------------|
//! | pdfium shared library (`$PDFIUM_LIB_PATH` or system) | primary extraction, OCR rasterisation | lopdf only, no OCR |
//! | `tesseract` | OCR | scanned documents keep their thin text layer |
//! | Java ≥ 8 + tabula jar (`$TABULA_JAR_PATH`) | tables | `tables` is always empty |
//!
//! Availability is probed once by [`Capabilities::probe`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cache;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod output;
pub mod parse;
pub mod pipeline;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cache::{CacheKey, CacheRow, CacheStore, MemoryCacheStore, ParseCache, SqliteCacheStore};
pub use capabilities::Capabilities;
pub use config::{ParseOptions, ParserConfig, ParserConfigBuilder, ScanThresholds};
pub use error::{CacheError, ErrorKind, ParseError};
pub use output::{ExtractedTable, ExtractionMethod, ParseResult, ParsedPage};
pub use parse::{ParsePipeline, ParsePipelineBuilder, ParseRequest};
pub use pipeline::extract::{ExtractorKind, LopdfExtractor, PdfiumExtractor, TextExtractor};
pub use pipeline::ocr::{OcrBackend, TesseractOcr};
pub use pipeline::patterns::{compile_patterns, PatternLimits};
pub use pipeline::sections::SectionDetector;
pub use pipeline::tables::{TableBackend, TabulaTables};
