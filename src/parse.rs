//! The parse orchestrator.
//!
//! [`ParsePipeline::parse`] drives one document through every stage:
//!
//! ```text
//! patterns ─▶ cache ─▶ validate ─▶ extract ─▶ OCR? ─▶ tables? ─▶ sections ─▶ cache
//!                │                 (primary,
//!                └─ hit: return     fallback)
//! ```
//!
//! Caller mistakes (bad patterns), unusable files and total extraction
//! failure end the call with an error. OCR, table extraction and the cache
//! are enrichments: when one fails it is logged and the result is returned
//! without it.

use crate::cache::{CacheStore, ParseCache};
use crate::capabilities::Capabilities;
use crate::config::{ParseOptions, ParserConfig};
use crate::error::ParseError;
use crate::output::{ExtractedTable, ExtractionMethod, ParseResult, ParsedPage};
use crate::pipeline::extract::{
    ensure_parallel_allowed, extract_parallel, in_background, LopdfExtractor, PdfiumExtractor,
    TextExtractor,
};
use crate::pipeline::ocr::{OcrBackend, TesseractOcr};
use crate::pipeline::patterns::{compile_patterns, PatternLimits};
use crate::pipeline::probe;
use crate::pipeline::scanned::looks_scanned;
use crate::pipeline::sections::SectionDetector;
use crate::pipeline::tables::{tables_likely, TableBackend, TabulaTables};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn};

/// One document to parse.
#[derive(Debug, Clone)]
pub struct ParseRequest {
    pub document_id: i64,
    pub organization_id: i64,
    /// Local path of the already-downloaded file.
    pub path: PathBuf,
    pub options: ParseOptions,
}

impl ParseRequest {
    pub fn new(document_id: i64, organization_id: i64, path: impl Into<PathBuf>) -> Self {
        Self {
            document_id,
            organization_id,
            path: path.into(),
            options: ParseOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ParseOptions) -> Self {
        self.options = options;
        self
    }
}

/// Parses documents into pages, sections and tables, with caching.
///
/// Build one per process and share it; every method takes `&self`.
///
/// # Example
/// ```rust,no_run
/// use pdf_ingest::{Capabilities, ParsePipeline, ParseRequest, ParserConfig, SqliteCacheStore};
/// use std::path::Path;
/// use std::sync::Arc;
///
/// let config = ParserConfig::default();
/// let capabilities = Capabilities::probe(&config);
/// let store = Arc::new(SqliteCacheStore::open(Path::new("cache.db")).unwrap());
/// let pipeline = ParsePipeline::new(config, capabilities, store);
///
/// let result = pipeline.parse(&ParseRequest::new(42, 7, "/data/report.pdf")).unwrap();
/// println!("{} pages via {}", result.page_count(), result.method);
/// ```
pub struct ParsePipeline {
    config: ParserConfig,
    capabilities: Capabilities,
    cache: ParseCache,
    primary: Arc<dyn TextExtractor>,
    fallback: Arc<dyn TextExtractor>,
    ocr: Arc<dyn OcrBackend>,
    tables: Arc<dyn TableBackend>,
}

impl std::fmt::Debug for ParsePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsePipeline")
            .field("config", &self.config)
            .field("capabilities", &self.capabilities)
            .field("primary", &self.primary.name())
            .field("fallback", &self.fallback.name())
            .finish_non_exhaustive()
    }
}

impl ParsePipeline {
    /// A pipeline with the production backends.
    pub fn new(
        config: ParserConfig,
        capabilities: Capabilities,
        store: Arc<dyn CacheStore>,
    ) -> Self {
        Self::builder(config, store)
            .capabilities(capabilities)
            .build()
    }

    /// Start building a pipeline with some backends replaced.
    pub fn builder(config: ParserConfig, store: Arc<dyn CacheStore>) -> ParsePipelineBuilder {
        ParsePipelineBuilder {
            config,
            store,
            capabilities: None,
            primary: None,
            fallback: None,
            ocr: None,
            tables: None,
        }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn cache(&self) -> &ParseCache {
        &self.cache
    }

    /// Parse one document.
    ///
    /// This blocks the calling thread. With `enable_parallel` set it must not
    /// be called from a current-thread tokio runtime; see
    /// [`ParsePipeline::parse_in_background`].
    ///
    /// # Errors
    /// - [`ParseError::InvalidPattern`]: custom section patterns rejected
    /// - [`ParseError::NotFound`] / [`ParseError::Corrupt`] /
    ///   [`ParseError::Encrypted`]: the file failed validation
    /// - [`ParseError::Parsing`]: both extractors failed, or parallel
    ///   extraction was requested from a current-thread runtime
    pub fn parse(&self, request: &ParseRequest) -> Result<ParseResult, ParseError> {
        let span = info_span!(
            "parse",
            document_id = request.document_id,
            organization_id = request.organization_id
        );
        let _entered = span.enter();
        let start = Instant::now();
        let options = &request.options;

        // ── Step 1: Caller patterns ──────────────────────────────────────
        let detector = match &options.custom_section_patterns {
            Some(patterns) => SectionDetector::with_patterns(compile_patterns(
                patterns,
                PatternLimits::from(&self.config),
            )?),
            None => SectionDetector::default(),
        };

        // ── Step 2: Cache ────────────────────────────────────────────────
        match self.cache.get(request.document_id, request.organization_id) {
            Ok(Some(hit)) => {
                info!(stage = "cache", "Cache hit ({} pages)", hit.page_count());
                return Ok(hit);
            }
            Ok(None) => debug!(stage = "cache", "Cache miss"),
            Err(e) => warn!(stage = "cache", error = %e, "Cache read failed; parsing"),
        }

        // ── Step 3: Validate ─────────────────────────────────────────────
        let path = probe::validate(&request.path)?;

        // ── Step 4: Extract text ─────────────────────────────────────────
        let (mut pages, mut method) = self.extract_text(&path, options.enable_parallel)?;
        info!(
            stage = "extract",
            "Extracted {} pages via {}",
            pages.len(),
            method
        );

        // ── Step 5: OCR ──────────────────────────────────────────────────
        if options.enable_ocr && looks_scanned(&pages, &self.config.scan) {
            info!(stage = "ocr", "Document looks scanned; running OCR");
            match self.ocr.extract(&path, &options.ocr_language) {
                Ok(ocr_pages) => {
                    pages = ocr_pages;
                    method = ExtractionMethod::Ocr;
                }
                Err(e) => warn!(stage = "ocr", error = %e, "OCR failed; keeping extracted text"),
            }
        }

        // ── Step 6: Tables ───────────────────────────────────────────────
        let tables = if options.enable_tables
            && (options.force_tables || tables_likely(&pages, self.config.table_probe_pages))
        {
            self.extract_tables(&path, pages.len())
        } else {
            Vec::new()
        };

        // ── Step 7: Sections ─────────────────────────────────────────────
        detector.detect(&mut pages);

        // ── Step 8: Cache write ──────────────────────────────────────────
        if let Err(e) = self.cache.put(
            request.document_id,
            request.organization_id,
            &pages,
            &tables,
            method,
        ) {
            warn!(stage = "cache", error = %e, "Cache write failed");
        }

        info!(
            "Parsed {} pages, {} tables via {} in {} ms",
            pages.len(),
            tables.len(),
            method,
            start.elapsed().as_millis()
        );
        Ok(ParseResult {
            document_id: request.document_id,
            pages,
            tables,
            method,
            cached: false,
        })
    }

    /// Run [`ParsePipeline::parse`] on tokio's blocking pool.
    ///
    /// Parallel extraction is allowed here on any runtime flavour: the
    /// blocking thread waits while the page ranges run on the pool.
    pub async fn parse_in_background(
        self: Arc<Self>,
        request: ParseRequest,
    ) -> Result<ParseResult, ParseError> {
        tokio::task::spawn_blocking(move || in_background(|| self.parse(&request)))
            .await
            .map_err(|e| ParseError::Parsing(format!("parse task panicked: {}", e)))?
    }

    fn extract_text(
        &self,
        path: &Path,
        parallel: bool,
    ) -> Result<(Vec<ParsedPage>, ExtractionMethod), ParseError> {
        let primary = if parallel {
            // Not a strategy failure: the fallback would hit the same wall.
            ensure_parallel_allowed()?;
            extract_parallel(Arc::clone(&self.primary), path)
                .map(|pages| (pages, ExtractionMethod::PrimaryParallel))
        } else {
            self.primary
                .extract(path)
                .map(|pages| (pages, ExtractionMethod::Primary))
        };

        let primary_err = match primary {
            Ok(extracted) => return Ok(extracted),
            Err(e) => e,
        };
        warn!(
            stage = "extract",
            error = %primary_err,
            "{} failed; trying {}",
            self.primary.name(),
            self.fallback.name()
        );

        match self.fallback.extract(path) {
            Ok(pages) => Ok((pages, ExtractionMethod::Fallback)),
            Err(fallback_err) => Err(ParseError::Parsing(format!(
                "all extraction strategies failed: {}: {}; {}: {}",
                self.primary.name(),
                primary_err,
                self.fallback.name(),
                fallback_err
            ))),
        }
    }

    fn extract_tables(&self, path: &Path, page_count: usize) -> Vec<ExtractedTable> {
        match self.tables.extract_tables(path, page_count) {
            Ok(tables) => {
                info!(stage = "tables", "Found {} tables", tables.len());
                tables
            }
            Err(e) => {
                warn!(stage = "tables", error = %e, "Table extraction failed");
                Vec::new()
            }
        }
    }
}

/// Builder for [`ParsePipeline`].
///
/// Unset backends default to the production ones. Unset capabilities are
/// probed from the host at [`build`](Self::build) time.
pub struct ParsePipelineBuilder {
    config: ParserConfig,
    store: Arc<dyn CacheStore>,
    capabilities: Option<Capabilities>,
    primary: Option<Arc<dyn TextExtractor>>,
    fallback: Option<Arc<dyn TextExtractor>>,
    ocr: Option<Arc<dyn OcrBackend>>,
    tables: Option<Arc<dyn TableBackend>>,
}

impl ParsePipelineBuilder {
    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    pub fn primary(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.primary = Some(extractor);
        self
    }

    pub fn fallback(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.fallback = Some(extractor);
        self
    }

    pub fn ocr(mut self, backend: Arc<dyn OcrBackend>) -> Self {
        self.ocr = Some(backend);
        self
    }

    pub fn tables(mut self, backend: Arc<dyn TableBackend>) -> Self {
        self.tables = Some(backend);
        self
    }

    pub fn build(self) -> ParsePipeline {
        let config = self.config;
        let capabilities = self
            .capabilities
            .unwrap_or_else(|| Capabilities::probe(&config));

        ParsePipeline {
            primary: self.primary.unwrap_or_else(|| Arc::new(PdfiumExtractor)),
            fallback: self.fallback.unwrap_or_else(|| Arc::new(LopdfExtractor)),
            ocr: self
                .ocr
                .unwrap_or_else(|| Arc::new(TesseractOcr::new(&config, &capabilities))),
            tables: self
                .tables
                .unwrap_or_else(|| Arc::new(TabulaTables::new(&config, &capabilities))),
            cache: ParseCache::new(self.store),
            config,
            capabilities,
        }
    }
}
