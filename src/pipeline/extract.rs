//! Text extraction: two independent strategies behind one trait.
//!
//! * [`PdfiumExtractor`]: the primary strategy, backed by pdfium.
//! * [`LopdfExtractor`]: the fallback, a pure-Rust parser that shares no
//!   code with pdfium, so a document that trips one often reads with the
//!   other.
//!
//! Both read page by page. A page that fails becomes a placeholder carrying
//! [`EXTRACTION_ERROR_MARKER`]; only a document-level load failure aborts a
//! strategy.
//!
//! ## pdfium bindings
//!
//! A `PdfDocument` borrows the `Pdfium` instance that opened it, so every
//! blocking call binds and loads on its own thread. With pdfium-render's
//! `thread_safe` feature each live `Pdfium` holds a process-wide lock, so
//! pdfium work never overlaps: [`extract_parallel`] splits the document into
//! a few contiguous page ranges and loads it once per range, which keeps the
//! number of loads small without pretending pdfium runs concurrently.
//! Extractors that are genuinely reentrant, such as lopdf, do overlap.

use crate::error::ParseError;
use crate::output::{ParsedPage, EXTRACTION_ERROR_MARKER};
use futures::future::join_all;
use pdfium_render::prelude::*;
use std::cell::Cell;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit pdfium shared library to load.
pub const PDFIUM_LIB_ENV: &str = "PDFIUM_LIB_PATH";

/// Message returned when parallel extraction is requested from a
/// current-thread runtime.
const PARALLEL_FORBIDDEN: &str = "parallel extraction cannot run inside a single-threaded \
async runtime: nested blocking dispatch would deadlock it. Either pass \
enable_parallel=false, or move parsing to a background task with \
ParsePipeline::parse_in_background or extract::in_background.";

/// Upper bound on concurrent range workers in [`extract_parallel`].
pub const MAX_EXTRACTION_WORKERS: usize = 8;

thread_local! {
    static IN_BACKGROUND: Cell<bool> = const { Cell::new(false) };
}

/// Which slot of the extraction chain a strategy fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorKind {
    Primary,
    Fallback,
}

/// A page-by-page text extraction strategy.
pub trait TextExtractor: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn kind(&self) -> ExtractorKind;

    /// Number of pages in the document.
    fn page_count(&self, path: &Path) -> Result<usize, ParseError>;

    /// Text of a single 1-indexed page, opening the document afresh.
    fn extract_page(&self, path: &Path, page_number: usize) -> Result<String, ParseError>;

    /// Text of every page, in order, with `section` unset.
    ///
    /// # Errors
    /// Only document-level failures; page failures become placeholders.
    fn extract(&self, path: &Path) -> Result<Vec<ParsedPage>, ParseError>;

    /// Text of a contiguous range of 1-indexed pages.
    ///
    /// The default reads each page through [`TextExtractor::extract_page`];
    /// implementations that can keep one document open across the range
    /// should override it.
    fn extract_range(
        &self,
        path: &Path,
        pages: RangeInclusive<usize>,
    ) -> Result<Vec<ParsedPage>, ParseError> {
        Ok(collect_page_range(pages, |page_number| {
            self.extract_page(path, page_number)
                .map_err(|e| e.to_string())
        }))
    }
}

/// Run `read_page` for pages `1..=count`, replacing failures with placeholders.
pub fn collect_pages<F>(count: usize, read_page: F) -> Vec<ParsedPage>
where
    F: FnMut(usize) -> Result<String, String>,
{
    collect_page_range(1..=count, read_page)
}

/// [`collect_pages`] over an arbitrary page range.
pub fn collect_page_range<F>(pages: RangeInclusive<usize>, mut read_page: F) -> Vec<ParsedPage>
where
    F: FnMut(usize) -> Result<String, String>,
{
    pages
        .map(|page_number| match read_page(page_number) {
            Ok(text) => ParsedPage::new(page_number, text),
            Err(e) => {
                warn!("Page {} failed to extract: {}", page_number, e);
                ParsedPage::placeholder(page_number, EXTRACTION_ERROR_MARKER, e)
            }
        })
        .collect()
}

// ── Primary: pdfium ─────────────────────────────────────────────────────

/// Bind to pdfium: `$PDFIUM_LIB_PATH` if set, otherwise the system library.
pub(crate) fn bind_pdfium() -> Result<Pdfium, ParseError> {
    let bindings = match std::env::var(PDFIUM_LIB_ENV) {
        Ok(lib) if !lib.is_empty() => Pdfium::bind_to_library(lib),
        _ => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| ParseError::Parsing(format!("pdfium library unavailable: {:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

/// Open a document, classifying load failures.
pub(crate) fn load_pdfium_document<'a>(
    pdfium: &'a Pdfium,
    path: &Path,
) -> Result<PdfDocument<'a>, ParseError> {
    pdfium.load_pdf_from_file(path, None).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            ParseError::Encrypted {
                path: path.to_path_buf(),
            }
        } else {
            ParseError::corrupt(path, err_str)
        }
    })
}

/// Primary strategy: pdfium's text layer.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfiumExtractor;

impl TextExtractor for PdfiumExtractor {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Primary
    }

    fn page_count(&self, path: &Path) -> Result<usize, ParseError> {
        let pdfium = bind_pdfium()?;
        let document = load_pdfium_document(&pdfium, path)?;
        Ok(document.pages().len() as usize)
    }

    fn extract_page(&self, path: &Path, page_number: usize) -> Result<String, ParseError> {
        let pdfium = bind_pdfium()?;
        let document = load_pdfium_document(&pdfium, path)?;
        read_pdfium_page(document.pages(), page_number)
            .map_err(|e| ParseError::Parsing(format!("page {page_number}: {e}")))
    }

    fn extract(&self, path: &Path) -> Result<Vec<ParsedPage>, ParseError> {
        let pdfium = bind_pdfium()?;
        let document = load_pdfium_document(&pdfium, path)?;
        let pages = document.pages();
        let total = pages.len() as usize;
        info!("pdfium opened {}: {} pages", path.display(), total);

        Ok(collect_pages(total, |page_number| {
            read_pdfium_page(pages, page_number)
        }))
    }

    fn extract_range(
        &self,
        path: &Path,
        range: RangeInclusive<usize>,
    ) -> Result<Vec<ParsedPage>, ParseError> {
        let pdfium = bind_pdfium()?;
        let document = load_pdfium_document(&pdfium, path)?;
        let pages = document.pages();
        Ok(collect_page_range(range, |page_number| {
            read_pdfium_page(pages, page_number)
        }))
    }
}

fn read_pdfium_page(pages: &PdfPages, page_number: usize) -> Result<String, String> {
    let index = page_number
        .checked_sub(1)
        .and_then(|i| u16::try_from(i).ok())
        .ok_or_else(|| format!("page {page_number} is out of range"))?;
    let page = pages.get(index).map_err(|e| format!("{:?}", e))?;
    let text = page.text().map_err(|e| format!("{:?}", e))?;
    Ok(text.all())
}

// ── Fallback: lopdf ─────────────────────────────────────────────────────

/// Fallback strategy: lopdf's content-stream text extraction.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl LopdfExtractor {
    fn load(path: &Path) -> Result<lopdf::Document, ParseError> {
        lopdf::Document::load(path).map_err(|e| ParseError::corrupt(path, e.to_string()))
    }

    /// lopdf's own page numbers, in document order.
    fn page_numbers(document: &lopdf::Document) -> Vec<u32> {
        document.get_pages().keys().copied().collect()
    }
}

impl TextExtractor for LopdfExtractor {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Fallback
    }

    fn page_count(&self, path: &Path) -> Result<usize, ParseError> {
        Ok(Self::load(path)?.get_pages().len())
    }

    fn extract_page(&self, path: &Path, page_number: usize) -> Result<String, ParseError> {
        let document = Self::load(path)?;
        let numbers = Self::page_numbers(&document);
        let number = page_number
            .checked_sub(1)
            .and_then(|i| numbers.get(i))
            .ok_or_else(|| ParseError::Parsing(format!("page {page_number} is out of range")))?;
        document
            .extract_text(&[*number])
            .map_err(|e| ParseError::Parsing(format!("page {page_number}: {e}")))
    }

    fn extract(&self, path: &Path) -> Result<Vec<ParsedPage>, ParseError> {
        let document = Self::load(path)?;
        let numbers = Self::page_numbers(&document);
        info!("lopdf opened {}: {} pages", path.display(), numbers.len());

        // Pages are renumbered densely from 1 regardless of lopdf's keys.
        Ok(collect_pages(numbers.len(), |page_number| {
            document
                .extract_text(&[numbers[page_number - 1]])
                .map_err(|e| e.to_string())
        }))
    }

    fn extract_range(
        &self,
        path: &Path,
        range: RangeInclusive<usize>,
    ) -> Result<Vec<ParsedPage>, ParseError> {
        let document = Self::load(path)?;
        let numbers = Self::page_numbers(&document);
        Ok(collect_page_range(range, |page_number| {
            let number = page_number
                .checked_sub(1)
                .and_then(|i| numbers.get(i))
                .ok_or_else(|| format!("page {page_number} is out of range"))?;
            document.extract_text(&[*number]).map_err(|e| e.to_string())
        }))
    }
}

// ── Parallel variant ────────────────────────────────────────────────────

/// Run `f` with this thread marked as a background parsing thread.
///
/// Parallel extraction is refused on a current-thread runtime's own thread,
/// but `spawn_blocking` threads of the same runtime inherit its handle. Work
/// wrapped here is allowed through: the blocking pool drives the page tasks
/// while this thread waits.
pub fn in_background<R>(f: impl FnOnce() -> R) -> R {
    struct Reset(bool);
    impl Drop for Reset {
        fn drop(&mut self) {
            IN_BACKGROUND.with(|flag| flag.set(self.0));
        }
    }

    let _reset = Reset(IN_BACKGROUND.with(|flag| flag.replace(true)));
    f()
}

/// Fail fast when called from a current-thread tokio runtime.
///
/// Parallel extraction blocks the calling thread while page tasks run on
/// the blocking pool; on a current-thread runtime that thread is the only
/// one driving those tasks. Threads inside [`in_background`] are exempt.
pub fn ensure_parallel_allowed() -> Result<(), ParseError> {
    if IN_BACKGROUND.with(Cell::get) {
        return Ok(());
    }
    match Handle::try_current() {
        Ok(handle) if matches!(handle.runtime_flavor(), RuntimeFlavor::CurrentThread) => {
            Err(ParseError::Parsing(PARALLEL_FORBIDDEN.to_string()))
        }
        _ => Ok(()),
    }
}

/// Split pages `1..=page_count` into at most `workers` contiguous ranges of
/// near-equal size.
pub fn page_ranges(page_count: usize, workers: usize) -> Vec<RangeInclusive<usize>> {
    let workers = workers.clamp(1, page_count.max(1));
    let base = page_count / workers;
    let extra = page_count % workers;

    let mut ranges = Vec::with_capacity(workers);
    let mut start = 1;
    for i in 0..workers {
        let len = base + usize::from(i < extra);
        if len == 0 {
            break;
        }
        ranges.push(start..=start + len - 1);
        start += len;
    }
    ranges
}

fn worker_count(page_count: usize) -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(MAX_EXTRACTION_WORKERS)
        .min(page_count.max(1))
}

/// Extract every page using a bounded set of blocking workers.
///
/// Pages are split into at most [`MAX_EXTRACTION_WORKERS`] contiguous
/// ranges; each range is one `spawn_blocking` task and one document load.
pub fn extract_parallel(
    extractor: Arc<dyn TextExtractor>,
    path: &Path,
) -> Result<Vec<ParsedPage>, ParseError> {
    ensure_parallel_allowed()?;

    let page_count = extractor.page_count(path)?;
    let ranges = page_ranges(page_count, worker_count(page_count));
    debug!(
        "Extracting {} pages in {} ranges with {}",
        page_count,
        ranges.len(),
        extractor.name()
    );
    let fan_out = extract_concurrently(extractor, path.to_path_buf(), ranges);

    match Handle::try_current() {
        Ok(handle) => Ok(tokio::task::block_in_place(|| handle.block_on(fan_out))),
        Err(_) => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|e| {
                    ParseError::Parsing(format!("failed to start extraction runtime: {e}"))
                })?;
            Ok(runtime.block_on(fan_out))
        }
    }
}

async fn extract_concurrently(
    extractor: Arc<dyn TextExtractor>,
    path: PathBuf,
    ranges: Vec<RangeInclusive<usize>>,
) -> Vec<ParsedPage> {
    let tasks = ranges.iter().cloned().map(|range| {
        let extractor = Arc::clone(&extractor);
        let path = path.clone();
        tokio::task::spawn_blocking(move || extractor.extract_range(&path, range))
    });
    let results = join_all(tasks).await;

    let mut pages = Vec::new();
    for (range, joined) in ranges.into_iter().zip(results) {
        let failure = match joined {
            Ok(Ok(extracted)) => {
                pages.extend(extracted);
                continue;
            }
            Ok(Err(e)) => e.to_string(),
            Err(e) => format!("extraction task panicked: {e}"),
        };
        warn!(
            "Pages {}-{} failed to extract: {}",
            range.start(),
            range.end(),
            failure
        );
        pages.extend(
            range.map(|n| ParsedPage::placeholder(n, EXTRACTION_ERROR_MARKER, &failure)),
        );
    }
    pages
}
