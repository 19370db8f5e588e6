//! OCR for scanned documents: pdfium rasterisation + the `tesseract` CLI.
//!
//! Pages are processed strictly one at a time. Each page is rendered, written
//! to a PNG in a per-document temp directory, recognised, and deleted before
//! the next page is rendered, so peak memory is one page bitmap regardless of
//! document length.
//!
//! ## DPI selection
//!
//! A 300 DPI RGB raster of a US-Letter page is about 25 MB. Before rendering
//! anything the whole-document raster size is estimated from the first page
//! and compared to available memory; on small hosts the lower DPI is used.

use crate::capabilities::Capabilities;
use crate::config::ParserConfig;
use crate::error::ParseError;
use crate::output::{ParsedPage, OCR_ERROR_MARKER};
use crate::pipeline::extract::{bind_pdfium, load_pdfium_document};
use crate::pipeline::probe::check_page_limit;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use regex::Regex;
use std::path::Path;
use std::process::Command;
use tracing::{debug, info, warn};

static RE_LANGUAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_+]{1,64}$").unwrap());

/// PDF user-space units per inch.
const POINTS_PER_INCH: f64 = 72.0;

/// Bytes per rendered pixel (RGB).
const BYTES_PER_PIXEL: f64 = 3.0;

/// Re-extracts page text by optical character recognition.
pub trait OcrBackend: Send + Sync {
    /// OCR every page of `path` with the given tesseract language.
    ///
    /// # Errors
    /// Document-level failures only; a page that fails becomes a
    /// placeholder carrying [`OCR_ERROR_MARKER`].
    fn extract(&self, path: &Path, language: &str) -> Result<Vec<ParsedPage>, ParseError>;
}

/// Check a tesseract language code before it reaches a subprocess.
///
/// Accepts codes such as `eng`, `chi_sim` and `eng+deu`.
pub fn validate_language(language: &str) -> Result<(), ParseError> {
    if RE_LANGUAGE.is_match(language) {
        Ok(())
    } else {
        Err(ParseError::Parsing(format!(
            "invalid OCR language '{language}': expected 1–64 of [A-Za-z0-9_+]"
        )))
    }
}

/// Choose the rasterisation DPI for a document.
///
/// `width_pt`/`height_pt` are the first page's dimensions in PDF points. The
/// estimate is `width_in × height_in × dpi² × 3 × page_count` bytes; when it
/// exceeds `available_memory` the document is rendered at `low_dpi`. Without
/// a memory reading, `dpi` is used.
pub fn select_dpi(
    width_pt: f32,
    height_pt: f32,
    page_count: usize,
    available_memory: Option<u64>,
    dpi: u32,
    low_dpi: u32,
) -> u32 {
    let Some(available) = available_memory else {
        return dpi;
    };

    let width_in = f64::from(width_pt) / POINTS_PER_INCH;
    let height_in = f64::from(height_pt) / POINTS_PER_INCH;
    let dpi_f = f64::from(dpi);
    let estimated = width_in * height_in * dpi_f * dpi_f * BYTES_PER_PIXEL * page_count as f64;

    if estimated > available as f64 {
        debug!(
            "Estimated raster size {:.0} MB exceeds {} MB available; using {} DPI",
            estimated / 1_048_576.0,
            available / 1_048_576,
            low_dpi
        );
        low_dpi
    } else {
        dpi
    }
}

/// Currently available system memory in bytes.
pub fn available_memory() -> Option<u64> {
    if !sysinfo::IS_SUPPORTED_SYSTEM {
        return None;
    }
    let mut sys = sysinfo::System::new();
    sys.refresh_memory();
    match sys.available_memory() {
        0 => None,
        bytes => Some(bytes),
    }
}

/// The production OCR backend.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    tesseract_cmd: String,
    dpi: u32,
    low_dpi: u32,
    max_pages: usize,
    available: bool,
    memory_introspection: bool,
}

impl TesseractOcr {
    pub fn new(config: &ParserConfig, capabilities: &Capabilities) -> Self {
        Self {
            tesseract_cmd: config.tesseract_cmd.clone(),
            dpi: config.ocr_dpi,
            low_dpi: config.ocr_low_dpi,
            max_pages: config.max_pages,
            available: capabilities.ocr && capabilities.pdfium,
            memory_introspection: capabilities.memory_introspection,
        }
    }

    fn recognise(&self, image_path: &Path, language: &str) -> Result<String, String> {
        let output = Command::new(&self.tesseract_cmd)
            .arg(image_path)
            .arg("stdout")
            .args(["-l", language])
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    format!("'{}' not found", self.tesseract_cmd)
                }
                _ => e.to_string(),
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
        }
    }

    fn ocr_page(
        &self,
        pages: &PdfPages,
        page_number: usize,
        dpi: u32,
        work_dir: &Path,
        language: &str,
    ) -> Result<String, String> {
        let page = pages
            .get((page_number - 1) as u16)
            .map_err(|e| format!("{:?}", e))?;

        let target_width = (page.width().value / POINTS_PER_INCH as f32 * dpi as f32).round() as i32;
        let render_config = PdfRenderConfig::new().set_target_width(target_width.max(1));
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| format!("render failed: {:?}", e))?;

        let image_path = work_dir.join(format!("page-{page_number}.png"));
        bitmap
            .as_image()
            .save_with_format(&image_path, image::ImageFormat::Png)
            .map_err(|e| format!("could not write raster: {e}"))?;
        drop(bitmap);

        let text = self.recognise(&image_path, language);
        if let Err(e) = std::fs::remove_file(&image_path) {
            debug!("Could not remove {}: {}", image_path.display(), e);
        }
        text
    }
}

impl OcrBackend for TesseractOcr {
    fn extract(&self, path: &Path, language: &str) -> Result<Vec<ParsedPage>, ParseError> {
        if !self.available {
            return Err(ParseError::Parsing(
                "OCR is not available: tesseract or pdfium was not found at startup".into(),
            ));
        }
        validate_language(language)?;

        let pdfium = bind_pdfium()?;
        let document = load_pdfium_document(&pdfium, path)?;
        let pages = document.pages();
        let page_count = pages.len() as usize;

        check_page_limit(page_count, self.max_pages, "OCR")?;
        if page_count == 0 {
            return Ok(Vec::new());
        }

        let (width_pt, height_pt) = pages
            .get(0)
            .map(|p| (p.width().value, p.height().value))
            .map_err(|e| ParseError::corrupt(path, format!("{:?}", e)))?;
        let memory = if self.memory_introspection {
            available_memory()
        } else {
            None
        };
        let dpi = select_dpi(width_pt, height_pt, page_count, memory, self.dpi, self.low_dpi);

        let work_dir = tempfile::TempDir::new()
            .map_err(|e| ParseError::Parsing(format!("cannot create OCR work dir: {e}")))?;
        info!(
            "OCR of {} pages at {} DPI (language '{}')",
            page_count, dpi, language
        );

        let mut out = Vec::with_capacity(page_count);
        for page_number in 1..=page_count {
            match self.ocr_page(pages, page_number, dpi, work_dir.path(), language) {
                Ok(text) => out.push(ParsedPage::new(page_number, text)),
                Err(e) => {
                    warn!("OCR failed on page {}: {}", page_number, e);
                    out.push(ParsedPage::placeholder(page_number, OCR_ERROR_MARKER, e));
                }
            }
        }
        Ok(out)
    }
}
