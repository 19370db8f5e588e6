//! Scanned-document heuristic.
//!
//! An image-only page still yields a few characters of embedded metadata
//! text, so "no text" is too strict a test. Either signal below is enough:
//!
//! 1. the whole document has fewer than `min_total_chars` trimmed characters;
//! 2. fewer than `min_text_page_ratio` of the pages individually exceed
//!    `min_page_chars` trimmed characters (a mostly-blank mixed document).

use crate::config::ScanThresholds;
use crate::output::ParsedPage;

/// Whether the extracted pages look like a scan that needs OCR.
pub fn looks_scanned(pages: &[ParsedPage], thresholds: &ScanThresholds) -> bool {
    let mut total_chars = 0usize;
    let mut pages_with_text = 0usize;

    for page in pages {
        let chars = page.text.trim().chars().count();
        total_chars += chars;
        if chars > thresholds.min_page_chars {
            pages_with_text += 1;
        }
    }

    if total_chars < thresholds.min_total_chars {
        return true;
    }

    (pages_with_text as f64) < (pages.len() as f64) * thresholds.min_text_page_ratio
}
