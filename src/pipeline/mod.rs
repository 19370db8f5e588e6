//! Pipeline stages for PDF ingestion.
//!
//! Each submodule implements exactly one step and is usable on its own;
//! [`crate::parse::ParsePipeline`] sequences them.
//!
//! ## Data Flow
//!
//! ```text
//! patterns   probe ──▶ extract ──▶ scanned? ──▶ ocr ──▶ tables ──▶ sections
//! (caller)  (file)    (pdfium/    (heuristic)  (tess-  (tabula)  (headings)
//!                      lopdf)                   eract)
//! ```
//!
//! 1. [`patterns`]: screen and compile caller-supplied section regexes
//! 2. [`probe`]: canonicalise the path, reject unsafe locations, check the
//!    header and detect encryption
//! 3. [`extract`]: page text via pdfium, falling back to lopdf
//! 4. [`scanned`]: decide whether the text layer is too thin to trust
//! 5. [`ocr`]: rasterise and recognise, one page at a time
//! 6. [`tables`]: cheap likelihood filter, then tabula-java per page
//! 7. [`sections`]: label pages with the heading they fall under

pub mod extract;
pub mod ocr;
pub mod patterns;
pub mod probe;
pub mod scanned;
pub mod sections;
pub mod tables;
