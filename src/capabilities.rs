//! Startup detection of optional native dependencies.
//!
//! pdfium, tesseract and a Java runtime with the tabula jar are all optional
//! at runtime. Each is probed once when the pipeline is built, and the stages
//! that need a missing one degrade instead of failing every parse with the
//! same spawn error.

use crate::config::ParserConfig;
use crate::pipeline::extract::bind_pdfium;
use crate::pipeline::tables::java_major_version;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Which optional backends this host can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// The pdfium shared library could be bound.
    pub pdfium: bool,
    /// The tesseract executable was found.
    pub ocr: bool,
    /// A Java runtime at or above the minimum version and the tabula jar
    /// are both present.
    pub tables: bool,
    /// Available memory can be read for OCR DPI selection.
    pub memory_introspection: bool,
    /// Detected Java major version, if any.
    pub java_version: Option<u32>,
}

impl Capabilities {
    /// Probe the host. Runs `java -version` once, so call it at startup.
    pub fn probe(config: &ParserConfig) -> Self {
        let pdfium = match bind_pdfium() {
            Ok(_) => true,
            Err(e) => {
                warn!("{}; primary extraction and OCR are disabled", e);
                false
            }
        };

        let ocr = which::which(&config.tesseract_cmd).is_ok();
        if !ocr {
            warn!("'{}' not found; OCR is disabled", config.tesseract_cmd);
        }

        let jar_present = config.tabula_jar.as_deref().is_some_and(|jar| jar.is_file());
        let java_version = if jar_present {
            java_major_version(&config.java_cmd)
        } else {
            None
        };
        let tables = jar_present && java_version.is_some_and(|v| v >= config.min_java_version);
        if !tables {
            warn!(
                "Table extraction is disabled (tabula jar present: {}, java: {:?}, minimum: {})",
                jar_present, java_version, config.min_java_version
            );
        }

        let capabilities = Self {
            pdfium,
            ocr,
            tables,
            memory_introspection: sysinfo::IS_SUPPORTED_SYSTEM,
            java_version,
        };
        info!("Detected capabilities: {:?}", capabilities);
        capabilities
    }

    /// Nothing optional is available.
    pub fn none() -> Self {
        Self {
            pdfium: false,
            ocr: false,
            tables: false,
            memory_introspection: false,
            java_version: None,
        }
    }

    /// Everything is assumed available. Intended for pipelines built with
    /// injected backends.
    pub fn all() -> Self {
        Self {
            pdfium: true,
            ocr: true,
            tables: true,
            memory_introspection: true,
            java_version: None,
        }
    }
}
