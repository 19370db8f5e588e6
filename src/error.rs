//! Error types for the pdf-ingest library.
//!
//! Two error types reflect two failure domains:
//!
//! * [`ParseError`]: returned from [`crate::parse::ParsePipeline::parse`].
//!   Every variant maps to exactly one [`ErrorKind`], so an HTTP handler or a
//!   job runner can translate it into a status code or a retry decision
//!   without string matching.
//!
//! * [`CacheError`]: raised by the parse cache and its stores. The pipeline
//!   never propagates it: a cache that cannot be read is a miss, and a cache
//!   that cannot be written only costs a future re-parse.
//!
//! Page-level problems are not errors at all. A page that fails to extract
//! is stored as a placeholder [`crate::output::ParsedPage`] carrying a visible
//! marker, so one bad page never sacrifices the rest of the document.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the parse pipeline.
#[derive(Debug, Error)]
pub enum ParseError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The resolved path does not exist.
    #[error("PDF file not found: '{path}'")]
    NotFound { path: PathBuf },

    /// The file cannot be read as a PDF, or the path itself was rejected.
    #[error("PDF '{path}' is corrupt or unreadable: {detail}")]
    Corrupt { path: PathBuf, detail: String },

    /// The document requires a password.
    #[error("PDF '{path}' is encrypted and requires a password")]
    Encrypted { path: PathBuf },

    // ── Caller configuration ──────────────────────────────────────────────
    /// A caller-supplied section pattern was rejected.
    #[error("Invalid section pattern: {0}")]
    InvalidPattern(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Both extraction strategies failed, or a required capability is absent.
    #[error("Parsing failed: {0}")]
    Parsing(String),
}

/// Coarse classification of a [`ParseError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Corrupt,
    Encrypted,
    InvalidPattern,
    InvalidConfig,
    Parsing,
}

impl ParseError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        ParseError::Corrupt {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// The taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ParseError::NotFound { .. } => ErrorKind::NotFound,
            ParseError::Corrupt { .. } => ErrorKind::Corrupt,
            ParseError::Encrypted { .. } => ErrorKind::Encrypted,
            ParseError::InvalidPattern(_) => ErrorKind::InvalidPattern,
            ParseError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            ParseError::Parsing(_) => ErrorKind::Parsing,
        }
    }

    /// Whether re-running the same call unchanged could succeed.
    ///
    /// Only a missing file qualifies, and only after the storage layer
    /// re-fetches it. Everything else needs the input or the caller to change.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ParseError::NotFound { .. })
    }
}

/// Errors raised by the parse cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("cache payload could not be (de)serialised: {0}")]
    Serde(#[from] serde_json::Error),

    /// A payload carried a `version` this build does not understand.
    #[error("unrecognised cache format version {0}")]
    UnknownVersion(i64),

    /// The payload parsed as JSON but matches none of the known shapes.
    #[error("unrecognised cache payload shape: {0}")]
    UnknownShape(String),

    #[error("cache store lock poisoned")]
    LockPoisoned,
}
