//! File validation: decide whether a path is worth extracting at all.
//!
//! Paths come from internal storage, not directly from users, but they are
//! validated as if hostile anyway. The path is canonicalised first so every
//! later check sees the real target of any symlink.
//!
//! The encryption probe fails open: if lopdf cannot answer the question the
//! file is assumed unencrypted, and the extractors surface genuine corruption
//! with a proper [`ParseError::Corrupt`].

use crate::error::ParseError;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Canonical path prefixes that never hold documents.
const SENSITIVE_ROOTS: &[&str] = &[
    "/etc", "/proc", "/sys", "/dev", "/boot", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/var/run",
];

/// How far into the file the `%PDF` header may appear.
const MAGIC_WINDOW: usize = 1024;

/// Validate a document path before extraction.
///
/// Returns the canonical path that extractors should open.
///
/// # Errors
/// - [`ParseError::NotFound`]: nothing exists at the resolved path
/// - [`ParseError::Corrupt`]: resolution failed, the path contains `..`,
///   points into a system directory, is not a regular file, or lacks a PDF
///   header
/// - [`ParseError::Encrypted`]: the document requires a password
pub fn validate(path: &Path) -> Result<PathBuf, ParseError> {
    let canonical = resolve(path)?;

    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(ParseError::corrupt(path, "path contains directory traversal"));
    }

    if let Some(root) = SENSITIVE_ROOTS
        .iter()
        .find(|root| canonical.starts_with(Path::new(root)))
    {
        return Err(ParseError::corrupt(
            &canonical,
            format!("path resolves under protected directory {root}"),
        ));
    }

    let metadata =
        std::fs::metadata(&canonical).map_err(|e| ParseError::corrupt(&canonical, e.to_string()))?;
    if !metadata.is_file() {
        return Err(ParseError::corrupt(&canonical, "not a regular file"));
    }

    check_magic(&canonical)?;

    if is_encrypted(&canonical) {
        return Err(ParseError::Encrypted { path: canonical });
    }

    debug!("Validated PDF: {}", canonical.display());
    Ok(canonical)
}

/// Follow symlinks to an absolute canonical path.
fn resolve(path: &Path) -> Result<PathBuf, ParseError> {
    std::fs::canonicalize(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ParseError::NotFound {
            path: path.to_path_buf(),
        },
        _ => ParseError::corrupt(path, format!("path resolution failed: {e}")),
    })
}

fn check_magic(path: &Path) -> Result<(), ParseError> {
    let mut head = Vec::with_capacity(MAGIC_WINDOW);
    std::fs::File::open(path)
        .and_then(|f| f.take(MAGIC_WINDOW as u64).read_to_end(&mut head))
        .map_err(|e| ParseError::corrupt(path, e.to_string()))?;

    if head.windows(4).any(|w| w == b"%PDF") {
        Ok(())
    } else {
        Err(ParseError::corrupt(path, "missing %PDF header"))
    }
}

/// Whether the document reports itself as password-protected.
///
/// Any probe failure that does not mention encryption counts as "no".
fn is_encrypted(path: &Path) -> bool {
    match lopdf::Document::load(path) {
        Ok(doc) => doc.is_encrypted(),
        Err(e) => {
            let msg = e.to_string();
            if names_encryption(&msg) {
                true
            } else {
                debug!("Encryption probe inconclusive for {}: {}", path.display(), msg);
                false
            }
        }
    }
}

/// Refuse documents with more than `max_pages` pages before a per-page
/// stage starts working through them.
pub fn check_page_limit(
    page_count: usize,
    max_pages: usize,
    stage: &str,
) -> Result<(), ParseError> {
    if page_count > max_pages {
        return Err(ParseError::Parsing(format!(
            "document has {page_count} pages; {stage} is limited to {max_pages}"
        )));
    }
    Ok(())
}

fn names_encryption(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("encrypt") || lower.contains("decrypt") || lower.contains("password")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn page_limit_is_inclusive() {
        assert!(check_page_limit(10_000, 10_000, "OCR").is_ok());
        assert!(check_page_limit(0, 10_000, "OCR").is_ok());

        let err = check_page_limit(10_001, 10_000, "table extraction").unwrap_err();
        assert!(matches!(err, ParseError::Parsing(_)));
        let msg = err.to_string();
        assert!(msg.contains("10001 pages"), "got: {msg}");
        assert!(msg.contains("table extraction is limited to 10000"), "got: {msg}");
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = validate(&dir.path().join("absent.pdf")).unwrap_err();
        assert!(matches!(err, ParseError::NotFound { .. }), "got: {err}");
    }

    #[test]
    fn directory_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let err = validate(dir.path()).unwrap_err();
        assert!(matches!(err, ParseError::Corrupt { .. }), "got: {err}");
    }

    #[test]
    fn traversal_is_rejected_even_when_it_resolves() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        write(&dir, "doc.pdf", b"%PDF-1.4\n");
        let sneaky = dir.path().join("sub").join("..").join("doc.pdf");
        let err = validate(&sneaky).unwrap_err();
        assert!(err.to_string().contains("traversal"), "got: {err}");
    }

    #[test]
    fn system_paths_are_rejected() {
        if Path::new("/etc/hostname").is_file() {
            let err = validate(Path::new("/etc/hostname")).unwrap_err();
            assert!(matches!(err, ParseError::Corrupt { .. }));
        }
    }

    #[cfg(unix)]
    #[test]
    fn symlink_into_system_dir_is_rejected() {
        let dir = TempDir::new().unwrap();
        let target = Path::new("/etc/hostname");
        if !target.is_file() {
            return;
        }
        let link = dir.path().join("innocent.pdf");
        std::os::unix::fs::symlink(target, &link).unwrap();
        let err = validate(&link).unwrap_err();
        assert!(err.to_string().contains("/etc"), "got: {err}");
    }

    #[test]
    fn non_pdf_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "notes.pdf", b"just some text");
        let err = validate(&path).unwrap_err();
        assert!(err.to_string().contains("%PDF"), "got: {err}");
    }

    #[test]
    fn unreadable_structure_fails_open() {
        // Header present but no valid body: the encryption probe cannot load
        // it and must not report encryption.
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "broken.pdf", b"%PDF-1.7\n%garbage without xref\n");
        let canonical = validate(&path).unwrap();
        assert!(canonical.is_absolute());
    }

    #[test]
    fn encryption_messages_are_recognised() {
        assert!(names_encryption("Decryption error: wrong key"));
        assert!(names_encryption("document requires a Password"));
        assert!(!names_encryption("invalid cross-reference table"));
    }
}
