//! Pre-parse validation of the container bytes.
//!
//! Runs before anything else and decides whether parsing can proceed at
//! all. Findings are ordinary diagnostics; only a fatal finding stops the
//! pipeline.

use std::io::{Cursor, Read};

use crate::config::ParseConfig;
use crate::diagnostics::{Diagnostic, Severity, Stage};
use crate::epub::{find_rootfile, parse_package, strip_bom};

/// Anything smaller cannot be a zip archive with content.
const MIN_ARCHIVE_BYTES: usize = 64;

/// Zip local-file-header magic.
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// How far into the file the magic is searched for (self-extracting
/// archives carry a preamble).
const MAGIC_SEARCH_WINDOW: usize = 64 * 1024;

/// Outcome of the validation pass. Immutable once produced.
#[derive(Debug)]
pub struct ValidationResult {
    pub findings: Vec<Diagnostic>,
    /// False when any finding is fatal.
    pub can_continue: bool,
}

impl ValidationResult {
    fn from_findings(findings: Vec<Diagnostic>) -> Self {
        let can_continue = !findings.iter().any(|d| d.severity == Severity::Fatal);
        Self {
            findings,
            can_continue,
        }
    }
}

/// Run the ordered validation checks against raw container bytes.
pub fn validate(data: &[u8], config: &ParseConfig) -> ValidationResult {
    let mut findings = Vec::new();

    // 1. Size bounds. Nothing else is meaningful outside them.
    if data.len() < MIN_ARCHIVE_BYTES {
        findings.push(Diagnostic::new(
            Stage::Validation,
            Severity::Fatal,
            format!("file is {} bytes, below the {} byte minimum", data.len(), MIN_ARCHIVE_BYTES),
        ));
        return ValidationResult::from_findings(findings);
    }
    if data.len() as u64 > config.max_file_size_bytes {
        findings.push(Diagnostic::new(
            Stage::Validation,
            Severity::Fatal,
            format!(
                "file is {} bytes, above the configured ceiling of {}",
                data.len(),
                config.max_file_size_bytes
            ),
        ));
        return ValidationResult::from_findings(findings);
    }

    // 2. Archive signature. Without a byte-addressable archive there is
    // nothing to extract from.
    let window = &data[..data.len().min(MAGIC_SEARCH_WINDOW)];
    if memchr::memmem::find(window, ZIP_MAGIC).is_none() {
        findings.push(
            Diagnostic::new(
                Stage::Validation,
                Severity::Fatal,
                "no zip local-file-header signature found",
            )
            .with_hint("the file is not an EPUB container"),
        );
        return ValidationResult::from_findings(findings);
    }

    // 3. Container descriptor present and well-formed.
    let container = read_zip_entry(data, "META-INF/container.xml");
    let opf_path = match &container {
        Some(bytes) => {
            let text = String::from_utf8_lossy(strip_bom(bytes));
            match find_rootfile(&text) {
                Ok(path) => Some(path),
                Err(e) => {
                    findings.push(
                        Diagnostic::new(
                            Stage::Validation,
                            Severity::Error,
                            format!("container descriptor is unusable: {}", e),
                        )
                        .with_hint("extraction will fall back to path guessing"),
                    );
                    None
                }
            }
        }
        None => {
            findings.push(
                Diagnostic::new(
                    Stage::Validation,
                    Severity::Error,
                    "META-INF/container.xml is missing",
                )
                .with_hint("extraction will fall back to path guessing"),
            );
            None
        }
    };

    // 4. At least one HTML/XHTML manifest entry.
    if let Some(opf_path) = opf_path {
        match read_zip_entry(data, &opf_path) {
            Some(bytes) => {
                if let Some(finding) = encoding_finding(&bytes) {
                    findings.push(finding);
                }
                let text = String::from_utf8_lossy(strip_bom(&bytes));
                match parse_package(&text) {
                    Ok(package) if package.html_entries().count() == 0 => {
                        findings.push(Diagnostic::new(
                            Stage::Validation,
                            Severity::Error,
                            "manifest declares no HTML or XHTML content",
                        ));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        findings.push(Diagnostic::new(
                            Stage::Validation,
                            Severity::Error,
                            format!("package document failed to parse: {}", e),
                        ));
                    }
                }
            }
            None => {
                findings.push(Diagnostic::new(
                    Stage::Validation,
                    Severity::Error,
                    format!("package document {} is missing from the archive", opf_path),
                ));
            }
        }
    }

    ValidationResult::from_findings(findings)
}

/// Best-effort read of a single zip entry; any failure yields `None`.
fn read_zip_entry(data: &[u8], path: &str) -> Option<Vec<u8>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data)).ok()?;
    let mut entry = archive.by_name(path).ok()?;
    let mut contents = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut contents).ok()?;
    Some(contents)
}

/// Record a detected non-UTF-8 character encoding on the package document.
fn encoding_finding(bytes: &[u8]) -> Option<Diagnostic> {
    let encoding = if bytes.starts_with(&[0xFF, 0xFE]) {
        "UTF-16LE"
    } else if bytes.starts_with(&[0xFE, 0xFF]) {
        "UTF-16BE"
    } else {
        return None;
    };
    Some(Diagnostic::new(
        Stage::Validation,
        Severity::Warning,
        format!("package document is encoded as {}", encoding),
    ))
}
