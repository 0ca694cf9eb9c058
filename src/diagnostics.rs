//! Non-fatal findings accumulated over one parse.
//!
//! Every pipeline stage reports what went wrong (and how it recovered)
//! through a shared collector; the finished, immutable list travels with
//! the document model so callers can explain degraded output to the user.

use std::fmt;
use std::sync::Mutex;

/// How bad a finding is.
///
/// Warnings and errors never abort anything; only fatal findings make the
/// orchestrator give up on a stage or the whole parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Quality concern; processing continued unaffected.
    Warning,
    /// Preferred path failed but a degraded path was taken.
    Error,
    /// No degraded path existed.
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Fatal => write!(f, "fatal"),
        }
    }
}

/// Pipeline stage that produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validation,
    Extraction,
    TextProcessing,
    ChapterAnalysis,
    Pagination,
    Assembly,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Validation => write!(f, "validation"),
            Stage::Extraction => write!(f, "extraction"),
            Stage::TextProcessing => write!(f, "text-processing"),
            Stage::ChapterAnalysis => write!(f, "chapter-analysis"),
            Stage::Pagination => write!(f, "pagination"),
            Stage::Assembly => write!(f, "assembly"),
        }
    }
}

/// One finding: where, how bad, what happened, and (optionally) what the
/// user could do about it.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub stage: Stage,
    pub severity: Severity,
    pub message: String,
    pub hint: Option<String>,
}

impl Diagnostic {
    pub fn new(stage: Stage, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            stage,
            severity,
            message: message.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.stage, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " ({})", hint)?;
        }
        Ok(())
    }
}

/// The finished, append-only finding list carried by a document model.
#[derive(Debug, Clone, Default)]
pub struct ParsingDiagnostics {
    entries: Vec<Diagnostic>,
}

impl ParsingDiagnostics {
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_fatal(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Fatal)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.entries
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    /// Human-readable one-line-per-finding summary.
    pub fn summary(&self) -> String {
        if self.entries.is_empty() {
            return "no findings".to_string();
        }
        let mut out = String::new();
        for entry in &self.entries {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&entry.to_string());
        }
        out
    }
}

/// Shared collector: the only mutable state that crosses worker threads.
#[derive(Debug, Default)]
pub(crate) struct DiagnosticsCollector {
    inner: Mutex<Vec<Diagnostic>>,
}

impl DiagnosticsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, diagnostic: Diagnostic) {
        // A poisoned lock means a worker panicked; keep collecting anyway.
        let mut entries = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.push(diagnostic);
    }

    pub fn warning(&self, stage: Stage, message: impl Into<String>) {
        self.push(Diagnostic::new(stage, Severity::Warning, message));
    }

    pub fn error(&self, stage: Stage, message: impl Into<String>) {
        self.push(Diagnostic::new(stage, Severity::Error, message));
    }

    pub fn fatal(&self, stage: Stage, message: impl Into<String>) {
        self.push(Diagnostic::new(stage, Severity::Fatal, message));
    }

    pub fn has_fatal(&self) -> bool {
        let entries = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.iter().any(|d| d.severity == Severity::Fatal)
    }

    pub fn finish(self) -> ParsingDiagnostics {
        let entries = match self.inner.into_inner() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        ParsingDiagnostics { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_accumulates_in_order() {
        let collector = DiagnosticsCollector::new();
        collector.warning(Stage::TextProcessing, "low quality");
        collector.error(Stage::Extraction, "spine empty");
        let diagnostics = collector.finish();

        assert_eq!(diagnostics.entries().len(), 2);
        assert_eq!(diagnostics.entries()[0].severity, Severity::Warning);
        assert_eq!(diagnostics.entries()[1].stage, Stage::Extraction);
        assert!(!diagnostics.has_fatal());
    }

    #[test]
    fn fatal_is_detected() {
        let collector = DiagnosticsCollector::new();
        collector.fatal(Stage::Validation, "not a zip archive");
        assert!(collector.has_fatal());
        assert!(collector.finish().has_fatal());
    }

    #[test]
    fn summary_includes_hint() {
        let collector = DiagnosticsCollector::new();
        collector.push(
            Diagnostic::new(Stage::Validation, Severity::Error, "container.xml missing")
                .with_hint("path-guessing fallback will be attempted"),
        );
        let summary = collector.finish().summary();
        assert!(summary.contains("container.xml missing"));
        assert!(summary.contains("path-guessing"));
        assert!(summary.starts_with("[error] validation"));
    }

    #[test]
    fn empty_summary() {
        assert_eq!(ParsingDiagnostics::default().summary(), "no findings");
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Fatal);
    }
}
