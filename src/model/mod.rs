//! The document model produced by one parse.
//!
//! Everything here is plain data owned by the caller once returned; the
//! pipeline keeps no reference to it. The reading UI and the storage layer
//! consume it through the read-only accessors on [`DocumentModel`].

use std::path::Path;

use crate::diagnostics::ParsingDiagnostics;

/// Book metadata (Dublin Core + extensions).
#[derive(Debug, Clone, Default)]
pub struct BookMetadata {
    pub title: String,
    pub authors: Vec<String>,
    pub language: String,
    pub identifier: String,
    pub publisher: Option<String>,
    pub description: Option<String>,
    pub subjects: Vec<String>,
    pub date: Option<String>,
    pub rights: Option<String>,
}

impl BookMetadata {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

/// One unit of content: a spine/manifest entry plus everything derived
/// from it.
///
/// Created by the content extractor with raw bytes; the HTML processor
/// fills `text`, `quality`, and `degraded`; the pagination engine fills
/// `pages` and `first_page`. No other component mutates it.
#[derive(Debug, Clone)]
pub struct ContentResource {
    /// Manifest identifier, or a synthesized one for guessed resources.
    pub id: String,
    /// Container-relative path inside the archive.
    pub href: String,
    /// Declared (or guessed) media type.
    pub media_type: String,
    /// Raw bytes as stored in the archive.
    pub data: Vec<u8>,
    /// Normalized plain text, filled by the HTML processor.
    pub text: String,
    /// Generated pages in local order, filled by the pagination engine.
    pub pages: Vec<String>,
    /// Visible-chars-to-raw-bytes ratio in [0, 1].
    pub quality: f64,
    /// True when quality fell below the configured minimum.
    pub degraded: bool,
    /// Global index of this resource's first page.
    pub first_page: usize,
}

impl ContentResource {
    pub fn new(
        id: impl Into<String>,
        href: impl Into<String>,
        media_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            id: id.into(),
            href: href.into(),
            media_type: media_type.into(),
            data,
            text: String::new(),
            pages: Vec::new(),
            quality: 0.0,
            degraded: false,
            first_page: 0,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// A merged, final chapter with its global page range.
///
/// Ranges are non-overlapping, ordered, and monotonically increasing with
/// document order; every range is a subset of `[0, total_pages - 1]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub title: String,
    /// Hierarchy depth, 1-based.
    pub level: u8,
    /// Archive path of the resource the chapter starts in.
    pub href: String,
    pub start_page: usize,
    pub end_page: usize,
}

/// The final output of one parse.
#[derive(Debug, Clone)]
pub struct DocumentModel {
    pub metadata: BookMetadata,
    pub resources: Vec<ContentResource>,
    pub chapters: Vec<Chapter>,
    pub diagnostics: ParsingDiagnostics,
    pub total_pages: usize,
}

impl DocumentModel {
    /// Minimal model returned when parsing cannot proceed: title derived
    /// from the file name, no chapters, zero pages.
    pub fn fallback(source_name: &str, diagnostics: ParsingDiagnostics) -> Self {
        Self {
            metadata: BookMetadata::new(title_from_source(source_name)),
            resources: Vec::new(),
            chapters: Vec::new(),
            diagnostics,
            total_pages: 0,
        }
    }

    /// Text of the page at the given absolute index.
    pub fn page(&self, index: usize) -> Option<&str> {
        if index >= self.total_pages {
            return None;
        }
        // Resources are ordered by first_page; find the owning resource.
        let position = self
            .resources
            .partition_point(|r| r.first_page <= index)
            .checked_sub(1)?;
        let resource = &self.resources[position];
        resource
            .pages
            .get(index - resource.first_page)
            .map(String::as_str)
    }

    /// The chapter whose page range contains the given absolute index.
    pub fn chapter_at(&self, page: usize) -> Option<&Chapter> {
        self.chapters
            .iter()
            .find(|c| c.start_page <= page && page <= c.end_page)
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }
}

/// The caller-facing result: a model that can always be rendered, plus a
/// success flag (false when any fatal finding was recorded).
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub model: DocumentModel,
    pub success: bool,
}

/// Derive a display title from a file name: strip directories and the
/// extension, leave the rest untouched.
pub(crate) fn title_from_source(source_name: &str) -> String {
    let stem = Path::new(source_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| source_name.to_string());
    if stem.is_empty() {
        "Untitled".to_string()
    } else {
        stem
    }
}
