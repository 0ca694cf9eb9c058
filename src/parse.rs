//! The main parse entry point.
//!
//! Sequences validation, extraction, per-resource processing, chapter
//! analysis, and pagination, collecting diagnostics throughout, and
//! assembles the final document model. This is the only place that holds
//! cross-stage state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{info, warn};

use crate::chapters::{MergedChapter, analyze_chapters};
use crate::config::ParseConfig;
use crate::diagnostics::{DiagnosticsCollector, Stage};
use crate::epub::{Archive, PackageDoc};
use crate::extract::extract_resources;
use crate::model::{
    Chapter, ContentResource, DocumentModel, ParseOutcome, title_from_source,
};
use crate::paginate::{PageBudget, page_index_for_offset, paginate};
use crate::text::{HeadingMark, process_html};
use crate::validate::validate;

/// Parse an EPUB container into a paginated document model.
///
/// Never fails outright: on fatal problems the returned model is a minimal
/// fallback (title derived from `source_name`, zero pages) and `success`
/// is false, so the caller can always render something.
///
/// ```
/// use folio::{ParseConfig, parse_epub};
///
/// let outcome = parse_epub(b"definitely not an epub, but long enough to check",
///                          "garbage.epub", &ParseConfig::default());
/// assert!(!outcome.success);
/// assert_eq!(outcome.model.total_pages, 0);
/// assert_eq!(outcome.model.metadata.title, "garbage");
/// ```
pub fn parse_epub(data: &[u8], source_name: &str, config: &ParseConfig) -> ParseOutcome {
    let diag = DiagnosticsCollector::new();

    if let Err(e) = config.validate() {
        diag.fatal(Stage::Validation, e.to_string());
        return fallback_outcome(source_name, diag);
    }

    let deadline = Deadline::start(config.processing_timeout);

    // 1. Validate the container bytes.
    let validation = validate(data, config);
    for finding in validation.findings {
        diag.push(finding);
    }
    if !validation.can_continue {
        return fallback_outcome(source_name, diag);
    }

    // 2. Open the archive; read-only and shared from here on.
    let archive = match Archive::open(data, config.max_memory_usage_bytes) {
        Ok(archive) => archive,
        Err(e) => {
            diag.fatal(Stage::Validation, format!("archive could not be opened: {}", e));
            return fallback_outcome(source_name, diag);
        }
    };
    if !archive.skipped().is_empty() {
        diag.warning(
            Stage::Validation,
            format!("{} damaged archive entries skipped", archive.skipped().len()),
        );
    }

    // 3. Package document; extraction can work without one.
    let package = match PackageDoc::load(&archive, &config.supported_encodings) {
        Ok(package) => Some(package),
        Err(e) => {
            diag.error(
                Stage::Extraction,
                format!("package document unusable: {}", e),
            );
            None
        }
    };

    // 4. Extract the resource list.
    let mut resources = extract_resources(&archive, package.as_ref(), config, &diag);
    if resources.is_empty() {
        diag.fatal(
            Stage::Extraction,
            "no content could be extracted from the archive",
        );
        return fallback_outcome(source_name, diag);
    }
    info!(resources = resources.len(), "extraction complete");

    let pool = build_pool(config, &diag);

    // 5. Per-resource text processing.
    let headings = process_resources(&mut resources, config, &deadline, pool.as_ref(), &diag);

    // 6. Chapter analysis over processed text and navigation data.
    let merged = analyze_chapters(&archive, package.as_ref(), &resources, &headings, config, &diag);

    // 7. Pagination.
    paginate_resources(&mut resources, config, &deadline, pool.as_ref(), &diag);

    // 8. Global page numbering, in original resource order.
    let mut next_page = 0;
    for resource in &mut resources {
        resource.first_page = next_page;
        next_page += resource.pages.len();
    }
    let total_pages = next_page;

    // 9. Map chapters onto global page ranges.
    let chapters = assign_page_ranges(merged, &resources, total_pages, &diag);

    let mut metadata = package.map(|p| p.metadata).unwrap_or_default();
    if metadata.title.trim().is_empty() {
        metadata.title = title_from_source(source_name);
    }

    let success = !diag.has_fatal();
    info!(total_pages, chapters = chapters.len(), success, "parse finished");

    ParseOutcome {
        model: DocumentModel {
            metadata,
            resources,
            chapters,
            diagnostics: diag.finish(),
            total_pages,
        },
        success,
    }
}

fn fallback_outcome(source_name: &str, diag: DiagnosticsCollector) -> ParseOutcome {
    ParseOutcome {
        model: DocumentModel::fallback(source_name, diag.finish()),
        success: false,
    }
}

/// Wall-clock budget shared by the whole parse, checked cooperatively at
/// unit-of-work boundaries so completed results survive expiry.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    fn start(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    fn expired(&self) -> bool {
        self.started.elapsed() >= self.budget
    }
}

fn build_pool(config: &ParseConfig, diag: &DiagnosticsCollector) -> Option<rayon::ThreadPool> {
    if !config.enable_parallel_processing {
        return None;
    }
    match rayon::ThreadPoolBuilder::new()
        .num_threads(config.worker_count())
        .build()
    {
        Ok(pool) => Some(pool),
        Err(e) => {
            warn!(error = %e, "worker pool unavailable, processing sequentially");
            diag.warning(
                Stage::TextProcessing,
                format!("worker pool unavailable ({}), processing sequentially", e),
            );
            None
        }
    }
}

fn process_resources(
    resources: &mut [ContentResource],
    config: &ParseConfig,
    deadline: &Deadline,
    pool: Option<&rayon::ThreadPool>,
    diag: &DiagnosticsCollector,
) -> Vec<Vec<HeadingMark>> {
    let skipped = AtomicUsize::new(0);
    let total = resources.len();

    let work = |resource: &mut ContentResource| -> Vec<HeadingMark> {
        if deadline.expired() {
            skipped.fetch_add(1, Ordering::Relaxed);
            return Vec::new();
        }
        let processed = process_html(&resource.data, config);
        if processed.used_fallback {
            diag.error(
                Stage::TextProcessing,
                format!("{}: malformed markup, fell back to naive tag stripping", resource.href),
            );
        }
        if processed.degraded {
            diag.warning(
                Stage::TextProcessing,
                format!(
                    "{}: quality score {:.2} below configured minimum",
                    resource.href, processed.quality
                ),
            );
        }
        resource.text = processed.text;
        resource.quality = processed.quality;
        resource.degraded = processed.degraded;
        processed.headings
    };

    let headings = match pool {
        Some(pool) => pool.install(|| resources.par_iter_mut().map(work).collect()),
        None => resources.iter_mut().map(work).collect(),
    };

    let skipped = skipped.into_inner();
    if skipped > 0 {
        diag.fatal(
            Stage::TextProcessing,
            format!(
                "processing timeout expired; {} of {} resources processed",
                total - skipped,
                total
            ),
        );
    }

    headings
}

fn paginate_resources(
    resources: &mut [ContentResource],
    config: &ParseConfig,
    deadline: &Deadline,
    pool: Option<&rayon::ThreadPool>,
    diag: &DiagnosticsCollector,
) {
    let budget = PageBudget::from(config);
    let skipped = AtomicUsize::new(0);
    let total = resources.len();

    let work = |resource: &mut ContentResource| {
        if deadline.expired() {
            skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        resource.pages = paginate(&resource.text, &budget, config.preserve_paragraphs);
    };

    match pool {
        Some(pool) => pool.install(|| resources.par_iter_mut().for_each(work)),
        None => resources.iter_mut().for_each(work),
    }

    let skipped = skipped.into_inner();
    if skipped > 0 && !diag.has_fatal() {
        diag.fatal(
            Stage::Pagination,
            format!(
                "processing timeout expired; {} of {} resources paginated",
                total - skipped,
                total
            ),
        );
    }
}

/// Walk merged chapters in order and assign global page ranges, clamping
/// so ranges stay ordered and non-overlapping.
fn assign_page_ranges(
    merged: Vec<MergedChapter>,
    resources: &[ContentResource],
    total_pages: usize,
    diag: &DiagnosticsCollector,
) -> Vec<Chapter> {
    if total_pages == 0 {
        if !merged.is_empty() {
            diag.warning(
                Stage::ChapterAnalysis,
                "chapter boundaries found but no pages were produced",
            );
        }
        return Vec::new();
    }

    let mut chapters: Vec<Chapter> = Vec::new();
    for chapter in merged {
        let resource = &resources[chapter.resource];
        if resource.pages.is_empty() {
            diag.warning(
                Stage::ChapterAnalysis,
                format!("chapter '{}' targets a resource with no pages", chapter.title),
            );
            continue;
        }

        let local = page_index_for_offset(&resource.pages, chapter.offset);
        let mut start = resource.first_page + local;
        if let Some(previous) = chapters.last()
            && start <= previous.start_page
        {
            start = previous.start_page + 1;
        }
        if start >= total_pages {
            diag.warning(
                Stage::ChapterAnalysis,
                format!("chapter '{}' falls past the last page, dropped", chapter.title),
            );
            continue;
        }

        chapters.push(Chapter {
            title: chapter.title,
            level: chapter.level,
            href: chapter.href,
            start_page: start,
            end_page: start,
        });
    }

    let count = chapters.len();
    for index in 0..count {
        chapters[index].end_page = if index + 1 < count {
            chapters[index + 1].start_page - 1
        } else {
            total_pages - 1
        };
    }

    chapters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;

    fn resource_with_pages(pages: usize, first_page: usize) -> ContentResource {
        let mut resource =
            ContentResource::new("id", "ch.xhtml", "application/xhtml+xml", Vec::new());
        resource.pages = (0..pages).map(|i| format!("page {}", i)).collect();
        resource.first_page = first_page;
        resource
    }

    fn merged(title: &str, resource: usize, offset: usize) -> MergedChapter {
        MergedChapter {
            title: title.to_string(),
            level: 1,
            resource,
            offset,
            href: "ch.xhtml".to_string(),
        }
    }

    #[test]
    fn ranges_are_ordered_and_cover_to_the_end() {
        let resources = vec![resource_with_pages(3, 0), resource_with_pages(4, 3)];
        let diag = DiagnosticsCollector::new();
        let chapters = assign_page_ranges(
            vec![merged("One", 0, 0), merged("Two", 1, 0)],
            &resources,
            7,
            &diag,
        );

        assert_eq!(chapters.len(), 2);
        assert_eq!((chapters[0].start_page, chapters[0].end_page), (0, 2));
        assert_eq!((chapters[1].start_page, chapters[1].end_page), (3, 6));
    }

    #[test]
    fn duplicate_starts_are_clamped_forward() {
        let resources = vec![resource_with_pages(5, 0)];
        let diag = DiagnosticsCollector::new();
        let chapters = assign_page_ranges(
            vec![merged("A", 0, 0), merged("B", 0, 0), merged("C", 0, 0)],
            &resources,
            5,
            &diag,
        );

        assert_eq!(chapters.len(), 3);
        let starts: Vec<_> = chapters.iter().map(|c| c.start_page).collect();
        assert_eq!(starts, vec![0, 1, 2]);
        for window in chapters.windows(2) {
            assert!(window[0].end_page < window[1].start_page);
        }
        assert_eq!(chapters.last().unwrap().end_page, 4);
    }

    #[test]
    fn chapters_past_the_last_page_are_dropped() {
        let resources = vec![resource_with_pages(1, 0)];
        let diag = DiagnosticsCollector::new();
        let chapters = assign_page_ranges(
            vec![merged("A", 0, 0), merged("B", 0, 0), merged("C", 0, 0)],
            &resources,
            1,
            &diag,
        );

        assert_eq!(chapters.len(), 1);
        let diagnostics = diag.finish();
        assert_eq!(diagnostics.count(Severity::Warning), 2);
    }

    #[test]
    fn zero_total_pages_yields_no_chapters() {
        let diag = DiagnosticsCollector::new();
        let chapters = assign_page_ranges(vec![merged("A", 0, 0)], &[], 0, &diag);
        assert!(chapters.is_empty());
    }
}
