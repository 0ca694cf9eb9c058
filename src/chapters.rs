//! Chapter reconstruction from multiple weak signals.
//!
//! Three analyzers each emit ranked candidates: the authored navigation
//! document (most reliable), heading markers found in the processed text,
//! and spine boundaries (always available). A confidence-based merge
//! dedupes candidates that resolve to the same position.

use std::cmp::Ordering;

use tracing::debug;

use crate::config::ParseConfig;
use crate::diagnostics::{DiagnosticsCollector, Stage};
use crate::epub::{Archive, NavPoint, PackageDoc, parse_nav_doc, parse_ncx};
use crate::model::ContentResource;
use crate::text::HeadingMark;

/// A chapter boundary emitted by one analyzer. Ephemeral: consumed by the
/// merge and discarded.
#[derive(Debug, Clone)]
struct ChapterCandidate {
    title: String,
    level: u8,
    /// Index into the resource list.
    resource: usize,
    /// Character offset within the resource's processed text.
    offset: usize,
    confidence: f64,
}

/// A merged boundary, ordered by position. Page ranges are assigned later,
/// once pagination has run.
#[derive(Debug, Clone)]
pub(crate) struct MergedChapter {
    pub title: String,
    pub level: u8,
    pub resource: usize,
    pub offset: usize,
    pub href: String,
}

/// Run the three analyzers and merge their candidates.
pub(crate) fn analyze_chapters(
    archive: &Archive,
    package: Option<&PackageDoc>,
    resources: &[ContentResource],
    headings: &[Vec<HeadingMark>],
    config: &ParseConfig,
    diag: &DiagnosticsCollector,
) -> Vec<MergedChapter> {
    if resources.is_empty() {
        return Vec::new();
    }

    let nav = || nav_candidates(archive, package, resources, config, diag);
    let head = || heading_candidates(resources, headings, config);
    let spine = || spine_candidates(resources, config);

    // The analyzers are read-only over already-produced data, so they can
    // run against each other.
    let (mut candidates, (from_headings, from_spine)) = if config.enable_parallel_processing {
        rayon::join(nav, || rayon::join(head, spine))
    } else {
        (nav(), (head(), spine()))
    };
    candidates.extend(from_headings);
    candidates.extend(from_spine);

    merge(candidates, resources, config)
}

/// Navigation-document analyzer: EPUB3 nav first, NCX second.
fn nav_candidates(
    archive: &Archive,
    package: Option<&PackageDoc>,
    resources: &[ContentResource],
    config: &ParseConfig,
    diag: &DiagnosticsCollector,
) -> Vec<ChapterCandidate> {
    let Some(package) = package else {
        return Vec::new();
    };

    let points = match load_nav_points(archive, package, config, diag) {
        Some(points) => points,
        None => return Vec::new(),
    };

    let mut candidates = Vec::new();
    for point in points {
        let path = package.resolve(&point.href);
        match resource_index(resources, &path) {
            Some(resource) => candidates.push(ChapterCandidate {
                title: point.title,
                level: point.level,
                resource,
                offset: 0,
                confidence: config.nav_confidence,
            }),
            None => diag.warning(
                Stage::ChapterAnalysis,
                format!(
                    "navigation entry '{}' targets unknown resource {}",
                    point.title, path
                ),
            ),
        }
    }
    candidates
}

fn load_nav_points(
    archive: &Archive,
    package: &PackageDoc,
    config: &ParseConfig,
    diag: &DiagnosticsCollector,
) -> Option<Vec<NavPoint>> {
    if let Some(nav_href) = &package.nav_href
        && let Ok(content) = archive.read_text(nav_href, &config.supported_encodings)
    {
        match parse_nav_doc(&content) {
            Ok(points) if !points.is_empty() => return Some(points),
            Ok(_) => {}
            Err(e) => diag.error(
                Stage::ChapterAnalysis,
                format!("navigation document unusable: {}", e),
            ),
        }
    }

    if let Some(ncx_href) = &package.ncx_href
        && let Ok(content) = archive.read_text(ncx_href, &config.supported_encodings)
    {
        match parse_ncx(&content) {
            Ok(points) if !points.is_empty() => return Some(points),
            Ok(_) => {}
            Err(e) => diag.error(
                Stage::ChapterAnalysis,
                format!("NCX document unusable: {}", e),
            ),
        }
    }

    debug!("no usable navigation document");
    None
}

/// Heading analyzer: structural markers left by the text pipeline.
fn heading_candidates(
    resources: &[ContentResource],
    headings: &[Vec<HeadingMark>],
    config: &ParseConfig,
) -> Vec<ChapterCandidate> {
    let mut candidates = Vec::new();
    for (resource, marks) in headings.iter().enumerate().take(resources.len()) {
        for mark in marks {
            candidates.push(ChapterCandidate {
                title: mark.title.clone(),
                level: mark.level,
                resource,
                offset: mark.offset,
                confidence: config.heading_confidence,
            });
        }
    }
    candidates
}

/// Spine analyzer: every resource boundary is an implicit chapter break.
fn spine_candidates(resources: &[ContentResource], config: &ParseConfig) -> Vec<ChapterCandidate> {
    resources
        .iter()
        .enumerate()
        .map(|(index, _)| ChapterCandidate {
            title: format!("Chapter {}", index + 1),
            level: 1,
            resource: index,
            offset: 0,
            confidence: config.spine_confidence,
        })
        .collect()
}

fn resource_index(resources: &[ContentResource], path: &str) -> Option<usize> {
    resources
        .iter()
        .position(|r| r.href == path)
        .or_else(|| resources.iter().position(|r| r.href.ends_with(path)))
}

/// Priority-bucketed dedup: group by position, keep the highest
/// confidence within the offset tolerance.
fn merge(
    mut candidates: Vec<ChapterCandidate>,
    resources: &[ContentResource],
    config: &ParseConfig,
) -> Vec<MergedChapter> {
    candidates.sort_by(|a, b| {
        (a.resource, a.offset)
            .cmp(&(b.resource, b.offset))
            .then_with(|| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(Ordering::Equal)
            })
    });

    let mut merged: Vec<ChapterCandidate> = Vec::new();
    for candidate in candidates {
        if let Some(last) = merged.last_mut()
            && last.resource == candidate.resource
            && candidate.offset - last.offset <= config.chapter_offset_tolerance
        {
            if candidate.confidence > last.confidence {
                *last = candidate;
            }
            continue;
        }
        merged.push(candidate);
    }

    merged
        .into_iter()
        .map(|c| MergedChapter {
            href: resources[c.resource].href.clone(),
            title: c.title,
            level: c.level,
            resource: c.resource,
            offset: c.offset,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(title: &str, resource: usize, offset: usize, confidence: f64) -> ChapterCandidate {
        ChapterCandidate {
            title: title.to_string(),
            level: 1,
            resource,
            offset,
            confidence,
        }
    }

    fn dummy_resources(count: usize) -> Vec<ContentResource> {
        (0..count)
            .map(|i| {
                ContentResource::new(
                    format!("id{}", i),
                    format!("ch{}.xhtml", i),
                    "application/xhtml+xml",
                    Vec::new(),
                )
            })
            .collect()
    }

    #[test]
    fn merge_keeps_highest_confidence_at_same_position() {
        let resources = dummy_resources(2);
        let config = ParseConfig::default();
        let merged = merge(
            vec![
                candidate("Chapter 1", 0, 0, 0.5),
                candidate("The Real Title", 0, 0, 0.9),
                candidate("Heading Title", 0, 30, 0.7),
                candidate("Chapter 2", 1, 0, 0.5),
            ],
            &resources,
            &config,
        );

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].title, "The Real Title");
        assert_eq!(merged[1].title, "Chapter 2");
    }

    #[test]
    fn merge_separates_positions_beyond_tolerance() {
        let resources = dummy_resources(1);
        let config = ParseConfig::default();
        let merged = merge(
            vec![
                candidate("Intro", 0, 0, 0.7),
                candidate("Part Two", 0, 500, 0.7),
            ],
            &resources,
            &config,
        );

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].offset, 500);
    }

    #[test]
    fn merge_orders_by_document_position() {
        let resources = dummy_resources(3);
        let config = ParseConfig::default();
        let merged = merge(
            vec![
                candidate("C", 2, 0, 0.5),
                candidate("A", 0, 0, 0.5),
                candidate("B", 1, 0, 0.5),
            ],
            &resources,
            &config,
        );

        let titles: Vec<_> = merged.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, ["A", "B", "C"]);
    }

    #[test]
    fn spine_candidates_cover_every_resource() {
        let resources = dummy_resources(3);
        let candidates = spine_candidates(&resources, &ParseConfig::default());
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[2].title, "Chapter 3");
    }
}
