//! Content extraction strategies.
//!
//! Turns the validated archive into an ordered resource list by trying
//! strategies in fixed priority order until one yields a usable result.
//! Each strategy is independently fallible: a failure becomes a diagnostic
//! and the chain moves on. For a valid archive with any HTML content at
//! all, extraction returns something.

use tracing::{debug, info};

use crate::config::ParseConfig;
use crate::diagnostics::{DiagnosticsCollector, Stage};
use crate::epub::{Archive, PackageDoc, decode_text, strip_bom};
use crate::error::{Error, Result};
use crate::model::ContentResource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Strategy {
    Spine,
    Manifest,
    DirectoryScan,
    RawText,
}

impl Strategy {
    fn name(self) -> &'static str {
        match self {
            Strategy::Spine => "spine",
            Strategy::Manifest => "manifest",
            Strategy::DirectoryScan => "directory-scan",
            Strategy::RawText => "raw-text",
        }
    }

    /// Archive-level guessing, gated by `enable_fallback_strategies`.
    fn is_guessing(self) -> bool {
        matches!(self, Strategy::DirectoryScan | Strategy::RawText)
    }
}

const STRATEGY_ORDER: [Strategy; 4] = [
    Strategy::Spine,
    Strategy::Manifest,
    Strategy::DirectoryScan,
    Strategy::RawText,
];

/// Run the strategy chain. Returns an empty list only when every strategy
/// came up empty.
pub(crate) fn extract_resources(
    archive: &Archive,
    package: Option<&PackageDoc>,
    config: &ParseConfig,
    diag: &DiagnosticsCollector,
) -> Vec<ContentResource> {
    for strategy in STRATEGY_ORDER {
        if strategy.is_guessing() && !config.enable_fallback_strategies {
            debug!(strategy = strategy.name(), "fallback strategies disabled, skipping");
            continue;
        }

        for attempt in 1..=config.max_retry_attempts {
            match run_strategy(strategy, archive, package, config) {
                Ok(resources) => {
                    match check_validity(strategy, &resources, package, config) {
                        Ok(()) => {
                            info!(
                                strategy = strategy.name(),
                                resources = resources.len(),
                                "extraction strategy succeeded"
                            );
                            return resources;
                        }
                        Err(reason) => {
                            diag.error(
                                Stage::Extraction,
                                format!("{} strategy unusable: {}", strategy.name(), reason),
                            );
                        }
                    }
                    // The strategies are deterministic; retrying an
                    // insufficient result cannot improve it.
                    break;
                }
                Err(e) => {
                    debug!(
                        strategy = strategy.name(),
                        attempt,
                        error = %e,
                        "extraction strategy failed"
                    );
                    if attempt == config.max_retry_attempts {
                        diag.error(
                            Stage::Extraction,
                            format!("{} strategy failed: {}", strategy.name(), e),
                        );
                    }
                }
            }
        }
    }

    Vec::new()
}

fn run_strategy(
    strategy: Strategy,
    archive: &Archive,
    package: Option<&PackageDoc>,
    config: &ParseConfig,
) -> Result<Vec<ContentResource>> {
    match strategy {
        Strategy::Spine => spine_strategy(archive, package),
        Strategy::Manifest => manifest_strategy(archive, package),
        Strategy::DirectoryScan => Ok(directory_strategy(archive)),
        Strategy::RawText => Ok(raw_text_strategy(archive, config)),
    }
}

/// Non-empty, and enough decoded text to be worth processing. The spine
/// result additionally has to cover a minimum fraction of the manifest's
/// HTML entries.
fn check_validity(
    strategy: Strategy,
    resources: &[ContentResource],
    package: Option<&PackageDoc>,
    config: &ParseConfig,
) -> std::result::Result<(), String> {
    if resources.is_empty() {
        return Err("no resources found".to_string());
    }

    let total_chars: usize = resources
        .iter()
        .map(|r| decode_text(strip_bom(&r.data), &config.supported_encodings).chars().count())
        .sum();
    if total_chars < config.min_extracted_chars {
        return Err(format!(
            "only {} decoded characters, below the {} minimum",
            total_chars, config.min_extracted_chars
        ));
    }

    if strategy == Strategy::Spine
        && let Some(package) = package
    {
        let manifest_html = package.html_entries().count();
        let minimum = (manifest_html as f64 * config.min_spine_fraction).ceil() as usize;
        if resources.len() < minimum {
            return Err(format!(
                "spine resolved {} of {} manifest HTML entries, below the minimum fraction",
                resources.len(),
                manifest_html
            ));
        }
    }

    Ok(())
}

/// Strategy 1: the authored reading order, resolved through the manifest.
fn spine_strategy(
    archive: &Archive,
    package: Option<&PackageDoc>,
) -> Result<Vec<ContentResource>> {
    let package = package.ok_or_else(|| {
        Error::MissingEntry("package document required for spine extraction".into())
    })?;

    let mut resources = Vec::new();
    for id in &package.spine_ids {
        let Some(entry) = package.manifest_by_id(id) else {
            continue;
        };
        if !entry.media_type.is_empty() && !entry.is_html() {
            continue;
        }
        let path = package.resolve(&entry.href);
        if let Ok(data) = archive.read(&path) {
            resources.push(ContentResource::new(
                entry.id.clone(),
                path,
                entry.media_type.clone(),
                data.to_vec(),
            ));
        }
    }
    Ok(resources)
}

/// Strategy 2: manifest order filtered to HTML media types.
fn manifest_strategy(
    archive: &Archive,
    package: Option<&PackageDoc>,
) -> Result<Vec<ContentResource>> {
    let package = package.ok_or_else(|| {
        Error::MissingEntry("package document required for manifest extraction".into())
    })?;

    let mut resources = Vec::new();
    for entry in package.html_entries() {
        let path = package.resolve(&entry.href);
        if let Ok(data) = archive.read(&path) {
            resources.push(ContentResource::new(
                entry.id.clone(),
                path,
                entry.media_type.clone(),
                data.to_vec(),
            ));
        }
    }
    Ok(resources)
}

/// Strategy 3: archive entries whose path implies HTML, in path order.
fn directory_strategy(archive: &Archive) -> Vec<ContentResource> {
    let mut resources = Vec::new();
    for path in archive.paths() {
        if !has_html_extension(path) {
            continue;
        }
        if let Ok(data) = archive.read(path) {
            let id = path
                .rsplit('/')
                .next()
                .and_then(|name| name.split('.').next())
                .unwrap_or(path);
            resources.push(ContentResource::new(
                id,
                path,
                guess_media_type(path),
                data.to_vec(),
            ));
        }
    }
    resources
}

/// Strategy 4: aggregate every plausibly-text entry into one degraded
/// resource.
fn raw_text_strategy(archive: &Archive, config: &ParseConfig) -> Vec<ContentResource> {
    let mut aggregate = String::new();
    for path in archive.paths() {
        if !plausibly_content(path) {
            continue;
        }
        let Ok(data) = archive.read(path) else {
            continue;
        };
        if let Some(text) = decode_plain_text(data, config) {
            if !aggregate.is_empty() {
                aggregate.push_str("\n\n");
            }
            aggregate.push_str(text.trim());
        }
    }

    if aggregate.is_empty() {
        return Vec::new();
    }
    vec![ContentResource::new(
        "raw-text",
        "raw-text",
        "text/plain",
        aggregate.into_bytes(),
    )]
}

fn has_html_extension(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".xhtml") || lower.ends_with(".html") || lower.ends_with(".htm")
}

fn guess_media_type(path: &str) -> &'static str {
    if path.to_ascii_lowercase().ends_with(".xhtml") {
        "application/xhtml+xml"
    } else {
        "text/html"
    }
}

/// Skip metadata, styling, and known binary formats; everything else is a
/// candidate for the raw-text aggregate.
fn plausibly_content(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    if lower == "mimetype" || lower.starts_with("meta-inf/") {
        return false;
    }
    const EXCLUDED: [&str; 14] = [
        ".opf", ".ncx", ".css", ".js", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".woff",
        ".woff2", ".ttf", ".otf", ".ico",
    ];
    !EXCLUDED.iter().any(|ext| lower.ends_with(ext))
}

/// UTF-8 or BOM-marked UTF-16 content decodes; anything else is treated as
/// binary.
fn decode_plain_text(data: &[u8], config: &ParseConfig) -> Option<String> {
    if let Ok(text) = std::str::from_utf8(strip_bom(data)) {
        return Some(text.to_string());
    }
    if data.starts_with(&[0xFF, 0xFE]) || data.starts_with(&[0xFE, 0xFF]) {
        return Some(decode_text(data, &config.supported_encodings).into_owned());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    const CONTAINER: &str = r#"<container><rootfiles>
<rootfile full-path="content.opf" media-type="application/oebps-package+xml"/>
</rootfiles></container>"#;

    fn opf(spine_ids: &[&str]) -> String {
        let mut opf = String::from("<package><metadata/>\n<manifest>\n");
        for id in spine_ids {
            opf.push_str(&format!(
                r#"<item id="{id}" href="{id}.xhtml" media-type="application/xhtml+xml"/>"#
            ));
            opf.push('\n');
        }
        opf.push_str("</manifest>\n<spine>\n");
        for id in spine_ids {
            opf.push_str(&format!(r#"<itemref idref="{id}"/>"#));
            opf.push('\n');
        }
        opf.push_str("</spine></package>");
        opf
    }

    fn chapter_html(title: &str) -> String {
        format!(
            "<html><body><h1>{title}</h1><p>{}</p></body></html>",
            "Sentence one goes here. Sentence two as well. ".repeat(4)
        )
    }

    fn build_archive(entries: &[(&str, &[u8])]) -> Archive {
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = ZipWriter::new(&mut cursor);
        let options = SimpleFileOptions::default();
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
        Archive::open(&cursor.into_inner(), u64::MAX).unwrap()
    }

    fn load_package(archive: &Archive) -> PackageDoc {
        PackageDoc::load(archive, &[]).unwrap()
    }

    #[test]
    fn spine_strategy_preserves_reading_order() {
        let ch_a = chapter_html("A");
        let ch_b = chapter_html("B");
        let archive = build_archive(&[
            ("META-INF/container.xml", CONTAINER.as_bytes()),
            ("content.opf", opf(&["b", "a"]).as_bytes()),
            ("a.xhtml", ch_a.as_bytes()),
            ("b.xhtml", ch_b.as_bytes()),
        ]);
        let package = load_package(&archive);
        let diag = DiagnosticsCollector::new();

        let resources =
            extract_resources(&archive, Some(&package), &ParseConfig::default(), &diag);

        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].href, "b.xhtml");
        assert_eq!(resources[1].href, "a.xhtml");
    }

    #[test]
    fn missing_package_falls_through_to_directory_scan() {
        let ch = chapter_html("Solo");
        let archive = build_archive(&[("text/solo.xhtml", ch.as_bytes())]);
        let diag = DiagnosticsCollector::new();

        let resources = extract_resources(&archive, None, &ParseConfig::default(), &diag);

        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].href, "text/solo.xhtml");
        // Spine and manifest failures were recorded on the way down.
        let diagnostics = diag.finish();
        assert!(diagnostics.entries().len() >= 2);
        assert!(!diagnostics.has_fatal());
    }

    #[test]
    fn sparse_spine_falls_back_to_manifest() {
        let ch = chapter_html("One");
        // Manifest declares three HTML chapters, spine references only one.
        let mut opf = String::from("<package><manifest>\n");
        for id in ["a", "b", "c"] {
            opf.push_str(&format!(
                r#"<item id="{id}" href="{id}.xhtml" media-type="application/xhtml+xml"/>"#
            ));
        }
        opf.push_str(r#"</manifest><spine><itemref idref="a"/></spine></package>"#);

        let archive = build_archive(&[
            ("META-INF/container.xml", CONTAINER.as_bytes()),
            ("content.opf", opf.as_bytes()),
            ("a.xhtml", ch.as_bytes()),
            ("b.xhtml", ch.as_bytes()),
            ("c.xhtml", ch.as_bytes()),
        ]);
        let package = load_package(&archive);
        let diag = DiagnosticsCollector::new();

        let resources =
            extract_resources(&archive, Some(&package), &ParseConfig::default(), &diag);

        assert_eq!(resources.len(), 3, "manifest order should win");
        assert!(
            diag.finish()
                .entries()
                .iter()
                .any(|d| d.message.contains("spine"))
        );
    }

    #[test]
    fn raw_text_aggregates_when_nothing_else_works() {
        let text = "Plain prose with enough characters to pass the validity check. ".repeat(3);
        let archive = build_archive(&[
            ("notes.txt", text.as_bytes()),
            ("image.png", &[0x89, 0x50, 0x4E, 0x47][..]),
        ]);
        let diag = DiagnosticsCollector::new();

        let resources = extract_resources(&archive, None, &ParseConfig::default(), &diag);

        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].media_type, "text/plain");
        assert!(String::from_utf8_lossy(&resources[0].data).contains("Plain prose"));
    }

    #[test]
    fn fallback_strategies_can_be_disabled() {
        let ch = chapter_html("Hidden");
        let archive = build_archive(&[("text/hidden.xhtml", ch.as_bytes())]);
        let config = ParseConfig {
            enable_fallback_strategies: false,
            ..ParseConfig::default()
        };
        let diag = DiagnosticsCollector::new();

        let resources = extract_resources(&archive, None, &config, &diag);
        assert!(resources.is_empty());
    }
}
