//! Configuration for the parsing pipeline.
//!
//! The `ParseConfig` struct controls validation limits, extraction
//! strategies, text cleanup, and pagination budgets. All fields are public
//! for easy configuration; use `Default::default()` for standard settings.

use std::time::Duration;

use crate::error::{Error, Result};

/// Configuration for one parse invocation.
///
/// # Example
///
/// ```
/// use folio::ParseConfig;
///
/// // Use defaults
/// let config = ParseConfig::default();
///
/// // Customize specific fields
/// let config = ParseConfig {
///     target_chars_per_page: 1200,
///     min_chars_per_page: 300,
///     max_chars_per_page: 1600,
///     ..ParseConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct ParseConfig {
    /// Maximum accepted container size in bytes. Larger inputs fail
    /// validation with a fatal finding.
    ///
    /// Default: `128 MiB`
    pub max_file_size_bytes: u64,

    /// Text encodings tried, in order, after UTF-8 fails. Labels are
    /// resolved through `encoding_rs` (e.g. `"windows-1252"`, `"utf-16be"`).
    ///
    /// Default: `["utf-16le", "utf-16be", "windows-1252"]`
    pub supported_encodings: Vec<String>,

    /// Allow the archive-level guessing strategies (directory traversal and
    /// raw-text aggregation) when manifest data is unusable.
    ///
    /// Default: `true`
    pub enable_fallback_strategies: bool,

    /// Attempts per extraction strategy before moving on to the next one.
    ///
    /// Default: `2`
    pub max_retry_attempts: u32,

    /// Process resources on a bounded worker pool instead of sequentially.
    ///
    /// Default: `true`
    pub enable_parallel_processing: bool,

    /// Upper bound on worker threads; the pool is sized to
    /// `min(available cores, max_workers)`.
    ///
    /// Default: `4`
    pub max_workers: usize,

    /// Keep heading markers (`#`-prefixed, one `#` per level) in page text.
    /// When false headings become plain paragraphs.
    ///
    /// Default: `false`
    pub preserve_formatting: bool,

    /// Additionally strip zero-width characters, soft hyphens, and other
    /// invisible artifacts during normalization.
    ///
    /// Default: `false`
    pub aggressive_cleanup: bool,

    /// Resources whose quality score (visible chars / raw bytes) falls
    /// below this are kept but flagged degraded.
    ///
    /// Default: `0.3`
    pub min_quality_score: f64,

    /// Preferred page size in characters. Must be strictly between
    /// `min_chars_per_page` and `max_chars_per_page`.
    ///
    /// Default: `1500`
    pub target_chars_per_page: usize,

    /// Lower bound for every page except the last of a resource.
    ///
    /// Default: `500`
    pub min_chars_per_page: usize,

    /// Hard upper bound for every page.
    ///
    /// Default: `2400`
    pub max_chars_per_page: usize,

    /// Accumulate whole paragraphs per page where possible. When false,
    /// pages are filled sentence by sentence without regard to paragraph
    /// boundaries.
    ///
    /// Default: `true`
    pub preserve_paragraphs: bool,

    /// Wall-clock budget for the whole parse. On expiry, completed
    /// per-resource results are kept and the parse finalizes degraded.
    ///
    /// Default: `30s`
    pub processing_timeout: Duration,

    /// Ceiling on total inflated archive bytes held in memory.
    ///
    /// Default: `512 MiB`
    pub max_memory_usage_bytes: u64,

    /// Minimum fraction of the manifest's HTML entries that spine
    /// resolution must recover before the manifest-order fallback kicks in.
    ///
    /// Default: `0.5`
    pub min_spine_fraction: f64,

    /// Minimum total decoded characters for an extraction strategy's
    /// result to count as usable.
    ///
    /// Default: `64`
    pub min_extracted_chars: usize,

    /// Chapter candidates within this many characters of each other (in
    /// the same resource) are treated as the same boundary.
    ///
    /// Default: `64`
    pub chapter_offset_tolerance: usize,

    /// Confidence weight for the navigation-document analyzer.
    ///
    /// Default: `0.9`
    pub nav_confidence: f64,

    /// Confidence weight for the heading analyzer.
    ///
    /// Default: `0.7`
    pub heading_confidence: f64,

    /// Confidence weight for the spine-boundary analyzer.
    ///
    /// Default: `0.5`
    pub spine_confidence: f64,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 128 * 1024 * 1024,
            supported_encodings: vec![
                "utf-16le".to_string(),
                "utf-16be".to_string(),
                "windows-1252".to_string(),
            ],
            enable_fallback_strategies: true,
            max_retry_attempts: 2,
            enable_parallel_processing: true,
            max_workers: 4,
            preserve_formatting: false,
            aggressive_cleanup: false,
            min_quality_score: 0.3,
            target_chars_per_page: 1500,
            min_chars_per_page: 500,
            max_chars_per_page: 2400,
            preserve_paragraphs: true,
            processing_timeout: Duration::from_secs(30),
            max_memory_usage_bytes: 512 * 1024 * 1024,
            min_spine_fraction: 0.5,
            min_extracted_chars: 64,
            chapter_offset_tolerance: 64,
            nav_confidence: 0.9,
            heading_confidence: 0.7,
            spine_confidence: 0.5,
        }
    }
}

impl ParseConfig {
    /// Check internal consistency of the configuration.
    ///
    /// The pagination budgets must satisfy
    /// `0 < min_chars_per_page < target_chars_per_page < max_chars_per_page`,
    /// ratios must lie in `[0, 1]`, and counts must be non-zero.
    pub fn validate(&self) -> Result<()> {
        if self.min_chars_per_page == 0 {
            return Err(Error::Config("min_chars_per_page must be positive".into()));
        }
        if self.target_chars_per_page <= self.min_chars_per_page
            || self.target_chars_per_page >= self.max_chars_per_page
        {
            return Err(Error::Config(format!(
                "target_chars_per_page ({}) must lie strictly between min ({}) and max ({})",
                self.target_chars_per_page, self.min_chars_per_page, self.max_chars_per_page
            )));
        }
        if self.max_file_size_bytes == 0 {
            return Err(Error::Config("max_file_size_bytes must be positive".into()));
        }
        if self.max_workers == 0 {
            return Err(Error::Config("max_workers must be at least 1".into()));
        }
        if self.max_retry_attempts == 0 {
            return Err(Error::Config("max_retry_attempts must be at least 1".into()));
        }
        for (name, value) in [
            ("min_quality_score", self.min_quality_score),
            ("min_spine_fraction", self.min_spine_fraction),
            ("nav_confidence", self.nav_confidence),
            ("heading_confidence", self.heading_confidence),
            ("spine_confidence", self.spine_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!("{} must be within [0, 1]", name)));
            }
        }
        Ok(())
    }

    /// Number of worker threads for per-resource processing.
    pub(crate) fn worker_count(&self) -> usize {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        cores.min(self.max_workers).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ParseConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.min_chars_per_page < config.target_chars_per_page);
        assert!(config.target_chars_per_page < config.max_chars_per_page);
        assert!(config.enable_fallback_strategies);
        assert!(config.preserve_paragraphs);
    }

    #[test]
    fn rejects_inverted_page_budgets() {
        let config = ParseConfig {
            target_chars_per_page: 3000,
            max_chars_per_page: 2000,
            ..ParseConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_target_equal_to_min() {
        let config = ParseConfig {
            min_chars_per_page: 1500,
            target_chars_per_page: 1500,
            ..ParseConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_ratios() {
        let config = ParseConfig {
            min_quality_score: 1.5,
            ..ParseConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ParseConfig {
            min_spine_fraction: -0.1,
            ..ParseConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn worker_count_respects_cap() {
        let config = ParseConfig {
            max_workers: 1,
            ..ParseConfig::default()
        };
        assert_eq!(config.worker_count(), 1);
    }
}
