//! HTML-to-text processing.
//!
//! A fixed pipeline of cleaning stages applied once per content resource.
//! Each stage takes the previous stage's text and returns new text; no
//! stage touches shared state. A stage that cannot make sense of the
//! markup drops to a naive tag-stripping regex so the resource always ends
//! up with some text.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::ParseConfig;
use crate::epub::{decode_text, strip_bom};

/// Marker pair the structure stage wraps heading text in; lifted back out
/// (with the heading level and final offset) before the text leaves the
/// pipeline.
const HEADING_OPEN: char = '\u{11}';
const HEADING_CLOSE: char = '\u{12}';

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

/// A heading found by the structure-preservation stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingMark {
    /// Heading level 1-6.
    pub level: u8,
    /// Character offset of the heading text in the final normalized text.
    pub offset: usize,
    pub title: String,
}

/// Output of the pipeline for one resource.
#[derive(Debug, Clone)]
pub struct ProcessedText {
    pub text: String,
    /// Visible chars / raw bytes, clamped to [0, 1].
    pub quality: f64,
    /// True when quality fell below the configured minimum.
    pub degraded: bool,
    /// True when the structure stage had to fall back to naive stripping.
    pub used_fallback: bool,
    pub headings: Vec<HeadingMark>,
}

/// Run the full pipeline over one resource's raw bytes.
pub fn process_html(raw: &[u8], config: &ParseConfig) -> ProcessedText {
    let source = decode_text(strip_bom(raw), &config.supported_encodings);

    let text = decode_entities(&source);
    let text = strip_executable(&text);
    let (text, used_fallback) = match preserve_structure(&text) {
        Ok(structured) => (structured, false),
        Err(MalformedMarkup) => (naive_strip(&text), true),
    };
    let text = normalize_text(&text, config.aggressive_cleanup);
    let text = optimize_whitespace(&text);
    let (text, headings) = lift_heading_marks(&text, config.preserve_formatting);

    let quality = quality_score(&text, raw.len());
    ProcessedText {
        degraded: quality < config.min_quality_score,
        text,
        quality,
        used_fallback,
        headings,
    }
}

/// Stage 1: resolve named and numeric character references.
pub(crate) fn decode_entities(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}

/// Stage 2: remove `<script>` and `<style>` elements with their content,
/// plus HTML comments. Removal is always whole-element; an unterminated
/// element is dropped to the end of the input rather than left partially
/// in place.
pub(crate) fn strip_executable(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let lb = lower.as_bytes();
    let mut out = String::with_capacity(html.len());
    let mut i = 0;

    while i < lb.len() {
        let script = find_element_open(lb, i, b"<script");
        let style = find_element_open(lb, i, b"<style");
        let comment = memchr::memmem::find(&lb[i..], b"<!--").map(|p| i + p);

        let (start, end_pat) = match nearest(&[
            (script, b"</script".as_slice()),
            (style, b"</style".as_slice()),
            (comment, b"-->".as_slice()),
        ]) {
            Some(hit) => hit,
            None => {
                out.push_str(&html[i..]);
                break;
            }
        };

        out.push_str(&html[i..start]);
        i = match memchr::memmem::find(&lb[start..], end_pat) {
            Some(rel) => {
                let end = start + rel;
                if end_pat == b"-->" {
                    end + 3
                } else {
                    // Skip past the closing tag's '>'.
                    memchr::memchr(b'>', &lb[end..])
                        .map(|g| end + g + 1)
                        .unwrap_or(lb.len())
                }
            }
            // Unterminated: never inject a fragment of executable content.
            None => lb.len(),
        };
    }

    out
}

/// Find `pattern` at or after `from`, requiring the byte after it to
/// actually end the tag name (so `<style` does not match `<styled-box`).
fn find_element_open(lower: &[u8], from: usize, pattern: &[u8]) -> Option<usize> {
    let mut search = from;
    while let Some(rel) = memchr::memmem::find(&lower[search..], pattern) {
        let pos = search + rel;
        match lower.get(pos + pattern.len()) {
            None | Some(b' ' | b'\t' | b'\n' | b'\r' | b'>' | b'/') => return Some(pos),
            _ => search = pos + 1,
        }
    }
    None
}

fn nearest<'p>(candidates: &[(Option<usize>, &'p [u8])]) -> Option<(usize, &'p [u8])> {
    candidates
        .iter()
        .filter_map(|(pos, pat)| pos.map(|p| (p, *pat)))
        .min_by_key(|(p, _)| *p)
}

pub(crate) struct MalformedMarkup;

/// Stage 3: convert block-level tags into paragraph breaks (and headings
/// into marker pairs), then drop every remaining tag.
///
/// Fails only on a `<` with no closing `>`, which is the cue to use the
/// naive fallback instead.
pub(crate) fn preserve_structure(html: &str) -> Result<String, MalformedMarkup> {
    let bytes = html.as_bytes();
    let mut out = String::with_capacity(html.len());
    let mut i = 0;

    while let Some(rel) = memchr::memchr(b'<', &bytes[i..]) {
        let lt = i + rel;
        out.push_str(&html[i..lt]);

        let Some(gt_rel) = memchr::memchr(b'>', &bytes[lt..]) else {
            return Err(MalformedMarkup);
        };
        let gt = lt + gt_rel;
        emit_tag_break(&html[lt + 1..gt], &mut out);
        i = gt + 1;
    }

    out.push_str(&html[i..]);
    Ok(out)
}

/// Emit the text-level replacement for one tag body.
fn emit_tag_break(tag: &str, out: &mut String) {
    let tag = tag.trim();
    let closing = tag.starts_with('/');
    let name: String = tag
        .trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();

    match name.as_str() {
        "p" | "div" | "li" | "ul" | "ol" | "blockquote" | "tr" | "table" | "section"
        | "article" | "figcaption" => out.push_str("\n\n"),
        "br" => out.push('\n'),
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            if closing {
                out.push(HEADING_CLOSE);
                out.push_str("\n\n");
            } else {
                out.push_str("\n\n");
                out.push(HEADING_OPEN);
                // Safe: name is exactly 'h' + one ASCII digit here.
                out.push(name.as_bytes()[1] as char);
            }
        }
        _ => {}
    }
}

/// Last-resort tag removal for markup the scanner gave up on.
pub(crate) fn naive_strip(html: &str) -> String {
    let stripped = TAG_RE.replace_all(html, " ");
    // An unterminated trailing tag survives the regex; cut it off.
    match stripped.rfind('<') {
        Some(pos) if !stripped[pos..].contains('>') => stripped[..pos].to_string(),
        _ => stripped.into_owned(),
    }
}

/// Stage 4: normalize Unicode whitespace to ASCII spaces, collapse runs,
/// and keep line breaks meaningful.
pub(crate) fn normalize_text(text: &str, aggressive: bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.chars() {
        if aggressive
            && matches!(c, '\u{AD}' | '\u{200B}'..='\u{200D}' | '\u{FEFF}' | '\u{2060}')
        {
            continue;
        }
        if c == '\n' {
            pending_space = false;
            out.push('\n');
        } else if c.is_whitespace() {
            pending_space = true;
        } else {
            if pending_space && !out.is_empty() && !out.ends_with('\n') {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        }
    }

    out
}

/// Stage 5: collapse blank-line runs into a single paragraph separator and
/// trim the ends.
pub(crate) fn optimize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0;

    for c in text.chars() {
        if c == '\n' {
            newlines += 1;
            continue;
        }
        if newlines > 0 && !out.is_empty() {
            out.push_str(if newlines == 1 { "\n" } else { "\n\n" });
        }
        newlines = 0;
        out.push(c);
    }

    out
}

/// Lift heading markers out of the final text.
///
/// Returns the cleaned text plus the headings with their character offsets
/// into it. With `preserve_formatting` headings keep a markdown-style
/// `#`-prefix; otherwise they become plain paragraphs.
pub(crate) fn lift_heading_marks(
    text: &str,
    preserve_formatting: bool,
) -> (String, Vec<HeadingMark>) {
    let mut out = String::with_capacity(text.len());
    let mut out_chars = 0;
    let mut headings = Vec::new();
    let mut iter = text.chars().peekable();

    while let Some(c) = iter.next() {
        if c == HEADING_CLOSE {
            continue;
        }
        if c != HEADING_OPEN {
            out.push(c);
            out_chars += 1;
            continue;
        }

        let level = iter
            .peek()
            .and_then(|d| d.to_digit(10))
            .filter(|d| (1..=6).contains(d));
        let Some(level) = level else {
            // Stray marker without a level digit; drop it.
            continue;
        };
        iter.next();

        let mut raw_title = String::new();
        for t in iter.by_ref() {
            if t == HEADING_CLOSE {
                break;
            }
            raw_title.push(t);
        }
        let title = raw_title.split_whitespace().collect::<Vec<_>>().join(" ");
        if title.is_empty() {
            continue;
        }

        let offset = out_chars;
        if preserve_formatting {
            for _ in 0..level {
                out.push('#');
            }
            out.push(' ');
            out_chars += level as usize + 1;
        }
        out.push_str(&title);
        out_chars += title.chars().count();

        headings.push(HeadingMark {
            level: level as u8,
            offset,
            title,
        });
    }

    (out, headings)
}

/// Visible characters per raw byte, clamped to [0, 1].
pub(crate) fn quality_score(text: &str, raw_len: usize) -> f64 {
    if raw_len == 0 {
        return 0.0;
    }
    let visible = text.chars().filter(|c| !c.is_whitespace()).count();
    (visible as f64 / raw_len as f64).clamp(0.0, 1.0)
}
