//! Adaptive pagination under character budgets.
//!
//! Splits normalized text into pages, preferring larger semantic breaks:
//! whole paragraphs, then sentences within an oversized paragraph, then a
//! forced character break as the last resort. Budgets are counted in
//! characters; the produced boundaries are deterministic for a given input
//! and configuration.

use std::mem;

use crate::config::ParseConfig;

/// Character budgets for one page.
#[derive(Debug, Clone, Copy)]
pub struct PageBudget {
    /// Preferred page size.
    pub target: usize,
    /// Lower bound for every page except the last of a resource.
    pub min: usize,
    /// Hard upper bound for every page.
    pub max: usize,
}

impl From<&ParseConfig> for PageBudget {
    fn from(config: &ParseConfig) -> Self {
        Self {
            target: config.target_chars_per_page,
            min: config.min_chars_per_page,
            max: config.max_chars_per_page,
        }
    }
}

/// Split one resource's text into pages.
pub fn paginate(text: &str, budget: &PageBudget, preserve_paragraphs: bool) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed.chars().count() <= budget.min {
        return vec![trimmed.to_string()];
    }

    let mut paginator = Paginator::new(*budget);
    if preserve_paragraphs {
        for paragraph in split_paragraphs(trimmed) {
            paginator.add_paragraph(paragraph);
        }
    } else {
        for sentence in split_sentences(trimmed) {
            paginator.add_sentence(sentence, " ");
        }
    }
    paginator.finish()
}

/// Local page index containing a character offset into the resource text.
///
/// Page boundaries drop separators, so the cumulative counts slightly
/// undershoot raw offsets; chapter mapping only needs the right
/// neighborhood, which the merge tolerance already absorbs.
pub(crate) fn page_index_for_offset(pages: &[String], offset: usize) -> usize {
    let mut cumulative = 0;
    for (index, page) in pages.iter().enumerate() {
        cumulative += page.chars().count();
        if offset < cumulative {
            return index;
        }
    }
    pages.len().saturating_sub(1)
}

struct Paginator {
    budget: PageBudget,
    pages: Vec<String>,
    current: String,
    current_chars: usize,
}

impl Paginator {
    fn new(budget: PageBudget) -> Self {
        Self {
            budget,
            pages: Vec::new(),
            current: String::new(),
            current_chars: 0,
        }
    }

    fn add_paragraph(&mut self, paragraph: &str) {
        let chars = paragraph.chars().count();
        if chars > self.budget.max {
            // The paragraph alone exceeds the hard maximum: fall through
            // to sentence accumulation for this paragraph only.
            let mut sep = "\n\n";
            for sentence in split_sentences(paragraph) {
                self.add_sentence(sentence, sep);
                sep = " ";
            }
            return;
        }
        self.accumulate(paragraph, chars, "\n\n", true);
    }

    fn add_sentence(&mut self, sentence: &str, sep: &str) {
        let chars = sentence.chars().count();
        if chars > self.budget.max {
            self.hard_break(sentence);
            return;
        }
        self.accumulate(sentence, chars, sep, false);
    }

    fn accumulate(&mut self, unit: &str, chars: usize, sep: &str, is_paragraph: bool) {
        let sep_chars = if self.current_chars == 0 {
            0
        } else {
            sep.chars().count()
        };

        if self.current_chars + sep_chars + chars <= self.budget.target {
            self.append(unit, chars, sep);
            return;
        }

        if self.current_chars >= self.budget.min {
            self.flush();
            self.append(unit, chars, "");
            return;
        }

        // The open page is still below the minimum; overshoot the target
        // as long as the hard maximum holds.
        if self.current_chars + sep_chars + chars <= self.budget.max {
            self.append(unit, chars, sep);
            if self.current_chars >= self.budget.target {
                self.flush();
            }
            return;
        }

        if is_paragraph {
            let mut sentence_sep = sep;
            for sentence in split_sentences(unit) {
                self.add_sentence(sentence, sentence_sep);
                sentence_sep = " ";
            }
            return;
        }

        // A sentence that neither fits nor can be postponed: close the
        // short page; the merge pass in finish() repairs it when possible.
        self.flush();
        self.append(unit, chars, "");
    }

    /// Forced character break, the only split permitted mid-word. The open
    /// page is filled to the hard maximum first so no short page gets
    /// stranded in front of the chunk run.
    fn hard_break(&mut self, sentence: &str) {
        let mut chars = sentence.chars();
        if self.current_chars > 0 {
            if self.current_chars + 1 < self.budget.max {
                self.current.push(' ');
                self.current_chars += 1;
                while self.current_chars < self.budget.max {
                    match chars.next() {
                        Some(c) => {
                            self.current.push(c);
                            self.current_chars += 1;
                        }
                        None => break,
                    }
                }
            }
            self.flush();
        }

        let rest: String = chars.collect();
        let chunks = hard_chunks(&rest, self.budget.max);
        let last = chunks.len().saturating_sub(1);
        for (index, chunk) in chunks.into_iter().enumerate() {
            if index == last {
                self.current_chars = chunk.chars().count();
                self.current = chunk;
            } else {
                self.pages.push(chunk);
            }
        }
    }

    fn append(&mut self, unit: &str, chars: usize, sep: &str) {
        if self.current_chars > 0 {
            self.current.push_str(sep);
            self.current_chars += sep.chars().count();
        }
        self.current.push_str(unit);
        self.current_chars += chars;
    }

    fn flush(&mut self) {
        if self.current_chars > 0 {
            self.pages.push(mem::take(&mut self.current));
            self.current_chars = 0;
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();

        // Repair pass: merge a below-minimum page into its successor when
        // the combined page still honors the hard maximum.
        let mut merged: Vec<String> = Vec::with_capacity(self.pages.len());
        for page in self.pages {
            if let Some(last) = merged.last_mut() {
                let last_chars = last.chars().count();
                if last_chars < self.budget.min
                    && last_chars + 2 + page.chars().count() <= self.budget.max
                {
                    last.push_str("\n\n");
                    last.push_str(&page);
                    continue;
                }
            }
            merged.push(page);
        }
        merged
    }
}

/// Split normalized text on blank-line paragraph separators.
pub(crate) fn split_paragraphs(text: &str) -> impl Iterator<Item = &str> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
}

/// Split text on sentence boundaries: terminator punctuation, optional
/// closing quotes/brackets, then whitespace.
pub(crate) fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut at_terminator = false;

    for (idx, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?' | '…') {
            at_terminator = true;
            continue;
        }
        if at_terminator {
            if matches!(c, '"' | '\'' | ')' | ']' | '\u{201D}' | '\u{2019}' | '»') {
                continue;
            }
            if c.is_whitespace() {
                let sentence = text[start..idx].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                start = idx + c.len_utf8();
                at_terminator = false;
                continue;
            }
        }
        at_terminator = false;
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

fn hard_chunks(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;
    for c in text.chars() {
        current.push(c);
        count += 1;
        if count == max {
            chunks.push(mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(min: usize, target: usize, max: usize) -> PageBudget {
        PageBudget { target, min, max }
    }

    #[test]
    fn short_text_is_a_single_page() {
        let pages = paginate("A short chapter.", &budget(500, 1500, 2400), true);
        assert_eq!(pages, vec!["A short chapter."]);
    }

    #[test]
    fn empty_text_yields_no_pages() {
        assert!(paginate("  \n\n ", &budget(500, 1500, 2400), true).is_empty());
    }

    #[test]
    fn paragraphs_accumulate_under_target() {
        let para = "word ".repeat(60).trim().to_string(); // ~300 chars
        let text = vec![para.clone(); 10].join("\n\n"); // ~3000 chars
        let pages = paginate(&text, &budget(200, 700, 1000), true);

        assert!(pages.len() > 1);
        for page in &pages {
            assert!(page.chars().count() <= 1000, "page exceeds max");
        }
        for page in &pages[..pages.len() - 1] {
            assert!(page.chars().count() >= 200, "non-final page below min");
        }
        // Paragraph boundaries survive inside pages.
        assert!(pages[0].contains("\n\n"));
    }

    #[test]
    fn oversized_paragraph_splits_on_sentences() {
        let sentence = format!("{}.", "x".repeat(99)); // 100 chars each
        let para = vec![sentence.clone(); 30].join(" "); // ~3030 chars, one paragraph
        let pages = paginate(&para, &budget(200, 700, 1000), true);

        assert!(pages.len() >= 3);
        for page in &pages {
            assert!(page.chars().count() <= 1000);
            // No sentence was torn apart.
            assert!(page.trim_end().ends_with('.'));
        }
    }

    #[test]
    fn unpunctuated_run_forces_hard_breaks() {
        let text = "a".repeat(50_000);
        let pages = paginate(&text, &budget(500, 1800, 2000), true);

        assert_eq!(pages.len(), 50_000usize.div_ceil(2000));
        for page in &pages {
            assert!(page.chars().count() <= 2000);
        }
        assert_eq!(pages.iter().map(|p| p.chars().count()).sum::<usize>(), 50_000);
    }

    #[test]
    fn pagination_is_deterministic() {
        let text = "The quick brown fox. ".repeat(500);
        let b = budget(300, 900, 1200);
        assert_eq!(paginate(&text, &b, true), paginate(&text, &b, true));
    }

    #[test]
    fn sentence_mode_ignores_paragraph_boundaries() {
        let text = "One sentence here.\n\nAnother sentence there.".repeat(40);
        let pages = paginate(&text, &budget(100, 300, 500), false);
        for page in &pages {
            assert!(page.chars().count() <= 500);
            assert!(!page.contains("\n\n"));
        }
    }

    #[test]
    fn split_sentences_handles_quotes_and_ellipses() {
        let sentences = split_sentences(r#"He said "stop." She left… Then what? The end."#);
        assert_eq!(
            sentences,
            vec![r#"He said "stop.""#, "She left…", "Then what?", "The end."]
        );
    }

    #[test]
    fn split_sentences_without_punctuation_is_one_sentence() {
        assert_eq!(split_sentences("no punctuation at all"), vec!["no punctuation at all"]);
    }

    #[test]
    fn page_index_for_offset_walks_pages() {
        let pages = vec!["a".repeat(100), "b".repeat(100), "c".repeat(50)];
        assert_eq!(page_index_for_offset(&pages, 0), 0);
        assert_eq!(page_index_for_offset(&pages, 99), 0);
        assert_eq!(page_index_for_offset(&pages, 100), 1);
        assert_eq!(page_index_for_offset(&pages, 240), 2);
        assert_eq!(page_index_for_offset(&pages, 10_000), 2);
    }
}
