//! Pagination invariants over generated text.

use folio::paginate::{PageBudget, paginate};
use proptest::prelude::*;

const BUDGET: PageBudget = PageBudget {
    target: 600,
    min: 200,
    max: 900,
};

/// Join generated words into sentences and paragraphs of ordinary shape.
fn build_text(paragraphs: &[Vec<String>]) -> String {
    paragraphs
        .iter()
        .map(|words| {
            words
                .chunks(8)
                .map(|sentence| format!("{}.", sentence.join(" ")))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn non_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

proptest! {
    #[test]
    fn pages_respect_character_budgets(
        paragraphs in prop::collection::vec(
            prop::collection::vec("[a-z]{1,10}", 3..40),
            1..30,
        )
    ) {
        let text = build_text(&paragraphs);
        let pages = paginate(&text, &BUDGET, true);

        prop_assert!(!pages.is_empty());
        for (index, page) in pages.iter().enumerate() {
            let chars = page.chars().count();
            prop_assert!(chars <= BUDGET.max, "page {} has {} chars", index, chars);
            prop_assert!(!page.trim().is_empty());
        }
        // Every page except the resource's last honors the minimum, given
        // ordinary sentence lengths.
        if text.chars().count() > BUDGET.min {
            for page in &pages[..pages.len() - 1] {
                prop_assert!(page.chars().count() >= BUDGET.min);
            }
        }
    }

    #[test]
    fn pagination_preserves_content(
        paragraphs in prop::collection::vec(
            prop::collection::vec("[a-z]{1,10}", 3..40),
            1..20,
        )
    ) {
        let text = build_text(&paragraphs);
        let pages = paginate(&text, &BUDGET, true);

        let joined = pages.join(" ");
        prop_assert_eq!(non_whitespace(&joined), non_whitespace(&text));
    }

    #[test]
    fn pagination_is_deterministic(
        paragraphs in prop::collection::vec(
            prop::collection::vec("[a-z]{1,10}", 3..30),
            1..20,
        )
    ) {
        let text = build_text(&paragraphs);
        prop_assert_eq!(
            paginate(&text, &BUDGET, true),
            paginate(&text, &BUDGET, true)
        );
    }

    #[test]
    fn sentence_mode_also_respects_budgets(
        words in prop::collection::vec("[a-z]{1,10}", 10..300)
    ) {
        let text = words
            .chunks(6)
            .map(|sentence| format!("{}.", sentence.join(" ")))
            .collect::<Vec<_>>()
            .join(" ");
        let pages = paginate(&text, &BUDGET, false);

        for page in &pages {
            prop_assert!(page.chars().count() <= BUDGET.max);
        }
    }
}

#[test]
fn forced_breaks_cover_unpunctuated_text_exactly() {
    let text = "x".repeat(10_000);
    let pages = paginate(&text, &BUDGET, true);

    assert_eq!(pages.len(), 10_000usize.div_ceil(BUDGET.max));
    assert_eq!(
        pages.iter().map(|p| p.chars().count()).sum::<usize>(),
        10_000
    );
    for page in &pages {
        assert!(page.chars().count() <= BUDGET.max);
    }
}

#[test]
fn short_input_is_one_page() {
    let pages = paginate("Just a line.", &BUDGET, true);
    assert_eq!(pages, vec!["Just a line."]);
}

#[test]
fn whitespace_only_input_has_no_pages() {
    assert!(paginate(" \n \n\n ", &BUDGET, true).is_empty());
}
