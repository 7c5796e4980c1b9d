//! Pagination utilities.
//!
//! A page is a blank-line delimited block of the document text. Pages are a
//! derived projection of `Document::content` and are recomputed whenever the
//! content changes; nothing here is persisted.

use crate::text_utils::segment_into_phrases;
use once_cell::sync::Lazy;
use regex::Regex;

/// Two or more consecutive newlines, tolerating CRLF line endings.
static RE_PAGE_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\r?\n){2,}").expect("page break pattern is valid"));

/// One page of the document together with its phrases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub index: usize,
    pub text: String,
    pub phrases: Vec<String>,
}

impl Page {
    fn new(index: usize, text: String) -> Self {
        let phrases = segment_into_phrases(&text);
        Self {
            index,
            text,
            phrases,
        }
    }

    pub fn phrase_count(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Split the provided text into pages of phrases.
///
/// Always returns at least one page; empty or whitespace-only text yields a
/// single empty page.
pub fn paginate(text: &str) -> Vec<Page> {
    split_pages(text)
        .into_iter()
        .enumerate()
        .map(|(index, text)| Page::new(index, text))
        .collect()
}

/// Split text into trimmed, non-empty page blocks.
pub fn split_pages(text: &str) -> Vec<String> {
    let pages: Vec<String> = RE_PAGE_BREAK
        .split(text)
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(str::to_string)
        .collect();

    if pages.is_empty() {
        return vec![String::new()];
    }
    pages
}

pub fn total_phrases(pages: &[Page]) -> usize {
    pages.iter().map(Page::phrase_count).sum()
}

pub fn is_blank_document(pages: &[Page]) -> bool {
    pages.iter().all(Page::is_blank)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_example_document_into_pages_and_phrases() {
        let pages = paginate("Hello world. Bye now.\n\nSecond page here.");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].text, "Hello world. Bye now.");
        assert_eq!(pages[1].text, "Second page here.");
        assert_eq!(pages[0].phrases, vec!["Hello world.", "Bye now."]);
        assert_eq!(pages[1].phrases, vec!["Second page here."]);
        assert_eq!(pages[1].index, 1);
    }

    #[test]
    fn empty_text_yields_single_empty_page() {
        for text in ["", "   ", "\n\n\n", " \t \n"] {
            let pages = paginate(text);
            assert_eq!(pages.len(), 1, "input {text:?}");
            assert_eq!(pages[0].text, "");
            assert!(is_blank_document(&pages));
        }
    }

    #[test]
    fn keeps_block_order_and_drops_empty_blocks() {
        let text = "\n\nfirst\n\n\n\nsecond\nstill second\n\n  \n\nthird\n";
        let pages = split_pages(text);
        assert_eq!(pages, vec!["first", "second\nstill second", "third"]);
    }

    #[test]
    fn single_newline_does_not_break_pages() {
        assert_eq!(split_pages("a\nb"), vec!["a\nb"]);
    }

    #[test]
    fn crlf_blank_lines_break_pages() {
        assert_eq!(split_pages("one\r\n\r\ntwo"), vec!["one", "two"]);
    }

    #[test]
    fn n_blocks_give_n_pages() {
        for n in 1..6 {
            let text = (0..n)
                .map(|i| format!("Block {i} text."))
                .collect::<Vec<_>>()
                .join("\n\n");
            let pages = paginate(&text);
            assert_eq!(pages.len(), n);
            for (i, page) in pages.iter().enumerate() {
                assert_eq!(page.text, format!("Block {i} text."));
            }
        }
    }

    #[test]
    fn pagination_is_idempotent() {
        let text = "One. Two! Three?\n\nFour: five; six\nseven.\n\n\nEight";
        assert_eq!(paginate(text), paginate(text));
        assert_eq!(total_phrases(&paginate(text)), 8);
    }
}
