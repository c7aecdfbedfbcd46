//! Content normalization: whitespace, sentence dedup, bounded truncation.
//!
//! Each pass is a function `&str -> String` applied in sequence, like the
//! cleanup passes used for Markdown. The whole pipeline is total: any input
//! produces a (possibly empty) string.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// Default maximum length of processed content, in characters.
pub const DEFAULT_MAX_LENGTH: usize = 4000;

/// Appended when content is hard-truncated mid-sentence.
pub const ELLIPSIS: &str = "...";

/// Fragments this short (after trimming) are dropped as noise.
const MIN_SENTENCE_CHARS: usize = 10;

/// A sentence-ending cut must land past this fraction of the max length.
const SENTENCE_CUT_RATIO: f64 = 0.7;

/// Normalize, deduplicate and truncate raw page text.
pub fn process(raw: &str, max_length: usize) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }

    let mut result = normalize_whitespace(raw);
    result = dedupe_sentences(&result);
    result = truncate_at_sentence(&result, max_length);

    result
}

/// Split text into trimmed, non-empty sentences.
///
/// A run of `.`, `!` or `?` ends a sentence only when followed by whitespace
/// or the end of input, so addresses like `jane@company.com`, decimals and
/// URLs stay intact.
pub fn split_sentences(text: &str) -> impl Iterator<Item = &str> {
    static TERMINATOR_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[.!?]+(?:\s+|$)").expect("valid regex"));

    TERMINATOR_RE
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Pass 1: Normalize whitespace
// ---------------------------------------------------------------------------

/// CRLF → LF, tabs → spaces, then collapse every whitespace run to one space.
fn normalize_whitespace(text: &str) -> String {
    static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

    let text = text.replace("\r\n", "\n").replace('\t', " ");
    WS_RE.replace_all(&text, " ").trim().to_string()
}

// ---------------------------------------------------------------------------
// Pass 2: Deduplicate sentences
// ---------------------------------------------------------------------------

/// Drop short fragments and exact duplicates, keeping first-seen order.
fn dedupe_sentences(text: &str) -> String {
    let mut seen: HashSet<&str> = HashSet::new();

    split_sentences(text)
        .filter(|s| s.chars().count() > MIN_SENTENCE_CHARS)
        .filter(|s| seen.insert(*s))
        .collect::<Vec<_>>()
        .join(". ")
}

// ---------------------------------------------------------------------------
// Pass 3: Truncate
// ---------------------------------------------------------------------------

/// Cut to `max_length` characters, preferring the last sentence end past 70%.
fn truncate_at_sentence(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        return text.to_string();
    }

    let cut = text
        .char_indices()
        .nth(max_length)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let truncated = &text[..cut];

    if let Some(end) = truncated.rfind(['.', '!', '?']) {
        let end_chars = truncated[..end].chars().count();
        if end_chars as f64 > max_length as f64 * SENTENCE_CUT_RATIO {
            // Terminators are ASCII, so `end + 1` is a char boundary.
            return truncated[..end + 1].to_string();
        }
    }

    format!("{truncated}{ELLIPSIS}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(process("", DEFAULT_MAX_LENGTH), "");
        assert_eq!(process(" \n\t ", DEFAULT_MAX_LENGTH), "");
    }

    #[test]
    fn normalize_whitespace_collapses_runs() {
        let input = "Line one\r\nline\ttwo   and\n\nthree";
        assert_eq!(normalize_whitespace(input), "Line one line two and three");
    }

    #[test]
    fn dedupe_drops_short_fragments_and_duplicates() {
        let input = "Rust is a systems language. Ok. Rust is a systems language! It has no garbage collector.";
        assert_eq!(
            dedupe_sentences(input),
            "Rust is a systems language. It has no garbage collector"
        );
    }

    #[test]
    fn fragment_length_boundary() {
        assert_eq!(dedupe_sentences("abcdefghij. abcdefghijk."), "abcdefghijk");
    }

    #[test]
    fn sentence_split_keeps_emails_and_decimals() {
        let sentences: Vec<_> =
            split_sentences("Write to jane@company.com today. Version 1.5 shipped!").collect();
        assert_eq!(
            sentences,
            vec!["Write to jane@company.com today", "Version 1.5 shipped"]
        );
    }

    #[test]
    fn short_content_is_unchanged_by_truncation() {
        let text = "Short enough to keep as is";
        assert_eq!(truncate_at_sentence(text, 100), text);
    }

    #[test]
    fn content_of_exactly_max_length_is_kept() {
        let text = "a".repeat(100);
        assert_eq!(truncate_at_sentence(&text, 100), text);
        assert_eq!(
            truncate_at_sentence(&"a".repeat(101), 100),
            format!("{}{ELLIPSIS}", "a".repeat(100))
        );
    }

    #[test]
    fn sentence_end_at_exactly_seventy_percent_hard_cuts() {
        let text = format!("{}.{}", "a".repeat(70), "b".repeat(200));
        let result = truncate_at_sentence(&text, 100);
        assert!(result.ends_with(ELLIPSIS));
        assert_eq!(result.chars().count(), 100 + ELLIPSIS.len());

        let text = format!("{}.{}", "a".repeat(71), "b".repeat(200));
        assert_eq!(truncate_at_sentence(&text, 100), format!("{}.", "a".repeat(71)));
    }

    #[test]
    fn truncation_prefers_late_sentence_end() {
        // Sentence end at char 85 of a 100-char window: past the 70% mark.
        let text = format!("{}. {}", "a".repeat(85), "b".repeat(100));
        let result = truncate_at_sentence(&text, 100);
        assert_eq!(result, format!("{}.", "a".repeat(85)));
    }

    #[test]
    fn truncation_hard_cuts_when_sentence_end_is_early() {
        let text = format!("{}. {}", "a".repeat(20), "b".repeat(200));
        let result = truncate_at_sentence(&text, 100);
        assert!(result.ends_with(ELLIPSIS));
        assert_eq!(result.chars().count(), 100 + ELLIPSIS.len());
    }

    #[test]
    fn truncation_respects_multibyte_boundaries() {
        let text = "联系我们获取更多信息".repeat(50);
        let result = truncate_at_sentence(&text, 30);
        assert_eq!(result.chars().count(), 30 + ELLIPSIS.len());
    }

    #[test]
    fn output_never_exceeds_bound() {
        let text = "The quick brown fox jumps over the lazy dog again and again. ".repeat(40);
        for max in [50, 120, 333, 1000] {
            let result = process(&text, max);
            assert!(result.chars().count() <= max + ELLIPSIS.len(), "max={max}");
        }
    }

    #[test]
    fn process_is_idempotent_within_bounds() {
        let input = "First sentence is here.  Second   sentence follows!\tFirst sentence is here? Tiny. Last one without a stop";
        let once = process(input, DEFAULT_MAX_LENGTH);
        let twice = process(&once, DEFAULT_MAX_LENGTH);
        assert_eq!(once, twice);
        assert_eq!(
            once,
            "First sentence is here. Second sentence follows. Last one without a stop"
        );
    }
}
