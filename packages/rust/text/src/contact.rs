//! Contact-information detection and extraction.
//!
//! Two cheap classifiers gate the extractor: [`is_contact_question`] looks at
//! the user's question, [`has_contact_information`] at the page text. Only
//! when both pass does the caller run [`extract_contact_information`].
//!
//! The classifiers are plain substring matches. They do not handle negation,
//! so "who should I not contact" still counts as a contact question.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use askpage_shared::ContactInfo;

/// Phrases that mark a question as asking for contact details.
const CONTACT_QUESTION_PHRASES: &[&str] = &[
    "contact",
    "phone",
    "email",
    "e-mail",
    "reach out",
    "get in touch",
    "telephone",
    "call them",
    "call us",
    "联系方式",
    "联系信息",
    "如何联系",
    "怎么联系",
    "联系电话",
    "联系邮箱",
    "联系地址",
];

/// Phrases that mark page text as carrying contact details.
const CONTACT_CONTENT_PHRASES: &[&str] = &[
    "contact us",
    "contact information",
    "get in touch",
    "reach us",
    "联系我们",
    "联系方式",
    "联系信息",
];

/// Words that make a sentence worth quoting as contact context.
const CONTACT_SENTENCE_KEYWORDS: &[&str] = &[
    "contact", "support", "help", "phone", "email", "address", "call", "reach", "mailto:", "联系",
];

/// Substrings that identify throwaway or documentation addresses.
const PLACEHOLDER_EMAIL_MARKERS: &[&str] = &["noreply", "example.com", "test.com", "placeholder"];

/// Digit count bounds for a phone candidate, inclusive.
const PHONE_DIGITS_MIN: usize = 7;
const PHONE_DIGITS_MAX: usize = 15;

/// Contact sentences must be strictly longer than this, after trimming.
const SENTENCE_MIN_CHARS: usize = 20;
/// ...and strictly shorter than this.
const SENTENCE_MAX_CHARS: usize = 200;
/// At most this many contact sentences are kept.
const MAX_CONTACT_SENTENCES: usize = 5;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("valid regex")
});

/// North American numbering: optional `+1`, area code with optional parens.
static NANP_PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+?1[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}").expect("valid regex")
});

/// Phone patterns unioned during extraction, NANP first.
static PHONE_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // International with country code: +44 20 7946 0958, +86 (10) 1234-5678
        r"\+\d{1,3}[-.\s]?(?:\(?\d{1,4}\)?[-.\s]?){1,4}\d{1,4}",
        // Dash-grouped: 0800-123-456, 555-123-4567, 555-1234
        r"\b\d{2,4}-\d{3,4}-\d{3,4}\b|\b\d{3,4}-\d{4}\b",
        // Generic grouped digits: 020 7946 0958, 030.1234.5678
        r"\b\d{2,4}(?:[\s.]\d{2,4}){2,4}\b",
    ]
    .into_iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static CONTACT_SENTENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+(?:\s+|$)|\n+").expect("valid regex"));

// ---------------------------------------------------------------------------
// Classifiers
// ---------------------------------------------------------------------------

/// Does the question ask for contact details?
pub fn is_contact_question(question: &str) -> bool {
    let lower = question.to_lowercase();
    CONTACT_QUESTION_PHRASES.iter().any(|p| lower.contains(p))
}

/// Does the content carry an email, a phone number, or a contact phrase?
pub fn has_contact_information(content: &str) -> bool {
    if EMAIL_RE.is_match(content) || NANP_PHONE_RE.is_match(content) {
        return true;
    }

    let lower = content.to_lowercase();
    CONTACT_CONTENT_PHRASES.iter().any(|p| lower.contains(p))
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Pull emails, phone numbers and contact sentences out of `content`.
///
/// The result may be entirely empty; call [`ContactInfo::into_valid`] before
/// treating it as found.
pub fn extract_contact_information(content: &str) -> ContactInfo {
    let info = ContactInfo {
        emails: extract_emails(content).collect(),
        phones: extract_phones(content).into_iter().collect(),
        other: extract_contact_sentences(content),
    };

    debug!(
        emails = info.emails.len(),
        phones = info.phones.len(),
        sentences = info.other.len(),
        "extracted contact information"
    );

    info
}

fn extract_emails(content: &str) -> impl Iterator<Item = String> + '_ {
    EMAIL_RE
        .find_iter(content)
        .map(|m| m.as_str().to_string())
        .filter(|email| !is_placeholder_email(email))
}

fn is_placeholder_email(email: &str) -> bool {
    let lower = email.to_lowercase();
    PLACEHOLDER_EMAIL_MARKERS.iter().any(|m| lower.contains(m))
}

/// Union the phone patterns, keeping the longest of any overlapping matches.
///
/// Digit bounds apply after overlap resolution, so a too-long number is
/// dropped whole rather than surfacing as one of its fragments.
fn extract_phones(content: &str) -> Vec<String> {
    let mut spans: Vec<(usize, usize)> = std::iter::once(&*NANP_PHONE_RE)
        .chain(PHONE_RES.iter())
        .flat_map(|re| re.find_iter(content))
        .map(|m| (m.start(), m.end()))
        .collect();
    spans.sort_by_key(|&(start, end)| (std::cmp::Reverse(end - start), start));

    let mut kept: Vec<(usize, usize)> = Vec::new();
    for (start, end) in spans {
        if kept.iter().all(|&(s, e)| end <= s || start >= e) {
            kept.push((start, end));
        }
    }

    kept.into_iter()
        .map(|(start, end)| content[start..end].trim().to_string())
        .filter(|candidate| {
            let digits = candidate.chars().filter(char::is_ascii_digit).count();
            (PHONE_DIGITS_MIN..=PHONE_DIGITS_MAX).contains(&digits)
        })
        .collect()
}

fn extract_contact_sentences(content: &str) -> Vec<String> {
    CONTACT_SENTENCE_RE
        .split(content)
        .map(str::trim)
        .filter(|sentence| {
            let len = sentence.chars().count();
            len > SENTENCE_MIN_CHARS && len < SENTENCE_MAX_CHARS
        })
        .filter(|sentence| {
            let lower = sentence.to_lowercase();
            CONTACT_SENTENCE_KEYWORDS.iter().any(|k| lower.contains(k))
        })
        .take(MAX_CONTACT_SENTENCES)
        .map(String::from)
        .collect()
}

/// Digits only, for comparing phone numbers written differently.
pub fn phone_digits(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Contact us at jane@company.com or call 555-123-4567.";

    #[test]
    fn contact_question_detection() {
        assert!(is_contact_question("How do I contact support?"));
        assert!(is_contact_question("What's their PHONE number"));
        assert!(is_contact_question("请问联系方式是什么"));
        assert!(!is_contact_question("What is Rust used for?"));
    }

    #[test]
    fn negated_question_still_counts() {
        assert!(is_contact_question("Who should I NOT contact?"));
    }

    #[test]
    fn content_detection_by_email_phone_or_phrase() {
        assert!(has_contact_information("write to someone@somewhere.org"));
        assert!(has_contact_information("dial (555) 123-4567 now"));
        assert!(has_contact_information("Get in touch with the team"));
        assert!(!has_contact_information("Rust is a systems programming language"));
    }

    #[test]
    fn sample_scenario_extracts_email_and_phone() {
        assert!(is_contact_question("How do I contact support?"));
        assert!(has_contact_information(SAMPLE));

        let info = extract_contact_information(SAMPLE);
        assert_eq!(
            info.emails.iter().collect::<Vec<_>>(),
            vec!["jane@company.com"]
        );
        assert!(info.phones.iter().any(|p| phone_digits(p) == "5551234567"));
        assert!(info.into_valid().is_some());
    }

    #[test]
    fn placeholder_emails_are_filtered() {
        let content = "Mail noreply@service.io, docs@example.com, qa@test.com, \
                       placeholder@corp.io or sales@corp.io";
        let info = extract_contact_information(content);
        assert_eq!(info.emails.iter().collect::<Vec<_>>(), vec!["sales@corp.io"]);
    }

    #[test]
    fn emails_are_deduplicated() {
        let content = "a@corp.io and again a@corp.io";
        let info = extract_contact_information(content);
        assert_eq!(info.emails.len(), 1);
    }

    #[test]
    fn phone_patterns_cover_common_formats() {
        let content = "US (555) 123-4567. UK +44 20 7946 0958. Office 0800-123-456. Berlin 030 1234 5678.";
        let info = extract_contact_information(content);
        let digits: Vec<String> = info.phones.iter().map(|p| phone_digits(p)).collect();

        assert!(digits.contains(&"5551234567".to_string()));
        assert!(digits.contains(&"442079460958".to_string()));
        assert!(digits.contains(&"0800123456".to_string()));
        assert!(digits.contains(&"03012345678".to_string()));
    }

    fn phones(content: &str) -> Vec<String> {
        extract_contact_information(content).phones.into_iter().collect()
    }

    #[test]
    fn overlapping_matches_yield_one_number() {
        assert_eq!(phones("UK office +44 20 7946 0958"), vec!["+44 20 7946 0958"]);
        assert_eq!(phones("Call +1 555-123-4567 today for help"), vec!["+1 555-123-4567"]);
        assert_eq!(phones("US line (555) 123-4567"), vec!["(555) 123-4567"]);
    }

    #[test]
    fn too_long_numbers_are_dropped_whole() {
        assert!(phones("dial +123 4567 8901 2345 6 now").is_empty());
        assert!(phones("ref 1234 5678 9012 3456 7890").is_empty());
    }

    #[test]
    fn phone_digit_bounds_are_inclusive() {
        assert_eq!(phones("Dial 555-1234 now"), vec!["555-1234"]);
        assert!(phones("Dial 12 34 56 now").is_empty());
        assert_eq!(phones("Dial +123 4567 8901 2345 now"), vec!["+123 4567 8901 2345"]);
    }

    #[test]
    fn local_seven_digit_numbers_are_found() {
        let info = extract_contact_information("Front desk: 555-1234. Fax 5555-1234.");
        let digits: Vec<String> = info.phones.iter().map(|p| phone_digits(p)).collect();
        assert!(digits.contains(&"5551234".to_string()));
        assert!(digits.contains(&"55551234".to_string()));
    }

    #[test]
    fn contact_sentences_filtered_by_keyword_and_length() {
        let content = "Call us. Our support team answers every weekday morning. \
                       The weather is nice today and tomorrow too. \
                       Email the help desk if your order is late";
        let info = extract_contact_information(content);
        assert_eq!(
            info.other,
            vec![
                "Our support team answers every weekday morning",
                "Email the help desk if your order is late",
            ]
        );
    }

    #[test]
    fn contact_sentence_length_bounds_are_exclusive() {
        let sentence = |len: usize| format!("contact {}", "x".repeat(len - "contact ".len()));
        let content = [20, 21, 199, 200]
            .into_iter()
            .map(sentence)
            .collect::<Vec<_>>()
            .join(". ");
        let info = extract_contact_information(&content);
        let lengths: Vec<usize> = info.other.iter().map(|s| s.chars().count()).collect();
        assert_eq!(lengths, vec![21, 199]);
    }

    #[test]
    fn contact_sentences_capped_at_five() {
        let content = (1..=8)
            .map(|i| format!("Contact office number {i} during business hours"))
            .collect::<Vec<_>>()
            .join(". ");
        let info = extract_contact_information(&content);
        assert_eq!(info.other.len(), MAX_CONTACT_SENTENCES);
        assert!(info.other[0].contains("number 1"));
    }

    #[test]
    fn nothing_found_is_invalid() {
        let info = extract_contact_information("Plain prose with no details whatsoever");
        assert!(!info.is_valid());
        assert!(info.into_valid().is_none());
    }
}
