//! Markup stripping for pages retrieved over plain HTTP.

use std::sync::LazyLock;

use regex::Regex;

/// Reduce an HTML document to its visible text.
///
/// `<script>` and `<style>` blocks go entirely, every other tag becomes a
/// space, the common entities are unescaped and whitespace is collapsed.
pub fn strip_markup(html: &str) -> String {
    static SCRIPT_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("valid regex"));
    static STYLE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("valid regex"));
    static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
    static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

    let text = SCRIPT_RE.replace_all(html, "");
    let text = STYLE_RE.replace_all(&text, "");
    let text = TAG_RE.replace_all(&text, " ");
    let text = unescape_entities(&text);

    WS_RE.replace_all(&text, " ").trim().to_string()
}

/// Unescape the handful of entities that matter for plain text.
///
/// `&amp;` goes last so `&amp;lt;` decodes to `&lt;`, not `<`.
fn unescape_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
