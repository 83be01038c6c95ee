//! ISBN candidates smuggled into quotes via the `kscrib:` directive
//!
//! A reader without usable book metadata writes a note such as
//! `kscrib: ISBN 978-0-81-257558-3`, or highlights the ISBN on the copyright
//! page and attaches a `kscrib:` note to it.

use regex::Regex;
use std::sync::LazyLock;

use crate::store::QuoteKind;

pub const DIRECTIVE_MARKER: &str = "kscrib:";

/// Normalized candidates longer than this are prose, not an ISBN
pub const MAX_CANDIDATE_LEN: usize = 55;

// Tried at each position before single-character stripping. Longer tokens
// first so "ebook" is not eaten as "e" + "book".
const NOISE_TOKENS: [&str; 6] = ["electronic", "e-book", "ebook", DIRECTIVE_MARKER, "isbn", "book"];

static ISBN13_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"97[89][0-9]{10}").expect("valid ISBN-13 pattern"));
static ISBN10_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]{9}[0-9x]").expect("valid ISBN-10 pattern"));

/// Whether an annotation carries the directive marker (case-insensitive)
pub fn has_directive(annotation: Option<&str>) -> bool {
    annotation
        .map(|a| a.to_lowercase().contains(DIRECTIVE_MARKER))
        .unwrap_or(false)
}

/// Lowercase and strip everything that commonly surrounds a printed ISBN
pub fn normalize(raw: &str) -> String {
    let lower = raw.to_lowercase();
    let mut out = String::with_capacity(lower.len());
    let mut rest = lower.as_str();

    'scan: while let Some(c) = rest.chars().next() {
        for token in NOISE_TOKENS {
            if let Some(after) = rest.strip_prefix(token) {
                rest = after;
                continue 'scan;
            }
        }
        if !(c.is_whitespace() || c == '-' || c == '(' || c == ')') {
            out.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }

    out
}

/// First ISBN-looking run in a normalized string, ISBN-13 before ISBN-10
pub fn match_isbn(normalized: &str) -> Option<&str> {
    ISBN13_RE
        .find(normalized)
        .or_else(|| ISBN10_RE.find(normalized))
        .map(|m| m.as_str())
}

/// Raw ISBN candidate carried by one quote, if any.
///
/// Notes are scanned on their annotation, highlights on the highlighted text.
/// The result still has to pass [`crate::isbn::Isbn::parse`].
pub fn candidate_from_quote(
    kind: QuoteKind,
    text: &str,
    annotation: Option<&str>,
) -> Option<String> {
    if !has_directive(annotation) {
        return None;
    }

    let field = match kind {
        QuoteKind::Note => annotation.unwrap_or_default(),
        QuoteKind::Highlight => text,
    };

    let normalized = normalize(field.trim());
    if normalized.len() > MAX_CANDIDATE_LEN {
        return None;
    }

    match_isbn(&normalized).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_directive_with_hyphenated_isbn13() {
        let candidate = candidate_from_quote(
            QuoteKind::Note,
            "some highlighted passage",
            Some("kscrib: ISBN 978-0-81-257558-3"),
        );
        assert_eq!(candidate.as_deref(), Some("9780812575583"));
    }

    #[test]
    fn test_highlight_directive_scans_text() {
        let candidate =
            candidate_from_quote(QuoteKind::Highlight, "081257558X", Some("kscrib:081257558X"));
        assert_eq!(candidate.as_deref(), Some("081257558x"));
    }

    #[test]
    fn test_marker_is_case_insensitive() {
        let candidate =
            candidate_from_quote(QuoteKind::Note, "", Some("KSCRIB: 978-0-81-257558-3"));
        assert_eq!(candidate.as_deref(), Some("9780812575583"));
    }

    #[test]
    fn test_no_directive_no_candidate() {
        let candidate = candidate_from_quote(QuoteKind::Highlight, "9780812575583", None);
        assert_eq!(candidate, None);

        let candidate =
            candidate_from_quote(QuoteKind::Highlight, "9780812575583", Some("nice page"));
        assert_eq!(candidate, None);
    }

    #[test]
    fn test_long_prose_is_rejected() {
        let text = "It was the best of times, it was the worst of times, it was 9780812575583";
        assert!(normalize(text).len() > MAX_CANDIDATE_LEN);
        assert_eq!(
            candidate_from_quote(QuoteKind::Highlight, text, Some("kscrib:")),
            None
        );
    }

    #[test]
    fn test_normalize_strips_noise_tokens() {
        assert_eq!(normalize("ISBN (e-book) 978-0-81-257558-3"), "9780812575583");
        assert_eq!(normalize("Electronic Book ISBN: 0-8125-7558-X"), ":081257558x");
        assert_eq!(normalize("eBook 9780812575583"), "9780812575583");
    }

    #[test]
    fn test_isbn13_preferred_over_isbn10() {
        assert_eq!(match_isbn("x9780812575583"), Some("9780812575583"));
        assert_eq!(match_isbn("isbn:081257558x"), Some("081257558x"));
        assert_eq!(match_isbn("no digits here"), None);
    }
}
