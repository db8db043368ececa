use regex::Regex;
use std::sync::LazyLock;

use crate::error::MatchError;

/// One entry of the payload pattern table. Group 1 captures the payload.
pub struct PayloadPattern {
    pub tag: &'static str,
    pub regex: LazyLock<Regex>,
}

/// Tried in order, most specific first; the bare `%PDF` signature is the catch-all.
pub static PATTERNS: [PayloadPattern; 4] = [
    PayloadPattern {
        tag: "declaration",
        regex: LazyLock::new(|| {
            Regex::new(r#"(?:var|let|const)\s+pdfData\s*=\s*["']([^"']+)["']"#).unwrap()
        }),
    },
    PayloadPattern {
        tag: "assignment",
        regex: LazyLock::new(|| Regex::new(r#"pdfData\s*=\s*["']([^"']+)["']"#).unwrap()),
    },
    PayloadPattern {
        tag: "data_uri",
        regex: LazyLock::new(|| {
            Regex::new(r#"["']data:application/pdf;base64,([^"']+)["']"#).unwrap()
        }),
    },
    PayloadPattern {
        tag: "pdf_signature",
        regex: LazyLock::new(|| Regex::new(r#"["'](JVBERi[^"']+)["']"#).unwrap()),
    },
];

/// A payload found in page text, borrowed from the text it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadMatch<'a> {
    pub tag: &'static str,
    pub payload: &'a str,
}

/// Scan `text` for an embedded base64 PDF. First pattern in [`PATTERNS`] to match wins.
pub fn find_payload(text: &str) -> Result<PayloadMatch<'_>, MatchError> {
    PATTERNS
        .iter()
        .find_map(|p| {
            let payload = p.regex.captures(text)?.get(1)?.as_str();
            Some(PayloadMatch { tag: p.tag, payload })
        })
        .ok_or(MatchError::NotFound)
}

// ── Tests ──
