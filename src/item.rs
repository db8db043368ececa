use chrono::Local;
use tracing::warn;
use url::Url;

use crate::error::ValidationError;

/// Query parameter that carries the book identity.
const BOOK_ID_PARAM: &str = "e";

/// Where an [`ItemId`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdOrigin {
    /// Taken verbatim from the URL; stable across runs.
    QueryParam,
    /// Generated from the clock because the URL carried no id. Not reproducible.
    Timestamp,
}

/// Stable key for every artifact written for one book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemId {
    value: String,
    origin: IdOrigin,
}

impl ItemId {
    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn origin(&self) -> IdOrigin {
        self.origin
    }

    pub fn is_reproducible(&self) -> bool {
        self.origin == IdOrigin::QueryParam
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

/// Check that `raw` points at a book page of the library. Performs no network I/O.
pub fn validate_url(raw: &str, host: &str, book_path: &str) -> Result<Url, ValidationError> {
    let url = Url::parse(raw)?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ValidationError::UnsupportedScheme(url.scheme().to_string()));
    }
    let found = url.host_str().unwrap_or_default();
    if !host_matches(found, host) {
        return Err(ValidationError::WrongHost {
            expected: host.to_string(),
            found: found.to_string(),
        });
    }
    if !url.path().contains(book_path) {
        return Err(ValidationError::MissingBookPath(book_path.to_string()));
    }
    Ok(url)
}

/// The library host itself or one of its subdomains (`www.library.alkafeel.net`).
fn host_matches(found: &str, host: &str) -> bool {
    let found = found.to_ascii_lowercase();
    let host = host.to_ascii_lowercase();
    found == host
        || found
            .strip_suffix(&host)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Raw text of the first `e=` pair, without percent or form decoding.
fn raw_query_value<'a>(url: &'a Url, key: &str) -> Option<&'a str> {
    url.query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix(key)?.strip_prefix('='))
}

/// Ids become file names under the output directory, so they must stay one path component.
fn is_safe_file_stem(id: &str) -> bool {
    !id.contains(['/', '\\']) && !id.contains("..") && !id.chars().any(char::is_control)
}

/// Book id from the `e` query parameter, or a timestamp-based fallback.
///
/// The parameter is taken as written in the URL, so `a+b%20c` stays `a+b%20c`.
pub fn derive_item_id(url: &Url) -> Result<ItemId, ValidationError> {
    let from_query = raw_query_value(url, BOOK_ID_PARAM).filter(|v| !v.is_empty());

    if let Some(value) = from_query.filter(|v| !is_safe_file_stem(v)) {
        return Err(ValidationError::UnsafeBookId(value.to_string()));
    }

    Ok(match from_query {
        Some(value) => ItemId {
            value: value.to_string(),
            origin: IdOrigin::QueryParam,
        },
        None => {
            let value = format!("book_{}", Local::now().format("%Y%m%d_%H%M%S"));
            warn!(
                "No '{}' parameter in {}, using non-reproducible id {}",
                BOOK_ID_PARAM, url, value
            );
            ItemId {
                value,
                origin: IdOrigin::Timestamp,
            }
        }
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: &str = "library.alkafeel.net";
    const BOOK: &str = "/dic/book/";

    fn validate(raw: &str) -> Result<Url, ValidationError> {
        validate_url(raw, HOST, BOOK)
    }

    #[test]
    fn valid_urls() {
        for raw in [
            "https://library.alkafeel.net/dic/book/?e=38c15-44c77-06464-07b96-de2b7-82795-3b",
            "https://library.alkafeel.net/dic/book/?e=test-id&other=param",
            "http://LIBRARY.alkafeel.net/ar/dic/book/index?e=x",
        ] {
            assert!(validate(raw).is_ok(), "{} should be valid", raw);
        }
    }

    #[test]
    fn invalid_urls() {
        assert!(matches!(
            validate("https://google.com"),
            Err(ValidationError::WrongHost { .. })
        ));
        assert!(matches!(
            validate("https://library.alkafeel.net/other/path"),
            Err(ValidationError::MissingBookPath(_))
        ));
        assert!(matches!(
            validate("not-a-url"),
            Err(ValidationError::Malformed(_))
        ));
        assert!(matches!(
            validate("https://other-site.net/dic/book/?e=test"),
            Err(ValidationError::WrongHost { .. })
        ));
        assert!(matches!(
            validate("ftp://library.alkafeel.net/dic/book/?e=test"),
            Err(ValidationError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn lookalike_host_rejected() {
        for raw in [
            "https://library.alkafeel.net.evil.example/dic/book/?e=1",
            "https://evillibrary.alkafeel.net/dic/book/?e=1",
            "https://alkafeel.net/dic/book/?e=1",
        ] {
            assert!(
                matches!(validate(raw), Err(ValidationError::WrongHost { .. })),
                "{} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn library_subdomains_accepted() {
        for raw in [
            "https://www.library.alkafeel.net/dic/book/?e=1",
            "https://WWW.Library.Alkafeel.net/dic/book/?e=1",
        ] {
            assert!(validate(raw).is_ok(), "{} should be valid", raw);
        }
    }

    #[test]
    fn id_from_query() {
        let cases = [
            (
                "https://library.alkafeel.net/dic/book/?e=38c15-44c77-06464-07b96-de2b7-82795-3b",
                "38c15-44c77-06464-07b96-de2b7-82795-3b",
            ),
            (
                "https://library.alkafeel.net/dic/book/?e=test-id&other=param",
                "test-id",
            ),
            (
                "https://library.alkafeel.net/dic/book/?lang=ar&e=later",
                "later",
            ),
            ("https://library.alkafeel.net/dic/book/?e=a+b%20c", "a+b%20c"),
            ("https://library.alkafeel.net/dic/book/?see=x&e=second", "second"),
            ("https://library.alkafeel.net/dic/book/?e=first&e=second", "first"),
        ];
        for (raw, expected) in cases {
            let id = derive_item_id(&validate(raw).unwrap()).unwrap();
            assert_eq!(id.as_str(), expected);
            assert_eq!(id.origin(), IdOrigin::QueryParam);
            assert!(id.is_reproducible());
        }
    }

    #[test]
    fn id_fallback() {
        for raw in [
            "https://library.alkafeel.net/dic/book/",
            "https://library.alkafeel.net/dic/book/?e=",
        ] {
            let id = derive_item_id(&validate(raw).unwrap()).unwrap();
            assert_eq!(id.origin(), IdOrigin::Timestamp);
            assert!(id.as_str().starts_with("book_"));
            assert!(!id.is_reproducible());
        }
    }

    #[test]
    fn path_like_ids_rejected() {
        for raw in [
            "https://library.alkafeel.net/dic/book/?e=..%2F..%2Fescaped",
            "https://library.alkafeel.net/dic/book/?e=../../escaped",
            "https://library.alkafeel.net/dic/book/?e=nested/book",
            "https://library.alkafeel.net/dic/book/?e=..",
        ] {
            let url = validate(raw).unwrap();
            assert!(
                matches!(derive_item_id(&url), Err(ValidationError::UnsafeBookId(_))),
                "{} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn control_characters_rejected() {
        assert!(!is_safe_file_stem("book\u{7}id"));
        assert!(!is_safe_file_stem("line\nbreak"));
        assert!(!is_safe_file_stem("back\\slash"));
        assert!(is_safe_file_stem("38c15-44c77-06464"));
        assert!(is_safe_file_stem("a+b%20c"));
    }
}
