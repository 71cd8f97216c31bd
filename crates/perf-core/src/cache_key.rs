//! Cache key cleaning.
//!
//! Cache keys often embed primary keys, session ids or hashes. Each pattern
//! below replaces such a substring with `#` so records do not depend on the
//! values a test happened to generate. Patterns run in order: the
//! session-prefix rules must see the key before the generic hash and integer
//! rules eat into it.

use std::sync::LazyLock;

use regex::Regex;

/// Placeholder substituted for every variable-looking substring.
pub const KEY_PLACEHOLDER: &str = "#";

/// `(pattern, replacement)` pairs, applied left to right.
static VARIABLE_PATTERNS: LazyLock<[(Regex, &'static str); 5]> = LazyLock::new(|| {
    [
        // Session keys for the `cache` session backend
        (
            Regex::new(r"(django\.contrib\.sessions\.cache)[0-9a-z]{32}\b").unwrap(),
            "${1}#",
        ),
        // Session keys for the `cached_db` session backend
        (
            Regex::new(r"(django\.contrib\.sessions\.cached_db)[0-9a-z]{32}\b").unwrap(),
            "${1}#",
        ),
        // Long random hashes
        (Regex::new(r"\b[0-9a-f]{32}\b").unwrap(), KEY_PLACEHOLDER),
        // UUIDs
        (
            Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}").unwrap(),
            KEY_PLACEHOLDER,
        ),
        // Integers
        (Regex::new(r"\d+").unwrap(), KEY_PLACEHOLDER),
    ]
});

/// Replace things that look like variables in a cache key with `#`.
#[must_use]
pub fn clean_key(key: &str) -> String {
    VARIABLE_PATTERNS
        .iter()
        .fold(key.to_string(), |key, (pattern, replacement)| {
            pattern.replace_all(&key, *replacement).into_owned()
        })
}
