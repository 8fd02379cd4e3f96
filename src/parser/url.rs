//! Locator extraction from free-form text.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, trace};

use super::error::ParseError;

/// Punctuation stripped from the document before tokenizing.
#[allow(clippy::expect_used)]
static DELIMITERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[(),]").expect("delimiter regex is valid")); // Static pattern, safe to panic

/// Prefixes that mark a token as a locator.
const LOCATOR_PREFIXES: [&str; 3] = ["http", "https", "ftp"];

/// Extracts locators from a text document.
///
/// Parentheses and commas are removed, the remainder is split on
/// whitespace, and every token starting with `http`, `https` or `ftp` is
/// kept. Duplicates are dropped by exact string match; the first occurrence
/// keeps its position.
///
/// Tokens are not validated as URLs: `httpfoo` is kept, and trailing
/// punctuation other than `,` and `)` stays on the token.
///
/// # Examples
///
/// ```
/// use bulkget_core::parser::extract_locators;
///
/// let found = extract_locators("see (https://a.example/x), ftp://b.example/y and https://a.example/x");
/// assert_eq!(found, ["https://a.example/x", "ftp://b.example/y"]);
/// ```
#[tracing::instrument(skip(text), fields(text_len = text.len()))]
#[must_use]
pub fn extract_locators(text: &str) -> Vec<String> {
    let cleaned = DELIMITERS.replace_all(text, "");
    let locators = dedup_locators(
        cleaned
            .split_whitespace()
            .filter(|token| is_locator(token))
            .map(str::to_string),
    );
    debug!(count = locators.len(), "locators extracted");
    locators
}

/// Drops repeated locators by exact string match, keeping first-occurrence order.
///
/// ```
/// use bulkget_core::parser::dedup_locators;
///
/// let merged = ["https://a.example/x", "https://b.example/y", "https://a.example/x"]
///     .map(String::from);
/// assert_eq!(dedup_locators(merged), ["https://a.example/x", "https://b.example/y"]);
/// ```
#[must_use]
pub fn dedup_locators<I>(locators: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    locators
        .into_iter()
        .filter(|locator| {
            let first = seen.insert(locator.clone());
            if first {
                trace!(%locator, "found locator");
            }
            first
        })
        .collect()
}

/// Reads `path` and extracts the locators it contains.
///
/// # Errors
///
/// Returns [`ParseError::Io`] if the file cannot be read.
#[tracing::instrument(skip(path), fields(path = %path.display()))]
pub fn load_locators(path: &Path) -> Result<Vec<String>, ParseError> {
    let text = std::fs::read_to_string(path).map_err(|e| ParseError::io(path, e))?;
    let locators = extract_locators(&text);
    info!(count = locators.len(), "locators found in file");
    Ok(locators)
}

fn is_locator(token: &str) -> bool {
    LOCATOR_PREFIXES
        .iter()
        .any(|prefix| token.starts_with(prefix))
}
