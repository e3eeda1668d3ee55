//! Finding URLs in free text and swapping them for their archived form.
//!
//! Extraction and substitution share one pattern so that replacement spans are
//! exactly the spans that were extracted.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

/// `http` or `https`, then anything up to whitespace, a paren, a bracket or a quote.
static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s()\[\]'"]+"#).expect("URL pattern compiles")
});

/// All non-overlapping URL-like matches, left to right, repeats included.
pub fn extract_urls(text: &str) -> Vec<&str> {
    URL_PATTERN.find_iter(text).map(|m| m.as_str()).collect()
}

/// Replace every URL match that has an entry in `replacements`; everything else
/// (unmapped URLs and all text between matches) is copied through unchanged.
pub fn substitute_urls(text: &str, replacements: &HashMap<String, String>) -> String {
    URL_PATTERN
        .replace_all(text, |caps: &Captures<'_>| {
            let original = &caps[0];
            replacements
                .get(original)
                .cloned()
                .unwrap_or_else(|| original.to_string())
        })
        .into_owned()
}
