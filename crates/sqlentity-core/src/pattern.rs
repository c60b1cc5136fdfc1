//! Cached regular expressions.
//!
//! Identifier validation and error-detail extraction run on every statement and
//! every storage failure, so compiled patterns are kept in a process-wide cache.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use regex::Regex;

/// Thread-safe cache of compiled patterns.
struct PatternCache {
    cache: RwLock<HashMap<String, Regex>>,
}

impl PatternCache {
    fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn get_or_compile(&self, pattern: &str) -> Result<Regex, regex::Error> {
        {
            let cache = self
                .cache
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(regex) = cache.get(pattern) {
                return Ok(regex.clone());
            }
        }

        let regex = Regex::new(pattern)?;
        self.cache
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }
}

fn pattern_cache() -> &'static PatternCache {
    static CACHE: OnceLock<PatternCache> = OnceLock::new();
    CACHE.get_or_init(PatternCache::new)
}

fn compiled(pattern: &str) -> Option<Regex> {
    match pattern_cache().get_or_compile(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::warn!(
                pattern = pattern,
                error = %e,
                "Invalid regex pattern, treating as non-match"
            );
            None
        }
    }
}

/// Check if `value` matches `pattern`.
///
/// An invalid pattern is logged and never matches.
pub fn matches_pattern(value: &str, pattern: &str) -> bool {
    compiled(pattern).is_some_and(|re| re.is_match(value))
}

/// Return the capture groups of the first match of `pattern` in `haystack`.
///
/// Group 0 (the whole match) is omitted; groups that did not participate are
/// returned as empty strings.
pub fn captures(haystack: &str, pattern: &str) -> Option<Vec<String>> {
    let re = compiled(pattern)?;
    let caps = re.captures(haystack)?;
    Some(
        caps.iter()
            .skip(1)
            .map(|m| m.map_or_else(String::new, |m| m.as_str().to_string()))
            .collect(),
    )
}

/// First capture group of `pattern` in `haystack`.
pub fn capture_first(haystack: &str, pattern: &str) -> Option<String> {
    captures(haystack, pattern)?
        .into_iter()
        .next()
        .filter(|s| !s.is_empty())
}
