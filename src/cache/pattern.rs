//! Glob Pattern Module
//!
//! Key matching for pattern invalidation: `*` = any run of characters,
//! `?` = exactly one character, everything else literal.

use regex::Regex;

use crate::error::{CacheError, Result};

/// A compiled glob.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    raw: String,
    regex: Regex,
}

impl GlobPattern {
    /// Compiles a glob into an anchored regular expression. Wildcards match
    /// any character, newlines included.
    pub fn new(pattern: &str) -> Result<Self> {
        let mut expr = String::with_capacity(pattern.len() + 12);
        expr.push_str("(?s)^");
        let mut buf = [0u8; 4];
        for ch in pattern.chars() {
            match ch {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                other => expr.push_str(&regex::escape(other.encode_utf8(&mut buf))),
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|e| CacheError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            raw: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether a key string contains glob metacharacters.
    pub fn is_pattern(key: &str) -> bool {
        key.contains('*') || key.contains('?')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_matches_any_run() {
        let glob = GlobPattern::new("user:*").unwrap();
        assert!(glob.matches("user:1"));
        assert!(glob.matches("user:"));
        assert!(glob.matches("user:1:profile"));
        assert!(!glob.matches("order:1"));
        assert!(!glob.matches("xuser:1"));
    }

    #[test]
    fn test_question_mark_matches_one_char() {
        let glob = GlobPattern::new("order:?").unwrap();
        assert!(glob.matches("order:1"));
        assert!(!glob.matches("order:12"));
        assert!(!glob.matches("order:"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let glob = GlobPattern::new("report.(daily)+*").unwrap();
        assert!(glob.matches("report.(daily)+2024"));
        assert!(!glob.matches("reportX(daily)+2024"));
    }

    #[test]
    fn test_wildcards_match_newlines() {
        let glob = GlobPattern::new("note:*").unwrap();
        assert!(glob.matches("note:line one\nline two"));
        assert!(GlobPattern::new("a?b").unwrap().matches("a\nb"));
    }

    #[test]
    fn test_is_pattern() {
        assert!(GlobPattern::is_pattern("menu:*"));
        assert!(GlobPattern::is_pattern("a?"));
        assert!(!GlobPattern::is_pattern("menu:all"));
    }
}
