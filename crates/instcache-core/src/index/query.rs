//! Search requests and LIKE pattern building.

use crate::models::{IndexedEntry, Origin};
use serde::{Deserialize, Serialize};

/// Escape character used in every LIKE clause built here.
pub const LIKE_ESCAPE: char = '\\';

/// Filter for searching the inventory.
///
/// An empty request matches every entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// Case-insensitive substring matched against identity and name.
    pub query: Option<String>,
    pub origin: Option<Origin>,
    /// Tags that must all be present (case-insensitive).
    pub tags: Vec<String>,
    pub limit: Option<usize>,
}

impl SearchRequest {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether an entry carries every required tag.
    pub(crate) fn tags_match(&self, entry: &IndexedEntry) -> bool {
        self.tags
            .iter()
            .all(|t| entry.tags.iter().any(|et| et.eq_ignore_ascii_case(t)))
    }
}

/// Search result from the inventory index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub matches: Vec<IndexedEntry>,
    /// Matches before `limit` was applied.
    pub total_count: usize,
    pub query_time_ms: f64,
}

/// Escape LIKE wildcards so a term matches literally.
pub fn escape_like_term(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if c == '%' || c == '_' || c == LIKE_ESCAPE {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

/// Build a lowercase substring LIKE pattern from a search term.
///
/// Returns `None` for a blank term, meaning "no text filter".
/// - "Git" → `%git%`
/// - "100%" → `%100\%%`
pub fn build_like_pattern(search_term: &str) -> Option<String> {
    let term = search_term.trim().to_lowercase();
    if term.is_empty() {
        return None;
    }
    Some(format!("%{}%", escape_like_term(&term)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_simple_term() {
        assert_eq!(escape_like_term("firefox"), "firefox");
    }

    #[test]
    fn test_escape_wildcards() {
        assert_eq!(escape_like_term("lib_c"), "lib\\_c");
        assert_eq!(escape_like_term("100%"), "100\\%");
        assert_eq!(escape_like_term("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_build_pattern_case_insensitive() {
        assert_eq!(build_like_pattern("  Git "), Some("%git%".to_string()));
    }

    #[test]
    fn test_build_pattern_empty() {
        assert_eq!(build_like_pattern(""), None);
        assert_eq!(build_like_pattern("   "), None);
    }
}
