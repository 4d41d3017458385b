//! Tag and query normalization.
//!
//! Tag names are stored in lowercase kebab-case, so every string that is
//! compared against them (user input, alias text, query tokens) goes through
//! the same rules first.

use std::collections::HashSet;

/// Normalizes tag names and splits free-text queries into tag-shaped terms.
///
/// All output is lowercase kebab-case with only alphanumeric characters and
/// hyphens.
pub struct TagNormalizer;

impl TagNormalizer {
    /// Normalizes a single tag to lowercase kebab-case format.
    ///
    /// # Normalization rules
    ///
    /// - Converts to lowercase
    /// - Replaces whitespace runs with a single hyphen
    /// - Removes all characters except alphanumeric and hyphens
    /// - Trims leading/trailing hyphens
    ///
    /// # Examples
    ///
    /// ```
    /// use notegraph::TagNormalizer;
    ///
    /// assert_eq!(TagNormalizer::normalize_tag("RUST"), "rust");
    /// assert_eq!(TagNormalizer::normalize_tag("machine learning"), "machine-learning");
    /// assert_eq!(TagNormalizer::normalize_tag("C++"), "c");
    /// assert_eq!(TagNormalizer::normalize_tag("  --rust--  "), "rust");
    /// ```
    #[must_use]
    pub fn normalize_tag(tag: &str) -> String {
        let normalized = tag
            .to_lowercase()
            .chars()
            .map(|c| if c.is_whitespace() { '-' } else { c })
            .filter(|c| c.is_alphanumeric() || *c == '-')
            .collect::<String>();

        // Collapse consecutive hyphens; this also trims the ends.
        normalized
            .split('-')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("-")
    }

    /// Normalizes a collection of tags, removing duplicates and empty strings.
    ///
    /// Order of first occurrence is preserved.
    ///
    /// # Examples
    ///
    /// ```
    /// use notegraph::TagNormalizer;
    ///
    /// let tags = vec!["Rust".to_string(), "rust".to_string(), "RUST".to_string()];
    /// assert_eq!(TagNormalizer::normalize_tags(tags), vec!["rust"]);
    /// ```
    #[must_use]
    pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
        let mut seen = HashSet::new();
        tags.into_iter()
            .map(|tag| Self::normalize_tag(&tag))
            .filter(|tag| !tag.is_empty() && seen.insert(tag.clone()))
            .collect()
    }

    /// Splits a query on whitespace and normalizes each token.
    ///
    /// Tokens that normalize to nothing are dropped. Duplicates are kept so
    /// the token count reflects what the user typed.
    ///
    /// # Examples
    ///
    /// ```
    /// use notegraph::TagNormalizer;
    ///
    /// assert_eq!(TagNormalizer::query_terms("  ML  & Rust "), vec!["ml", "rust"]);
    /// assert!(TagNormalizer::query_terms("?!").is_empty());
    /// ```
    #[must_use]
    pub fn query_terms(query: &str) -> Vec<String> {
        query
            .split_whitespace()
            .map(Self::normalize_tag)
            .filter(|term| !term.is_empty())
            .collect()
    }
}
