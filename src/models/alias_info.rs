use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{TagId, TagSource};

/// Minimum confidence for an LLM-created alias to be trusted during keyword expansion.
pub const TRUSTED_ALIAS_CONFIDENCE: f64 = 0.8;

/// Information about a tag alias mapping.
///
/// Captures the alias text, its canonical tag target, provenance metadata
/// (source, confidence, model version), and creation timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasInfo {
    alias: String,
    canonical_tag_id: TagId,
    source: TagSource,
    confidence: f64,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    model_version: Option<String>,
}

impl AliasInfo {
    /// Creates a new AliasInfo.
    ///
    /// # Examples
    ///
    /// ```
    /// use notegraph::{AliasInfo, TagId, TagSource};
    /// use time::OffsetDateTime;
    ///
    /// let alias = AliasInfo::new(
    ///     "ml",
    ///     TagId::new(42),
    ///     TagSource::Llm,
    ///     0.85,
    ///     OffsetDateTime::now_utc(),
    ///     Some("deepseek-r1:8b".to_string()),
    /// );
    ///
    /// assert_eq!(alias.alias(), "ml");
    /// assert_eq!(alias.canonical_tag_id(), TagId::new(42));
    /// assert!(alias.is_trusted());
    /// ```
    pub fn new(
        alias: impl Into<String>,
        canonical_tag_id: TagId,
        source: TagSource,
        confidence: f64,
        created_at: OffsetDateTime,
        model_version: Option<String>,
    ) -> Self {
        Self {
            alias: alias.into(),
            canonical_tag_id,
            source,
            confidence,
            created_at,
            model_version,
        }
    }

    /// Returns the alias text.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Returns the canonical tag ID this alias resolves to.
    pub fn canonical_tag_id(&self) -> TagId {
        self.canonical_tag_id
    }

    /// Returns who created this alias.
    pub fn source(&self) -> TagSource {
        self.source
    }

    /// Returns the confidence score (0.0-1.0).
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Returns when this alias was created.
    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    /// Returns the model version if this is an LLM-created alias.
    pub fn model_version(&self) -> Option<&str> {
        self.model_version.as_deref()
    }

    /// Whether the alias may widen a keyword query.
    ///
    /// User aliases always qualify; LLM aliases need [`TRUSTED_ALIAS_CONFIDENCE`].
    pub fn is_trusted(&self) -> bool {
        self.source.is_user() || self.confidence >= TRUSTED_ALIAS_CONFIDENCE
    }
}

impl fmt::Display for AliasInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} (source: {}, confidence: {:.0}%)",
            self.alias,
            self.canonical_tag_id.get(),
            self.source,
            self.confidence * 100.0
        )
    }
}
