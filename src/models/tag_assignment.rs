use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{TagId, TagSource};

/// Assignment of a tag to a note.
///
/// Tracks provenance, the assignment confidence and timestamps for each
/// tag-note relationship. The retrieval core reads the confidence to weight
/// a note's accumulated tag activation and never mutates assignments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagAssignment {
    tag_id: TagId,
    source: TagSource,
    confidence: f64,
    model_version: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    verified: bool,
}

impl TagAssignment {
    /// Creates a user-created tag assignment with full confidence.
    ///
    /// # Examples
    ///
    /// ```
    /// use notegraph::{TagAssignment, TagId};
    /// use time::OffsetDateTime;
    ///
    /// let assignment = TagAssignment::user(TagId::new(42), OffsetDateTime::now_utc());
    ///
    /// assert_eq!(assignment.tag_id(), TagId::new(42));
    /// assert_eq!(assignment.confidence(), 1.0);
    /// assert!(assignment.source().is_user());
    /// ```
    pub fn user(tag_id: TagId, created_at: OffsetDateTime) -> Self {
        Self {
            tag_id,
            source: TagSource::User,
            confidence: 1.0,
            model_version: None,
            created_at,
            verified: false,
        }
    }

    /// Creates a new LLM-inferred tag assignment.
    ///
    /// # Examples
    ///
    /// ```
    /// use notegraph::{TagAssignment, TagId};
    /// use time::OffsetDateTime;
    ///
    /// let assignment = TagAssignment::llm(
    ///     TagId::new(1),
    ///     "deepseek-r1:8b",
    ///     0.85,
    ///     OffsetDateTime::now_utc(),
    /// );
    ///
    /// assert_eq!(assignment.confidence(), 0.85);
    /// assert_eq!(assignment.model(), Some("deepseek-r1:8b"));
    /// ```
    pub fn llm(
        tag_id: TagId,
        model: impl Into<String>,
        confidence: f64,
        created_at: OffsetDateTime,
    ) -> Self {
        Self {
            tag_id,
            source: TagSource::Llm,
            confidence,
            model_version: Some(model.into()),
            created_at,
            verified: false,
        }
    }

    /// Returns the tag ID.
    pub fn tag_id(&self) -> TagId {
        self.tag_id
    }

    /// Returns the source of this tag assignment.
    pub fn source(&self) -> TagSource {
        self.source
    }

    /// Returns the stored confidence.
    ///
    /// The stored value is not range-checked; use [`TagAssignment::weight`]
    /// when the value feeds a score.
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Returns the confidence clamped to `[0.0, 1.0]`.
    pub fn weight(&self) -> f64 {
        clamp_unit(self.confidence)
    }

    /// Returns the model identifier if this is an LLM-inferred tag.
    pub fn model(&self) -> Option<&str> {
        self.model_version.as_deref()
    }

    /// Returns when this tag assignment was created.
    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    /// Returns whether this assignment has been verified by the user.
    pub fn verified(&self) -> bool {
        self.verified
    }

    /// Marks this assignment as verified by the user.
    pub fn verify(&mut self) {
        self.verified = true;
    }
}

/// Clamps a stored confidence into `[0.0, 1.0]`, mapping NaN to 0.
pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
