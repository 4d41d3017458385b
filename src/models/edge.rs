use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{EdgeId, TagId};
use super::tag_assignment::clamp_unit;

/// XKOS hierarchy kind of a tag edge.
///
/// `generic` is an is-a relation (transformer -> neural-network), `partitive`
/// a part-of relation (attention -> transformer). Edges without a kind are
/// stored with a NULL `hierarchy_type` and modeled as `Option::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HierarchyKind {
    Generic,
    Partitive,
}

impl HierarchyKind {
    /// Returns the value stored in the `hierarchy_type` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Partitive => "partitive",
        }
    }
}

impl fmt::Display for HierarchyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HierarchyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "generic" => Ok(Self::Generic),
            "partitive" => Ok(Self::Partitive),
            other => Err(format!("unknown hierarchy type '{other}'")),
        }
    }
}

/// Who asserted an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeOrigin {
    /// Confirmed or drawn by the user.
    User,
    /// Proposed by hierarchy inference.
    Inferred,
}

impl EdgeOrigin {
    /// Returns the value stored in the `source` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Inferred => "inferred",
        }
    }

    /// Parses a stored `source` column value.
    ///
    /// Rows written before the `inferred` label existed carry `llm`.
    pub fn from_column(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "inferred" | "llm" => Some(Self::Inferred),
            _ => None,
        }
    }
}

impl fmt::Display for EdgeOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional validity bounds of an edge. `None` on either side is unbounded.
///
/// The window is half-open: an edge is valid from `valid_from` inclusive
/// until `valid_until` exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityWindow {
    #[serde(with = "time::serde::rfc3339::option")]
    pub valid_from: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub valid_until: Option<OffsetDateTime>,
}

impl ValidityWindow {
    /// A window with no bounds.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Returns true when `instant` falls inside the window.
    pub fn covers(&self, instant: OffsetDateTime) -> bool {
        self.valid_from.is_none_or(|from| from <= instant)
            && self.valid_until.is_none_or(|until| instant < until)
    }
}

/// A persisted, directed edge of the tag graph.
///
/// Direction is fixed: `source` is the narrower concept, `target` the broader one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    id: EdgeId,
    source: TagId,
    target: TagId,
    confidence: f64,
    hierarchy_kind: Option<HierarchyKind>,
    validity: ValidityWindow,
    origin: EdgeOrigin,
    model_version: Option<String>,
    verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    updated_at: OffsetDateTime,
}

impl Edge {
    /// Reassembles an edge read from the store.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: EdgeId,
        source: TagId,
        target: TagId,
        confidence: f64,
        hierarchy_kind: Option<HierarchyKind>,
        validity: ValidityWindow,
        origin: EdgeOrigin,
        model_version: Option<String>,
        verified: bool,
        created_at: OffsetDateTime,
        updated_at: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            source,
            target,
            confidence,
            hierarchy_kind,
            validity,
            origin,
            model_version,
            verified,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> EdgeId {
        self.id
    }

    /// The narrower endpoint.
    pub fn source(&self) -> TagId {
        self.source
    }

    /// The broader endpoint.
    pub fn target(&self) -> TagId {
        self.target
    }

    /// Raw stored confidence, not range-checked.
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Confidence clamped to `[0.0, 1.0]` for use in scoring.
    pub fn weight(&self) -> f64 {
        clamp_unit(self.confidence)
    }

    pub fn hierarchy_kind(&self) -> Option<HierarchyKind> {
        self.hierarchy_kind
    }

    pub fn validity(&self) -> ValidityWindow {
        self.validity
    }

    pub fn origin(&self) -> EdgeOrigin {
        self.origin
    }

    pub fn model_version(&self) -> Option<&str> {
        self.model_version.as_deref()
    }

    pub fn verified(&self) -> bool {
        self.verified
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn updated_at(&self) -> OffsetDateTime {
        self.updated_at
    }

    /// Returns the endpoint opposite to `tag`, or `None` if `tag` is not an endpoint.
    ///
    /// Spreading treats relatedness as symmetric, so both directions resolve.
    pub fn other_endpoint(&self, tag: TagId) -> Option<TagId> {
        if self.source == tag {
            Some(self.target)
        } else if self.target == tag {
            Some(self.source)
        } else {
            None
        }
    }
}

/// An edge waiting to be written.
///
/// Hierarchy inference computes candidates first and hands them over for
/// atomic insertion, so no transaction stays open during inference.
///
/// # Examples
///
/// ```
/// use notegraph::{EdgeCandidate, EdgeOrigin, HierarchyKind, TagId};
///
/// let candidate = EdgeCandidate::new(TagId::new(1), TagId::new(2), 0.9)
///     .hierarchy_kind(HierarchyKind::Generic)
///     .inferred_by("deepseek-r1:8b");
///
/// assert_eq!(candidate.origin, EdgeOrigin::Inferred);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeCandidate {
    pub source: TagId,
    pub target: TagId,
    pub confidence: f64,
    pub hierarchy_kind: Option<HierarchyKind>,
    pub validity: ValidityWindow,
    pub origin: EdgeOrigin,
    pub model_version: Option<String>,
    pub verified: bool,
}

impl EdgeCandidate {
    /// Creates a user-originated candidate with no hierarchy kind and no validity bounds.
    pub fn new(source: TagId, target: TagId, confidence: f64) -> Self {
        Self {
            source,
            target,
            confidence,
            hierarchy_kind: None,
            validity: ValidityWindow::unbounded(),
            origin: EdgeOrigin::User,
            model_version: None,
            verified: false,
        }
    }

    pub fn hierarchy_kind(mut self, kind: HierarchyKind) -> Self {
        self.hierarchy_kind = Some(kind);
        self
    }

    pub fn validity(mut self, validity: ValidityWindow) -> Self {
        self.validity = validity;
        self
    }

    /// Marks the candidate as produced by the given model.
    pub fn inferred_by(mut self, model: impl Into<String>) -> Self {
        self.origin = EdgeOrigin::Inferred;
        self.model_version = Some(model.into());
        self
    }

    pub fn verified(mut self, verified: bool) -> Self {
        self.verified = verified;
        self
    }
}
