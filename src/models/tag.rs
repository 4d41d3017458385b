use serde::{Deserialize, Serialize};

use super::TagId;

/// A node of the tag graph.
///
/// Tags use a SKOS-inspired vocabulary model where the `name` field is the
/// preferred label. `degree_centrality` counts the edges incident to the tag
/// regardless of direction; it is maintained alongside edge writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    id: TagId,
    name: String,
    degree_centrality: u32,
}

impl Tag {
    /// Creates a new tag with zero centrality.
    ///
    /// # Examples
    ///
    /// ```
    /// use notegraph::{Tag, TagId};
    ///
    /// let tag = Tag::new(TagId::new(1), "rust");
    /// assert_eq!(tag.id(), TagId::new(1));
    /// assert_eq!(tag.name(), "rust");
    /// assert_eq!(tag.degree_centrality(), 0);
    /// ```
    pub fn new(id: TagId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            degree_centrality: 0,
        }
    }

    /// Sets the centrality counter read from the store.
    pub fn with_degree_centrality(mut self, degree_centrality: u32) -> Self {
        self.degree_centrality = degree_centrality;
        self
    }

    /// Returns the tag's unique identifier.
    pub fn id(&self) -> TagId {
        self.id
    }

    /// Returns the preferred label for this tag.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of edges incident to this tag.
    pub fn degree_centrality(&self) -> u32 {
        self.degree_centrality
    }
}
