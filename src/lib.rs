pub mod centrality;
pub mod config;
pub mod db;
mod deadline;
pub mod error;
pub mod expansion;
pub mod graph;
pub mod keyword;
pub mod merge;
pub mod models;
mod normalizer;
pub mod service;
pub mod spreading_activation;
pub mod utils;

pub use centrality::EdgeMutation;
pub use config::{ActivationConfig, ExpansionConfig, MergeConfig, RetrievalConfig};
pub use db::Database;
pub use deadline::Deadline;
pub use error::{RetrievalError, RetrievalResult};
pub use expansion::{KeywordGroup, QueryExpander, WeightedTermSet};
pub use graph::{GraphStore, NoteTagWeight, SqliteGraphStore};
pub use keyword::{Fts5KeywordSearch, KeywordSearch};
pub use merge::{DualChannelMerger, MergeOutcome, RankedNote, SearchMetadata, SkipReason};
pub use models::{
    AliasInfo, Edge, EdgeCandidate, EdgeId, EdgeOrigin, HierarchyKind, Note, NoteBuilder, NoteId,
    SearchResult, Tag, TagAssignment, TagId, TagSource, TRUSTED_ALIAS_CONFIDENCE, ValidityWindow,
};
pub use normalizer::TagNormalizer;
pub use service::{NoteService, SearchResponse};
