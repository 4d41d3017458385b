mod alias_info;
mod edge;
mod ids;
mod note;
mod search_result;
mod tag;
mod tag_assignment;
mod tag_source;

pub use alias_info::{AliasInfo, TRUSTED_ALIAS_CONFIDENCE};
pub use edge::{Edge, EdgeCandidate, EdgeOrigin, HierarchyKind, ValidityWindow};
pub use ids::{EdgeId, NoteId, TagId};
pub use note::{Note, NoteBuilder};
pub use search_result::SearchResult;
pub use tag::Tag;
pub use tag_assignment::TagAssignment;
pub(crate) use tag_assignment::clamp_unit;
pub use tag_source::TagSource;
