use serde::{Deserialize, Serialize};

use super::Note;

/// A ranked note returned by a retrieval call.
///
/// Constructed fresh per query and never persisted. `relevance_score` is
/// normalized to `[0.0, 1.0]` within the result set it belongs to; the
/// per-channel scores are the inputs the merger saw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub note: Note,
    pub relevance_score: f64,
    pub keyword_score: Option<f64>,
    pub graph_score: Option<f64>,
    pub found_by_both: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NoteBuilder, NoteId};

    #[test]
    fn serializes_channel_breakdown() {
        let result = SearchResult {
            note: NoteBuilder::new()
                .id(NoteId::new(3))
                .content("graph note")
                .build(),
            relevance_score: 1.0,
            keyword_score: None,
            graph_score: Some(0.42),
            found_by_both: false,
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["relevance_score"], 1.0);
        assert_eq!(json["keyword_score"], serde_json::Value::Null);
        assert_eq!(json["graph_score"], 0.42);
        assert_eq!(json["note"]["id"], 3);
    }
}
