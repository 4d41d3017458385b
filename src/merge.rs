//! Dual-channel merge of keyword and graph scores.
//!
//! Notes found by both channels get an intersection boost. When the graph
//! channel has nothing to say (cold start) or the graph is too sparse to
//! trust, keyword results pass through untouched.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::debug;

use crate::NoteId;
use crate::config::MergeConfig;
use crate::error::RetrievalResult;
use crate::graph::GraphStore;

/// Why the graph channel did not contribute to a ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No seeds, or activation never left them.
    ColdStart,
    /// Too few tags have edges for graph scores to be meaningful.
    SparseGraph,
    /// The graph store failed; keyword results were served instead.
    StoreUnavailable,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ColdStart => "cold start",
            Self::SparseGraph => "sparse graph",
            Self::StoreUnavailable => "graph store unavailable",
        })
    }
}

/// Diagnostics for one search call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchMetadata {
    pub graph_skipped: Option<SkipReason>,
    pub keyword_hits: usize,
    pub graph_hits: usize,
    /// The FTS5 expression that was run, if any.
    pub keyword_expression: Option<String>,
    pub graph_density: Option<f64>,
}

/// A note's position in the merged ranking, before the note itself is loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedNote {
    pub note_id: NoteId,
    pub score: f64,
    pub keyword_score: Option<f64>,
    pub graph_score: Option<f64>,
    pub found_by_both: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub ranked: Vec<RankedNote>,
    pub graph_skipped: Option<SkipReason>,
    pub graph_density: Option<f64>,
}

pub struct DualChannelMerger<'a> {
    config: &'a MergeConfig,
}

impl<'a> DualChannelMerger<'a> {
    pub fn new(config: &'a MergeConfig) -> Self {
        Self { config }
    }

    /// Merges both channels into one ranking, best first.
    ///
    /// Fails with a configuration error if the merge settings are out of range.
    /// Ties are broken by newer `created_at`, then by higher note id.
    pub fn merge<S: GraphStore + ?Sized>(
        &self,
        store: &S,
        keyword: &HashMap<NoteId, f64>,
        graph: &HashMap<NoteId, f64>,
    ) -> RetrievalResult<MergeOutcome> {
        self.config.validate()?;
        if graph.is_empty() {
            return self.keyword_only(store, keyword, SkipReason::ColdStart, None);
        }

        let density = store.graph_density()?;
        if density < self.config.min_graph_density {
            debug!(
                density,
                min = self.config.min_graph_density,
                "graph too sparse, using keyword results only"
            );
            return self.keyword_only(store, keyword, SkipReason::SparseGraph, Some(density));
        }

        let mut ranked = combine(keyword, graph, self.config.intersection_boost);
        let max = ranked.iter().map(|r| r.score).fold(0.0_f64, f64::max);
        if max > 0.0 {
            for entry in &mut ranked {
                entry.score /= max;
            }
        }
        sort_ranked(store, &mut ranked)?;

        debug!(
            keyword = keyword.len(),
            graph = graph.len(),
            both = ranked.iter().filter(|r| r.found_by_both).count(),
            "merged channels"
        );
        Ok(MergeOutcome {
            ranked,
            graph_skipped: None,
            graph_density: Some(density),
        })
    }

    /// Graph scores as they are, sorted. Used by the graph-only entry points.
    pub fn graph_only<S: GraphStore + ?Sized>(
        &self,
        store: &S,
        graph: &HashMap<NoteId, f64>,
    ) -> RetrievalResult<MergeOutcome> {
        let mut ranked: Vec<RankedNote> = graph
            .iter()
            .map(|(&note_id, &score)| RankedNote {
                note_id,
                score,
                keyword_score: None,
                graph_score: Some(score),
                found_by_both: false,
            })
            .collect();
        sort_ranked(store, &mut ranked)?;

        Ok(MergeOutcome {
            ranked,
            graph_skipped: graph.is_empty().then_some(SkipReason::ColdStart),
            graph_density: None,
        })
    }

    /// Keyword scores as they are, sorted. Used when the graph channel is skipped.
    pub fn keyword_only<S: GraphStore + ?Sized>(
        &self,
        store: &S,
        keyword: &HashMap<NoteId, f64>,
        reason: SkipReason,
        graph_density: Option<f64>,
    ) -> RetrievalResult<MergeOutcome> {
        let mut ranked: Vec<RankedNote> = keyword
            .iter()
            .map(|(&note_id, &score)| RankedNote {
                note_id,
                score,
                keyword_score: Some(score),
                graph_score: None,
                found_by_both: false,
            })
            .collect();
        sort_ranked(store, &mut ranked)?;

        Ok(MergeOutcome {
            ranked,
            graph_skipped: Some(reason),
            graph_density,
        })
    }
}

/// Sums both channels per note and boosts notes present in both. Not normalized.
pub(crate) fn combine(
    keyword: &HashMap<NoteId, f64>,
    graph: &HashMap<NoteId, f64>,
    intersection_boost: f64,
) -> Vec<RankedNote> {
    let notes: HashSet<NoteId> = keyword.keys().chain(graph.keys()).copied().collect();

    notes
        .into_iter()
        .map(|note_id| {
            let keyword_score = keyword.get(&note_id).copied();
            let graph_score = graph.get(&note_id).copied();
            let kw = keyword_score.unwrap_or(0.0);
            let gr = graph_score.unwrap_or(0.0);
            let found_by_both = kw > 0.0 && gr > 0.0;

            let mut score = kw + gr;
            if found_by_both {
                score *= intersection_boost;
            }

            RankedNote {
                note_id,
                score,
                keyword_score,
                graph_score,
                found_by_both,
            }
        })
        .collect()
}

fn sort_ranked<S: GraphStore + ?Sized>(store: &S, ranked: &mut [RankedNote]) -> RetrievalResult<()> {
    let ids: Vec<NoteId> = ranked.iter().map(|r| r.note_id).collect();
    let created = store.note_timestamps(&ids)?;

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                let a_time = created.get(&a.note_id).copied().unwrap_or(OffsetDateTime::UNIX_EPOCH);
                let b_time = created.get(&b.note_id).copied().unwrap_or(OffsetDateTime::UNIX_EPOCH);
                b_time.cmp(&a_time)
            })
            .then_with(|| b.note_id.cmp(&a.note_id))
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use crate::graph::SqliteGraphStore;

    fn scores(pairs: &[(i64, f64)]) -> HashMap<NoteId, f64> {
        pairs.iter().map(|&(id, s)| (NoteId::new(id), s)).collect()
    }

    /// Ten tags, `connected` of them on edges, and notes 1..=4 created at 100, 200, 200, 50.
    fn setup(connected_pairs: usize) -> Database {
        let db = Database::in_memory().unwrap();
        let conn = db.connection();
        for id in 1..=10 {
            conn.execute(
                "INSERT INTO tags (id, name) VALUES (?1, ?2)",
                rusqlite::params![id, format!("tag-{id}")],
            )
            .unwrap();
        }
        for pair in 0..connected_pairs as i64 {
            conn.execute(
                "INSERT INTO edges (source_tag_id, target_tag_id, confidence, created_at, updated_at)
                 VALUES (?1, ?2, 1.0, 0, 0)",
                [2 * pair + 1, 2 * pair + 2],
            )
            .unwrap();
        }
        conn.execute_batch(
            "INSERT INTO notes (id, content, created_at, updated_at) VALUES
                 (1, 'a', 100, 100), (2, 'b', 200, 200), (3, 'c', 200, 200), (4, 'd', 50, 50);",
        )
        .unwrap();
        db
    }

    #[test]
    fn intersection_boost_applies_before_normalization() {
        let combined = combine(&scores(&[(1, 0.4)]), &scores(&[(1, 0.3)]), 1.5);

        assert_eq!(combined.len(), 1);
        assert!((combined[0].score - 1.05).abs() < 1e-9);
        assert!(combined[0].found_by_both);
    }

    #[test]
    fn single_channel_notes_are_not_boosted() {
        let combined = combine(&scores(&[(1, 0.4)]), &scores(&[(2, 0.3)]), 1.5);

        for entry in combined {
            assert!(!entry.found_by_both);
            let expected = if entry.note_id == NoteId::new(1) { 0.4 } else { 0.3 };
            assert!((entry.score - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn empty_graph_passes_keyword_scores_through() {
        let db = setup(1);
        let store = SqliteGraphStore::new(db.connection());
        let config = MergeConfig::default();

        let outcome = DualChannelMerger::new(&config)
            .merge(&store, &scores(&[(1, 0.4), (2, 0.9)]), &HashMap::new())
            .unwrap();

        assert_eq!(outcome.graph_skipped, Some(SkipReason::ColdStart));
        assert_eq!(outcome.ranked[0].note_id, NoteId::new(2));
        assert_eq!(outcome.ranked[0].score, 0.9);
        assert_eq!(outcome.ranked[1].score, 0.4);
    }

    #[test]
    fn sparse_graph_falls_back_to_keywords() {
        let db = setup(1); // 2 of 10 tags connected
        let store = SqliteGraphStore::new(db.connection());
        let config = MergeConfig {
            min_graph_density: 0.5,
            ..MergeConfig::default()
        };

        let outcome = DualChannelMerger::new(&config)
            .merge(&store, &scores(&[(1, 0.4)]), &scores(&[(2, 1.0)]))
            .unwrap();

        assert_eq!(outcome.graph_skipped, Some(SkipReason::SparseGraph));
        assert_eq!(outcome.ranked.len(), 1);
        assert_eq!(outcome.ranked[0].score, 0.4);
        assert_eq!(outcome.graph_density, Some(0.2));
    }

    #[test]
    fn merged_scores_normalize_to_unit_range() {
        let db = setup(1);
        let store = SqliteGraphStore::new(db.connection());
        let config = MergeConfig::default();

        let outcome = DualChannelMerger::new(&config)
            .merge(&store, &scores(&[(1, 0.4), (2, 1.0)]), &scores(&[(1, 0.3), (4, 0.5)]))
            .unwrap();

        assert_eq!(outcome.graph_skipped, None);
        let ids: Vec<i64> = outcome.ranked.iter().map(|r| r.note_id.get()).collect();
        // note 1: 1.05, note 2: 1.0, note 4: 0.5
        assert_eq!(ids, vec![1, 2, 4]);
        assert!((outcome.ranked[0].score - 1.0).abs() < 1e-9);
        assert!((outcome.ranked[1].score - 1.0 / 1.05).abs() < 1e-9);
        assert!(outcome.ranked.iter().all(|r| (0.0..=1.0).contains(&r.score)));
    }

    #[test]
    fn out_of_range_boost_is_rejected() {
        let db = setup(1);
        let store = SqliteGraphStore::new(db.connection());
        let config = MergeConfig {
            intersection_boost: f64::NAN,
            ..MergeConfig::default()
        };

        let result = DualChannelMerger::new(&config).merge(&store, &scores(&[(1, 0.4)]), &scores(&[(1, 0.3)]));

        assert!(matches!(result, Err(crate::RetrievalError::Configuration(_))));
    }

    #[test]
    fn ties_prefer_newer_notes_then_higher_ids() {
        let db = setup(1);
        let store = SqliteGraphStore::new(db.connection());
        let config = MergeConfig::default();

        let outcome = DualChannelMerger::new(&config)
            .keyword_only(
                &store,
                &scores(&[(1, 0.5), (2, 0.5), (3, 0.5), (4, 0.5)]),
                SkipReason::ColdStart,
                None,
            )
            .unwrap();

        let ids: Vec<i64> = outcome.ranked.iter().map(|r| r.note_id.get()).collect();
        assert_eq!(ids, vec![3, 2, 1, 4]);
    }
}
