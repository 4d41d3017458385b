//! Keyword channel over the `notes_fts` full-text index.

use std::collections::HashMap;

use rusqlite::Connection;
use tracing::debug;

use crate::NoteId;
use crate::error::RetrievalResult;
use crate::expansion::KeywordGroup;

/// Full-text search producing note relevance in `[0.0, 1.0]`.
pub trait KeywordSearch {
    /// Scores notes matching every group (any alternative within a group).
    fn search(&self, groups: &[KeywordGroup]) -> RetrievalResult<HashMap<NoteId, f64>>;
}

/// Builds an FTS5 MATCH expression: alternatives are OR-ed inside a group,
/// groups are AND-ed together.
///
/// Every alternative is a quoted string, so FTS5 operators in user input are
/// inert. Returns `None` when there is nothing to match.
///
/// # Examples
///
/// ```
/// use notegraph::{KeywordGroup, keyword::match_expression};
///
/// let groups = vec![
///     KeywordGroup { token: "ml".into(), alternatives: vec!["ml".into(), "machine-learning".into()] },
///     KeywordGroup { token: "rust".into(), alternatives: vec!["rust".into()] },
/// ];
///
/// assert_eq!(
///     match_expression(&groups).as_deref(),
///     Some(r#"("ml" OR "machine-learning") AND ("rust")"#)
/// );
/// ```
pub fn match_expression(groups: &[KeywordGroup]) -> Option<String> {
    let clauses: Vec<String> = groups
        .iter()
        .filter_map(|group| {
            let alternatives: Vec<String> = group
                .alternatives
                .iter()
                .filter(|alt| !alt.trim().is_empty())
                .map(|alt| quote(alt))
                .collect();
            (!alternatives.is_empty()).then(|| format!("({})", alternatives.join(" OR ")))
        })
        .collect();

    (!clauses.is_empty()).then(|| clauses.join(" AND "))
}

fn quote(term: &str) -> String {
    format!("\"{}\"", term.replace('"', "\"\""))
}

/// [`KeywordSearch`] backed by the SQLite FTS5 index, ranked with `bm25()`.
pub struct Fts5KeywordSearch<'conn> {
    conn: &'conn Connection,
}

impl<'conn> Fts5KeywordSearch<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl KeywordSearch for Fts5KeywordSearch<'_> {
    fn search(&self, groups: &[KeywordGroup]) -> RetrievalResult<HashMap<NoteId, f64>> {
        let Some(expression) = match_expression(groups) else {
            return Ok(HashMap::new());
        };

        let mut stmt = self.conn.prepare_cached(
            "SELECT note_id, bm25(notes_fts)
             FROM notes_fts
             WHERE notes_fts MATCH ?1
             ORDER BY bm25(notes_fts)",
        )?;
        let rows = stmt.query_map([&expression], |row| {
            Ok((NoteId::new(row.get(0)?), row.get::<_, f64>(1)?))
        })?;

        let mut raw = Vec::new();
        for row in rows {
            raw.push(row?);
        }

        // bm25() is negative and lower is better; the first row is the best hit.
        let best = raw.first().map(|&(_, score)| score).unwrap_or(0.0);
        let scores: HashMap<NoteId, f64> = raw
            .into_iter()
            .map(|(note, score)| {
                let relevance = if best < 0.0 { score / best } else { 1.0 };
                (note, relevance.clamp(0.0, 1.0))
            })
            .collect();

        debug!(%expression, hits = scores.len(), "keyword search");
        Ok(scores)
    }
}
