//! Read access to the persisted tag graph.
//!
//! [`GraphStore`] is the seam between the retrieval algorithms and storage:
//! the expander, the activation engine and the merger only ever read through
//! it. [`SqliteGraphStore`] implements it over a borrowed connection, which
//! lets a caller run every read of one retrieval call inside a single
//! transaction snapshot.
//!
//! Rows that break the invariants ranking relies on (an edge pointing at a
//! missing tag, an unknown hierarchy kind, a negative centrality counter, a
//! corrupt timestamp) surface as [`RetrievalError::InvariantViolation`].

use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension, Row};
use time::OffsetDateTime;

use crate::error::{RetrievalError, RetrievalResult};
use crate::{
    AliasInfo, Edge, EdgeId, EdgeOrigin, HierarchyKind, NoteId, Tag, TagAssignment, TagId,
    TagSource, ValidityWindow,
};

/// One note-tag assignment as seen by note scoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteTagWeight {
    pub note_id: NoteId,
    pub tag_id: TagId,
    /// Raw stored confidence; scoring clamps it.
    pub confidence: f64,
}

/// Read-only view over tags, edges, aliases and note-tag assignments.
pub trait GraphStore {
    /// Edges touching `tag` in either direction whose validity window covers `now`.
    fn incident_edges(&self, tag: TagId, now: OffsetDateTime) -> RetrievalResult<Vec<Edge>>;

    fn tag(&self, id: TagId) -> RetrievalResult<Option<Tag>>;

    /// Looks up a tag by its exact (case-insensitive) name.
    fn find_tag_by_name(&self, name: &str) -> RetrievalResult<Option<Tag>>;

    /// Resolves an alias to its canonical tag.
    fn resolve_alias(&self, alias: &str) -> RetrievalResult<Option<TagId>>;

    /// All aliases pointing at `tag`, trusted or not.
    fn aliases_for_tag(&self, tag: TagId) -> RetrievalResult<Vec<AliasInfo>>;

    /// Centrality counters for the given tags. Unknown tags are absent from the map.
    fn degree_centrality(&self, tags: &[TagId]) -> RetrievalResult<HashMap<TagId, u32>>;

    /// Highest centrality counter over all tags, 0 for an empty graph.
    fn max_degree_centrality(&self) -> RetrievalResult<u32>;

    /// Share of tags with at least one incident edge, in `[0.0, 1.0]`.
    fn graph_density(&self) -> RetrievalResult<f64>;

    /// Every assignment of a note to one of `tags`.
    fn assignments_for_tags(&self, tags: &[TagId]) -> RetrievalResult<Vec<NoteTagWeight>>;

    /// Tag assignments of a note, or `None` when the note does not exist.
    fn note_tags(&self, note: NoteId) -> RetrievalResult<Option<Vec<TagAssignment>>>;

    /// Creation times of the given notes. Unknown notes are absent from the map.
    fn note_timestamps(&self, notes: &[NoteId]) -> RetrievalResult<HashMap<NoteId, OffsetDateTime>>;
}

/// [`GraphStore`] backed by the SQLite schema in [`crate::db`].
pub struct SqliteGraphStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteGraphStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

/// Edge columns joined with endpoint existence, before validation.
struct EdgeRow {
    id: i64,
    source: i64,
    target: i64,
    source_exists: bool,
    target_exists: bool,
    confidence: f64,
    hierarchy_type: Option<String>,
    valid_from: Option<i64>,
    valid_until: Option<i64>,
    origin: String,
    model_version: Option<String>,
    verified: bool,
    created_at: i64,
    updated_at: i64,
}

const EDGE_COLUMNS: &str = "e.id, e.source_tag_id, e.target_tag_id,
     s.id IS NOT NULL, t.id IS NOT NULL,
     e.confidence, e.hierarchy_type, e.valid_from, e.valid_until,
     e.source, e.model_version, e.verified, e.created_at, e.updated_at";

impl EdgeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            source: row.get(1)?,
            target: row.get(2)?,
            source_exists: row.get(3)?,
            target_exists: row.get(4)?,
            confidence: row.get(5)?,
            hierarchy_type: row.get(6)?,
            valid_from: row.get(7)?,
            valid_until: row.get(8)?,
            origin: row.get(9)?,
            model_version: row.get(10)?,
            verified: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    fn into_edge(self) -> RetrievalResult<Edge> {
        for (exists, tag) in [(self.source_exists, self.source), (self.target_exists, self.target)] {
            if !exists {
                return Err(RetrievalError::invariant(format!(
                    "edge {} references missing tag {}",
                    self.id, tag
                )));
            }
        }

        let hierarchy_kind = self
            .hierarchy_type
            .as_deref()
            .map(str::parse::<HierarchyKind>)
            .transpose()
            .map_err(|e| RetrievalError::invariant(format!("edge {}: {e}", self.id)))?;

        let origin = EdgeOrigin::from_column(&self.origin).ok_or_else(|| {
            RetrievalError::invariant(format!(
                "edge {} has unknown source '{}'",
                self.id, self.origin
            ))
        })?;

        let validity = ValidityWindow {
            valid_from: self.valid_from.map(|t| timestamp("valid_from", t)).transpose()?,
            valid_until: self.valid_until.map(|t| timestamp("valid_until", t)).transpose()?,
        };

        Ok(Edge::from_parts(
            EdgeId::new(self.id),
            TagId::new(self.source),
            TagId::new(self.target),
            self.confidence,
            hierarchy_kind,
            validity,
            origin,
            self.model_version,
            self.verified,
            timestamp("created_at", self.created_at)?,
            timestamp("updated_at", self.updated_at)?,
        ))
    }
}

/// Converts stored Unix seconds, reporting out-of-range values as corruption.
pub(crate) fn timestamp(column: &str, secs: i64) -> RetrievalResult<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(secs)
        .map_err(|_| RetrievalError::invariant(format!("corrupt {column} timestamp {secs}")))
}

fn centrality(tag: i64, raw: i64) -> RetrievalResult<u32> {
    u32::try_from(raw).map_err(|_| {
        RetrievalError::invariant(format!("tag {tag} has invalid degree centrality {raw}"))
    })
}

fn tag_from_parts(id: i64, name: String, degree: i64) -> RetrievalResult<Tag> {
    Ok(Tag::new(TagId::new(id), name).with_degree_centrality(centrality(id, degree)?))
}

impl GraphStore for SqliteGraphStore<'_> {
    fn incident_edges(&self, tag: TagId, now: OffsetDateTime) -> RetrievalResult<Vec<Edge>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {EDGE_COLUMNS}
             FROM edges e
             LEFT JOIN tags s ON s.id = e.source_tag_id
             LEFT JOIN tags t ON t.id = e.target_tag_id
             WHERE e.source_tag_id = ?1 OR e.target_tag_id = ?1
             ORDER BY e.id"
        ))?;

        let rows = stmt.query_map([tag.get()], EdgeRow::from_row)?;

        let mut edges = Vec::new();
        for row in rows {
            let edge = row?.into_edge()?;
            if edge.validity().covers(now) {
                edges.push(edge);
            }
        }
        Ok(edges)
    }

    fn tag(&self, id: TagId) -> RetrievalResult<Option<Tag>> {
        let row: Option<(i64, String, i64)> = self
            .conn
            .prepare_cached("SELECT id, name, degree_centrality FROM tags WHERE id = ?1")?
            .query_row([id.get()], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .optional()?;

        row.map(|(id, name, degree)| tag_from_parts(id, name, degree))
            .transpose()
    }

    fn find_tag_by_name(&self, name: &str) -> RetrievalResult<Option<Tag>> {
        let row: Option<(i64, String, i64)> = self
            .conn
            .prepare_cached(
                "SELECT id, name, degree_centrality FROM tags WHERE name = ?1 COLLATE NOCASE",
            )?
            .query_row([name], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .optional()?;

        row.map(|(id, name, degree)| tag_from_parts(id, name, degree))
            .transpose()
    }

    fn resolve_alias(&self, alias: &str) -> RetrievalResult<Option<TagId>> {
        let id: Option<i64> = self
            .conn
            .prepare_cached("SELECT canonical_tag_id FROM tag_aliases WHERE alias = ?1 COLLATE NOCASE")?
            .query_row([alias], |row| row.get(0))
            .optional()?;

        Ok(id.map(TagId::new))
    }

    fn aliases_for_tag(&self, tag: TagId) -> RetrievalResult<Vec<AliasInfo>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT alias, source, confidence, created_at, model_version
             FROM tag_aliases
             WHERE canonical_tag_id = ?1
             ORDER BY alias",
        )?;

        let rows = stmt.query_map([tag.get()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut aliases = Vec::new();
        for row in rows {
            let (alias, source, confidence, created_at, model_version) = row?;
            aliases.push(AliasInfo::new(
                alias,
                tag,
                TagSource::from_column(&source),
                confidence,
                timestamp("alias created_at", created_at)?,
                model_version,
            ));
        }
        Ok(aliases)
    }

    fn degree_centrality(&self, tags: &[TagId]) -> RetrievalResult<HashMap<TagId, u32>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT degree_centrality FROM tags WHERE id = ?1")?;

        let mut degrees = HashMap::with_capacity(tags.len());
        for &tag in tags {
            let raw: Option<i64> = stmt.query_row([tag.get()], |row| row.get(0)).optional()?;
            if let Some(raw) = raw {
                degrees.insert(tag, centrality(tag.get(), raw)?);
            }
        }
        Ok(degrees)
    }

    fn max_degree_centrality(&self) -> RetrievalResult<u32> {
        let (min, max): (i64, i64) = self.conn.query_row(
            "SELECT COALESCE(MIN(degree_centrality), 0), COALESCE(MAX(degree_centrality), 0) FROM tags",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        if min < 0 {
            return Err(RetrievalError::invariant(format!(
                "negative degree centrality {min} in tags table"
            )));
        }
        centrality(0, max)
    }

    fn graph_density(&self) -> RetrievalResult<f64> {
        let (total, connected): (i64, i64) = self.conn.query_row(
            "SELECT
                 COUNT(*),
                 COUNT(*) FILTER (WHERE EXISTS (
                     SELECT 1 FROM edges e
                     WHERE e.source_tag_id = tags.id OR e.target_tag_id = tags.id
                 ))
             FROM tags",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        if total == 0 {
            return Ok(0.0);
        }
        Ok(connected as f64 / total as f64)
    }

    fn assignments_for_tags(&self, tags: &[TagId]) -> RetrievalResult<Vec<NoteTagWeight>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT note_id, confidence FROM note_tags WHERE tag_id = ?1")?;

        let mut weights = Vec::new();
        for &tag_id in tags {
            let rows = stmt.query_map([tag_id.get()], |row| {
                Ok(NoteTagWeight {
                    note_id: NoteId::new(row.get(0)?),
                    tag_id,
                    confidence: row.get(1)?,
                })
            })?;
            for row in rows {
                weights.push(row?);
            }
        }
        Ok(weights)
    }

    fn note_tags(&self, note: NoteId) -> RetrievalResult<Option<Vec<TagAssignment>>> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM notes WHERE id = ?1)",
            [note.get()],
            |row| row.get(0),
        )?;
        if !exists {
            return Ok(None);
        }

        load_assignments(self.conn, note).map(Some)
    }

    fn note_timestamps(&self, notes: &[NoteId]) -> RetrievalResult<HashMap<NoteId, OffsetDateTime>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT created_at FROM notes WHERE id = ?1")?;

        let mut timestamps = HashMap::with_capacity(notes.len());
        for &note in notes {
            let created_at: Option<i64> =
                stmt.query_row([note.get()], |row| row.get(0)).optional()?;
            if let Some(created_at) = created_at {
                timestamps.insert(note, timestamp("note created_at", created_at)?);
            }
        }
        Ok(timestamps)
    }
}

/// Reads one edge by id, with the same validation as [`GraphStore::incident_edges`].
pub(crate) fn load_edge(conn: &Connection, id: EdgeId) -> RetrievalResult<Option<Edge>> {
    let row = conn
        .prepare_cached(&format!(
            "SELECT {EDGE_COLUMNS}
             FROM edges e
             LEFT JOIN tags s ON s.id = e.source_tag_id
             LEFT JOIN tags t ON t.id = e.target_tag_id
             WHERE e.id = ?1"
        ))?
        .query_row([id.get()], EdgeRow::from_row)
        .optional()?;

    row.map(EdgeRow::into_edge).transpose()
}

/// Reads a note's tag assignments in assignment order.
pub(crate) fn load_assignments(
    conn: &Connection,
    note: NoteId,
) -> RetrievalResult<Vec<TagAssignment>> {
    let mut stmt = conn.prepare_cached(
        "SELECT tag_id, confidence, source, created_at, model_version, verified
         FROM note_tags
         WHERE note_id = ?1
         ORDER BY created_at, tag_id",
    )?;

    let rows = stmt.query_map([note.get()], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, f64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, bool>(5)?,
        ))
    })?;

    let mut assignments = Vec::new();
    for row in rows {
        let (tag_id, confidence, source, created_at, model_version, verified) = row?;
        let created_at = timestamp("note_tags created_at", created_at)?;

        let mut assignment = match TagSource::from_column(&source) {
            TagSource::User => TagAssignment::user(TagId::new(tag_id), created_at),
            TagSource::Llm => TagAssignment::llm(
                TagId::new(tag_id),
                model_version.unwrap_or_else(|| "unknown".to_string()),
                confidence,
                created_at,
            ),
        };
        if verified {
            assignment.verify();
        }
        assignments.push(assignment);
    }
    Ok(assignments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use time::Duration;

    fn setup() -> Database {
        let db = Database::in_memory().unwrap();
        db.connection()
            .execute_batch(
                "INSERT INTO tags (id, name) VALUES
                     (1, 'transformer'), (2, 'neural-network'), (3, 'attention'), (4, 'cooking');
                 INSERT INTO edges (source_tag_id, target_tag_id, confidence, hierarchy_type, created_at, updated_at)
                 VALUES (1, 2, 0.9, 'generic', 0, 0), (3, 1, 0.8, 'partitive', 0, 0);",
            )
            .unwrap();
        db
    }

    #[test]
    fn incident_edges_include_both_directions() {
        let db = setup();
        let store = SqliteGraphStore::new(db.connection());

        let edges = store
            .incident_edges(TagId::new(1), OffsetDateTime::now_utc())
            .unwrap();

        assert_eq!(edges.len(), 2);
        let neighbors: Vec<TagId> = edges
            .iter()
            .filter_map(|e| e.other_endpoint(TagId::new(1)))
            .collect();
        assert!(neighbors.contains(&TagId::new(2)));
        assert!(neighbors.contains(&TagId::new(3)));
        assert_eq!(edges[1].hierarchy_kind(), Some(HierarchyKind::Partitive));
    }

    #[test]
    fn incident_edges_skip_expired_and_future_edges() {
        let db = setup();
        let now = OffsetDateTime::now_utc();
        let hour = Duration::hours(1);
        db.connection()
            .execute(
                "INSERT INTO edges (source_tag_id, target_tag_id, confidence, valid_until, created_at, updated_at)
                 VALUES (4, 2, 1.0, ?1, 0, 0)",
                [(now - hour).unix_timestamp()],
            )
            .unwrap();
        db.connection()
            .execute(
                "INSERT INTO edges (source_tag_id, target_tag_id, confidence, valid_from, created_at, updated_at)
                 VALUES (4, 3, 1.0, ?1, 0, 0)",
                [(now + hour).unix_timestamp()],
            )
            .unwrap();
        let store = SqliteGraphStore::new(db.connection());

        assert!(store.incident_edges(TagId::new(4), now).unwrap().is_empty());
        assert_eq!(
            store
                .incident_edges(TagId::new(4), now - Duration::hours(2))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn unknown_hierarchy_type_is_an_invariant_violation() {
        let db = setup();
        db.connection()
            .execute(
                "INSERT INTO edges (source_tag_id, target_tag_id, confidence, hierarchy_type, created_at, updated_at)
                 VALUES (4, 1, 0.5, 'instance', 0, 0)",
                [],
            )
            .unwrap();
        let store = SqliteGraphStore::new(db.connection());

        let result = store.incident_edges(TagId::new(4), OffsetDateTime::now_utc());
        assert!(matches!(result, Err(RetrievalError::InvariantViolation(_))));
    }

    #[test]
    fn edge_to_missing_tag_is_an_invariant_violation() {
        let db = setup();
        let conn = db.connection();
        conn.execute("PRAGMA foreign_keys = OFF", []).unwrap();
        conn.execute(
            "INSERT INTO edges (source_tag_id, target_tag_id, confidence, created_at, updated_at)
             VALUES (4, 99, 0.5, 0, 0)",
            [],
        )
        .unwrap();
        let store = SqliteGraphStore::new(conn);

        let err = store
            .incident_edges(TagId::new(4), OffsetDateTime::now_utc())
            .unwrap_err();
        assert!(err.to_string().contains("missing tag 99"));
    }

    #[test]
    fn negative_centrality_is_an_invariant_violation() {
        let db = setup();
        db.connection()
            .execute("UPDATE tags SET degree_centrality = -1 WHERE id = 4", [])
            .unwrap();
        let store = SqliteGraphStore::new(db.connection());

        assert!(matches!(
            store.max_degree_centrality(),
            Err(RetrievalError::InvariantViolation(_))
        ));
        assert!(matches!(
            store.degree_centrality(&[TagId::new(4)]),
            Err(RetrievalError::InvariantViolation(_))
        ));
    }

    #[test]
    fn density_counts_connected_tags() {
        let db = setup();
        let store = SqliteGraphStore::new(db.connection());

        // three of four tags touch an edge
        assert!((store.graph_density().unwrap() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn density_of_empty_store_is_zero() {
        let db = Database::in_memory().unwrap();
        let store = SqliteGraphStore::new(db.connection());

        assert_eq!(store.graph_density().unwrap(), 0.0);
        assert_eq!(store.max_degree_centrality().unwrap(), 0);
    }

    #[test]
    fn find_tag_by_name_ignores_case() {
        let db = setup();
        let store = SqliteGraphStore::new(db.connection());

        let tag = store.find_tag_by_name("Transformer").unwrap().unwrap();
        assert_eq!(tag.id(), TagId::new(1));
        assert!(store.find_tag_by_name("missing").unwrap().is_none());
    }

    #[test]
    fn aliases_resolve_and_list_with_provenance() {
        let db = setup();
        db.connection()
            .execute_batch(
                "INSERT INTO tag_aliases (alias, canonical_tag_id, source, confidence, created_at)
                 VALUES ('nn', 2, 'user', 1.0, 0), ('neural-net', 2, 'llm', 0.6, 0);",
            )
            .unwrap();
        let store = SqliteGraphStore::new(db.connection());

        assert_eq!(store.resolve_alias("NN").unwrap(), Some(TagId::new(2)));
        let aliases = store.aliases_for_tag(TagId::new(2)).unwrap();
        assert_eq!(aliases.len(), 2);
        assert_eq!(aliases[0].alias(), "neural-net");
        assert!(!aliases[0].is_trusted());
        assert!(aliases[1].is_trusted());
    }

    #[test]
    fn note_reads_distinguish_missing_notes() {
        let db = setup();
        db.connection()
            .execute_batch(
                "INSERT INTO notes (id, content, created_at, updated_at) VALUES (10, 'attention heads', 1000, 1000);
                 INSERT INTO note_tags (note_id, tag_id, confidence, source, created_at, model_version)
                 VALUES (10, 3, 0.7, 'llm', 1000, 'model-a');",
            )
            .unwrap();
        let store = SqliteGraphStore::new(db.connection());

        let tags = store.note_tags(NoteId::new(10)).unwrap().unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].confidence(), 0.7);
        assert!(store.note_tags(NoteId::new(11)).unwrap().is_none());

        let weights = store.assignments_for_tags(&[TagId::new(3)]).unwrap();
        assert_eq!(
            weights,
            vec![NoteTagWeight {
                note_id: NoteId::new(10),
                tag_id: TagId::new(3),
                confidence: 0.7
            }]
        );

        let times = store
            .note_timestamps(&[NoteId::new(10), NoteId::new(11)])
            .unwrap();
        assert_eq!(times.len(), 1);
        assert_eq!(times[&NoteId::new(10)].unix_timestamp(), 1000);
    }
}
