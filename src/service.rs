use std::collections::{HashMap, HashSet};

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use crate::centrality::{self, EdgeMutation};
use crate::config::RetrievalConfig;
use crate::deadline::Deadline;
use crate::error::{RetrievalError, RetrievalResult};
use crate::expansion::{QueryExpander, WeightedTermSet};
use crate::graph::{self, GraphStore, SqliteGraphStore};
use crate::keyword::{Fts5KeywordSearch, KeywordSearch, match_expression};
use crate::merge::{DualChannelMerger, MergeOutcome, SearchMetadata, SkipReason};
use crate::spreading_activation::{score_notes, spread_activation};
use crate::{
    AliasInfo, Database, Edge, EdgeCandidate, EdgeId, Note, NoteBuilder, NoteId, SearchResult,
    Tag, TagAssignment, TagId, TagNormalizer, TagSource,
};

/// Ranked results of a dual-channel search with diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub metadata: SearchMetadata,
}

/// Service layer over the note archive and its tag graph.
///
/// NoteService owns a Database instance. It offers the note, tag and alias
/// operations retrieval reads from, the edge writes that keep degree
/// centrality consistent, and the three retrieval entry points:
/// [`search`](Self::search), [`graph_search`](Self::graph_search) and
/// [`related_to_note`](Self::related_to_note).
///
/// # Examples
///
/// ```
/// use notegraph::{Database, NoteService};
///
/// # fn main() -> anyhow::Result<()> {
/// let db = Database::in_memory()?;
/// let service = NoteService::new(db);
///
/// service.create_note("Ownership rules in Rust", Some(&["rust"]))?;
/// let response = service.search("rust", 10)?;
/// assert_eq!(response.results.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct NoteService {
    db: Database,
    config: RetrievalConfig,
}

impl NoteService {
    /// Creates a new NoteService with default retrieval settings.
    pub fn new(db: Database) -> Self {
        Self {
            db,
            config: RetrievalConfig::default(),
        }
    }

    /// Creates a NoteService with explicit retrieval settings.
    ///
    /// Fails with [`RetrievalError::Configuration`] if any tunable is out of range.
    pub fn with_config(db: Database, config: RetrievalConfig) -> RetrievalResult<Self> {
        config.validate()?;
        Ok(Self { db, config })
    }

    /// Returns a reference to the underlying database.
    ///
    /// Useful for testing or advanced operations that need direct database access.
    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Runs `f` inside an immediate write transaction.
    ///
    /// Commits on `Ok`, rolls back on `Err`.
    fn write_transaction<T, E>(&self, f: impl FnOnce(&Connection) -> Result<T, E>) -> Result<T, E>
    where
        E: From<rusqlite::Error>,
    {
        self.transaction("BEGIN IMMEDIATE", f)
    }

    /// Runs `f` inside a deferred transaction so every read sees one snapshot.
    fn read_snapshot<T>(
        &self,
        f: impl FnOnce(&Connection) -> RetrievalResult<T>,
    ) -> RetrievalResult<T> {
        self.transaction("BEGIN DEFERRED", f)
    }

    fn transaction<T, E>(
        &self,
        begin: &str,
        f: impl FnOnce(&Connection) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<rusqlite::Error>,
    {
        let conn = self.db.connection();
        conn.execute(begin, [])?;

        match f(conn) {
            Ok(value) => {
                if let Err(e) = conn.execute("COMMIT", []) {
                    conn.execute("ROLLBACK", []).ok();
                    return Err(e.into());
                }
                Ok(value)
            }
            Err(e) => {
                conn.execute("ROLLBACK", []).ok();
                Err(e)
            }
        }
    }

    /// Creates a new note with the given content and optional user tags.
    ///
    /// Tag names are normalized and deduplicated; aliases resolve to their
    /// canonical tag.
    ///
    /// # Examples
    ///
    /// ```
    /// use notegraph::{Database, NoteService};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let service = NoteService::new(Database::in_memory()?);
    ///
    /// let note = service.create_note("My first note", Some(&["Rust", "rust"]))?;
    /// assert_eq!(note.content(), "My first note");
    /// assert_eq!(note.tags().len(), 1);
    /// # Ok(())
    /// # }
    /// ```
    pub fn create_note(&self, content: &str, tags: Option<&[&str]>) -> Result<Note> {
        let timestamp = OffsetDateTime::now_utc().unix_timestamp();
        let created_at = OffsetDateTime::from_unix_timestamp(timestamp)?;

        self.write_transaction(|conn| {
            conn.execute(
                "INSERT INTO notes (content, created_at, updated_at) VALUES (?1, ?2, ?3)",
                (content, timestamp, timestamp),
            )?;
            let note_id = NoteId::new(conn.last_insert_rowid());

            let mut assignments = Vec::new();
            let mut seen = HashSet::new();
            for tag_name in tags.unwrap_or_default() {
                let tag_id = self.get_or_create_tag(tag_name)?;
                if !seen.insert(tag_id) {
                    continue;
                }

                conn.execute(
                    "INSERT INTO note_tags (note_id, tag_id, confidence, source, created_at, verified, model_version)
                     VALUES (?1, ?2, 1.0, 'user', ?3, 0, NULL)",
                    (note_id.get(), tag_id.get(), timestamp),
                )?;
                assignments.push(TagAssignment::user(tag_id, created_at));
            }

            Ok(NoteBuilder::new()
                .id(note_id)
                .content(content)
                .created_at(created_at)
                .updated_at(created_at)
                .tags(assignments)
                .build())
        })
    }

    /// Retrieves a note by its ID.
    ///
    /// Returns `None` if no note exists with the given ID. This is not
    /// considered an error condition.
    pub fn get_note(&self, id: NoteId) -> Result<Option<Note>> {
        Ok(load_note(self.db.connection(), id)?)
    }

    /// Deletes a note by its ID.
    ///
    /// This operation is idempotent. Foreign key constraints remove the note's
    /// tag assignments; triggers remove it from the full-text index.
    pub fn delete_note(&self, id: NoteId) -> Result<()> {
        self.db
            .connection()
            .execute("DELETE FROM notes WHERE id = ?1", [id.get()])?;
        Ok(())
    }

    /// Gets or creates a tag by name.
    ///
    /// The name is normalized first. If an alias exists for the normalized
    /// name, returns the canonical tag ID.
    pub fn get_or_create_tag(&self, name: &str) -> Result<TagId> {
        let normalized = TagNormalizer::normalize_tag(name);
        if normalized.is_empty() {
            anyhow::bail!("Tag name '{}' is empty after normalization", name);
        }
        let conn = self.db.connection();

        if let Some(canonical_tag_id) = self.resolve_alias(&normalized)? {
            return Ok(canonical_tag_id);
        }

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM tags WHERE name = ?1 COLLATE NOCASE",
                [&normalized],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = existing {
            return Ok(TagId::new(id));
        }

        conn.execute("INSERT INTO tags (name) VALUES (?1)", [&normalized])?;
        Ok(TagId::new(conn.last_insert_rowid()))
    }

    /// Looks up a tag by name or alias without creating it.
    pub fn find_tag(&self, name: &str) -> Result<Option<Tag>> {
        let normalized = TagNormalizer::normalize_tag(name);
        let store = SqliteGraphStore::new(self.db.connection());

        if let Some(id) = store.resolve_alias(&normalized)? {
            return Ok(store.tag(id)?);
        }
        Ok(store.find_tag_by_name(&normalized)?)
    }

    /// Adds tags to an existing note.
    ///
    /// User assignments always carry confidence 1.0; for LLM assignments the
    /// given confidence and model are stored. Existing assignments are kept.
    ///
    /// # Examples
    ///
    /// ```
    /// use notegraph::{Database, NoteService, TagSource};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let service = NoteService::new(Database::in_memory()?);
    /// let note = service.create_note("My note", None)?;
    ///
    /// service.add_tags_to_note(note.id(), &["rust"], TagSource::User, 1.0, None)?;
    /// service.add_tags_to_note(note.id(), &["ai"], TagSource::Llm, 0.85, Some("deepseek-r1:8b"))?;
    ///
    /// let note = service.get_note(note.id())?.expect("note exists");
    /// assert_eq!(note.tags().len(), 2);
    /// # Ok(())
    /// # }
    /// ```
    pub fn add_tags_to_note(
        &self,
        note_id: NoteId,
        tags: &[&str],
        source: TagSource,
        confidence: f64,
        model_version: Option<&str>,
    ) -> Result<()> {
        let conn = self.db.connection();
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let note_exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM notes WHERE id = ?1)",
            [note_id.get()],
            |row| row.get(0),
        )?;
        if !note_exists {
            anyhow::bail!("Note with id {} does not exist", note_id);
        }

        let (confidence, model_version) = match source {
            TagSource::User => (1.0, None),
            TagSource::Llm => (confidence, model_version),
        };

        for tag_name in tags {
            let tag_id = self.get_or_create_tag(tag_name)?;
            conn.execute(
                "INSERT OR IGNORE INTO note_tags
                 (note_id, tag_id, confidence, source, created_at, verified, model_version)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
                rusqlite::params![
                    note_id.get(),
                    tag_id.get(),
                    confidence,
                    source.as_str(),
                    now,
                    model_version,
                ],
            )?;
        }

        Ok(())
    }

    /// Deletes a tag, its assignments, aliases and edges.
    ///
    /// Neighbors of the tag lose one centrality point per removed edge, in
    /// the same transaction. Returns whether the tag existed.
    pub fn delete_tag(&self, tag_id: TagId) -> Result<bool> {
        self.write_transaction(|conn| {
            centrality::on_tag_deleted(conn, tag_id)?;
            let removed = conn.execute("DELETE FROM tags WHERE id = ?1", [tag_id.get()])?;
            Ok(removed > 0)
        })
    }

    /// Resolves an alias to its canonical tag ID.
    ///
    /// Normalizes the input alias name before lookup.
    ///
    /// # Examples
    ///
    /// ```
    /// use notegraph::{Database, NoteService, TagSource};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let service = NoteService::new(Database::in_memory()?);
    ///
    /// let canonical_tag_id = service.get_or_create_tag("machine-learning")?;
    /// service.create_alias("ml", canonical_tag_id, TagSource::User, 1.0, None)?;
    ///
    /// assert_eq!(service.resolve_alias("ML")?, Some(canonical_tag_id));
    /// assert_eq!(service.resolve_alias("non-existent")?, None);
    /// # Ok(())
    /// # }
    /// ```
    pub fn resolve_alias(&self, name: &str) -> Result<Option<TagId>> {
        let normalized = TagNormalizer::normalize_tag(name);
        let store = SqliteGraphStore::new(self.db.connection());
        Ok(store.resolve_alias(&normalized)?)
    }

    /// Creates an alias mapping an alternate name to a canonical tag.
    ///
    /// Verifies that the canonical tag exists and is not itself an alias.
    /// Uses INSERT OR REPLACE for idempotent updates.
    pub fn create_alias(
        &self,
        alias: &str,
        canonical_tag_id: TagId,
        source: TagSource,
        confidence: f64,
        model_version: Option<&str>,
    ) -> Result<()> {
        let normalized_alias = TagNormalizer::normalize_tag(alias);
        if normalized_alias.is_empty() {
            anyhow::bail!("Alias '{}' is empty after normalization", alias);
        }
        let conn = self.db.connection();
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let tag_name: Option<String> = conn
            .query_row(
                "SELECT name FROM tags WHERE id = ?1",
                [canonical_tag_id.get()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(tag_name) = tag_name else {
            anyhow::bail!("Canonical tag with id {} does not exist", canonical_tag_id);
        };

        let is_alias: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM tag_aliases WHERE alias = ?1 COLLATE NOCASE)",
            [&tag_name],
            |row| row.get(0),
        )?;
        if is_alias {
            anyhow::bail!(
                "Cannot create alias: tag '{}' (id {}) is itself an alias",
                tag_name,
                canonical_tag_id
            );
        }

        conn.execute(
            "INSERT OR REPLACE INTO tag_aliases (alias, canonical_tag_id, source, confidence, created_at, model_version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                normalized_alias,
                canonical_tag_id.get(),
                source.as_str(),
                confidence,
                now,
                model_version,
            ],
        )?;

        Ok(())
    }

    /// Lists all tag aliases, ordered by canonical tag name then alias.
    pub fn list_aliases(&self) -> Result<Vec<AliasInfo>> {
        let conn = self.db.connection();

        let mut stmt = conn.prepare(
            "SELECT ta.alias, ta.canonical_tag_id, ta.source, ta.confidence, ta.created_at, ta.model_version
             FROM tag_aliases ta
             JOIN tags t ON ta.canonical_tag_id = t.id
             ORDER BY t.name, ta.alias",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut aliases = Vec::new();
        for row_result in rows {
            let (alias, canonical_tag_id, source, confidence, created_at, model_version) =
                row_result?;

            aliases.push(AliasInfo::new(
                alias,
                TagId::new(canonical_tag_id),
                TagSource::from_column(&source),
                confidence,
                OffsetDateTime::from_unix_timestamp(created_at)?,
                model_version,
            ));
        }

        Ok(aliases)
    }

    /// Removes an alias mapping. Idempotent.
    pub fn remove_alias(&self, alias: &str) -> Result<()> {
        let normalized = TagNormalizer::normalize_tag(alias);
        self.db.connection().execute(
            "DELETE FROM tag_aliases WHERE alias = ?1 COLLATE NOCASE",
            [&normalized],
        )?;
        Ok(())
    }

    /// Writes an edge and updates endpoint centrality atomically.
    ///
    /// An existing edge between the same pair is updated in place and leaves
    /// centrality untouched. Self-loops are rejected.
    ///
    /// # Examples
    ///
    /// ```
    /// use notegraph::{Database, EdgeCandidate, HierarchyKind, NoteService};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let service = NoteService::new(Database::in_memory()?);
    /// let transformer = service.get_or_create_tag("transformer")?;
    /// let network = service.get_or_create_tag("neural-network")?;
    ///
    /// let edge = service.create_edge(
    ///     &EdgeCandidate::new(transformer, network, 0.9).hierarchy_kind(HierarchyKind::Generic),
    /// )?;
    /// assert_eq!(edge.target(), network);
    /// # Ok(())
    /// # }
    /// ```
    pub fn create_edge(&self, candidate: &EdgeCandidate) -> RetrievalResult<Edge> {
        self.write_transaction(|conn| insert_edge(conn, candidate))
    }

    /// Writes precomputed candidates in one transaction. Any failure rolls back all of them.
    pub fn create_edges_batch(&self, candidates: &[EdgeCandidate]) -> RetrievalResult<Vec<Edge>> {
        self.write_transaction(|conn| {
            candidates
                .iter()
                .map(|candidate| insert_edge(conn, candidate))
                .collect()
        })
    }

    /// Deletes the edge from `source` to `target`, if any, and releases centrality.
    pub fn delete_edge(&self, source: TagId, target: TagId) -> RetrievalResult<bool> {
        self.write_transaction(|conn| {
            let removed = conn.execute(
                "DELETE FROM edges WHERE source_tag_id = ?1 AND target_tag_id = ?2",
                [source.get(), target.get()],
            )?;
            if removed > 0 {
                EdgeMutation::Deleted { source, target }.apply(conn)?;
            }
            Ok(removed > 0)
        })
    }

    /// Recomputes every centrality counter from the edge set.
    pub fn backfill_centrality(&self) -> RetrievalResult<usize> {
        self.write_transaction(centrality::backfill)
    }

    /// Dual-channel search: keyword matches merged with spreading activation.
    ///
    /// A store failure in the graph channel degrades to keyword-only results
    /// and is reported in [`SearchMetadata::graph_skipped`]. Configuration,
    /// invariant and timeout errors abort the call.
    #[instrument(level = "debug", skip(self, query), fields(query_len = query.len()))]
    pub fn search(&self, query: &str, limit: usize) -> RetrievalResult<SearchResponse> {
        let deadline = Deadline::after(self.config.timeout);
        let now = OffsetDateTime::now_utc();

        self.read_snapshot(|conn| {
            let store = SqliteGraphStore::new(conn);
            let expander = QueryExpander::new(&store, &self.config.expansion);

            let (terms, graph) = match expander.expand(query, None, now) {
                Ok(terms) => {
                    let graph = self.graph_channel(&store, terms.seeds(), None, now, &deadline);
                    (terms, graph)
                }
                Err(e) => (WeightedTermSet::from_tokens(query), Err(e)),
            };
            deadline.check()?;

            let keyword = Fts5KeywordSearch::new(conn).search(terms.keyword_groups())?;
            let merger = DualChannelMerger::new(&self.config.merge);

            let graph_hits = graph.as_ref().map(HashMap::len).unwrap_or(0);
            let outcome = match graph {
                Ok(graph) => merger.merge(&store, &keyword, &graph)?,
                Err(e) if e.allows_keyword_fallback() => {
                    warn!(error = %e, "graph channel unavailable, serving keyword results");
                    merger.keyword_only(&store, &keyword, SkipReason::StoreUnavailable, None)?
                }
                Err(e) => return Err(e),
            };
            deadline.check()?;

            let metadata = SearchMetadata {
                graph_skipped: outcome.graph_skipped,
                keyword_hits: keyword.len(),
                graph_hits,
                keyword_expression: match_expression(terms.keyword_groups()),
                graph_density: outcome.graph_density,
            };
            let results = materialize(conn, outcome, limit)?;

            info!(
                results = results.len(),
                keyword_hits = metadata.keyword_hits,
                graph_hits = metadata.graph_hits,
                graph_skipped = ?metadata.graph_skipped,
                elapsed_ms = deadline.elapsed().as_millis() as u64,
                "search complete"
            );
            Ok(SearchResponse { results, metadata })
        })
    }

    /// Graph channel only. Empty on cold start.
    #[instrument(level = "debug", skip(self, query), fields(query_len = query.len()))]
    pub fn graph_search(&self, query: &str, limit: usize) -> RetrievalResult<Vec<SearchResult>> {
        let deadline = Deadline::after(self.config.timeout);
        let now = OffsetDateTime::now_utc();

        self.read_snapshot(|conn| {
            let store = SqliteGraphStore::new(conn);
            let terms = QueryExpander::new(&store, &self.config.expansion).expand(query, None, now)?;
            let graph = self.graph_channel(&store, terms.seeds(), None, now, &deadline)?;

            let outcome = DualChannelMerger::new(&self.config.merge).graph_only(&store, &graph)?;
            let results = materialize(conn, outcome, limit)?;

            info!(results = results.len(), "graph search complete");
            Ok(results)
        })
    }

    /// Notes related to `note_id` through the tag graph, excluding the note itself.
    ///
    /// The note's own tags are the seeds, weighted by assignment confidence.
    /// Fails with [`RetrievalError::NoteNotFound`] for an unknown note.
    #[instrument(level = "debug", skip(self))]
    pub fn related_to_note(&self, note_id: NoteId, limit: usize) -> RetrievalResult<Vec<SearchResult>> {
        let deadline = Deadline::after(self.config.timeout);
        let now = OffsetDateTime::now_utc();

        self.read_snapshot(|conn| {
            let store = SqliteGraphStore::new(conn);
            let terms =
                QueryExpander::new(&store, &self.config.expansion).expand("", Some(note_id), now)?;
            let graph = self.graph_channel(&store, terms.seeds(), Some(note_id), now, &deadline)?;

            let outcome = DualChannelMerger::new(&self.config.merge).graph_only(&store, &graph)?;
            let results = materialize(conn, outcome, limit)?;

            info!(results = results.len(), "related notes complete");
            Ok(results)
        })
    }

    fn graph_channel(
        &self,
        store: &SqliteGraphStore<'_>,
        seeds: &HashMap<TagId, f64>,
        exclude: Option<NoteId>,
        now: OffsetDateTime,
        deadline: &Deadline,
    ) -> RetrievalResult<HashMap<NoteId, f64>> {
        let activations = spread_activation(store, seeds, &self.config.activation, now, deadline)?;
        deadline.check()?;
        score_notes(store, &activations, exclude)
    }
}

fn insert_edge(conn: &Connection, candidate: &EdgeCandidate) -> RetrievalResult<Edge> {
    if candidate.source == candidate.target {
        return Err(RetrievalError::invariant(format!(
            "self-loop edge on tag {}",
            candidate.source
        )));
    }
    if !candidate.confidence.is_finite() {
        return Err(RetrievalError::invariant(format!(
            "edge confidence must be finite, got {}",
            candidate.confidence
        )));
    }

    let now = OffsetDateTime::now_utc().unix_timestamp();
    let hierarchy_type = candidate.hierarchy_kind.map(|kind| kind.as_str());
    let valid_from = candidate.validity.valid_from.map(OffsetDateTime::unix_timestamp);
    let valid_until = candidate.validity.valid_until.map(OffsetDateTime::unix_timestamp);

    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM edges WHERE source_tag_id = ?1 AND target_tag_id = ?2",
            [candidate.source.get(), candidate.target.get()],
            |row| row.get(0),
        )
        .optional()?;

    let id = match existing {
        Some(id) => {
            conn.execute(
                "UPDATE edges
                 SET confidence = ?1, hierarchy_type = ?2, valid_from = ?3, valid_until = ?4,
                     source = ?5, model_version = ?6, verified = ?7, updated_at = ?8
                 WHERE id = ?9",
                rusqlite::params![
                    candidate.confidence,
                    hierarchy_type,
                    valid_from,
                    valid_until,
                    candidate.origin.as_str(),
                    candidate.model_version,
                    candidate.verified,
                    now,
                    id,
                ],
            )?;
            id
        }
        None => {
            conn.execute(
                "INSERT INTO edges
                 (source_tag_id, target_tag_id, confidence, hierarchy_type, valid_from, valid_until,
                  source, model_version, verified, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                rusqlite::params![
                    candidate.source.get(),
                    candidate.target.get(),
                    candidate.confidence,
                    hierarchy_type,
                    valid_from,
                    valid_until,
                    candidate.origin.as_str(),
                    candidate.model_version,
                    candidate.verified,
                    now,
                ],
            )?;
            EdgeMutation::Created {
                source: candidate.source,
                target: candidate.target,
            }
            .apply(conn)?;
            conn.last_insert_rowid()
        }
    };

    graph::load_edge(conn, EdgeId::new(id))?
        .ok_or_else(|| RetrievalError::invariant(format!("edge {id} vanished after write")))
}

fn load_note(conn: &Connection, id: NoteId) -> RetrievalResult<Option<Note>> {
    let row: Option<(String, i64, i64)> = conn
        .prepare_cached("SELECT content, created_at, updated_at FROM notes WHERE id = ?1")?
        .query_row([id.get()], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .optional()?;

    let Some((content, created_at, updated_at)) = row else {
        return Ok(None);
    };

    Ok(Some(
        NoteBuilder::new()
            .id(id)
            .content(content)
            .created_at(graph::timestamp("note created_at", created_at)?)
            .updated_at(graph::timestamp("note updated_at", updated_at)?)
            .tags(graph::load_assignments(conn, id)?)
            .build(),
    ))
}

/// Loads the top `limit` ranked notes.
fn materialize(
    conn: &Connection,
    outcome: MergeOutcome,
    limit: usize,
) -> RetrievalResult<Vec<SearchResult>> {
    let mut results = Vec::with_capacity(limit.min(outcome.ranked.len()));
    for ranked in outcome.ranked.into_iter().take(limit) {
        if let Some(note) = load_note(conn, ranked.note_id)? {
            results.push(SearchResult {
                note,
                relevance_score: ranked.score,
                keyword_score: ranked.keyword_score,
                graph_score: ranked.graph_score,
                found_by_both: ranked.found_by_both,
            });
        }
    }
    Ok(results)
}
