//! Degree centrality maintenance.
//!
//! `tags.degree_centrality` counts the edges incident to a tag, regardless of
//! direction. Whoever writes an edge applies the matching [`EdgeMutation`] on
//! the same connection inside the same transaction, so the counter and the
//! edge set commit or roll back together.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::TagId;
use crate::error::{RetrievalError, RetrievalResult};

/// An edge write whose effect on centrality has to be recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeMutation {
    Created { source: TagId, target: TagId },
    Deleted { source: TagId, target: TagId },
}

impl EdgeMutation {
    /// Adjusts both endpoint counters.
    ///
    /// Must run inside the transaction that performed the edge write.
    pub fn apply(self, conn: &Connection) -> RetrievalResult<()> {
        match self {
            Self::Created { source, target } => on_edge_created(conn, source, target),
            Self::Deleted { source, target } => on_edge_deleted(conn, source, target),
        }
    }
}

/// Increments the counters of both endpoints of a new edge.
pub fn on_edge_created(conn: &Connection, source: TagId, target: TagId) -> RetrievalResult<()> {
    reject_self_loop(source, target)?;

    let mut stmt = conn.prepare_cached(
        "UPDATE tags SET degree_centrality = degree_centrality + 1 WHERE id = ?1",
    )?;
    for tag in [source, target] {
        if stmt.execute([tag.get()])? == 0 {
            return Err(RetrievalError::invariant(format!(
                "edge endpoint tag {tag} does not exist"
            )));
        }
    }

    debug!(%source, %target, "incremented degree centrality");
    Ok(())
}

/// Decrements the counters of both endpoints of a removed edge, never below zero.
pub fn on_edge_deleted(conn: &Connection, source: TagId, target: TagId) -> RetrievalResult<()> {
    reject_self_loop(source, target)?;

    let mut stmt = conn.prepare_cached(
        "UPDATE tags SET degree_centrality = MAX(0, degree_centrality - 1) WHERE id = ?1",
    )?;
    for tag in [source, target] {
        stmt.execute([tag.get()])?;
    }

    debug!(%source, %target, "decremented degree centrality");
    Ok(())
}

/// Decrements the far endpoint of every edge incident to `tag`.
///
/// Call before deleting the tag: the foreign-key cascade removes the edges
/// afterwards without touching any counter. Returns the number of edges seen.
pub fn on_tag_deleted(conn: &Connection, tag: TagId) -> RetrievalResult<usize> {
    let neighbors: Vec<i64> = {
        let mut stmt = conn.prepare_cached(
            "SELECT CASE WHEN source_tag_id = ?1 THEN target_tag_id ELSE source_tag_id END
             FROM edges
             WHERE (source_tag_id = ?1 OR target_tag_id = ?1)
               AND source_tag_id != target_tag_id",
        )?;
        let rows = stmt.query_map([tag.get()], |row| row.get(0))?;
        rows.collect::<Result<_, _>>()?
    };

    let mut stmt = conn.prepare_cached(
        "UPDATE tags SET degree_centrality = MAX(0, degree_centrality - 1) WHERE id = ?1",
    )?;
    for neighbor in &neighbors {
        stmt.execute([neighbor])?;
    }

    debug!(%tag, edges = neighbors.len(), "released centrality of deleted tag");
    Ok(neighbors.len())
}

/// Recomputes every counter from the current edge set.
///
/// Used once for databases whose edges predate centrality tracking, or to
/// repair drift. Returns the number of tags whose counter changed.
pub fn backfill(conn: &Connection) -> RetrievalResult<usize> {
    let changed = conn.execute(
        "UPDATE tags
         SET degree_centrality = (
             SELECT COUNT(*) FROM edges e
             WHERE e.source_tag_id = tags.id OR e.target_tag_id = tags.id
         )
         WHERE degree_centrality != (
             SELECT COUNT(*) FROM edges e
             WHERE e.source_tag_id = tags.id OR e.target_tag_id = tags.id
         )",
        [],
    )?;

    info!(changed, "backfilled degree centrality");
    Ok(changed)
}

fn reject_self_loop(source: TagId, target: TagId) -> RetrievalResult<()> {
    if source == target {
        return Err(RetrievalError::invariant(format!(
            "self-loop edge on tag {source}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn setup(tag_count: i64) -> Database {
        let db = Database::in_memory().unwrap();
        for id in 1..=tag_count {
            db.connection()
                .execute(
                    "INSERT INTO tags (id, name) VALUES (?1, ?2)",
                    rusqlite::params![id, format!("tag-{id}")],
                )
                .unwrap();
        }
        db
    }

    fn degree(db: &Database, tag: i64) -> i64 {
        db.connection()
            .query_row(
                "SELECT degree_centrality FROM tags WHERE id = ?1",
                [tag],
                |row| row.get(0),
            )
            .unwrap()
    }

    fn incident_count(db: &Database, tag: i64) -> i64 {
        db.connection()
            .query_row(
                "SELECT COUNT(*) FROM edges WHERE source_tag_id = ?1 OR target_tag_id = ?1",
                [tag],
                |row| row.get(0),
            )
            .unwrap()
    }

    fn insert_edge(db: &Database, source: i64, target: i64) {
        let conn = db.connection();
        conn.execute(
            "INSERT INTO edges (source_tag_id, target_tag_id, confidence, created_at, updated_at)
             VALUES (?1, ?2, 0.9, 0, 0)",
            [source, target],
        )
        .unwrap();
        EdgeMutation::Created {
            source: TagId::new(source),
            target: TagId::new(target),
        }
        .apply(conn)
        .unwrap();
    }

    fn delete_edge(db: &Database, source: i64, target: i64) {
        let conn = db.connection();
        let removed = conn
            .execute(
                "DELETE FROM edges WHERE source_tag_id = ?1 AND target_tag_id = ?2",
                [source, target],
            )
            .unwrap();
        if removed > 0 {
            EdgeMutation::Deleted {
                source: TagId::new(source),
                target: TagId::new(target),
            }
            .apply(conn)
            .unwrap();
        }
    }

    #[test]
    fn created_edge_increments_both_endpoints() {
        let db = setup(2);

        insert_edge(&db, 1, 2);

        assert_eq!(degree(&db, 1), 1);
        assert_eq!(degree(&db, 2), 1);
    }

    #[test]
    fn deleted_edge_decrements_both_endpoints() {
        let db = setup(3);
        insert_edge(&db, 1, 2);
        insert_edge(&db, 3, 2);

        delete_edge(&db, 1, 2);

        assert_eq!(degree(&db, 1), 0);
        assert_eq!(degree(&db, 2), 1);
        assert_eq!(degree(&db, 3), 1);
    }

    #[test]
    fn decrement_floors_at_zero() {
        let db = setup(2);

        on_edge_deleted(db.connection(), TagId::new(1), TagId::new(2)).unwrap();

        assert_eq!(degree(&db, 1), 0);
        assert_eq!(degree(&db, 2), 0);
    }

    #[test]
    fn self_loops_are_rejected() {
        let db = setup(1);

        let result = on_edge_created(db.connection(), TagId::new(1), TagId::new(1));

        assert!(matches!(result, Err(RetrievalError::InvariantViolation(_))));
        assert_eq!(degree(&db, 1), 0);
    }

    #[test]
    fn missing_endpoint_is_an_invariant_violation() {
        let db = setup(1);

        let result = on_edge_created(db.connection(), TagId::new(1), TagId::new(42));

        assert!(matches!(result, Err(RetrievalError::InvariantViolation(_))));
    }

    #[test]
    fn centrality_tracks_incident_edges_through_mixed_writes() {
        let db = setup(6);
        let ops: &[(bool, i64, i64)] = &[
            (true, 1, 2),
            (true, 1, 3),
            (true, 2, 3),
            (true, 4, 1),
            (false, 1, 3),
            (true, 5, 6),
            (false, 4, 1),
            (false, 4, 1),
            (true, 3, 4),
            (false, 5, 6),
            (true, 6, 1),
        ];

        for &(create, source, target) in ops {
            if create {
                insert_edge(&db, source, target);
            } else {
                delete_edge(&db, source, target);
            }
            for tag in 1..=6 {
                assert_eq!(degree(&db, tag), incident_count(&db, tag), "tag {tag}");
                assert!(degree(&db, tag) >= 0);
            }
        }
    }

    #[test]
    fn tag_deletion_releases_neighbor_counters() {
        let db = setup(4);
        insert_edge(&db, 1, 2);
        insert_edge(&db, 3, 1);
        insert_edge(&db, 3, 4);

        let conn = db.connection();
        let edges = on_tag_deleted(conn, TagId::new(1)).unwrap();
        conn.execute("DELETE FROM tags WHERE id = 1", []).unwrap();

        assert_eq!(edges, 2);
        assert_eq!(degree(&db, 2), 0);
        assert_eq!(degree(&db, 3), 1);
        assert_eq!(degree(&db, 4), 1);
        for tag in 2..=4 {
            assert_eq!(degree(&db, tag), incident_count(&db, tag));
        }
    }

    #[test]
    fn backfill_repairs_untracked_edges() {
        let db = setup(3);
        db.connection()
            .execute_batch(
                "INSERT INTO edges (source_tag_id, target_tag_id, confidence, created_at, updated_at)
                 VALUES (1, 2, 1.0, 0, 0), (1, 3, 1.0, 0, 0);
                 UPDATE tags SET degree_centrality = 7 WHERE id = 3;",
            )
            .unwrap();

        let changed = backfill(db.connection()).unwrap();

        assert_eq!(changed, 3);
        assert_eq!(degree(&db, 1), 2);
        assert_eq!(degree(&db, 2), 1);
        assert_eq!(degree(&db, 3), 1);
        assert_eq!(backfill(db.connection()).unwrap(), 0);
    }
}
