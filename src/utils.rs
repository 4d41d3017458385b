//! Shared helpers for the CLI: database location and tag display names.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::{Database, TagAssignment};

/// Gets the cross-platform database path.
///
/// Returns the path as `{data_dir}/notegraph/notes.db` where `data_dir` is:
/// - Linux: `~/.local/share`
/// - macOS: `~/Library/Application Support`
/// - Windows: `C:\Users\<user>\AppData\Roaming`
///
/// # Errors
///
/// Returns an error if the data directory cannot be determined.
pub fn get_database_path() -> Result<PathBuf> {
    let data_dir =
        dirs::data_dir().ok_or_else(|| anyhow::anyhow!("Failed to determine data directory"))?;

    Ok(data_dir.join("notegraph").join("notes.db"))
}

/// Ensures the parent directory of the database file exists.
pub fn ensure_database_directory(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }
    Ok(())
}

/// Gets tag names for the given assignments, in assignment order.
///
/// Uses a single batch query with an IN clause. Assignments whose tag no
/// longer exists are skipped.
pub fn get_tag_names(db: &Database, tag_assignments: &[TagAssignment]) -> Result<Vec<String>> {
    if tag_assignments.is_empty() {
        return Ok(Vec::new());
    }

    let conn = db.connection();
    let tag_ids: Vec<i64> = tag_assignments.iter().map(|ta| ta.tag_id().get()).collect();

    let placeholders = vec!["?"; tag_ids.len()].join(", ");
    let query = format!("SELECT id, name FROM tags WHERE id IN ({placeholders})");

    let mut stmt = conn.prepare(&query).context("Failed to prepare tag query")?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(tag_ids.iter()), |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })
        .context("Failed to query tag names")?;

    let mut by_id = std::collections::HashMap::new();
    for row_result in rows {
        let (id, name) = row_result.context("Failed to read tag name")?;
        by_id.insert(id, name);
    }

    Ok(tag_ids.iter().filter_map(|id| by_id.remove(id)).collect())
}
