//! Native project query functions.

use rusqlite::{Connection, OptionalExtension};

use remix_types::project::{Project, ProjectDisplayData};
use remix_types::{ProjectId, Timestamp};

use super::{id_list, id_set, ts};
use crate::{DbError, Result};

/// Insert a project, or refresh its name, author and version if it exists.
///
/// Remix state (`remix_root`, `remix_migrated_at`) is left untouched on update.
pub fn upsert(conn: &Connection, project: &Project) -> Result<()> {
    conn.execute(
        "INSERT INTO projects (id, name, user_id, username, version)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            user_id = excluded.user_id,
            username = excluded.username,
            version = excluded.version",
        rusqlite::params![
            project.id,
            project.name,
            project.user_id,
            project.username,
            project.version as i64,
        ],
    )?;
    Ok(())
}

/// Find a project by id.
pub fn find(conn: &Connection, id: ProjectId) -> Result<Option<ProjectRow>> {
    let row = conn
        .query_row(
            "SELECT id, name, user_id, username, version, remix_root, remix_migrated_at
             FROM projects WHERE id = ?1",
            [id],
            map_row,
        )
        .optional()?;
    Ok(row)
}

/// Get a project by id, failing with [`DbError::NotFound`] if it is missing.
pub fn get(conn: &Connection, id: ProjectId) -> Result<ProjectRow> {
    find(conn, id)?.ok_or_else(|| DbError::NotFound(format!("project {id}")))
}

/// Keep only the ids that belong to an existing project. Sorted, deduplicated.
pub fn filter_existing_ids(conn: &Connection, ids: &[ProjectId]) -> Result<Vec<ProjectId>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id FROM projects WHERE id IN {} ORDER BY id",
        id_set(1)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([id_list(ids)?], |row| row.get(0))?
        .collect::<std::result::Result<Vec<ProjectId>, _>>()?;
    Ok(rows)
}

/// Display data for the graph view.
pub fn display_data_by_ids(
    conn: &Connection,
    ids: &[ProjectId],
) -> Result<Vec<ProjectDisplayData>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id, name, username FROM projects WHERE id IN {} ORDER BY id",
        id_set(1)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([id_list(ids)?], |row| {
            Ok(ProjectDisplayData {
                id: row.get(0)?,
                name: row.get(1)?,
                username: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Set the remix root flag.
pub fn set_remix_root(conn: &Connection, id: ProjectId, remix_root: bool) -> Result<()> {
    conn.execute(
        "UPDATE projects SET remix_root = ?1 WHERE id = ?2",
        rusqlite::params![remix_root, id],
    )?;
    Ok(())
}

/// Set the remix root flag and stamp when the lineage was last recomputed.
pub fn set_remix_state(
    conn: &Connection,
    id: ProjectId,
    remix_root: bool,
    migrated_at: Timestamp,
) -> Result<()> {
    let updated = conn.execute(
        "UPDATE projects SET remix_root = ?1, remix_migrated_at = ?2 WHERE id = ?3",
        rusqlite::params![remix_root, migrated_at as i64, id],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(format!("project {id}")));
    }
    Ok(())
}

/// Delete a project. Relation rows go with it (`ON DELETE CASCADE`).
pub fn delete(conn: &Connection, id: ProjectId) -> Result<()> {
    conn.execute("DELETE FROM projects WHERE id = ?1", [id])?;
    Ok(())
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProjectRow> {
    Ok(ProjectRow {
        id: row.get(0)?,
        name: row.get(1)?,
        user_id: row.get(2)?,
        username: row.get(3)?,
        version: row.get::<_, i64>(4)? as u32,
        remix_root: row.get(5)?,
        remix_migrated_at: row.get::<_, Option<i64>>(6)?.map(ts),
    })
}

/// A raw project row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRow {
    pub id: ProjectId,
    pub name: String,
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub version: u32,
    pub remix_root: bool,
    pub remix_migrated_at: Option<Timestamp>,
}

impl ProjectRow {
    pub fn project(&self) -> Project {
        Project {
            id: self.id,
            name: self.name.clone(),
            user_id: self.user_id,
            username: self.username.clone(),
            version: self.version,
        }
    }
}
