//! Foreign relation query functions: external parent -> native child.

use rusqlite::Connection;

use remix_types::relation::ForeignRelation;
use remix_types::{ForeignProjectId, ProjectId};

use super::{id_list, id_set, ts};
use crate::Result;

/// Insert a relation. Inserting an existing pair is a no-op.
pub fn insert(conn: &Connection, relation: &ForeignRelation) -> Result<()> {
    conn.execute(
        "INSERT INTO foreign_relations (foreign_parent_id, child_id, created_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (foreign_parent_id, child_id) DO NOTHING",
        rusqlite::params![
            relation.foreign_parent_id,
            relation.child_id,
            relation.created_at as i64,
        ],
    )?;
    Ok(())
}

/// Delete a relation.
pub fn delete(
    conn: &Connection,
    foreign_parent_id: ForeignProjectId,
    child_id: ProjectId,
) -> Result<()> {
    conn.execute(
        "DELETE FROM foreign_relations WHERE foreign_parent_id = ?1 AND child_id = ?2",
        rusqlite::params![foreign_parent_id, child_id],
    )?;
    Ok(())
}

/// Foreign parent ids of a native child.
pub fn parent_ids(conn: &Connection, child_id: ProjectId) -> Result<Vec<ForeignProjectId>> {
    let mut stmt = conn.prepare(
        "SELECT foreign_parent_id FROM foreign_relations
         WHERE child_id = ?1
         ORDER BY foreign_parent_id",
    )?;
    let rows = stmt
        .query_map([child_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<ForeignProjectId>, _>>()?;
    Ok(rows)
}

/// Every foreign edge into the given native children.
pub fn edges_of_children(
    conn: &Connection,
    child_ids: &[ProjectId],
) -> Result<Vec<ForeignRelation>> {
    if child_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT foreign_parent_id, child_id, created_at FROM foreign_relations
         WHERE child_id IN {}
         ORDER BY foreign_parent_id, child_id",
        id_set(1)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([id_list(child_ids)?], |row| {
            Ok(ForeignRelation {
                foreign_parent_id: row.get(0)?,
                child_id: row.get(1)?,
                created_at: ts(row.get(2)?),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Remove every foreign relation.
pub fn remove_all(conn: &Connection) -> Result<usize> {
    Ok(conn.execute("DELETE FROM foreign_relations", [])?)
}
