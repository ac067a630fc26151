//! Backward relation query functions.
//!
//! A backward row is a direct parent link that has not been folded into the
//! forward closure.

use rusqlite::{Connection, OptionalExtension};

use remix_types::relation::{BackwardRelation, RelationKey};
use remix_types::{ProjectId, Timestamp, UserId};

use super::{id_list, id_set, ts};
use crate::Result;

const COLUMNS: &str = "parent_id, child_id, created_at, seen_at";

/// Insert a relation. Inserting an existing parent/child pair is a no-op.
pub fn insert(conn: &Connection, relation: &BackwardRelation) -> Result<()> {
    conn.execute(
        "INSERT INTO backward_relations (parent_id, child_id, created_at, seen_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (parent_id, child_id) DO NOTHING",
        rusqlite::params![
            relation.parent_id,
            relation.child_id,
            relation.created_at as i64,
            relation.seen_at.map(|t| t as i64),
        ],
    )?;
    Ok(())
}

/// Delete a relation.
pub fn delete(conn: &Connection, key: RelationKey) -> Result<()> {
    conn.execute(
        "DELETE FROM backward_relations WHERE parent_id = ?1 AND child_id = ?2",
        rusqlite::params![key.ancestor_id, key.descendant_id],
    )?;
    Ok(())
}

/// Find the relation between a parent and a child.
pub fn find(
    conn: &Connection,
    parent_id: ProjectId,
    child_id: ProjectId,
) -> Result<Option<BackwardRelation>> {
    let sql = format!("SELECT {COLUMNS} FROM backward_relations WHERE parent_id = ?1 AND child_id = ?2");
    let row = conn
        .query_row(&sql, [parent_id, child_id], map_row)
        .optional()?;
    Ok(row)
}

/// Backward parent relations of a child.
pub fn parent_relations(conn: &Connection, child_id: ProjectId) -> Result<Vec<BackwardRelation>> {
    let sql = format!("SELECT {COLUMNS} FROM backward_relations WHERE child_id = ?1 ORDER BY parent_id");
    query(conn, &sql, [child_id])
}

/// Backward relations whose parent is one of `parent_ids`.
pub fn relations_with_parent_in(
    conn: &Connection,
    parent_ids: &[ProjectId],
) -> Result<Vec<BackwardRelation>> {
    if parent_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {COLUMNS} FROM backward_relations
         WHERE parent_id IN {}
         ORDER BY parent_id, child_id",
        id_set(1)
    );
    query(conn, &sql, [id_list(parent_ids)?])
}

/// Backward edges from any of `parent_ids` to any of `child_ids`.
pub fn edges_between(
    conn: &Connection,
    parent_ids: &[ProjectId],
    child_ids: &[ProjectId],
) -> Result<Vec<BackwardRelation>> {
    if parent_ids.is_empty() || child_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {COLUMNS} FROM backward_relations
         WHERE parent_id IN {} AND child_id IN {}
         ORDER BY parent_id, child_id",
        id_set(1),
        id_set(2)
    );
    query(conn, &sql, [id_list(parent_ids)?, id_list(child_ids)?])
}

/// Backward children of the user's projects by other users that the user has not seen.
pub fn unseen_child_relations_of_user(
    conn: &Connection,
    user_id: UserId,
) -> Result<Vec<BackwardRelation>> {
    let sql = "SELECT r.parent_id, r.child_id, r.created_at, r.seen_at
         FROM backward_relations r
         JOIN projects p ON p.id = r.parent_id
         JOIN projects c ON c.id = r.child_id
         WHERE r.seen_at IS NULL
           AND p.user_id = ?1
           AND (c.user_id IS NULL OR c.user_id <> ?1)
         ORDER BY r.created_at DESC, r.child_id";
    query(conn, sql, [user_id])
}

/// Stamp a relation as seen.
pub fn mark_seen(conn: &Connection, key: RelationKey, seen_at: Timestamp) -> Result<()> {
    conn.execute(
        "UPDATE backward_relations SET seen_at = ?1 WHERE parent_id = ?2 AND child_id = ?3",
        rusqlite::params![seen_at as i64, key.ancestor_id, key.descendant_id],
    )?;
    Ok(())
}

/// Stamp every unseen relation created at or before `cutoff` as seen at `cutoff`.
pub fn mark_all_unseen_as_seen(conn: &Connection, cutoff: Timestamp) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE backward_relations SET seen_at = ?1 WHERE seen_at IS NULL AND created_at <= ?1",
        [cutoff as i64],
    )?;
    Ok(changed)
}

/// Remove every backward relation.
pub fn remove_all(conn: &Connection) -> Result<usize> {
    Ok(conn.execute("DELETE FROM backward_relations", [])?)
}

/// Remove every backward relation touching a project.
pub fn remove_all_of_project(conn: &Connection, id: ProjectId) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM backward_relations WHERE parent_id = ?1 OR child_id = ?1",
        [id],
    )?)
}

fn query(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<BackwardRelation>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, map_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BackwardRelation> {
    Ok(BackwardRelation {
        parent_id: row.get(0)?,
        child_id: row.get(1)?,
        created_at: ts(row.get(2)?),
        seen_at: row.get::<_, Option<i64>>(3)?.map(ts),
    })
}
