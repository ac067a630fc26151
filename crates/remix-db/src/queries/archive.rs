//! Archived dates of removed native relations.

use rusqlite::Connection;

use remix_types::relation::RelationKey;
use remix_types::{ProjectId, Timestamp};

use super::{id_list, id_set, ts};
use crate::Result;

/// Remember the dates of a relation that is being removed.
pub fn remember(
    conn: &Connection,
    key: RelationKey,
    created_at: Timestamp,
    seen_at: Option<Timestamp>,
    removed_at: Timestamp,
) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO relation_archive
         (ancestor_id, descendant_id, created_at, seen_at, removed_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            key.ancestor_id,
            key.descendant_id,
            created_at as i64,
            seen_at.map(|t| t as i64),
            removed_at as i64,
        ],
    )?;
    Ok(())
}

/// Drop the archived dates of a relation that exists again.
pub fn forget(conn: &Connection, key: RelationKey) -> Result<()> {
    conn.execute(
        "DELETE FROM relation_archive WHERE ancestor_id = ?1 AND descendant_id = ?2",
        rusqlite::params![key.ancestor_id, key.descendant_id],
    )?;
    Ok(())
}

/// Archived relations into any of `descendant_ids`.
pub fn relations_into(
    conn: &Connection,
    descendant_ids: &[ProjectId],
) -> Result<Vec<ArchivedRelation>> {
    if descendant_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT ancestor_id, descendant_id, created_at, seen_at, removed_at
         FROM relation_archive
         WHERE descendant_id IN {}
         ORDER BY descendant_id, ancestor_id",
        id_set(1)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([id_list(descendant_ids)?], |row| {
            Ok(ArchivedRelation {
                key: RelationKey::new(row.get(0)?, row.get(1)?),
                created_at: ts(row.get(2)?),
                seen_at: row.get::<_, Option<i64>>(3)?.map(ts),
                removed_at: ts(row.get(4)?),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Forget every archived relation.
pub fn remove_all(conn: &Connection) -> Result<usize> {
    Ok(conn.execute("DELETE FROM relation_archive", [])?)
}

/// A raw archive row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedRelation {
    pub key: RelationKey,
    pub created_at: Timestamp,
    pub seen_at: Option<Timestamp>,
    pub removed_at: Timestamp,
}
