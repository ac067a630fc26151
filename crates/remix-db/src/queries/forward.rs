//! Forward (closure) relation query functions.
//!
//! One row per ancestor/descendant pair; depth 0 rows are self-relations and
//! depth 1 rows are the direct parent edges folded into the closure.

use rusqlite::{Connection, OptionalExtension};

use remix_types::relation::{ForwardRelation, RelationKey};
use remix_types::{ProjectId, Timestamp, UserId};

use super::{id_list, id_set, ts};
use crate::Result;

const COLUMNS: &str = "ancestor_id, descendant_id, depth, created_at, seen_at";

/// Insert a relation.
pub fn insert(conn: &Connection, relation: &ForwardRelation) -> Result<()> {
    conn.execute(
        "INSERT INTO forward_relations (ancestor_id, descendant_id, depth, created_at, seen_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            relation.ancestor_id,
            relation.descendant_id,
            relation.depth as i64,
            relation.created_at as i64,
            relation.seen_at.map(|t| t as i64),
        ],
    )?;
    Ok(())
}

/// Change the depth of an existing relation, keeping its dates.
pub fn update_depth(conn: &Connection, key: RelationKey, depth: u32) -> Result<()> {
    conn.execute(
        "UPDATE forward_relations SET depth = ?1 WHERE ancestor_id = ?2 AND descendant_id = ?3",
        rusqlite::params![depth as i64, key.ancestor_id, key.descendant_id],
    )?;
    Ok(())
}

/// Delete a relation.
pub fn delete(conn: &Connection, key: RelationKey) -> Result<()> {
    conn.execute(
        "DELETE FROM forward_relations WHERE ancestor_id = ?1 AND descendant_id = ?2",
        rusqlite::params![key.ancestor_id, key.descendant_id],
    )?;
    Ok(())
}

/// Find the relation between two projects, at any depth.
pub fn find(
    conn: &Connection,
    ancestor_id: ProjectId,
    descendant_id: ProjectId,
) -> Result<Option<ForwardRelation>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM forward_relations WHERE ancestor_id = ?1 AND descendant_id = ?2"
    );
    let row = conn
        .query_row(&sql, [ancestor_id, descendant_id], map_row)
        .optional()?;
    Ok(row)
}

/// All relations whose descendant is in `descendant_ids`, self-relations included.
pub fn ancestor_relations(
    conn: &Connection,
    descendant_ids: &[ProjectId],
) -> Result<Vec<ForwardRelation>> {
    if descendant_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {COLUMNS} FROM forward_relations
         WHERE descendant_id IN {}
         ORDER BY descendant_id, depth, ancestor_id",
        id_set(1)
    );
    query(conn, &sql, [id_list(descendant_ids)?])
}

/// Relations to real ancestors (depth >= 1) of the given projects.
pub fn parent_ancestor_relations(
    conn: &Connection,
    descendant_ids: &[ProjectId],
) -> Result<Vec<ForwardRelation>> {
    if descendant_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {COLUMNS} FROM forward_relations
         WHERE descendant_id IN {} AND depth >= 1
         ORDER BY descendant_id, depth, ancestor_id",
        id_set(1)
    );
    query(conn, &sql, [id_list(descendant_ids)?])
}

/// The project's subtree: every relation starting at `ancestor_id`, self-relation included.
pub fn subtree_relations(conn: &Connection, ancestor_id: ProjectId) -> Result<Vec<ForwardRelation>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM forward_relations
         WHERE ancestor_id = ?1
         ORDER BY depth, descendant_id"
    );
    query(conn, &sql, [ancestor_id])
}

/// Relations to real descendants (depth >= 1) of the given projects.
pub fn descendant_relations(
    conn: &Connection,
    ancestor_ids: &[ProjectId],
) -> Result<Vec<ForwardRelation>> {
    if ancestor_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {COLUMNS} FROM forward_relations
         WHERE ancestor_id IN {} AND depth >= 1
         ORDER BY ancestor_id, descendant_id",
        id_set(1)
    );
    query(conn, &sql, [id_list(ancestor_ids)?])
}

/// Direct edges (depth 1) from any of `ancestor_ids` to any of `descendant_ids`.
pub fn direct_edges_between(
    conn: &Connection,
    ancestor_ids: &[ProjectId],
    descendant_ids: &[ProjectId],
) -> Result<Vec<ForwardRelation>> {
    if ancestor_ids.is_empty() || descendant_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {COLUMNS} FROM forward_relations
         WHERE depth = 1 AND ancestor_id IN {} AND descendant_id IN {}
         ORDER BY ancestor_id, descendant_id",
        id_set(1),
        id_set(2)
    );
    query(conn, &sql, [id_list(ancestor_ids)?, id_list(descendant_ids)?])
}

/// Ids of direct children (depth 1) of a project.
pub fn child_ids(conn: &Connection, parent_id: ProjectId) -> Result<Vec<ProjectId>> {
    let mut stmt = conn.prepare(
        "SELECT descendant_id FROM forward_relations
         WHERE ancestor_id = ?1 AND depth = 1
         ORDER BY descendant_id",
    )?;
    let rows = stmt
        .query_map([parent_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<ProjectId>, _>>()?;
    Ok(rows)
}

/// Roots of the graphs the given projects belong to.
///
/// A root is an ancestor (or the project itself) with no real ancestor of its own.
pub fn root_ids(conn: &Connection, ids: &[ProjectId]) -> Result<Vec<ProjectId>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT DISTINCT r.ancestor_id FROM forward_relations r
         WHERE r.descendant_id IN {}
           AND NOT EXISTS (
               SELECT 1 FROM forward_relations up
               WHERE up.descendant_id = r.ancestor_id AND up.depth >= 1
           )
         ORDER BY r.ancestor_id",
        id_set(1)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([id_list(ids)?], |row| row.get(0))?
        .collect::<std::result::Result<Vec<ProjectId>, _>>()?;
    Ok(rows)
}

/// Every descendant of the given roots, roots included. Sorted, deduplicated.
pub fn descendant_ids(conn: &Connection, root_ids: &[ProjectId]) -> Result<Vec<ProjectId>> {
    if root_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT DISTINCT descendant_id FROM forward_relations
         WHERE ancestor_id IN {}
         ORDER BY descendant_id",
        id_set(1)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([id_list(root_ids)?], |row| row.get(0))?
        .collect::<std::result::Result<Vec<ProjectId>, _>>()?;
    Ok(rows)
}

/// Direct remixes of the user's projects by other users that the user has not seen.
pub fn unseen_direct_descendant_relations_of_user(
    conn: &Connection,
    user_id: UserId,
) -> Result<Vec<ForwardRelation>> {
    let sql = "SELECT r.ancestor_id, r.descendant_id, r.depth, r.created_at, r.seen_at
         FROM forward_relations r
         JOIN projects a ON a.id = r.ancestor_id
         JOIN projects d ON d.id = r.descendant_id
         WHERE r.depth = 1
           AND r.seen_at IS NULL
           AND a.user_id = ?1
           AND (d.user_id IS NULL OR d.user_id <> ?1)
         ORDER BY r.created_at DESC, r.descendant_id";
    query(conn, sql, [user_id])
}

/// Stamp a relation as seen.
pub fn mark_seen(conn: &Connection, key: RelationKey, seen_at: Timestamp) -> Result<()> {
    conn.execute(
        "UPDATE forward_relations SET seen_at = ?1 WHERE ancestor_id = ?2 AND descendant_id = ?3",
        rusqlite::params![seen_at as i64, key.ancestor_id, key.descendant_id],
    )?;
    Ok(())
}

/// Stamp every unseen relation created at or before `cutoff` as seen at `cutoff`.
///
/// Returns the number of rows changed.
pub fn mark_all_unseen_as_seen(conn: &Connection, cutoff: Timestamp) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE forward_relations SET seen_at = ?1 WHERE seen_at IS NULL AND created_at <= ?1",
        [cutoff as i64],
    )?;
    Ok(changed)
}

/// Remove every forward relation.
pub fn remove_all(conn: &Connection) -> Result<usize> {
    Ok(conn.execute("DELETE FROM forward_relations", [])?)
}

/// Remove every forward relation touching a project, self-relation included.
pub fn remove_all_of_project(conn: &Connection, id: ProjectId) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM forward_relations WHERE ancestor_id = ?1 OR descendant_id = ?1",
        [id],
    )?)
}

fn query(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<ForwardRelation>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, map_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ForwardRelation> {
    Ok(ForwardRelation {
        ancestor_id: row.get(0)?,
        descendant_id: row.get(1)?,
        depth: row.get::<_, i64>(2)? as u32,
        created_at: ts(row.get(3)?),
        seen_at: row.get::<_, Option<i64>>(4)?.map(ts),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::projects;
    use remix_types::project::Project;

    fn rel(a: ProjectId, d: ProjectId, depth: u32) -> ForwardRelation {
        ForwardRelation {
            ancestor_id: a,
            descendant_id: d,
            depth,
            created_at: 100,
            seen_at: None,
        }
    }

    fn add_project(conn: &Connection, id: ProjectId, user_id: Option<UserId>) {
        projects::upsert(
            conn,
            &Project {
                id,
                name: format!("p{id}"),
                user_id,
                username: None,
                version: 1,
            },
        )
        .expect("insert project");
    }

    /// 1 -> 2 -> 3, plus an isolated project 4.
    fn chain_db() -> Connection {
        let conn = crate::open_memory().expect("open test db");
        for id in 1..=4 {
            add_project(&conn, id, Some(id * 10));
        }
        for r in [
            rel(1, 1, 0),
            rel(2, 2, 0),
            rel(3, 3, 0),
            rel(4, 4, 0),
            rel(1, 2, 1),
            rel(2, 3, 1),
            rel(1, 3, 2),
        ] {
            insert(&conn, &r).expect("insert relation");
        }
        conn
    }

    #[test]
    fn test_insert_and_find() {
        let conn = chain_db();
        let found = find(&conn, 1, 3).expect("find").expect("exists");
        assert_eq!(found.depth, 2);
        assert!(find(&conn, 3, 1).expect("find").is_none());
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let conn = chain_db();
        assert!(insert(&conn, &rel(1, 3, 5)).is_err());
    }

    #[test]
    fn test_relation_requires_existing_projects() {
        let conn = chain_db();
        assert!(insert(&conn, &rel(1, 99, 1)).is_err());
    }

    #[test]
    fn test_root_and_descendant_ids() {
        let conn = chain_db();
        assert_eq!(root_ids(&conn, &[3]).expect("roots"), vec![1]);
        assert_eq!(root_ids(&conn, &[3, 4]).expect("roots"), vec![1, 4]);
        assert_eq!(descendant_ids(&conn, &[1]).expect("desc"), vec![1, 2, 3]);
        assert!(root_ids(&conn, &[99]).expect("roots").is_empty());
    }

    #[test]
    fn test_ancestor_and_parent_relations() {
        let conn = chain_db();
        let all = ancestor_relations(&conn, &[3]).expect("ancestors");
        assert_eq!(all.len(), 3);
        assert!(all[0].is_self_relation());

        let real = parent_ancestor_relations(&conn, &[3]).expect("parents");
        assert_eq!(
            real.iter().map(|r| (r.ancestor_id, r.depth)).collect::<Vec<_>>(),
            vec![(2, 1), (1, 2)]
        );
        assert!(parent_ancestor_relations(&conn, &[1]).expect("root").is_empty());
    }

    #[test]
    fn test_subtree_and_descendant_relations() {
        let conn = chain_db();
        let subtree = subtree_relations(&conn, 2).expect("subtree");
        assert_eq!(
            subtree.iter().map(|r| r.descendant_id).collect::<Vec<_>>(),
            vec![2, 3]
        );
        let desc = descendant_relations(&conn, &[1, 2]).expect("desc");
        assert_eq!(desc.len(), 3);
        assert!(desc.iter().all(|r| r.depth >= 1));
    }

    #[test]
    fn test_direct_edges_between() {
        let conn = chain_db();
        let ids = [1, 2, 3];
        let edges = direct_edges_between(&conn, &ids, &ids).expect("edges");
        assert_eq!(
            edges.iter().map(|r| r.key()).collect::<Vec<_>>(),
            vec![RelationKey::new(1, 2), RelationKey::new(2, 3)]
        );
        assert_eq!(child_ids(&conn, 1).expect("children"), vec![2]);
    }

    #[test]
    fn test_update_depth_and_delete() {
        let conn = chain_db();
        update_depth(&conn, RelationKey::new(1, 3), 4).expect("update");
        assert_eq!(find(&conn, 1, 3).expect("find").expect("exists").depth, 4);
        delete(&conn, RelationKey::new(1, 3)).expect("delete");
        assert!(find(&conn, 1, 3).expect("find").is_none());
    }

    #[test]
    fn test_unseen_relations_of_user() {
        let conn = chain_db();
        // Project 5 remixes project 1 but belongs to the same user.
        add_project(&conn, 5, Some(10));
        insert(&conn, &rel(5, 5, 0)).expect("self");
        insert(&conn, &rel(1, 5, 1)).expect("edge");

        let unseen = unseen_direct_descendant_relations_of_user(&conn, 10).expect("unseen");
        assert_eq!(unseen.len(), 1);
        assert_eq!(unseen[0].key(), RelationKey::new(1, 2));

        mark_seen(&conn, RelationKey::new(1, 2), 300).expect("mark");
        assert!(unseen_direct_descendant_relations_of_user(&conn, 10)
            .expect("unseen")
            .is_empty());
    }

    #[test]
    fn test_mark_all_unseen_respects_cutoff() {
        let conn = chain_db();
        let mut late = rel(4, 3, 1);
        late.created_at = 900;
        insert(&conn, &late).expect("late relation");

        let changed = mark_all_unseen_as_seen(&conn, 500).expect("mark all");
        assert_eq!(changed, 7);
        assert_eq!(find(&conn, 1, 2).expect("find").expect("exists").seen_at, Some(500));
        assert_eq!(find(&conn, 4, 3).expect("find").expect("exists").seen_at, None);
    }

    #[test]
    fn test_remove_all_of_project() {
        let conn = chain_db();
        let removed = remove_all_of_project(&conn, 2).expect("remove");
        assert_eq!(removed, 3);
        assert!(find(&conn, 1, 3).expect("find").is_some());
        assert_eq!(remove_all(&conn).expect("remove all"), 4);
    }
}
