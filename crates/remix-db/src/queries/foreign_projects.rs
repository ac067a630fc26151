//! Cached metadata of projects on the external platform.

use rusqlite::Connection;

use remix_types::project::ForeignProject;
use remix_types::ForeignProjectId;

use super::{id_list, id_set};
use crate::Result;

/// Insert or refresh cached metadata.
pub fn upsert(conn: &Connection, project: &ForeignProject) -> Result<()> {
    conn.execute(
        "INSERT INTO foreign_projects (id, name, description, username)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            description = excluded.description,
            username = excluded.username",
        rusqlite::params![
            project.id,
            project.name,
            project.description,
            project.username,
        ],
    )?;
    Ok(())
}

/// Cached metadata for the given ids. Unknown ids are skipped.
pub fn data_by_ids(conn: &Connection, ids: &[ForeignProjectId]) -> Result<Vec<ForeignProject>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id, name, description, username FROM foreign_projects
         WHERE id IN {}
         ORDER BY id",
        id_set(1)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([id_list(ids)?], |row| {
            Ok(ForeignProject {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                username: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Keep only the ids with cached metadata.
pub fn filter_existing_ids(
    conn: &Connection,
    ids: &[ForeignProjectId],
) -> Result<Vec<ForeignProjectId>> {
    Ok(data_by_ids(conn, ids)?.into_iter().map(|p| p.id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn foreign(id: ForeignProjectId, name: &str) -> ForeignProject {
        ForeignProject {
            id,
            name: Some(name.to_string()),
            description: None,
            username: Some("scratcher".to_string()),
        }
    }

    #[test]
    fn test_upsert_refreshes_metadata() {
        let conn = crate::open_memory().expect("open test db");
        upsert(&conn, &foreign(5000, "Pong")).expect("insert");
        upsert(&conn, &foreign(5000, "Pong Deluxe")).expect("update");

        let data = data_by_ids(&conn, &[5000]).expect("data");
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].name.as_deref(), Some("Pong Deluxe"));
    }

    #[test]
    fn test_filter_existing_ids() {
        let conn = crate::open_memory().expect("open test db");
        upsert(&conn, &foreign(2, "b")).expect("insert");
        upsert(&conn, &foreign(1, "a")).expect("insert");
        assert_eq!(filter_existing_ids(&conn, &[3, 2, 1]).expect("filter"), vec![1, 2]);
    }
}
