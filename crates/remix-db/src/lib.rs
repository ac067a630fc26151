//! # remix-db
//!
//! Closure store for the remix lineage engine.
//! Manages the single SQLite database at `$REMIX_DATA_DIR/remix.db`.
//!
//! ## Schema
//!
//! - WAL mode mandatory
//! - Foreign keys enforced: a relation row never outlives either endpoint
//! - All timestamps are Unix epoch seconds (u64)
//! - Schema version stored in `PRAGMA user_version`
//!
//! Query functions take a plain `&Connection`, so callers may pass a
//! `rusqlite::Transaction` to group several writes into one atomic unit.

pub mod migrations;
pub mod queries;
pub mod schema;

use rusqlite::Connection;
use std::path::Path;

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Database error types.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("id list encoding failed: {0}")]
    IdList(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Open or create the remix database at the given path.
///
/// Configures WAL mode, foreign keys, and runs any pending migrations.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing).
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Configure SQLite pragmas.
fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -8000;",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_memory() {
        let conn = open_memory().expect("open in-memory db");
        let version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .expect("get user_version");
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let conn = open_memory().expect("open");
        let fk: i32 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .expect("get foreign_keys");
        assert_eq!(fk, 1);
    }

    #[test]
    fn test_open_file_reopens_without_migrating_again() {
        let dir = std::env::temp_dir().join(format!("remix-db-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create dir");
        let path = dir.join("remix.db");
        {
            let conn = open(&path).expect("first open");
            conn.execute("INSERT INTO projects (id, name) VALUES (1, 'kept')", [])
                .expect("insert");
        }
        let conn = open(&path).expect("second open");
        let name: String = conn
            .query_row("SELECT name FROM projects WHERE id = 1", [], |row| row.get(0))
            .expect("query");
        assert_eq!(name, "kept");
        drop(conn);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
