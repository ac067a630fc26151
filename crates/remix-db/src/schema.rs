//! SQL schema definitions.

/// Complete schema for the v1 remix database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Projects
-- ============================================================

CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    user_id INTEGER,
    username TEXT,
    version INTEGER NOT NULL DEFAULT 1,
    remix_root INTEGER NOT NULL DEFAULT 1,
    remix_migrated_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_projects_user ON projects(user_id);

-- Cached metadata of projects on the external platform.
CREATE TABLE IF NOT EXISTS foreign_projects (
    id INTEGER PRIMARY KEY,
    name TEXT,
    description TEXT,
    username TEXT
);

-- ============================================================
-- Closure tables
-- ============================================================

CREATE TABLE IF NOT EXISTS forward_relations (
    ancestor_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    descendant_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    depth INTEGER NOT NULL CHECK (depth >= 0),
    created_at INTEGER NOT NULL,
    seen_at INTEGER,
    PRIMARY KEY (ancestor_id, descendant_id),
    CHECK ((depth = 0) = (ancestor_id = descendant_id))
);

CREATE INDEX IF NOT EXISTS idx_forward_descendant ON forward_relations(descendant_id, depth);
CREATE INDEX IF NOT EXISTS idx_forward_unseen ON forward_relations(depth, seen_at);

CREATE TABLE IF NOT EXISTS backward_relations (
    parent_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    child_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    created_at INTEGER NOT NULL,
    seen_at INTEGER,
    PRIMARY KEY (parent_id, child_id),
    CHECK (parent_id <> child_id)
);

CREATE INDEX IF NOT EXISTS idx_backward_child ON backward_relations(child_id);

-- The foreign parent may not be cached yet, so it carries no foreign key.
CREATE TABLE IF NOT EXISTS foreign_relations (
    foreign_parent_id INTEGER NOT NULL,
    child_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (foreign_parent_id, child_id)
);

CREATE INDEX IF NOT EXISTS idx_foreign_child ON foreign_relations(child_id);

-- Dates of native relations that were removed, so a link that comes back
-- keeps its original history.
CREATE TABLE IF NOT EXISTS relation_archive (
    ancestor_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    descendant_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    created_at INTEGER NOT NULL,
    seen_at INTEGER,
    removed_at INTEGER NOT NULL,
    PRIMARY KEY (ancestor_id, descendant_id)
);

CREATE INDEX IF NOT EXISTS idx_archive_descendant ON relation_archive(descendant_id);
"#;
