//! # remix-types
//!
//! Shared domain types for the remix lineage workspace: project ids, declared
//! parents, closure relations, the full remix graph view handed to the
//! frontend visualizer, and remix notifications.

pub mod graph;
pub mod notification;
pub mod project;
pub mod relation;

/// Id of a project hosted on this platform.
pub type ProjectId = i64;
/// Id of a project hosted on the external (Scratch) platform.
pub type ForeignProjectId = i64;
/// Id of a user account.
pub type UserId = i64;
/// Unix epoch seconds.
pub type Timestamp = u64;

/// Version number of a freshly uploaded project.
pub const INITIAL_VERSION: u32 = 1;

/// Default bound on root/descendant expansion rounds in the full graph walk.
pub const DEFAULT_MAX_GRAPH_ITERATIONS: usize = 6;

/// Current time as Unix epoch seconds.
pub fn now_secs() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
