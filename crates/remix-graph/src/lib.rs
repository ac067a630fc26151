//! # remix-graph
//!
//! The remix graph engine: keeps the lineage closure tables of
//! [`remix_db`] consistent while projects declare, drop and change their
//! remix parents, and answers whole-graph queries for the visualizer.
//!
//! ## Modules
//!
//! - [`manipulator`]: incremental link/unlink edits of the closure
//! - [`manager`]: registration, updates, graph views, seen-marking
//! - [`notify`]: the remix notification sink
//! - [`service`]: inbound entry points for upload handlers
//! - [`config`]: engine tunables
//!
//! Every mutation runs inside one SQLite transaction: either all relation
//! writes of a call commit, or none do.

pub mod config;
pub mod manager;
pub mod manipulator;
pub mod notify;
pub mod service;

pub use config::RemixConfig;
pub use manager::RemixManager;
pub use manipulator::{GraphManipulator, PreservedDates};
pub use notify::{NotifyError, RemixNotifier};
pub use service::RemixService;

use remix_db::DbError;
use remix_types::ProjectId;

/// Error types for remix graph operations.
#[derive(Debug, thiserror::Error)]
pub enum RemixError {
    /// Persistence failure. The surrounding transaction has been rolled back.
    #[error("database error: {0}")]
    Db(#[from] DbError),

    /// The project already has a self-relation; use an update instead.
    #[error("project {0} is already registered in the remix graph")]
    AlreadyRegistered(ProjectId),

    /// The project does not exist.
    #[error("project {0} not found")]
    ProjectNotFound(ProjectId),
}

/// Convenience result type for remix graph operations.
pub type Result<T> = std::result::Result<T, RemixError>;
