//! Inbound entry points for upload and view handlers.
//!
//! Owns the database connection and routes each event to the manager.

use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;

use remix_db::queries::projects;
use remix_types::graph::RemixGraph;
use remix_types::project::{ForeignProject, ParentDescriptor, Project};
use remix_types::relation::UnseenRemix;
use remix_types::{ProjectId, Timestamp, UserId};

use crate::{RemixConfig, RemixError, RemixManager, RemixNotifier, Result};

pub struct RemixService {
    conn: Connection,
    manager: RemixManager,
}

impl RemixService {
    pub fn new(conn: Connection, manager: RemixManager) -> Self {
        Self { conn, manager }
    }

    /// Open (or create) the database at `path` and build a service on it.
    pub fn open(path: &Path, config: RemixConfig, notifier: Arc<dyn RemixNotifier>) -> Result<Self> {
        let conn = remix_db::open(path)?;
        Ok(Self::new(conn, RemixManager::new(config, notifier)))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn manager(&self) -> &RemixManager {
        &self.manager
    }

    /// A project was uploaded for the first time.
    pub fn on_project_created(&mut self, project: &Project, parents: &[ParentDescriptor]) -> Result<()> {
        self.manager.register_new_node(&mut self.conn, project, parents)
    }

    /// A stored project was re-uploaded with a new parent list.
    ///
    /// Bumps the project's version and diffs its parents. Returns the new version.
    ///
    /// # Errors
    ///
    /// - [`RemixError::ProjectNotFound`] if the project was never stored
    /// - [`RemixError::Db`] if persistence fails
    pub fn on_project_parents_changed(
        &mut self,
        project_id: ProjectId,
        parents: &[ParentDescriptor],
    ) -> Result<u32> {
        let mut project = projects::find(&self.conn, project_id)?
            .ok_or(RemixError::ProjectNotFound(project_id))?
            .project();
        project.version += 1;
        self.manager.update_node(&mut self.conn, &project, parents)?;
        Ok(project.version)
    }

    /// A user opened the remix graph view of a project.
    pub fn on_user_viewed_graph(&self, project_id: ProjectId) -> Result<RemixGraph> {
        self.manager.get_full_remix_graph(&self.conn, project_id)
    }

    pub fn remix_count(&self, project_id: ProjectId) -> Result<usize> {
        self.manager.remix_count(&self.conn, project_id)
    }

    pub fn descendant_count(&self, project_id: ProjectId) -> Result<usize> {
        self.manager.descendant_count(&self.conn, project_id)
    }

    pub fn unseen_remixes_of_user(&self, user_id: UserId) -> Result<Vec<UnseenRemix>> {
        self.manager.unseen_remixes_of_user(&self.conn, user_id)
    }

    pub fn mark_relation_seen(&self, ancestor_id: ProjectId, descendant_id: ProjectId) -> Result<bool> {
        self.manager.mark_relation_seen(&self.conn, ancestor_id, descendant_id)
    }

    pub fn mark_all_unseen_of_user(&mut self, user_id: UserId) -> Result<usize> {
        self.manager.mark_all_unseen_of_user(&mut self.conn, user_id)
    }

    pub fn mark_all_unseen_as_seen(&mut self, cutoff: Timestamp) -> Result<usize> {
        self.manager.mark_all_unseen_as_seen(&mut self.conn, cutoff)
    }

    pub fn add_foreign_projects(&mut self, projects: &[ForeignProject]) -> Result<usize> {
        self.manager.add_foreign_projects(&mut self.conn, projects)
    }

    pub fn remove_project(&mut self, project_id: ProjectId) -> Result<()> {
        self.manager.remove_project(&mut self.conn, project_id)
    }

    pub fn remove_all_relations(&mut self) -> Result<()> {
        self.manager.remove_all_relations(&mut self.conn)
    }
}
