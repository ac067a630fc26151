//! Remix manager: registration, updates and whole-graph queries.
//!
//! Mutations open one transaction on the connection they are handed and
//! commit it only after every relation write of the call succeeded.
//! Remix notifications are collected while the transaction is open and
//! dispatched after the commit.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use rusqlite::Connection;

use remix_db::queries::{archive, backward, foreign, foreign_projects, forward, projects};
use remix_db::DbError;
use remix_types::graph::{GraphConvergence, GraphEdge, RemixGraph};
use remix_types::notification::RemixNotification;
use remix_types::project::{ForeignProject, ParentDescriptor, Project};
use remix_types::relation::{DirectRelation, ForwardRelation, RelationKey, UnseenRemix};
use remix_types::{now_secs, ForeignProjectId, ProjectId, Timestamp, UserId};

use crate::manipulator::{merge_min, GraphManipulator, PreservedDates};
use crate::{RemixConfig, RemixError, RemixNotifier, Result};

type Clock = Arc<dyn Fn() -> Timestamp + Send + Sync>;

/// Entry point of the remix engine.
#[derive(Clone)]
pub struct RemixManager {
    config: RemixConfig,
    notifier: Arc<dyn RemixNotifier>,
    clock: Clock,
}

impl RemixManager {
    pub fn new(config: RemixConfig, notifier: Arc<dyn RemixNotifier>) -> Self {
        Self {
            config,
            notifier,
            clock: Arc::new(now_secs),
        }
    }

    /// Replace the wall clock used to stamp relations.
    pub fn with_clock(mut self, clock: impl Fn() -> Timestamp + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config(&self) -> &RemixConfig {
        &self.config
    }

    fn now(&self) -> Timestamp {
        (self.clock)()
    }

    /// Record the declared parents of a project.
    ///
    /// A project on its initial version is registered from scratch; any later
    /// version has its parent set diffed against the stored one.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails; nothing is written in that case.
    pub fn add_remixes(
        &self,
        conn: &mut Connection,
        project: &Project,
        parents: &[ParentDescriptor],
    ) -> Result<()> {
        if project.is_initial_version() {
            self.register_new_node(conn, project, parents)
        } else {
            self.update_node(conn, project, parents)
        }
    }

    /// Register a project that has no remix history.
    ///
    /// Writes the project row, its self-relation, one relation per ancestor
    /// inherited through each existing native parent (minimum depth wins),
    /// its foreign parent links and its root flag. Authors of the native
    /// parents are notified once the transaction has committed.
    ///
    /// # Errors
    ///
    /// - [`RemixError::AlreadyRegistered`] if the project has a self-relation
    /// - [`RemixError::Db`] if persistence fails
    pub fn register_new_node(
        &self,
        conn: &mut Connection,
        project: &Project,
        parents: &[ParentDescriptor],
    ) -> Result<()> {
        let now = self.now();
        let manipulator = GraphManipulator::new(now);
        let tx = conn.transaction().map_err(DbError::Sqlite)?;

        if forward::find(&tx, project.id, project.id)?.is_some() {
            return Err(RemixError::AlreadyRegistered(project.id));
        }
        projects::upsert(&tx, project)?;

        let (native_ids, foreign_ids) = split_parents(project.id, parents);
        let existing_parents = projects::filter_existing_ids(&tx, &native_ids)?;

        let mut relations = BTreeMap::new();
        merge_min(&mut relations, RelationKey::new(project.id, project.id), 0);
        let mut notifications = Vec::new();
        for &parent_id in &existing_parents {
            manipulator.ensure_self_relation(&tx, parent_id)?;
            let parent = projects::get(&tx, parent_id)?;
            if let (Some(parent_author), Some(child_author)) = (parent.user_id, project.user_id) {
                notifications.push(RemixNotification {
                    parent_author,
                    child_author,
                    parent_project: parent_id,
                    child_project: project.id,
                });
            }
        }
        for relation in forward::ancestor_relations(&tx, &existing_parents)? {
            merge_min(
                &mut relations,
                RelationKey::new(relation.ancestor_id, project.id),
                relation.depth + 1,
            );
        }

        for (key, &depth) in &relations {
            forward::insert(
                &tx,
                &ForwardRelation {
                    ancestor_id: key.ancestor_id,
                    descendant_id: key.descendant_id,
                    depth,
                    created_at: now,
                    seen_at: None,
                },
            )?;
        }
        manipulator.link_to_foreign_parents(&tx, project.id, &foreign_ids)?;

        let remix_root = relations.len() == 1;
        projects::set_remix_state(&tx, project.id, remix_root, now)?;
        tx.commit().map_err(DbError::Sqlite)?;

        tracing::info!(
            project_id = project.id,
            native_parents = existing_parents.len(),
            foreign_parents = foreign_ids.len(),
            relations = relations.len(),
            remix_root,
            "registered project in remix graph"
        );
        self.dispatch(&notifications);
        Ok(())
    }

    /// Apply a changed parent list to a project that is already in the graph.
    ///
    /// Steps, all in one transaction:
    /// 1. unlink removed backward parents
    /// 2. if any forward parent was removed, unlink every forward parent and
    ///    queue the kept ones for relinking
    /// 3. link new and requeued parents, restoring preserved dates
    /// 4. unlink removed foreign parents
    /// 5. link added foreign parents
    /// 6. convert backward relations whose cycle went through a removed parent
    ///
    /// The root flag and migration timestamp are recomputed at the end.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails; nothing is written in that case.
    pub fn update_node(
        &self,
        conn: &mut Connection,
        project: &Project,
        parents: &[ParentDescriptor],
    ) -> Result<()> {
        let now = self.now();
        let manipulator = GraphManipulator::new(now);
        let tx = conn.transaction().map_err(DbError::Sqlite)?;
        let id = project.id;

        projects::upsert(&tx, project)?;
        manipulator.ensure_self_relation(&tx, id)?;

        let (native_ids, foreign_ids) = split_parents(id, parents);
        let new_native: BTreeSet<ProjectId> =
            projects::filter_existing_ids(&tx, &native_ids)?.into_iter().collect();

        let mut preserved = PreservedDates::new();
        let mut old_forward = BTreeSet::new();
        for relation in forward::ancestor_relations(&tx, &[id])? {
            if relation.is_direct() {
                old_forward.insert(relation.ancestor_id);
            }
            preserved.remember_forward(&relation);
        }
        let mut old_backward = BTreeSet::new();
        for relation in backward::parent_relations(&tx, id)? {
            old_backward.insert(relation.parent_id);
            preserved.remember_backward(&relation);
        }

        let mut to_add: BTreeSet<ProjectId> = new_native
            .iter()
            .filter(|p| !old_forward.contains(*p) && !old_backward.contains(*p))
            .copied()
            .collect();
        let forward_to_remove: Vec<ProjectId> = old_forward.difference(&new_native).copied().collect();
        let backward_to_remove: Vec<ProjectId> =
            old_backward.difference(&new_native).copied().collect();

        if !backward_to_remove.is_empty() {
            manipulator.unlink_from_native_backward_parents(&tx, id, &backward_to_remove)?;
        }
        if !forward_to_remove.is_empty() {
            let all_forward: Vec<ProjectId> = old_forward.iter().copied().collect();
            manipulator.unlink_from_all_native_forward_parents(&tx, id, &all_forward)?;
            to_add.extend(old_forward.iter().filter(|p| !forward_to_remove.contains(p)));
        }
        if !to_add.is_empty() {
            let to_add: Vec<ProjectId> = to_add.into_iter().collect();
            manipulator.link_to_native_parents(&tx, id, &to_add, &preserved)?;
        }

        let old_foreign: BTreeSet<ForeignProjectId> =
            foreign::parent_ids(&tx, id)?.into_iter().collect();
        let new_foreign: BTreeSet<ForeignProjectId> = foreign_ids.into_iter().collect();
        let foreign_to_remove: Vec<ForeignProjectId> =
            old_foreign.difference(&new_foreign).copied().collect();
        let foreign_to_add: Vec<ForeignProjectId> =
            new_foreign.difference(&old_foreign).copied().collect();
        if !foreign_to_remove.is_empty() {
            manipulator.unlink_from_foreign_parents(&tx, id, &foreign_to_remove)?;
        }
        if !foreign_to_add.is_empty() {
            manipulator.link_to_foreign_parents(&tx, id, &foreign_to_add)?;
        }

        let converted = if forward_to_remove.is_empty() {
            Vec::new()
        } else {
            manipulator.convert_backward_parents_having_no_forward_ancestor(
                &tx,
                id,
                &forward_to_remove,
            )?
        };

        let remix_root = forward::parent_ancestor_relations(&tx, &[id])?.is_empty();
        projects::set_remix_state(&tx, id, remix_root, now)?;
        tx.commit().map_err(DbError::Sqlite)?;

        tracing::info!(
            project_id = id,
            removed_forward = forward_to_remove.len(),
            removed_backward = backward_to_remove.len(),
            added_foreign = foreign_to_add.len(),
            removed_foreign = foreign_to_remove.len(),
            converted = converted.len(),
            remix_root,
            "updated remix relations"
        );
        Ok(())
    }

    /// Every node and edge connected to `id`, in either direction.
    ///
    /// Alternates between "roots of the current node set" and "descendants
    /// of those roots" until the set stops changing or the configured round
    /// cap is hit. Hitting the cap is reported in
    /// [`RemixGraph::convergence`], not as an error.
    pub fn get_full_remix_graph(&self, conn: &Connection, id: ProjectId) -> Result<RemixGraph> {
        let cap = self.config.max_graph_iterations.max(1);
        let mut ids = vec![id];
        let mut iterations = 0;
        let convergence = loop {
            let previous: BTreeSet<ProjectId> = ids.iter().copied().collect();
            let roots = forward::root_ids(conn, &ids)?;
            ids = forward::descendant_ids(conn, &roots)?;
            iterations += 1;

            if ids.iter().copied().collect::<BTreeSet<_>>() == previous {
                break GraphConvergence::Stabilized { iterations };
            }
            if iterations >= cap {
                tracing::warn!(
                    project_id = id,
                    iterations,
                    nodes = ids.len(),
                    "remix graph expansion hit its round cap"
                );
                break GraphConvergence::IterationCapReached { iterations };
            }
        };

        let forward_edges = forward::direct_edges_between(conn, &ids, &ids)?
            .iter()
            .map(edge_with_depth)
            .collect();
        let forward_relations = forward::descendant_relations(conn, &ids)?
            .iter()
            .map(edge_with_depth)
            .collect();
        let backward_edges = backward::edges_between(conn, &ids, &ids)?
            .into_iter()
            .map(|r| GraphEdge {
                ancestor_id: r.parent_id,
                descendant_id: r.child_id,
                depth: None,
            })
            .collect();

        let foreign_relations = foreign::edges_of_children(conn, &ids)?;
        let foreign_nodes: Vec<ForeignProjectId> = foreign_relations
            .iter()
            .map(|r| r.foreign_parent_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let foreign_edges = foreign_relations
            .into_iter()
            .map(|r| GraphEdge {
                ancestor_id: r.foreign_parent_id,
                descendant_id: r.child_id,
                depth: None,
            })
            .collect();

        let native_nodes_data = projects::display_data_by_ids(conn, &ids)?
            .into_iter()
            .map(|d| (d.id, d))
            .collect();
        let foreign_nodes_data = foreign_projects::data_by_ids(conn, &foreign_nodes)?
            .into_iter()
            .map(|d| (d.id, d))
            .collect();

        Ok(RemixGraph {
            native_nodes: ids,
            native_nodes_data,
            foreign_nodes,
            foreign_nodes_data,
            forward_edges,
            backward_edges,
            forward_relations,
            foreign_edges,
            convergence,
        })
    }

    /// Size of the project's whole remix graph, the project itself excluded.
    pub fn remix_count(&self, conn: &Connection, id: ProjectId) -> Result<usize> {
        let graph = self.get_full_remix_graph(conn, id)?;
        Ok(graph.native_nodes.len().saturating_sub(1))
    }

    /// Number of distinct forward descendants of the project.
    pub fn descendant_count(&self, conn: &Connection, id: ProjectId) -> Result<usize> {
        Ok(forward::subtree_relations(conn, id)?
            .iter()
            .filter(|r| !r.is_self_relation())
            .count())
    }

    /// The direct link between two projects: the depth-1 forward relation,
    /// or else the backward relation.
    pub fn find_direct_relation(
        &self,
        conn: &Connection,
        ancestor_id: ProjectId,
        descendant_id: ProjectId,
    ) -> Result<Option<DirectRelation>> {
        if let Some(relation) = forward::find(conn, ancestor_id, descendant_id)? {
            if relation.is_direct() {
                return Ok(Some(DirectRelation::Forward(relation)));
            }
        }
        Ok(backward::find(conn, ancestor_id, descendant_id)?.map(DirectRelation::Backward))
    }

    /// Stamp the direct link between two projects as seen now.
    ///
    /// Returns `false` if there is no such link.
    pub fn mark_relation_seen(
        &self,
        conn: &Connection,
        ancestor_id: ProjectId,
        descendant_id: ProjectId,
    ) -> Result<bool> {
        let now = self.now();
        match self.find_direct_relation(conn, ancestor_id, descendant_id)? {
            Some(DirectRelation::Forward(r)) => forward::mark_seen(conn, r.key(), now)?,
            Some(DirectRelation::Backward(r)) => backward::mark_seen(conn, r.key(), now)?,
            None => return Ok(false),
        }
        Ok(true)
    }

    /// Stamp every unseen remix of the user's projects as seen now.
    ///
    /// Returns the number of relations marked.
    pub fn mark_all_unseen_of_user(&self, conn: &mut Connection, user_id: UserId) -> Result<usize> {
        let now = self.now();
        let tx = conn.transaction().map_err(DbError::Sqlite)?;
        let forward_unseen = forward::unseen_direct_descendant_relations_of_user(&tx, user_id)?;
        let backward_unseen = backward::unseen_child_relations_of_user(&tx, user_id)?;
        for relation in &forward_unseen {
            forward::mark_seen(&tx, relation.key(), now)?;
        }
        for relation in &backward_unseen {
            backward::mark_seen(&tx, relation.key(), now)?;
        }
        tx.commit().map_err(DbError::Sqlite)?;

        let marked = forward_unseen.len() + backward_unseen.len();
        tracing::debug!(user_id, marked, "marked remixes of user as seen");
        Ok(marked)
    }

    /// Stamp every unseen relation created at or before `cutoff` as seen at `cutoff`.
    pub fn mark_all_unseen_as_seen(&self, conn: &mut Connection, cutoff: Timestamp) -> Result<usize> {
        let tx = conn.transaction().map_err(DbError::Sqlite)?;
        let marked = forward::mark_all_unseen_as_seen(&tx, cutoff)?
            + backward::mark_all_unseen_as_seen(&tx, cutoff)?;
        tx.commit().map_err(DbError::Sqlite)?;
        tracing::info!(cutoff, marked, "marked all unseen remix relations as seen");
        Ok(marked)
    }

    /// Unseen direct remixes of the user's projects by other users, newest first.
    pub fn unseen_remixes_of_user(&self, conn: &Connection, user_id: UserId) -> Result<Vec<UnseenRemix>> {
        let mut links: Vec<(RelationKey, Timestamp)> =
            forward::unseen_direct_descendant_relations_of_user(conn, user_id)?
                .into_iter()
                .map(|r| (r.key(), r.created_at))
                .collect();
        links.extend(
            backward::unseen_child_relations_of_user(conn, user_id)?
                .into_iter()
                .map(|r| (r.key(), r.created_at)),
        );

        let ids: Vec<ProjectId> = links
            .iter()
            .flat_map(|(k, _)| [k.ancestor_id, k.descendant_id])
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let data: HashMap<ProjectId, _> = projects::display_data_by_ids(conn, &ids)?
            .into_iter()
            .map(|d| (d.id, d))
            .collect();

        let mut remixes: Vec<UnseenRemix> = links
            .into_iter()
            .filter_map(|(key, created_at)| {
                let original = data.get(&key.ancestor_id)?;
                let remix = data.get(&key.descendant_id)?;
                Some(UnseenRemix {
                    original_project_id: original.id,
                    original_project_name: original.name.clone(),
                    remix_project_id: remix.id,
                    remix_project_name: remix.name.clone(),
                    remix_project_author: remix.username.clone(),
                    created_at,
                })
            })
            .collect();
        remixes.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(a.remix_project_id.cmp(&b.remix_project_id))
        });
        Ok(remixes)
    }

    /// Insert or refresh cached metadata of external projects.
    pub fn add_foreign_projects(&self, conn: &mut Connection, projects: &[ForeignProject]) -> Result<usize> {
        let tx = conn.transaction().map_err(DbError::Sqlite)?;
        for project in projects {
            foreign_projects::upsert(&tx, project)?;
        }
        tx.commit().map_err(DbError::Sqlite)?;
        Ok(projects.len())
    }

    /// Keep only the external ids with cached metadata.
    pub fn filter_existing_foreign_ids(
        &self,
        conn: &Connection,
        ids: &[ForeignProjectId],
    ) -> Result<Vec<ForeignProjectId>> {
        Ok(foreign_projects::filter_existing_ids(conn, ids)?)
    }

    /// Administrative reset: drop every forward, backward and foreign relation.
    pub fn remove_all_relations(&self, conn: &mut Connection) -> Result<()> {
        let tx = conn.transaction().map_err(DbError::Sqlite)?;
        let forward_removed = forward::remove_all(&tx)?;
        let backward_removed = backward::remove_all(&tx)?;
        let foreign_removed = foreign::remove_all(&tx)?;
        archive::remove_all(&tx)?;
        tx.commit().map_err(DbError::Sqlite)?;

        tracing::warn!(
            forward_removed,
            backward_removed,
            foreign_removed,
            "removed all remix relations"
        );
        Ok(())
    }

    /// Delete a project and detach it from the graph.
    ///
    /// Its children lose it as a parent first, so their ancestry is
    /// recomputed and cycles that ran through it can be folded back.
    ///
    /// # Errors
    ///
    /// - [`RemixError::ProjectNotFound`] if the project does not exist
    /// - [`RemixError::Db`] if persistence fails
    pub fn remove_project(&self, conn: &mut Connection, id: ProjectId) -> Result<()> {
        let manipulator = GraphManipulator::new(self.now());
        let tx = conn.transaction().map_err(DbError::Sqlite)?;
        if projects::find(&tx, id)?.is_none() {
            return Err(RemixError::ProjectNotFound(id));
        }

        backward::remove_all_of_project(&tx, id)?;
        let children = forward::child_ids(&tx, id)?;
        for &child_id in &children {
            manipulator.unlink_from_all_native_forward_parents(&tx, child_id, &[id])?;
            manipulator.convert_backward_parents_having_no_forward_ancestor(&tx, child_id, &[id])?;
        }
        forward::remove_all_of_project(&tx, id)?;
        projects::delete(&tx, id)?;
        tx.commit().map_err(DbError::Sqlite)?;

        tracing::info!(project_id = id, children = children.len(), "removed project from remix graph");
        Ok(())
    }

    fn dispatch(&self, notifications: &[RemixNotification]) {
        for notification in notifications {
            if let Err(e) = self.notifier.notify_remix(notification) {
                tracing::warn!(
                    parent_project = notification.parent_project,
                    child_project = notification.child_project,
                    error = %e,
                    "remix notification dropped"
                );
            }
        }
    }
}

/// Split declared parents into native and foreign ids.
///
/// Non-positive ids and references to the project itself are dropped.
fn split_parents(
    id: ProjectId,
    parents: &[ParentDescriptor],
) -> (Vec<ProjectId>, Vec<ForeignProjectId>) {
    let mut native = Vec::new();
    let mut foreign = Vec::new();
    for parent in parents.iter().filter(|p| p.parent_project_id > 0) {
        if parent.is_foreign_origin {
            foreign.push(parent.parent_project_id);
        } else if parent.parent_project_id != id {
            native.push(parent.parent_project_id);
        }
    }
    (native, foreign)
}

fn edge_with_depth(relation: &ForwardRelation) -> GraphEdge {
    GraphEdge {
        ancestor_id: relation.ancestor_id,
        descendant_id: relation.descendant_id,
        depth: Some(relation.depth),
    }
}
