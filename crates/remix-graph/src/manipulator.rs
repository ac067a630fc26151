//! Incremental edits of the remix closure.
//!
//! Changing the direct parents of a project `N` only changes relations from
//! projects outside `N`'s subtree to projects inside it. Relations inside the
//! subtree never pass through `N`'s incoming edges, so they are left alone.
//! Every edit recomputes the outside ancestry of the subtree from the edges
//! that cross into it and writes the difference.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rusqlite::Connection;

use remix_db::queries::archive::ArchivedRelation;
use remix_db::queries::{archive, backward, foreign, forward, projects};
use remix_types::relation::{BackwardRelation, ForeignRelation, ForwardRelation, RelationKey};
use remix_types::{ForeignProjectId, ProjectId, Timestamp};

use crate::Result;

/// Dates of relations that existed before an update, keyed by relation key.
///
/// A relation that is removed and written again keeps its original
/// `created_at` and `seen_at`.
#[derive(Debug, Clone, Default)]
pub struct PreservedDates {
    created_at: HashMap<RelationKey, Timestamp>,
    seen_at: HashMap<RelationKey, Option<Timestamp>>,
}

impl PreservedDates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remember(&mut self, key: RelationKey, created_at: Timestamp, seen_at: Option<Timestamp>) {
        self.created_at.insert(key, created_at);
        self.seen_at.insert(key, seen_at);
    }

    pub fn remember_forward(&mut self, relation: &ForwardRelation) {
        self.remember(relation.key(), relation.created_at, relation.seen_at);
    }

    pub fn remember_backward(&mut self, relation: &BackwardRelation) {
        self.remember(relation.key(), relation.created_at, relation.seen_at);
    }

    /// Archived dates never override dates of a live row.
    pub fn remember_archived(&mut self, relation: &ArchivedRelation) {
        if !self.created_at.contains_key(&relation.key) {
            self.remember(relation.key, relation.created_at, relation.seen_at);
        }
    }

    pub fn created_at(&self, key: &RelationKey) -> Option<Timestamp> {
        self.created_at.get(key).copied()
    }

    pub fn seen_at(&self, key: &RelationKey) -> Option<Timestamp> {
        self.seen_at.get(key).copied().flatten()
    }

    fn merged_with_archive(&self, archived: &[ArchivedRelation]) -> PreservedDates {
        let mut merged = self.clone();
        for relation in archived {
            merged.remember_archived(relation);
        }
        merged
    }
}

/// Result of linking a project to native parents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkOutcome {
    /// Parents folded into the forward closure.
    pub forward: Vec<ProjectId>,
    /// Parents stored as backward relations because they descend from the project.
    pub backward: Vec<ProjectId>,
}

/// Applies link/unlink edits to the closure tables.
///
/// All writes go through the connection it is handed; callers pass a
/// transaction so that one logical edit commits or rolls back as a whole.
#[derive(Debug, Clone, Copy)]
pub struct GraphManipulator {
    now: Timestamp,
}

impl GraphManipulator {
    /// `now` stamps every relation created or archived by this manipulator.
    pub fn new(now: Timestamp) -> Self {
        Self { now }
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Insert the project's self-relation if it is missing.
    ///
    /// Returns `true` when a relation was inserted.
    pub fn ensure_self_relation(&self, conn: &Connection, id: ProjectId) -> Result<bool> {
        if forward::find(conn, id, id)?.is_some() {
            return Ok(false);
        }
        forward::insert(
            conn,
            &ForwardRelation {
                ancestor_id: id,
                descendant_id: id,
                depth: 0,
                created_at: self.now,
                seen_at: None,
            },
        )?;
        Ok(true)
    }

    /// Make each of `parent_ids` a direct parent of `node`.
    ///
    /// A parent that already descends from `node` would close a cycle and is
    /// stored as a backward relation instead. Ids that are not positive, equal
    /// `node`, or are already direct parents are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a read or write fails.
    pub fn link_to_native_parents(
        &self,
        conn: &Connection,
        node: ProjectId,
        parent_ids: &[ProjectId],
        preserved: &PreservedDates,
    ) -> Result<LinkOutcome> {
        self.ensure_self_relation(conn, node)?;
        let subtree = subtree_ids(conn, node)?;
        let mut parents = direct_parent_ids(conn, node)?;
        let mut outcome = LinkOutcome::default();

        for &parent_id in parent_ids {
            if parent_id <= 0
                || parent_id == node
                || parents.contains(&parent_id)
                || outcome.backward.contains(&parent_id)
            {
                continue;
            }
            if subtree.contains(&parent_id) {
                self.link_backward(conn, parent_id, node, preserved)?;
                outcome.backward.push(parent_id);
                continue;
            }
            self.ensure_self_relation(conn, parent_id)?;
            parents.insert(parent_id);
            outcome.forward.push(parent_id);
        }

        if !outcome.forward.is_empty() {
            self.rebuild_external_ancestry(conn, node, &subtree, &parents, preserved)?;
        }
        if !outcome.backward.is_empty() {
            tracing::debug!(
                project_id = node,
                backward = ?outcome.backward,
                "parent link would close a cycle, kept as backward relation"
            );
        }
        Ok(outcome)
    }

    /// Drop the direct forward edges from `parent_ids` to `node` and recompute
    /// the ancestry of `node` and everything below it.
    ///
    /// # Errors
    ///
    /// Returns an error if a read or write fails.
    pub fn unlink_from_all_native_forward_parents(
        &self,
        conn: &Connection,
        node: ProjectId,
        parent_ids: &[ProjectId],
    ) -> Result<()> {
        let mut parents = direct_parent_ids(conn, node)?;
        let before = parents.len();
        for parent_id in parent_ids {
            parents.remove(parent_id);
        }
        if parents.len() == before {
            return Ok(());
        }
        let subtree = subtree_ids(conn, node)?;
        self.rebuild_external_ancestry(conn, node, &subtree, &parents, &PreservedDates::new())
    }

    /// Remove backward relations from `parent_ids` to `node`, archiving their dates.
    ///
    /// # Errors
    ///
    /// Returns an error if a read or write fails.
    pub fn unlink_from_native_backward_parents(
        &self,
        conn: &Connection,
        node: ProjectId,
        parent_ids: &[ProjectId],
    ) -> Result<()> {
        for &parent_id in parent_ids {
            if let Some(relation) = backward::find(conn, parent_id, node)? {
                archive::remember(
                    conn,
                    relation.key(),
                    relation.created_at,
                    relation.seen_at,
                    self.now,
                )?;
                backward::delete(conn, relation.key())?;
            }
        }
        Ok(())
    }

    /// Record foreign parents of `node`. Ids that are not positive are skipped.
    pub fn link_to_foreign_parents(
        &self,
        conn: &Connection,
        node: ProjectId,
        foreign_ids: &[ForeignProjectId],
    ) -> Result<()> {
        for &foreign_parent_id in foreign_ids.iter().filter(|&&id| id > 0) {
            foreign::insert(
                conn,
                &ForeignRelation {
                    foreign_parent_id,
                    child_id: node,
                    created_at: self.now,
                },
            )?;
        }
        Ok(())
    }

    pub fn unlink_from_foreign_parents(
        &self,
        conn: &Connection,
        node: ProjectId,
        foreign_ids: &[ForeignProjectId],
    ) -> Result<()> {
        for &foreign_parent_id in foreign_ids {
            foreign::delete(conn, foreign_parent_id, node)?;
        }
        Ok(())
    }

    /// Fold backward relations back into the forward closure once the cycle
    /// they would have closed is gone.
    ///
    /// Only paths that ran through one of `candidate_parent_ids` into `node`
    /// can have disappeared, so the backward relations considered are those
    /// whose parent lies in `node`'s subtree and whose child is an ancestor
    /// (or self) of a candidate. Returns the ids of the children whose
    /// backward relation was converted.
    ///
    /// # Errors
    ///
    /// Returns an error if a read or write fails.
    pub fn convert_backward_parents_having_no_forward_ancestor(
        &self,
        conn: &Connection,
        node: ProjectId,
        candidate_parent_ids: &[ProjectId],
    ) -> Result<Vec<ProjectId>> {
        if candidate_parent_ids.is_empty() {
            return Ok(Vec::new());
        }
        let candidate_ancestors: BTreeSet<ProjectId> =
            forward::ancestor_relations(conn, candidate_parent_ids)?
                .into_iter()
                .map(|r| r.ancestor_id)
                .chain(candidate_parent_ids.iter().copied())
                .collect();
        let subtree: Vec<ProjectId> = subtree_ids(conn, node)?.into_iter().collect();

        let mut converted = Vec::new();
        for relation in backward::relations_with_parent_in(conn, &subtree)? {
            if !candidate_ancestors.contains(&relation.child_id) {
                continue;
            }
            // Earlier conversions may have re-closed the cycle.
            if forward::find(conn, relation.child_id, relation.parent_id)?.is_some() {
                continue;
            }
            let mut dates = PreservedDates::new();
            dates.remember_backward(&relation);
            backward::delete(conn, relation.key())?;
            let outcome =
                self.link_to_native_parents(conn, relation.child_id, &[relation.parent_id], &dates)?;
            if !outcome.forward.is_empty() {
                converted.push(relation.child_id);
            }
        }

        if !converted.is_empty() {
            tracing::info!(
                project_id = node,
                converted = converted.len(),
                "backward relations folded into forward closure"
            );
        }
        Ok(converted)
    }

    fn link_backward(
        &self,
        conn: &Connection,
        parent_id: ProjectId,
        child_id: ProjectId,
        preserved: &PreservedDates,
    ) -> Result<()> {
        let key = RelationKey::new(parent_id, child_id);
        let preserved = preserved.merged_with_archive(&archive::relations_into(conn, &[child_id])?);
        backward::insert(
            conn,
            &BackwardRelation {
                parent_id,
                child_id,
                created_at: preserved.created_at(&key).unwrap_or(self.now),
                seen_at: preserved.seen_at(&key),
            },
        )?;
        archive::forget(conn, key)?;
        Ok(())
    }

    /// Recompute every relation from outside `subtree` into it, given the new
    /// set of direct parents of `node` (the subtree's top).
    fn rebuild_external_ancestry(
        &self,
        conn: &Connection,
        node: ProjectId,
        subtree: &BTreeSet<ProjectId>,
        parents: &BTreeSet<ProjectId>,
        preserved: &PreservedDates,
    ) -> Result<()> {
        let subtree_list: Vec<ProjectId> = subtree.iter().copied().collect();

        // Paths inside the subtree, per starting project.
        let mut internal: HashMap<ProjectId, Vec<(ProjectId, u32)>> = subtree
            .iter()
            .map(|&id| (id, vec![(id, 0)]))
            .collect();
        for relation in forward::descendant_relations(conn, &subtree_list)? {
            if let Some(paths) = internal.get_mut(&relation.ancestor_id) {
                paths.push((relation.descendant_id, relation.depth));
            }
        }

        // Rows currently pointing into the subtree from outside, and the
        // direct edges among them that cross the boundary.
        let mut existing: BTreeMap<RelationKey, ForwardRelation> = BTreeMap::new();
        let mut crossing: Vec<(ProjectId, ProjectId)> =
            parents.iter().map(|&parent_id| (parent_id, node)).collect();
        for relation in forward::ancestor_relations(conn, &subtree_list)? {
            if subtree.contains(&relation.ancestor_id) {
                continue;
            }
            if relation.is_direct() && relation.descendant_id != node {
                crossing.push((relation.ancestor_id, relation.descendant_id));
            }
            existing.insert(relation.key(), relation);
        }

        let outside: Vec<ProjectId> = crossing
            .iter()
            .map(|&(x, _)| x)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let mut ancestors: HashMap<ProjectId, Vec<(ProjectId, u32)>> = HashMap::new();
        for relation in forward::ancestor_relations(conn, &outside)? {
            ancestors
                .entry(relation.descendant_id)
                .or_default()
                .push((relation.ancestor_id, relation.depth));
        }

        let mut wanted: BTreeMap<RelationKey, u32> = BTreeMap::new();
        for (x, y) in crossing {
            let (Some(ups), Some(downs)) = (ancestors.get(&x), internal.get(&y)) else {
                continue;
            };
            for &(ancestor_id, up) in ups {
                for &(descendant_id, down) in downs {
                    merge_min(&mut wanted, RelationKey::new(ancestor_id, descendant_id), up + 1 + down);
                }
            }
        }

        let preserved = preserved.merged_with_archive(&archive::relations_into(conn, &subtree_list)?);
        let (mut inserted, mut updated, mut removed) = (0usize, 0usize, 0usize);

        for (key, relation) in &existing {
            match wanted.get(key) {
                None => {
                    archive::remember(conn, *key, relation.created_at, relation.seen_at, self.now)?;
                    forward::delete(conn, *key)?;
                    removed += 1;
                }
                Some(&depth) if depth != relation.depth => {
                    forward::update_depth(conn, *key, depth)?;
                    updated += 1;
                }
                Some(_) => {}
            }
        }
        for (key, depth) in wanted {
            if existing.contains_key(&key) {
                continue;
            }
            forward::insert(
                conn,
                &ForwardRelation {
                    ancestor_id: key.ancestor_id,
                    descendant_id: key.descendant_id,
                    depth,
                    created_at: preserved.created_at(&key).unwrap_or(self.now),
                    seen_at: preserved.seen_at(&key),
                },
            )?;
            archive::forget(conn, key)?;
            inserted += 1;
        }

        projects::set_remix_root(conn, node, parents.is_empty())?;

        tracing::debug!(
            project_id = node,
            subtree = subtree.len(),
            inserted,
            updated,
            removed,
            "rebuilt external ancestry"
        );
        Ok(())
    }
}

/// Keep the smaller depth when two paths reach the same relation key.
pub(crate) fn merge_min(relations: &mut BTreeMap<RelationKey, u32>, key: RelationKey, depth: u32) {
    relations
        .entry(key)
        .and_modify(|d| *d = (*d).min(depth))
        .or_insert(depth);
}

/// `node` and all of its forward descendants.
fn subtree_ids(conn: &Connection, node: ProjectId) -> Result<BTreeSet<ProjectId>> {
    let mut ids: BTreeSet<ProjectId> = forward::subtree_relations(conn, node)?
        .into_iter()
        .map(|r| r.descendant_id)
        .collect();
    ids.insert(node);
    Ok(ids)
}

fn direct_parent_ids(conn: &Connection, node: ProjectId) -> Result<BTreeSet<ProjectId>> {
    Ok(forward::parent_ancestor_relations(conn, &[node])?
        .into_iter()
        .filter(ForwardRelation::is_direct)
        .map(|r| r.ancestor_id)
        .collect())
}
