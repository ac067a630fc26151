//! Closure-table relation rows.

use serde::{Deserialize, Serialize};

use crate::{ForeignProjectId, ProjectId, Timestamp};

/// Unique key of a native relation: one row per ancestor/descendant pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationKey {
    pub ancestor_id: ProjectId,
    pub descendant_id: ProjectId,
}

impl RelationKey {
    pub fn new(ancestor_id: ProjectId, descendant_id: ProjectId) -> Self {
        Self {
            ancestor_id,
            descendant_id,
        }
    }
}

/// A forward (closure-consistent) relation between two native projects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardRelation {
    pub ancestor_id: ProjectId,
    pub descendant_id: ProjectId,
    /// Shortest number of direct remix hops. 0 = self-relation.
    pub depth: u32,
    pub created_at: Timestamp,
    pub seen_at: Option<Timestamp>,
}

impl ForwardRelation {
    pub fn key(&self) -> RelationKey {
        RelationKey::new(self.ancestor_id, self.descendant_id)
    }

    pub fn is_self_relation(&self) -> bool {
        self.depth == 0
    }

    pub fn is_direct(&self) -> bool {
        self.depth == 1
    }
}

/// A direct parent link that is not folded into the forward closure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackwardRelation {
    pub parent_id: ProjectId,
    pub child_id: ProjectId,
    pub created_at: Timestamp,
    pub seen_at: Option<Timestamp>,
}

impl BackwardRelation {
    pub fn key(&self) -> RelationKey {
        RelationKey::new(self.parent_id, self.child_id)
    }
}

/// A native project's immediate parent on the external platform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignRelation {
    pub foreign_parent_id: ForeignProjectId,
    pub child_id: ProjectId,
    pub created_at: Timestamp,
}

/// A direct native parent link, whichever table holds it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DirectRelation {
    Forward(ForwardRelation),
    Backward(BackwardRelation),
}

impl DirectRelation {
    pub fn key(&self) -> RelationKey {
        match self {
            DirectRelation::Forward(r) => r.key(),
            DirectRelation::Backward(r) => r.key(),
        }
    }

    pub fn created_at(&self) -> Timestamp {
        match self {
            DirectRelation::Forward(r) => r.created_at,
            DirectRelation::Backward(r) => r.created_at,
        }
    }

    pub fn seen_at(&self) -> Option<Timestamp> {
        match self {
            DirectRelation::Forward(r) => r.seen_at,
            DirectRelation::Backward(r) => r.seen_at,
        }
    }
}

/// A remix of one of the user's projects that the user has not looked at yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct UnseenRemix {
    pub original_project_id: ProjectId,
    pub original_project_name: String,
    pub remix_project_id: ProjectId,
    pub remix_project_name: String,
    pub remix_project_author: Option<String>,
    pub created_at: Timestamp,
}
