//! The full remix graph view rendered by the frontend visualizer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::project::{ForeignProject, ProjectDisplayData};
use crate::{ForeignProjectId, ProjectId};

/// Every node and edge connected to a project, in either direction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RemixGraph {
    /// Sorted, deduplicated native node ids.
    pub native_nodes: Vec<ProjectId>,
    pub native_nodes_data: BTreeMap<ProjectId, ProjectDisplayData>,
    /// Sorted, deduplicated foreign node ids.
    pub foreign_nodes: Vec<ForeignProjectId>,
    pub foreign_nodes_data: BTreeMap<ForeignProjectId, ForeignProject>,
    /// Direct native edges folded into the closure (depth 1).
    pub forward_edges: Vec<GraphEdge>,
    /// Direct native edges held back because they would close a cycle.
    pub backward_edges: Vec<GraphEdge>,
    /// All closure relations with depth >= 1 starting inside the graph.
    pub forward_relations: Vec<GraphEdge>,
    /// Foreign parent -> native child edges.
    pub foreign_edges: Vec<GraphEdge>,
    pub convergence: GraphConvergence,
}

impl RemixGraph {
    pub fn is_empty(&self) -> bool {
        self.native_nodes.is_empty()
    }
}

/// An edge of the graph view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub ancestor_id: i64,
    pub descendant_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
}

/// How the root/descendant expansion loop terminated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GraphConvergence {
    /// The node set stopped changing after this many rounds.
    Stabilized { iterations: usize },
    /// The round cap was hit first; the node set may be incomplete.
    IterationCapReached { iterations: usize },
}

impl Default for GraphConvergence {
    fn default() -> Self {
        GraphConvergence::Stabilized { iterations: 0 }
    }
}

impl GraphConvergence {
    pub fn is_complete(&self) -> bool {
        matches!(self, GraphConvergence::Stabilized { .. })
    }
}
