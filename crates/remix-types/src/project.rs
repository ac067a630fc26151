//! Projects, declared parents and cached display data.

use serde::{Deserialize, Serialize};

use crate::{ForeignProjectId, ProjectId, UserId, INITIAL_VERSION};

/// A native project as seen by the remix engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    /// Author account, if the project still has one.
    pub user_id: Option<UserId>,
    pub username: Option<String>,
    /// Bumped on every re-upload. 1 = first upload.
    #[serde(default = "initial_version")]
    pub version: u32,
}

fn initial_version() -> u32 {
    INITIAL_VERSION
}

impl Project {
    /// Whether this is the project's first upload (no remix history yet).
    pub fn is_initial_version(&self) -> bool {
        self.version == INITIAL_VERSION
    }
}

/// One entry of the parent list a project declares on upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ParentDescriptor {
    pub parent_project_id: i64,
    pub is_foreign_origin: bool,
}

impl ParentDescriptor {
    pub fn native(id: ProjectId) -> Self {
        Self {
            parent_project_id: id,
            is_foreign_origin: false,
        }
    }

    pub fn foreign(id: ForeignProjectId) -> Self {
        Self {
            parent_project_id: id,
            is_foreign_origin: true,
        }
    }
}

/// Cached metadata of a project hosted on the external platform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct ForeignProject {
    pub id: ForeignProjectId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub username: Option<String>,
}

/// Display data of a native node in the remix graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct ProjectDisplayData {
    pub id: ProjectId,
    pub name: String,
    pub username: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_version_routing() {
        let mut project = Project {
            id: 1,
            name: "Galaxy".to_string(),
            user_id: Some(7),
            username: Some("ada".to_string()),
            version: INITIAL_VERSION,
        };
        assert!(project.is_initial_version());
        project.version += 1;
        assert!(!project.is_initial_version());
    }

    #[test]
    fn test_parent_descriptor_wire_names() {
        let json = serde_json::to_value(ParentDescriptor::foreign(42)).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({"parentProjectId": 42, "isForeignOrigin": true})
        );
    }

    #[test]
    fn test_project_version_defaults_to_initial() {
        let project: Project =
            serde_json::from_str(r#"{"id":3,"name":"x","user_id":null,"username":null}"#)
                .expect("parse");
        assert!(project.is_initial_version());
    }
}
