//! Upload and administration command handlers.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use remix_types::project::{ForeignProject, ParentDescriptor, Project};

use super::{field, required_i64};
use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

fn parents(params: &Value) -> std::result::Result<Vec<ParentDescriptor>, RpcError> {
    Ok(field::<Option<Vec<ParentDescriptor>>>(params, "parents")?.unwrap_or_default())
}

/// A project was uploaded for the first time.
pub async fn project_created(state: &Arc<DaemonState>, params: &Value) -> Result {
    let project: Project = field(params, "project")?;
    let parents = parents(params)?;

    let mut service = state.service.lock().await;
    service.on_project_created(&project, &parents)?;

    Ok(serde_json::json!({"project_id": project.id, "registered": true}))
}

/// A stored project was re-uploaded with a new parent list.
pub async fn project_parents_changed(state: &Arc<DaemonState>, params: &Value) -> Result {
    let project_id = required_i64(params, "project_id")?;
    let parents = parents(params)?;

    let mut service = state.service.lock().await;
    let version = service.on_project_parents_changed(project_id, &parents)?;

    Ok(serde_json::json!({"project_id": project_id, "version": version}))
}

/// Cache metadata of projects on the external platform.
pub async fn add_foreign_projects(state: &Arc<DaemonState>, params: &Value) -> Result {
    let projects: Vec<ForeignProject> = field(params, "projects")?;

    let mut service = state.service.lock().await;
    let stored = service.add_foreign_projects(&projects)?;

    Ok(serde_json::json!({"stored": stored}))
}

/// Delete a project and detach it from the remix graph.
pub async fn remove_project(state: &Arc<DaemonState>, params: &Value) -> Result {
    let project_id = required_i64(params, "project_id")?;

    let mut service = state.service.lock().await;
    service.remove_project(project_id)?;

    Ok(serde_json::json!({"project_id": project_id, "removed": true}))
}

/// Drop every remix relation.
pub async fn remove_all_relations(state: &Arc<DaemonState>) -> Result {
    let mut service = state.service.lock().await;
    service.remove_all_relations()?;
    info!("remix relations reset over RPC");

    Ok(serde_json::json!({"removed": true}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_state;

    #[tokio::test]
    async fn test_create_twice_is_rejected() {
        let state = test_state();
        let params = serde_json::json!({
            "project": {"id": 1, "name": "Rocket", "user_id": null, "username": null},
        });
        project_created(&state, &params).await.expect("first create");

        let err = project_created(&state, &params).await.expect_err("second create");
        assert_eq!(err.code, -32051);
    }

    #[tokio::test]
    async fn test_parents_changed_bumps_version() {
        let state = test_state();
        for id in [1, 2] {
            let params = serde_json::json!({
                "project": {"id": id, "name": "p", "user_id": null, "username": null},
            });
            project_created(&state, &params).await.expect("create");
        }

        let result = project_parents_changed(
            &state,
            &serde_json::json!({
                "project_id": 2,
                "parents": [{"parentProjectId": 1, "isForeignOrigin": false}],
            }),
        )
        .await
        .expect("change");
        assert_eq!(result["version"], 2);

        let service = state.service.lock().await;
        assert_eq!(service.descendant_count(1).expect("count"), 1);
    }

    #[tokio::test]
    async fn test_foreign_projects_and_removal() {
        let state = test_state();
        let result = add_foreign_projects(
            &state,
            &serde_json::json!({
                "projects": [{"id": 7000, "name": "Pong", "description": null, "username": "scratcher"}],
            }),
        )
        .await
        .expect("add");
        assert_eq!(result["stored"], 1);

        let err = remove_project(&state, &serde_json::json!({"project_id": 3}))
            .await
            .expect_err("unknown project");
        assert_eq!(err.code, -32050);

        remove_all_relations(&state).await.expect("reset");
    }
}
