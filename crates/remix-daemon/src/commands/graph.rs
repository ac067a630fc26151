//! Remix graph view and seen-marking command handlers.

use std::sync::Arc;

use serde_json::Value;

use super::{field, required_i64};
use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

/// Every node and edge connected to a project.
pub async fn get_remix_graph(state: &Arc<DaemonState>, params: &Value) -> Result {
    let project_id = required_i64(params, "project_id")?;

    let service = state.service.lock().await;
    let graph = service.on_user_viewed_graph(project_id)?;

    serde_json::to_value(graph).map_err(|e| RpcError::internal_error(&e.to_string()))
}

/// Size of the project's remix graph and number of its descendants.
pub async fn get_remix_count(state: &Arc<DaemonState>, params: &Value) -> Result {
    let project_id = required_i64(params, "project_id")?;

    let service = state.service.lock().await;
    let remix_count = service.remix_count(project_id)?;
    let descendant_count = service.descendant_count(project_id)?;

    Ok(serde_json::json!({
        "project_id": project_id,
        "remix_count": remix_count,
        "descendant_count": descendant_count,
    }))
}

/// Unseen remixes of a user's projects.
pub async fn get_unseen_remixes(state: &Arc<DaemonState>, params: &Value) -> Result {
    let user_id = required_i64(params, "user_id")?;

    let service = state.service.lock().await;
    let remixes = service.unseen_remixes_of_user(user_id)?;

    Ok(serde_json::json!({"remixes": remixes}))
}

/// Mark one direct remix link as seen.
pub async fn mark_remix_seen(state: &Arc<DaemonState>, params: &Value) -> Result {
    let ancestor_id = required_i64(params, "ancestor_id")?;
    let descendant_id = required_i64(params, "descendant_id")?;

    let service = state.service.lock().await;
    let marked = service.mark_relation_seen(ancestor_id, descendant_id)?;

    Ok(serde_json::json!({"marked": marked}))
}

/// Mark every unseen remix of a user's projects as seen.
pub async fn mark_all_unseen_of_user(state: &Arc<DaemonState>, params: &Value) -> Result {
    let user_id = required_i64(params, "user_id")?;

    let mut service = state.service.lock().await;
    let marked = service.mark_all_unseen_of_user(user_id)?;

    Ok(serde_json::json!({"marked": marked}))
}

/// Mark every unseen relation created up to `cutoff` (default: now) as seen.
pub async fn mark_all_unseen_as_seen(state: &Arc<DaemonState>, params: &Value) -> Result {
    let cutoff = field::<Option<u64>>(params, "cutoff")?.unwrap_or_else(remix_types::now_secs);

    let mut service = state.service.lock().await;
    let marked = service.mark_all_unseen_as_seen(cutoff)?;

    Ok(serde_json::json!({"marked": marked, "cutoff": cutoff}))
}
