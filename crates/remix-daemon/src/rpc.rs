//! JSON-RPC server over Unix socket.
//!
//! Listens on a Unix domain socket, accepts connections, and dispatches
//! JSON-RPC method calls to the appropriate command handlers.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tracing::{debug, error, info, warn};

use remix_db::DbError;
use remix_graph::RemixError;

use crate::commands;
use crate::DaemonState;

/// JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Method name.
    pub method: String,
    /// Parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// JSON-RPC response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    /// JSON-RPC version.
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Result or error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcError {
    pub code: i32,
    /// Error name.
    pub message: String,
    /// Optional structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcResponse {
    /// Create a success response.
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl RpcError {
    /// Parse error (-32700).
    pub fn parse_error() -> Self {
        Self {
            code: -32700,
            message: "PARSE_ERROR".to_string(),
            data: None,
        }
    }

    /// Invalid request (-32600).
    pub fn invalid_request() -> Self {
        Self {
            code: -32600,
            message: "INVALID_REQUEST".to_string(),
            data: None,
        }
    }

    /// Method not found (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: "METHOD_NOT_FOUND".to_string(),
            data: Some(serde_json::json!({"method": method})),
        }
    }

    /// Invalid params (-32602).
    pub fn invalid_params(detail: &str) -> Self {
        Self {
            code: -32602,
            message: "INVALID_PARAMS".to_string(),
            data: Some(serde_json::json!({"detail": detail})),
        }
    }

    /// Internal error (-32603).
    pub fn internal_error(detail: &str) -> Self {
        Self {
            code: -32603,
            message: "INTERNAL_ERROR".to_string(),
            data: Some(serde_json::json!({"detail": detail})),
        }
    }

    /// Project not found (-32050).
    pub fn project_not_found(project_id: i64) -> Self {
        Self {
            code: -32050,
            message: "PROJECT_NOT_FOUND".to_string(),
            data: Some(serde_json::json!({"project_id": project_id})),
        }
    }

    /// Project already registered (-32051).
    pub fn already_registered(project_id: i64) -> Self {
        Self {
            code: -32051,
            message: "ALREADY_REGISTERED".to_string(),
            data: Some(serde_json::json!({"project_id": project_id})),
        }
    }
}

impl From<RemixError> for RpcError {
    fn from(err: RemixError) -> Self {
        match err {
            RemixError::ProjectNotFound(id) => RpcError::project_not_found(id),
            RemixError::AlreadyRegistered(id) => RpcError::already_registered(id),
            RemixError::Db(DbError::NotFound(what)) => Self {
                code: -32050,
                message: "PROJECT_NOT_FOUND".to_string(),
                data: Some(serde_json::json!({"detail": what})),
            },
            RemixError::Db(e) => {
                error!(error = %e, "remix engine persistence failure");
                RpcError::internal_error(&format!("db error: {e}"))
            }
        }
    }
}

/// The RPC server.
pub struct RpcServer {
    state: Arc<DaemonState>,
    socket_path: PathBuf,
}

impl RpcServer {
    /// Create a new RPC server.
    pub fn new(state: Arc<DaemonState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) -> anyhow::Result<()> {
        // Remove stale socket file
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("IPC server listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(state, stream).await {
                            warn!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

/// Handle a single client connection.
async fn handle_connection(
    state: Arc<DaemonState>,
    stream: tokio::net::UnixStream,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break; // EOF
        }

        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) if request.jsonrpc == "2.0" => dispatch_request(state.clone(), request).await,
            Ok(request) => RpcResponse::error(request.id, RpcError::invalid_request()),
            Err(_) => RpcResponse::error(serde_json::Value::Null, RpcError::parse_error()),
        };

        let mut response_json = serde_json::to_string(&response)?;
        response_json.push('\n');
        writer.write_all(response_json.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Dispatch a JSON-RPC request to the appropriate command handler.
pub async fn dispatch_request(state: Arc<DaemonState>, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    let method = request.method.as_str();

    debug!("Dispatching RPC method: {}", method);

    let result = match method {
        // Upload and administration
        "project_created" => commands::projects::project_created(&state, &request.params).await,
        "project_parents_changed" => {
            commands::projects::project_parents_changed(&state, &request.params).await
        }
        "add_foreign_projects" => {
            commands::projects::add_foreign_projects(&state, &request.params).await
        }
        "remove_project" => commands::projects::remove_project(&state, &request.params).await,
        "remove_all_relations" => commands::projects::remove_all_relations(&state).await,

        // Graph views and seen-marking
        "get_remix_graph" => commands::graph::get_remix_graph(&state, &request.params).await,
        "get_remix_count" => commands::graph::get_remix_count(&state, &request.params).await,
        "get_unseen_remixes" => commands::graph::get_unseen_remixes(&state, &request.params).await,
        "mark_remix_seen" => commands::graph::mark_remix_seen(&state, &request.params).await,
        "mark_all_unseen_of_user" => {
            commands::graph::mark_all_unseen_of_user(&state, &request.params).await
        }
        "mark_all_unseen_as_seen" => {
            commands::graph::mark_all_unseen_as_seen(&state, &request.params).await
        }

        _ => Err(RpcError::method_not_found(method)),
    };

    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(err) => RpcResponse::error(id, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_state;

    fn request(method: &str, params: serde_json::Value) -> RpcRequest {
        RpcRequest {
            jsonrpc: "2.0".to_string(),
            id: serde_json::json!(1),
            method: method.to_string(),
            params,
        }
    }

    #[test]
    fn test_rpc_error_codes() {
        let err = RpcError::project_not_found(4);
        assert_eq!(err.code, -32050);
        assert_eq!(err.message, "PROJECT_NOT_FOUND");

        let err = RpcError::from(RemixError::AlreadyRegistered(4));
        assert_eq!(err.code, -32051);

        let err = RpcError::method_not_found("unknown");
        assert_eq!(err.code, -32601);
    }

    #[test]
    fn test_rpc_response_success() {
        let resp = RpcResponse::success(serde_json::json!(1), serde_json::json!({"remix_count": 2}));
        assert!(resp.result.is_some());
        assert!(resp.error.is_none());
    }

    #[test]
    fn test_rpc_response_error() {
        let resp = RpcResponse::error(serde_json::json!(1), RpcError::internal_error("test"));
        assert!(resp.result.is_none());
        assert!(resp.error.is_some());
    }

    #[tokio::test]
    async fn test_dispatch_unknown_method() {
        let state = test_state();
        let resp = dispatch_request(state, request("init_pik", serde_json::json!({}))).await;
        assert_eq!(resp.error.map(|e| e.code), Some(-32601));
    }

    #[tokio::test]
    async fn test_dispatch_remix_flow() {
        let state = test_state();
        let mut events = state.event_bus.subscribe();

        for (id, parents) in [(1, serde_json::json!([])), (2, serde_json::json!([{"parentProjectId": 1, "isForeignOrigin": false}]))] {
            let resp = dispatch_request(
                state.clone(),
                request(
                    "project_created",
                    serde_json::json!({
                        "project": {"id": id, "name": format!("p{id}"), "user_id": id * 10, "username": null},
                        "parents": parents,
                    }),
                ),
            )
            .await;
            assert!(resp.error.is_none(), "create {id}: {:?}", resp.error);
        }

        let event = events.try_recv().expect("remix event");
        assert_eq!(event.event_type, "RemixCreated");

        let resp = dispatch_request(
            state.clone(),
            request("get_remix_count", serde_json::json!({"project_id": 1})),
        )
        .await;
        let result = resp.result.expect("count result");
        assert_eq!(result["remix_count"], 1);
        assert_eq!(result["descendant_count"], 1);

        let resp = dispatch_request(
            state.clone(),
            request("get_remix_graph", serde_json::json!({"project_id": 2})),
        )
        .await;
        let graph = resp.result.expect("graph result");
        assert_eq!(graph["nativeNodes"], serde_json::json!([1, 2]));

        let resp = dispatch_request(
            state.clone(),
            request("get_unseen_remixes", serde_json::json!({"user_id": 10})),
        )
        .await;
        assert_eq!(resp.result.expect("unseen")["remixes"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_dispatch_maps_engine_errors() {
        let state = test_state();
        let resp = dispatch_request(
            state.clone(),
            request(
                "project_parents_changed",
                serde_json::json!({"project_id": 77, "parents": []}),
            ),
        )
        .await;
        assert_eq!(resp.error.map(|e| e.code), Some(-32050));

        let resp = dispatch_request(state, request("get_remix_graph", serde_json::json!({}))).await;
        assert_eq!(resp.error.map(|e| e.code), Some(-32602));
    }
}
