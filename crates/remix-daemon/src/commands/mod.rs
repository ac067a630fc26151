//! IPC command handlers.
//!
//! Each submodule implements the commands for one IPC category.

pub mod graph;
pub mod projects;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::rpc::RpcError;

/// Required integer parameter.
pub(crate) fn required_i64(params: &Value, key: &str) -> Result<i64, RpcError> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} required")))
}

/// Parameter deserialized into `T`; a missing key deserializes from `null`.
pub(crate) fn field<T: DeserializeOwned>(params: &Value, key: &str) -> Result<T, RpcError> {
    let value = params.get(key).cloned().unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|e| RpcError::invalid_params(&format!("{key}: {e}")))
}
