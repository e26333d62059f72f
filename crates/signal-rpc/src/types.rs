//! JSON-RPC 2.0 wire types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use signal_core::RpcId;
use signal_core::constants::JSONRPC_VERSION;

/// Outgoing request body.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Correlation id echoed by the daemon.
    pub id: RpcId,
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Method name (e.g. `send`, `listGroups`).
    pub method: String,
    /// Parameters object.
    pub params: Value,
}

impl RpcRequest {
    /// Build a request; `null` params are sent as `{}`.
    pub fn new(id: RpcId, method: impl Into<String>, params: Value) -> Self {
        let params = if params.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            params
        };
        Self {
            id,
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// Incoming reply body.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Protocol tag; must be `"2.0"`.
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// Echoed request id.
    #[serde(default)]
    pub id: Option<Value>,
    /// Result payload on success.
    #[serde(default)]
    pub result: Option<Value>,
    /// Error payload on failure.
    #[serde(default)]
    pub error: Option<RpcErrorBody>,
}

impl RpcResponse {
    /// The echoed id as a string. Numeric ids are rendered in decimal.
    pub fn id_str(&self) -> Option<String> {
        match self.id.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Error object inside a reply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorBody {
    /// JSON-RPC error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_wire_shape() {
        let req = RpcRequest::new(RpcId::from("send-1"), "send", json!({"account": "+1555"}));
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(
            v,
            json!({"id": "send-1", "jsonrpc": "2.0", "method": "send", "params": {"account": "+1555"}})
        );
    }

    #[test]
    fn null_params_become_empty_object() {
        let req = RpcRequest::new(RpcId::from("version-1"), "version", Value::Null);
        assert_eq!(req.params, json!({}));
    }

    #[test]
    fn response_tolerates_missing_fields() {
        let resp: RpcResponse = serde_json::from_value(json!({"id": 7})).unwrap();
        assert!(resp.jsonrpc.is_none());
        assert_eq!(resp.id_str().as_deref(), Some("7"));
        assert!(resp.result.is_none());
    }

    #[test]
    fn error_body_parses() {
        let resp: RpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": "x",
            "error": {"code": -1, "message": "boom"}
        }))
        .unwrap();
        let err = resp.error.unwrap();
        assert_eq!(err.code, -1);
        assert_eq!(err.message, "boom");
    }
}
