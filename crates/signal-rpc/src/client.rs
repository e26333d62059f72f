//! HTTP client for daemon JSON-RPC calls.

use std::time::Duration;

use serde_json::Value;
use signal_core::RpcId;
use signal_core::constants::JSONRPC_VERSION;
use signal_core::text::truncate_str;
use tracing::{debug, warn};

use crate::endpoint::Endpoint;
use crate::errors::{Result, RpcError};
use crate::types::{RpcRequest, RpcResponse};

/// Longest error body kept in [`RpcError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// JSON-RPC client bound to one daemon.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Clone, Debug)]
pub struct RpcClient {
    http: reqwest::Client,
    endpoint: Endpoint,
}

impl RpcClient {
    /// Build a client with its own connection pool.
    ///
    /// `connect_timeout` bounds TCP connection setup only; established
    /// requests and the event stream are not subject to a total timeout.
    pub fn new(endpoint: Endpoint, connect_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self::with_client(http, endpoint))
    }

    /// Build a client around an existing `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, endpoint: Endpoint) -> Self {
        Self { http, endpoint }
    }

    /// The daemon this client talks to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The underlying HTTP client, shared with the event stream.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Call `method` and return its `result` (`Value::Null` when absent).
    ///
    /// A blank or missing `id` is replaced with a generated one. The reply
    /// must be a success status carrying a JSON object tagged
    /// `jsonrpc: "2.0"` whose id equals the request id. A reply `error`
    /// becomes [`RpcError::Server`] with code and message verbatim.
    pub async fn call(&self, method: &str, params: Value, id: Option<&str>) -> Result<Value> {
        let id = RpcId::or_next(id, method);
        let request = RpcRequest::new(id.clone(), method, params);
        debug!(method, id = %id, "rpc call");

        let response = self
            .http
            .post(self.endpoint.rpc_url().clone())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(method, id = %id, status = status.as_u16(), "rpc call rejected");
            return Err(RpcError::Status {
                status: status.as_u16(),
                body: truncate_str(&body, MAX_ERROR_BODY).to_string(),
            });
        }

        let bytes = response.bytes().await?;
        let value: Value = serde_json::from_slice(&bytes)?;
        let reply = check_reply(&id, value)?;

        if let Some(error) = reply.error {
            debug!(method, id = %id, code = error.code, message = %error.message, "rpc server error");
            return Err(RpcError::Server {
                code: error.code,
                message: error.message,
            });
        }

        Ok(reply.result.unwrap_or(Value::Null))
    }
}

/// Validate the envelope of a reply to request `id`.
fn check_reply(id: &RpcId, value: Value) -> Result<RpcResponse> {
    if !value.is_object() {
        return Err(RpcError::protocol("response is not a JSON object"));
    }
    let reply: RpcResponse = serde_json::from_value(value)?;

    match reply.jsonrpc.as_deref() {
        Some(JSONRPC_VERSION) => {}
        Some(other) => {
            return Err(RpcError::protocol(format!(
                "unexpected jsonrpc version '{other}'"
            )));
        }
        None => return Err(RpcError::protocol("response has no jsonrpc tag")),
    }

    let actual = reply.id_str();
    if actual.as_deref() != Some(id.as_str()) {
        return Err(RpcError::IdMismatch {
            expected: id.to_string(),
            actual,
        });
    }

    Ok(reply)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    use super::*;

    /// Replies with `result`, echoing whatever id the request carried.
    struct Echo(Value);

    impl Respond for Echo {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let body: Value = serde_json::from_slice(&request.body).unwrap();
            ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": body["id"],
                "result": self.0,
            }))
        }
    }

    async fn client_for(server: &MockServer) -> RpcClient {
        let endpoint = Endpoint::parse(&server.uri()).unwrap();
        RpcClient::new(endpoint, Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn call_returns_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/rpc"))
            .and(body_partial_json(json!({"jsonrpc": "2.0", "method": "version"})))
            .respond_with(Echo(json!({"version": "0.13.4"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let result = client.call("version", json!({}), None).await.unwrap();
        assert_eq!(result["version"], "0.13.4");
    }

    #[tokio::test]
    async fn explicit_id_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"id": "my-id", "params": {"account": "+1555"}})))
            .respond_with(Echo(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let result = client
            .call("listGroups", json!({"account": "+1555"}), Some("my-id"))
            .await
            .unwrap();
        assert_eq!(result, json!([]));
    }

    #[tokio::test]
    async fn missing_result_is_null() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(Echo(Value::Null))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let result = client.call("sendReaction", json!({}), None).await.unwrap();
        assert!(result.is_null());
    }

    #[tokio::test]
    async fn mismatched_id_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": "someone-else",
                "result": {"timestamp": 1}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.call("send", json!({}), Some("mine")).await.unwrap_err();
        assert_matches!(
            err,
            RpcError::IdMismatch { expected, actual }
                if expected == "mine" && actual.as_deref() == Some("someone-else")
        );
    }

    #[tokio::test]
    async fn server_error_is_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": "g1",
                "error": {"code": -32602, "message": "Specified account does not exist"}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client
            .call("listGroups", json!({"account": "+1000"}), Some("g1"))
            .await
            .unwrap_err();
        assert_matches!(
            err,
            RpcError::Server { code: -32602, ref message } if message == "Specified account does not exist"
        );
    }

    #[tokio::test]
    async fn non_success_status_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.call("version", json!({}), None).await.unwrap_err();
        assert!(err.is_transport());
        assert_matches!(err, RpcError::Status { status: 502, ref body } if body == "bad gateway");
    }

    #[tokio::test]
    async fn missing_protocol_tag_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "v", "result": {}})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.call("version", json!({}), Some("v")).await.unwrap_err();
        assert_matches!(err, RpcError::Protocol { .. });
    }

    #[tokio::test]
    async fn malformed_body_is_json_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"jsonrpc\": \"2.0\", "))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.call("version", json!({}), None).await.unwrap_err();
        assert_matches!(err, RpcError::Json(_));
    }

    #[tokio::test]
    async fn non_object_body_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2, 3])))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.call("version", json!({}), None).await.unwrap_err();
        assert_matches!(err, RpcError::Protocol { .. });
    }

    #[tokio::test]
    async fn unreachable_daemon_is_http_error() {
        let endpoint = Endpoint::parse("http://127.0.0.1:9").unwrap();
        let client = RpcClient::new(endpoint, Duration::from_millis(500)).unwrap();
        let err = client.call("version", json!({}), None).await.unwrap_err();
        assert_matches!(err, RpcError::Http(_));
    }

    #[test]
    fn generated_ids_are_distinct() {
        let a = RpcId::or_next(None, "send");
        let b = RpcId::or_next(Some("  "), "send");
        assert_ne!(a, b);
    }
}
