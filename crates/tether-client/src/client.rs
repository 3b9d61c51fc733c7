//! Tether client implementation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tether_core::protocol::{
    CallToolParams, Implementation, InitializeParams, InitializeResult, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, PROTOCOL_VERSION, ReadResourceParams, ReadResourceResult,
    ResumeReport, Tool, ToolOutput, methods,
};
use tracing::{debug, info};

use crate::error::{ClientError, ClientResult};
use crate::transport::{Exchange, Transport};

/// The call surface shared by plain and resilient clients.
#[async_trait]
pub trait ToolClient: Send + Sync {
    /// Session identifier currently in use.
    fn session_id(&self) -> String;

    /// Invoke a tool. A tool that reports `isError` is returned as `Ok`.
    async fn call_tool(&self, name: &str, arguments: Value) -> ClientResult<ToolOutput>;

    /// List the server's tools.
    async fn list_tools(&self) -> ClientResult<Vec<Tool>>;

    /// Read a resource by URI.
    async fn read_resource(&self, uri: &str) -> ClientResult<ReadResourceResult>;

    /// Round-trip a ping.
    async fn ping(&self) -> ClientResult<()>;

    /// Copy the state of `previous_session_id` into the current session.
    async fn resume_session(&self, previous_session_id: &str) -> ClientResult<ResumeReport> {
        let output =
            self.call_tool("resume_session", json!({"old_session_id": previous_session_id})).await?;
        if output.is_error {
            return Err(ClientError::Rpc {
                code: 0,
                message: output.text().unwrap_or("resume_session failed").to_string(),
            });
        }
        Ok(output.parse()?)
    }
}

/// One session on one server, over any [`Transport`].
pub struct SessionClient {
    /// Transport implementation.
    transport: Arc<dyn Transport>,
    /// Session assigned by the server during `initialize`.
    session_id: String,
    /// Instance that assigned the session.
    instance: String,
    /// Request ID counter.
    request_id: AtomicU64,
}

impl SessionClient {
    /// Open a new session over `transport`.
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake fails or the server does not assign
    /// a session id.
    pub async fn connect(transport: Arc<dyn Transport>) -> ClientResult<Self> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: json!({}),
            client_info: Some(Implementation {
                name: "tether-client".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            }),
        };
        let request =
            JsonRpcRequest::new(0, methods::INITIALIZE, Some(serde_json::to_value(params)?));
        let exchange = transport.exchange(None, &serde_json::to_vec(&request)?).await?;
        let session_id = exchange.session_id.clone().ok_or_else(|| {
            ClientError::Protocol("initialize response missing session id".to_string())
        })?;
        let result: InitializeResult = serde_json::from_value(Self::interpret(exchange)?)?;

        let client = Self {
            transport,
            session_id,
            instance: result.instance,
            request_id: AtomicU64::new(1),
        };
        client.notify(methods::INITIALIZED, None).await?;
        info!(
            session_id = %client.session_id,
            instance = %client.instance,
            endpoint = %client.transport.endpoint(),
            "Session established"
        );
        Ok(client)
    }

    /// Instance that created this session.
    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Send a request and wait for its result.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be parsed.
    pub async fn request(&self, method: &str, params: Option<Value>) -> ClientResult<Value> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);
        let exchange =
            self.transport.exchange(Some(&self.session_id), &serde_json::to_vec(&request)?).await?;
        debug!(session_id = %self.session_id, method, status = exchange.status, "Request answered");
        Self::interpret(exchange)
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> ClientResult<()> {
        let request = JsonRpcRequest::notification(method, params);
        let exchange =
            self.transport.exchange(Some(&self.session_id), &serde_json::to_vec(&request)?).await?;
        match exchange.status {
            200..=299 => Ok(()),
            _ => Self::interpret(exchange).map(|_| ()),
        }
    }

    /// End the session on the server. Stored state is left to expire.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be reached.
    pub async fn close(&self) -> ClientResult<()> {
        self.transport.terminate(&self.session_id).await
    }

    /// Turn a raw reply into a result value or a classified error.
    fn interpret(exchange: Exchange) -> ClientResult<Value> {
        let response: Option<JsonRpcResponse> = if exchange.body.is_empty() {
            None
        } else {
            serde_json::from_slice(&exchange.body).ok()
        };
        let rpc_message = response
            .as_ref()
            .and_then(|r| r.error.as_ref())
            .map(|e| e.message.clone())
            .unwrap_or_default();

        match exchange.status {
            404 => return Err(ClientError::SessionLost(rpc_message)),
            503 => return Err(ClientError::Unavailable(rpc_message)),
            200..=299 => {}
            status => return Err(ClientError::Http { status, message: rpc_message }),
        }

        let response = response
            .ok_or_else(|| ClientError::Protocol("response is not a JSON-RPC message".to_string()))?;
        if let Some(error) = response.error {
            return Err(ClientError::from_rpc(error.code, error.message));
        }
        response.result.ok_or_else(|| ClientError::Protocol("response missing result".to_string()))
    }
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("endpoint", &self.transport.endpoint())
            .field("session_id", &self.session_id)
            .field("instance", &self.instance)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ToolClient for SessionClient {
    fn session_id(&self) -> String {
        self.session_id.clone()
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> ClientResult<ToolOutput> {
        let params = CallToolParams { name: name.to_string(), arguments };
        let result = self.request(methods::TOOLS_CALL, Some(serde_json::to_value(params)?)).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn list_tools(&self) -> ClientResult<Vec<Tool>> {
        let result = self.request(methods::TOOLS_LIST, None).await?;
        let list: ListToolsResult = serde_json::from_value(result)?;
        Ok(list.tools)
    }

    async fn read_resource(&self, uri: &str) -> ClientResult<ReadResourceResult> {
        let params = ReadResourceParams { uri: uri.to_string() };
        let params = serde_json::to_value(params)?;
        let result = self.request(methods::RESOURCES_READ, Some(params)).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn ping(&self) -> ClientResult<()> {
        self.request(methods::PING, None).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tether_core::protocol::{JsonRpcError, codes};

    /// Mock transport replaying canned replies.
    struct MockTransport {
        replies: Mutex<Vec<Exchange>>,
        sent: Mutex<Vec<(Option<String>, JsonRpcRequest)>>,
    }

    impl MockTransport {
        fn new(mut replies: Vec<Exchange>) -> Arc<Self> {
            replies.reverse();
            Arc::new(Self { replies: Mutex::new(replies), sent: Mutex::new(Vec::new()) })
        }

        fn sent(&self) -> Vec<(Option<String>, JsonRpcRequest)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn exchange(
            &self,
            session_id: Option<&str>,
            message: &[u8],
        ) -> ClientResult<Exchange> {
            let request: JsonRpcRequest = serde_json::from_slice(message).unwrap();
            self.sent.lock().unwrap().push((session_id.map(str::to_string), request));
            self.replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| ClientError::Transport("connection reset".to_string()))
        }

        async fn terminate(&self, _session_id: &str) -> ClientResult<()> {
            Ok(())
        }

        fn endpoint(&self) -> String {
            "mock://".to_string()
        }
    }

    fn reply(status: u16, response: Option<JsonRpcResponse>) -> Exchange {
        Exchange {
            status,
            session_id: Some("s1".to_string()),
            body: response.map(|r| serde_json::to_vec(&r).unwrap()).unwrap_or_default(),
        }
    }

    fn init_reply() -> Exchange {
        let result = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "serverInfo": {"name": "tether", "version": "0.1.0"},
            "instance": "mcp-server-1"
        });
        reply(200, Some(JsonRpcResponse::success(Some(json!(0)), result)))
    }

    #[tokio::test]
    async fn test_connect_performs_handshake() {
        let transport = MockTransport::new(vec![init_reply(), reply(202, None)]);
        let client = SessionClient::connect(transport.clone()).await.unwrap();
        assert_eq!(client.session_id(), "s1");
        assert_eq!(client.instance(), "mcp-server-1");

        let sent = transport.sent();
        assert_eq!(sent[0].0, None);
        assert_eq!(sent[0].1.method, methods::INITIALIZE);
        assert_eq!(sent[1].0.as_deref(), Some("s1"));
        assert!(sent[1].1.is_notification());
    }

    #[tokio::test]
    async fn test_connect_without_session_header_fails() {
        let mut init = init_reply();
        init.session_id = None;
        let transport = MockTransport::new(vec![init]);
        let err = SessionClient::connect(transport).await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_call_tool_decodes_output() {
        let output = ToolOutput::json(&json!({"counter": 7, "instance": "mcp-server-1"}));
        let transport = MockTransport::new(vec![
            init_reply(),
            reply(202, None),
            reply(
                200,
                Some(JsonRpcResponse::success(Some(json!(1)), serde_json::to_value(&output).unwrap())),
            ),
        ]);
        let client = SessionClient::connect(transport).await.unwrap();
        let result = client.call_tool("increment_counter", json!({})).await.unwrap();
        assert_eq!(result.parse::<Value>().unwrap()["counter"], 7);
    }

    #[tokio::test]
    async fn test_status_classification() {
        let lost = SessionClient::interpret(reply(404, None)).unwrap_err();
        assert!(matches!(lost, ClientError::SessionLost(_)));

        let unavailable = JsonRpcResponse::failure(
            Some(json!(1)),
            JsonRpcError::new(codes::STORE_UNAVAILABLE, "Store backend unreachable"),
        );
        let err = SessionClient::interpret(reply(503, Some(unavailable))).unwrap_err();
        assert!(matches!(err, ClientError::Unavailable(ref m) if m.contains("unreachable")));

        let err = SessionClient::interpret(reply(502, None)).unwrap_err();
        assert!(matches!(err, ClientError::Http { status: 502, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_rpc_error_is_not_retryable() {
        let invalid =
            JsonRpcResponse::failure(Some(json!(1)), JsonRpcError::new(codes::INVALID_PARAMS, "bad"));
        let err = SessionClient::interpret(reply(200, Some(invalid))).unwrap_err();
        assert!(matches!(err, ClientError::Rpc { code: codes::INVALID_PARAMS, .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_lost_connection_surfaces_transport_error() {
        let transport = MockTransport::new(vec![init_reply(), reply(202, None)]);
        let client = SessionClient::connect(transport).await.unwrap();
        let err = client.ping().await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }
}
