//! Transport-agnostic request handling.
//!
//! The [`Dispatcher`] owns the instance's session registry. Sessions are
//! registered by `initialize` and live only as long as this instance does;
//! their state lives in the shared store and outlives them. A registration
//! idle for longer than the session TTL is forgotten, like its state.

use std::collections::HashMap;

use http::StatusCode;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::protocol::{
    CallToolParams, Implementation, InitializeParams, InitializeResult, JSONRPC_VERSION,
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, ListToolsResult, PROTOCOL_VERSION,
    ReadResourceParams, ToolOutput, codes, methods,
};
use crate::service::{HealthReport, SessionService, ToolError};
use crate::store::StoreError;

/// What to send back for one request.
#[derive(Debug, Clone)]
pub struct DispatchReply {
    /// Transport status.
    pub status: StatusCode,
    /// Session the reply belongs to, echoed in the session header.
    pub session_id: Option<String>,
    /// JSON-RPC response, absent for notifications and terminations.
    pub body: Option<JsonRpcResponse>,
}

impl DispatchReply {
    fn response(status: StatusCode, session_id: Option<&str>, body: JsonRpcResponse) -> Self {
        Self { status, session_id: session_id.map(str::to_string), body: Some(body) }
    }

    fn error(status: StatusCode, session_id: Option<&str>, id: Option<Value>, error: JsonRpcError) -> Self {
        Self::response(status, session_id, JsonRpcResponse::failure(id, error))
    }

    fn empty(status: StatusCode, session_id: Option<&str>) -> Self {
        Self { status, session_id: session_id.map(str::to_string), body: None }
    }

    /// Serialized body, empty when there is none.
    pub fn body_bytes(&self) -> Vec<u8> {
        self.body.as_ref().and_then(|body| serde_json::to_vec(body).ok()).unwrap_or_default()
    }
}

/// Handles decoded requests for one instance.
#[derive(Debug)]
pub struct Dispatcher {
    service: SessionService,
    /// Session id to the time of its last request.
    sessions: RwLock<HashMap<String, Instant>>,
}

impl Dispatcher {
    /// Create a dispatcher with an empty session registry.
    pub fn new(service: SessionService) -> Self {
        Self { service, sessions: RwLock::new(HashMap::new()) }
    }

    /// The tool service behind this dispatcher.
    pub fn service(&self) -> &SessionService {
        &self.service
    }

    /// Identifier of this instance.
    pub fn instance_id(&self) -> &str {
        self.service.instance().id()
    }

    /// Number of live sessions registered on this instance.
    pub async fn session_count(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        self.evict_idle(&mut sessions);
        sessions.len()
    }

    fn is_idle(&self, last_seen: Instant, now: Instant) -> bool {
        now.saturating_duration_since(last_seen) > self.service.ttl()
    }

    fn evict_idle(&self, sessions: &mut HashMap<String, Instant>) {
        let now = Instant::now();
        let before = sessions.len();
        sessions.retain(|_, last_seen| !self.is_idle(*last_seen, now));
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, instance = self.instance_id(), "Evicted idle sessions");
        }
    }

    /// Refresh a registration, dropping it instead when it has gone idle.
    async fn touch(&self, session_id: &str) -> bool {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let Some(last_seen) = sessions.get(session_id).copied() else {
            return false;
        };
        if self.is_idle(last_seen, now) {
            sessions.remove(session_id);
            debug!(session_id = %session_id, instance = self.instance_id(), "Session expired");
            return false;
        }
        sessions.insert(session_id.to_string(), now);
        true
    }

    /// Store probe for the health endpoint.
    pub async fn health(&self) -> HealthReport {
        self.service.health().await
    }

    /// Handle one JSON-RPC message.
    pub async fn handle(&self, session_id: Option<&str>, body: &[u8]) -> DispatchReply {
        let request: JsonRpcRequest = match serde_json::from_slice(body) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "Rejecting unparseable request");
                let error = JsonRpcError {
                    code: codes::PARSE_ERROR,
                    message: "Parse error".to_string(),
                    data: Some(json!({"error": e.to_string()})),
                };
                return DispatchReply::error(StatusCode::BAD_REQUEST, session_id, None, error);
            }
        };
        if request.jsonrpc != JSONRPC_VERSION {
            let error = JsonRpcError::new(codes::INVALID_REQUEST, "Unsupported JSON-RPC version");
            return DispatchReply::error(StatusCode::BAD_REQUEST, session_id, request.id, error);
        }

        if request.method == methods::INITIALIZE {
            return self.initialize(&request).await;
        }

        let Some(session_id) = session_id else {
            let error = JsonRpcError::new(codes::INVALID_REQUEST, "Missing mcp-session-id header");
            return DispatchReply::error(StatusCode::BAD_REQUEST, None, request.id, error);
        };
        if !self.touch(session_id).await {
            debug!(session_id = %session_id, instance = self.instance_id(), "Unknown session");
            let error = JsonRpcError::new(codes::SESSION_NOT_FOUND, "Session not found");
            return DispatchReply::error(StatusCode::NOT_FOUND, Some(session_id), request.id, error);
        }

        if request.is_notification() {
            debug!(session_id = %session_id, method = %request.method, "Notification received");
            return DispatchReply::empty(StatusCode::ACCEPTED, Some(session_id));
        }

        let result = match request.method.as_str() {
            methods::PING => Ok(json!({})),
            methods::TOOLS_LIST => encode(&ListToolsResult { tools: self.service.tools() }),
            methods::TOOLS_CALL => self.call_tool(session_id, request.params.as_ref()).await,
            methods::RESOURCES_READ => self.read_resource(session_id, request.params.as_ref()).await,
            other => {
                let error = JsonRpcError::new(codes::METHOD_NOT_FOUND, format!("Method not found: {}", other));
                return DispatchReply::error(StatusCode::OK, Some(session_id), request.id, error);
            }
        };

        match result {
            Ok(value) => DispatchReply::response(
                StatusCode::OK,
                Some(session_id),
                JsonRpcResponse::success(request.id, value),
            ),
            Err(err) => {
                let status = if err.is_unavailable() {
                    warn!(session_id = %session_id, error = %err, "Store unavailable");
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    debug!(session_id = %session_id, error = %err, "Request failed");
                    StatusCode::OK
                };
                let error = JsonRpcError::new(err.code(), err.to_string());
                DispatchReply::error(status, Some(session_id), request.id, error)
            }
        }
    }

    /// Unregister a session. Its stored state is left to expire.
    pub async fn terminate(&self, session_id: Option<&str>) -> DispatchReply {
        let Some(session_id) = session_id else {
            return DispatchReply::empty(StatusCode::BAD_REQUEST, None);
        };
        if self.sessions.write().await.remove(session_id).is_some() {
            info!(session_id = %session_id, instance = self.instance_id(), "Session terminated");
            DispatchReply::empty(StatusCode::OK, Some(session_id))
        } else {
            DispatchReply::empty(StatusCode::NOT_FOUND, Some(session_id))
        }
    }

    async fn initialize(&self, request: &JsonRpcRequest) -> DispatchReply {
        if let Some(params) = &request.params {
            match serde_json::from_value::<InitializeParams>(params.clone()) {
                Ok(params) => debug!(
                    protocol_version = %params.protocol_version,
                    client = params.client_info.as_ref().map_or("unknown", |c| c.name.as_str()),
                    "Initialize requested"
                ),
                Err(e) => debug!(error = %e, "Ignoring malformed initialize params"),
            }
        }

        let session_id = Uuid::new_v4().simple().to_string();
        {
            let mut sessions = self.sessions.write().await;
            self.evict_idle(&mut sessions);
            sessions.insert(session_id.clone(), Instant::now());
        }
        info!(session_id = %session_id, instance = self.instance_id(), "Session initialized");

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: json!({"tools": {}, "resources": {}}),
            server_info: Implementation {
                name: "tether".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instance: self.instance_id().to_string(),
        };
        match encode(&result) {
            Ok(value) => DispatchReply::response(
                StatusCode::OK,
                Some(&session_id),
                JsonRpcResponse::success(request.id.clone(), value),
            ),
            Err(err) => {
                let error = JsonRpcError::new(err.code(), err.to_string());
                DispatchReply::error(StatusCode::INTERNAL_SERVER_ERROR, None, request.id.clone(), error)
            }
        }
    }

    async fn call_tool(&self, session_id: &str, params: Option<&Value>) -> Result<Value, ToolError> {
        let params: CallToolParams = params
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?
            .ok_or_else(|| ToolError::InvalidArguments("tools/call requires params".to_string()))?;

        let value = self.service.call_tool(session_id, &params.name, &params.arguments).await?;
        encode(&ToolOutput::json(&value))
    }

    async fn read_resource(&self, session_id: &str, params: Option<&Value>) -> Result<Value, ToolError> {
        let params: ReadResourceParams = params
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?
            .ok_or_else(|| ToolError::InvalidArguments("resources/read requires params".to_string()))?;

        encode(&self.service.read_resource(session_id, &params.uri).await?)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::from(StoreError::serialization("response", e)))
}
