//! Wire protocol shared by the tether server and client.
//!
//! Requests are JSON-RPC 2.0 envelopes carrying MCP-style methods
//! (`initialize`, `tools/list`, `tools/call`, `resources/read`, `ping`).
//! The session identifier travels in the [`SESSION_HEADER`] header, never in
//! the body.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::recovery::{ResumeOutcome, ResumeStatus};

/// JSON-RPC protocol version.
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol revision advertised during `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Header carrying the session identifier on every request after `initialize`.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Path of the JSON-RPC endpoint.
pub const MCP_PATH: &str = "/mcp";

/// Path of the liveness probe.
pub const HEALTH_PATH: &str = "/health";

/// Method names.
pub mod methods {
    /// Session creation handshake.
    pub const INITIALIZE: &str = "initialize";
    /// Client acknowledgement after `initialize`.
    pub const INITIALIZED: &str = "notifications/initialized";
    /// Keep-alive.
    pub const PING: &str = "ping";
    /// Tool catalog.
    pub const TOOLS_LIST: &str = "tools/list";
    /// Tool invocation.
    pub const TOOLS_CALL: &str = "tools/call";
    /// Resource read.
    pub const RESOURCES_READ: &str = "resources/read";
}

/// JSON-RPC error codes.
pub mod codes {
    /// Body is not valid JSON.
    pub const PARSE_ERROR: i32 = -32700;
    /// Body is JSON but not a valid request.
    pub const INVALID_REQUEST: i32 = -32600;
    /// Unknown method or tool.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Missing or malformed arguments.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Unexpected server failure.
    pub const INTERNAL_ERROR: i32 = -32603;
    /// The session store is unreachable; retry elsewhere.
    pub const STORE_UNAVAILABLE: i32 = -32001;
    /// Stored session data could not be decoded or updated.
    pub const STORE_DATA_ERROR: i32 = -32002;
    /// The session id is not registered on this instance.
    pub const SESSION_NOT_FOUND: i32 = -32003;
}

/// JSON-RPC 2.0 request message. A request without `id` is a notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (should be "2.0").
    pub jsonrpc: String,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Request ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl JsonRpcRequest {
    /// Build a request expecting a response.
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self { jsonrpc: JSONRPC_VERSION.to_string(), method: method.into(), params, id: Some(id.into()) }
    }

    /// Build a notification.
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self { jsonrpc: JSONRPC_VERSION.to_string(), method: method.into(), params, id: None }
    }

    /// Whether this message expects no response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC 2.0 response message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (should be "2.0").
    pub jsonrpc: String,
    /// Result (on success).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error (on failure).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    /// Request ID (matches the request).
    pub id: Option<Value>,
}

impl JsonRpcResponse {
    /// Successful response.
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self { jsonrpc: JSONRPC_VERSION.to_string(), result: Some(result), error: None, id }
    }

    /// Error response.
    pub fn failure(id: Option<Value>, error: JsonRpcError) -> Self {
        Self { jsonrpc: JSONRPC_VERSION.to_string(), result: None, error: Some(error), id }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i32,
    /// Error message.
    pub message: String,
    /// Optional error data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Error without data.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }
}

/// Name and version of a protocol peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Implementation {
    /// Peer name.
    pub name: String,
    /// Peer version.
    pub version: String,
}

/// `initialize` request parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol revision the client speaks.
    pub protocol_version: String,
    /// Client capabilities (opaque to this server).
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_info: Option<Implementation>,
}

/// `initialize` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Protocol revision the server speaks.
    pub protocol_version: String,
    /// Server capabilities.
    pub capabilities: Value,
    /// Server information.
    pub server_info: Implementation,
    /// Instance that created the session.
    pub instance: String,
}

/// Tool definition advertised by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Tool name.
    pub name: String,
    /// Tool description.
    pub description: String,
    /// JSON schema of the tool arguments.
    pub input_schema: Value,
}

/// `tools/list` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    /// Available tools.
    pub tools: Vec<Tool>,
}

/// `tools/call` parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    /// Tool name.
    pub name: String,
    /// Tool arguments.
    #[serde(default)]
    pub arguments: Value,
}

/// Content item of a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    /// Text content.
    Text {
        /// Text content.
        text: String,
    },
}

/// `tools/call` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutput {
    /// Result content.
    pub content: Vec<Content>,
    /// Whether the tool reported a failure.
    #[serde(default)]
    pub is_error: bool,
}

impl ToolOutput {
    /// Successful result carrying `value` as JSON text.
    pub fn json(value: &Value) -> Self {
        Self { content: vec![Content::Text { text: value.to_string() }], is_error: false }
    }

    /// Failed result carrying a message.
    pub fn error(message: impl Into<String>) -> Self {
        Self { content: vec![Content::Text { text: message.into() }], is_error: true }
    }

    /// Text of the first content item.
    pub fn text(&self) -> Option<&str> {
        self.content.iter().find_map(|c| match c {
            Content::Text { text } => Some(text.as_str()),
        })
    }

    /// Decode the first text item as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no text item or it does not decode as `T`.
    pub fn parse<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(self.text().unwrap_or_default())
    }
}

/// `resources/read` parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceParams {
    /// Resource URI.
    pub uri: String,
}

/// One item of a resource read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    /// Resource URI.
    pub uri: String,
    /// MIME type of `text`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Resource body.
    pub text: String,
}

/// `resources/read` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceResult {
    /// Resource contents.
    pub contents: Vec<ResourceContents>,
}

/// Result of the `resume_session` tool as seen by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeReport {
    /// Resolution of the request.
    pub status: ResumeStatus,
    /// Number of fields copied into the current session.
    #[serde(default)]
    pub keys_migrated: usize,
    /// Instance that performed the resume.
    pub instance: String,
}

impl ResumeReport {
    /// Attach the answering instance to an outcome.
    pub fn new(outcome: ResumeOutcome, instance: impl Into<String>) -> Self {
        Self { status: outcome.status, keys_migrated: outcome.keys_migrated, instance: instance.into() }
    }

    /// The outcome without the instance tag.
    pub fn outcome(&self) -> ResumeOutcome {
        ResumeOutcome { status: self.status, keys_migrated: self.keys_migrated }
    }
}

/// URI of a session's summary resource.
pub fn summary_uri(session_id: &str) -> String {
    format!("resource://session/{}/summary", session_id)
}

/// Extract the session id from a summary resource URI.
pub fn parse_summary_uri(uri: &str) -> Option<&str> {
    uri.strip_prefix("resource://session/")?
        .strip_suffix("/summary")
        .filter(|id| !id.is_empty() && !id.contains('/'))
}
