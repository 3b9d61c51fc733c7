//! Tool handlers built on the session store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info};

use super::health::HealthReport;
use super::instance::InstanceInfo;
use crate::protocol::{
    ReadResourceResult, ResourceContents, ResumeReport, Tool, codes, parse_summary_uri,
};
use crate::session::SessionHandle;
use crate::store::{KeyedTtlStore, StoreError};

/// Largest `num_items` accepted by `analyze_data`.
pub const MAX_ANALYZE_ITEMS: u32 = 10_000;

const COUNTER: &str = "counter";
const NOTES: &str = "notes";
const ANALYSIS_RESULT: &str = "analysis_result";

/// Errors returned by tool handlers.
#[derive(Error, Debug)]
pub enum ToolError {
    /// Arguments were missing or malformed.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// No tool with this name.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// No resource at this URI.
    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    /// The resource belongs to another session.
    #[error("Resource belongs to another session: {0}")]
    ForeignResource(String),

    /// The session store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ToolError {
    /// JSON-RPC error code reported for this error.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidArguments(_) | Self::UnknownResource(_) | Self::ForeignResource(_) => {
                codes::INVALID_PARAMS
            }
            Self::UnknownTool(_) => codes::METHOD_NOT_FOUND,
            Self::Store(StoreError::Unreachable(_)) => codes::STORE_UNAVAILABLE,
            Self::Store(StoreError::Serialization { .. } | StoreError::NotAnInteger { .. }) => {
                codes::STORE_DATA_ERROR
            }
            Self::Store(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Whether the store behind this instance is unavailable.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_unreachable())
    }
}

#[derive(Deserialize)]
struct AddNoteArgs {
    note: String,
}

#[derive(Deserialize)]
struct AnalyzeArgs {
    num_items: u32,
}

#[derive(Deserialize)]
struct ResumeArgs {
    old_session_id: String,
}

fn parse_args<T: DeserializeOwned>(tool: &str, arguments: &Value) -> Result<T, ToolError> {
    let arguments = if arguments.is_null() { json!({}) } else { arguments.clone() };
    serde_json::from_value(arguments)
        .map_err(|e| ToolError::InvalidArguments(format!("{}: {}", tool, e)))
}

/// Session-scoped tools served by one instance.
#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn KeyedTtlStore>,
    instance: Arc<InstanceInfo>,
    ttl: Duration,
}

impl SessionService {
    /// Create the service over `store` for `instance`.
    pub fn new(store: Arc<dyn KeyedTtlStore>, instance: Arc<InstanceInfo>, ttl: Duration) -> Self {
        Self { store, instance, ttl }
    }

    /// The answering instance.
    pub fn instance(&self) -> &InstanceInfo {
        &self.instance
    }

    /// Idle lifetime of a session.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// A handle on one session's namespace.
    pub fn session(&self, session_id: &str) -> SessionHandle {
        SessionHandle::new(self.store.clone(), session_id, self.ttl)
    }

    /// Probe the store for the health endpoint.
    pub async fn health(&self) -> HealthReport {
        HealthReport::probe(self.store.as_ref(), self.instance.id()).await
    }

    /// Tool catalog.
    pub fn tools(&self) -> Vec<Tool> {
        let no_args = || json!({"type": "object", "properties": {}});
        vec![
            Tool {
                name: "increment_counter".to_string(),
                description: "Increment the session-scoped counter and return its value.".to_string(),
                input_schema: no_args(),
            },
            Tool {
                name: "get_counter".to_string(),
                description: "Get the current session counter value.".to_string(),
                input_schema: no_args(),
            },
            Tool {
                name: "add_note".to_string(),
                description: "Append a note to the session's note list.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {"note": {"type": "string"}},
                    "required": ["note"]
                }),
            },
            Tool {
                name: "list_notes".to_string(),
                description: "List all notes stored in this session.".to_string(),
                input_schema: no_args(),
            },
            Tool {
                name: "analyze_data".to_string(),
                description: "Run a multi-step analysis over the session's data.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "num_items": {"type": "integer", "minimum": 0, "maximum": MAX_ANALYZE_ITEMS}
                    },
                    "required": ["num_items"]
                }),
            },
            Tool {
                name: "resume_session".to_string(),
                description: "Copy state from a previous session into this one after failover."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {"old_session_id": {"type": "string"}},
                    "required": ["old_session_id"]
                }),
            },
            Tool {
                name: "get_server_info".to_string(),
                description: "Report which instance answered and how many sessions it sees."
                    .to_string(),
                input_schema: no_args(),
            },
            Tool {
                name: "get_status".to_string(),
                description: "Report uptime, active session count and the current time.".to_string(),
                input_schema: no_args(),
            },
        ]
    }

    /// Run tool `name` in session `session_id`.
    ///
    /// # Errors
    ///
    /// Returns `ToolError` for unknown tools, bad arguments or store failures.
    pub async fn call_tool(
        &self,
        session_id: &str,
        name: &str,
        arguments: &Value,
    ) -> Result<Value, ToolError> {
        debug!(session_id = %session_id, tool = name, "Calling tool");
        let session = self.session(session_id);
        let instance = self.instance.id();

        match name {
            "increment_counter" => {
                let counter = session.increment(COUNTER, 1).await?;
                Ok(json!({"counter": counter, "instance": instance}))
            }
            "get_counter" => {
                let counter: i64 = session.get_or_default(COUNTER).await?;
                Ok(json!({"counter": counter, "instance": instance}))
            }
            "add_note" => {
                let args: AddNoteArgs = parse_args(name, arguments)?;
                let notes_count = session.append_to_list(NOTES, args.note).await?;
                Ok(json!({"notes_count": notes_count, "instance": instance}))
            }
            "list_notes" => {
                let notes: Vec<String> = session.get_or_default(NOTES).await?;
                Ok(json!({"notes": notes, "instance": instance}))
            }
            "analyze_data" => {
                let args: AnalyzeArgs = parse_args(name, arguments)?;
                self.analyze_data(&session, args.num_items).await
            }
            "resume_session" => {
                let args: ResumeArgs = parse_args(name, arguments)?;
                if args.old_session_id.is_empty() {
                    return Err(ToolError::InvalidArguments(
                        "resume_session: old_session_id must not be empty".to_string(),
                    ));
                }
                let outcome = session.copy_from(&args.old_session_id).await?;
                let report = ResumeReport::new(outcome, instance);
                serde_json::to_value(report)
                    .map_err(|e| ToolError::from(StoreError::serialization(name, e)))
            }
            "get_server_info" => {
                let sessions = self.store.list_namespaces().await?.len();
                Ok(json!({"instance": instance, "sessions": sessions}))
            }
            "get_status" => {
                let active_sessions = self.store.list_namespaces().await?.len();
                Ok(json!({
                    "instance": instance,
                    "uptime_seconds": self.instance.uptime_seconds(),
                    "active_sessions": active_sessions,
                    "timestamp": Utc::now().to_rfc3339(),
                }))
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    async fn analyze_data(&self, session: &SessionHandle, num_items: u32) -> Result<Value, ToolError> {
        if num_items > MAX_ANALYZE_ITEMS {
            return Err(ToolError::InvalidArguments(format!(
                "analyze_data: num_items must be at most {}",
                MAX_ANALYZE_ITEMS
            )));
        }

        let total_score: f64 = (1..=num_items).map(|i| f64::from(i) * 1.5).sum();
        session
            .set(ANALYSIS_RESULT, &json!({"total_score": total_score, "items_processed": num_items}))
            .await?;
        info!(
            session_id = %session.session_id(),
            items_processed = num_items,
            total_score,
            "Analysis complete"
        );

        Ok(json!({
            "items_processed": num_items,
            "total_score": total_score,
            "instance": self.instance.id(),
        }))
    }

    /// Read a resource by URI.
    ///
    /// Serves `resource://session/{id}/summary`, a pretty JSON summary of
    /// every known field of that session. Only the session itself may read it.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::UnknownResource` for any other URI,
    /// `ToolError::ForeignResource` when `{id}` is not `caller`, or the
    /// store's error.
    pub async fn read_resource(&self, caller: &str, uri: &str) -> Result<ReadResourceResult, ToolError> {
        let session_id =
            parse_summary_uri(uri).ok_or_else(|| ToolError::UnknownResource(uri.to_string()))?;
        if session_id != caller {
            debug!(session_id = %caller, target = %session_id, "Refusing summary of another session");
            return Err(ToolError::ForeignResource(uri.to_string()));
        }
        let session = self.session(session_id);

        let counter: i64 = session.get_or_default(COUNTER).await?;
        let notes: Vec<String> = session.get_or_default(NOTES).await?;
        let analysis: Option<Value> = session.get(ANALYSIS_RESULT).await?;
        let summary = json!({
            "session_id": session_id,
            "counter": counter,
            "notes": notes,
            "analysis_result": analysis,
            "instance": self.instance.id(),
        });
        let text = serde_json::to_string_pretty(&summary)
            .map_err(|e| StoreError::serialization("summary", e))?;

        Ok(ReadResourceResult {
            contents: vec![ResourceContents {
                uri: uri.to_string(),
                mime_type: Some("application/json".to_string()),
                text,
            }],
        })
    }
}

impl std::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService")
            .field("instance", &self.instance.id())
            .field("backend", &self.store.backend())
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn service() -> (Arc<MemoryStore>, SessionService) {
        let store = Arc::new(MemoryStore::new());
        let service = SessionService::new(
            store.clone(),
            Arc::new(InstanceInfo::new("mcp-server-1")),
            Duration::from_secs(1800),
        );
        (store, service)
    }

    #[tokio::test]
    async fn test_counter_tools() {
        let (_, service) = service();
        let none = Value::Null;

        let value = service.call_tool("s1", "get_counter", &none).await.unwrap();
        assert_eq!(value, json!({"counter": 0, "instance": "mcp-server-1"}));

        service.call_tool("s1", "increment_counter", &none).await.unwrap();
        let value = service.call_tool("s1", "increment_counter", &none).await.unwrap();
        assert_eq!(value["counter"], 2);

        let other = service.call_tool("s2", "get_counter", &none).await.unwrap();
        assert_eq!(other["counter"], 0);
    }

    #[tokio::test]
    async fn test_note_tools() {
        let (_, service) = service();
        let value = service.call_tool("s1", "add_note", &json!({"note": "first"})).await.unwrap();
        assert_eq!(value["notes_count"], 1);
        service.call_tool("s1", "add_note", &json!({"note": "second"})).await.unwrap();

        let value = service.call_tool("s1", "list_notes", &Value::Null).await.unwrap();
        assert_eq!(value["notes"], json!(["first", "second"]));
    }

    #[tokio::test]
    async fn test_add_note_requires_note() {
        let (_, service) = service();
        let err = service.call_tool("s1", "add_note", &json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert_eq!(err.code(), codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_analyze_data_scores_and_stores_result() {
        let (store, service) = service();
        let value = service.call_tool("s1", "analyze_data", &json!({"num_items": 4})).await.unwrap();
        assert_eq!(value["items_processed"], 4);
        assert_eq!(value["total_score"], 15.0);

        let stored = store.get("s1", "analysis_result").await.unwrap().unwrap();
        let stored: Value = serde_json::from_str(&stored).unwrap();
        assert_eq!(stored, json!({"total_score": 15.0, "items_processed": 4}));
    }

    #[tokio::test]
    async fn test_analyze_data_rejects_negative_and_huge() {
        let (_, service) = service();
        let err = service.call_tool("s1", "analyze_data", &json!({"num_items": -1})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));

        let args = json!({"num_items": MAX_ANALYZE_ITEMS + 1});
        let err = service.call_tool("s1", "analyze_data", &args).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_resume_session_tool() {
        let (_, service) = service();
        let none = Value::Null;
        for _ in 0..3 {
            service.call_tool("old", "increment_counter", &none).await.unwrap();
        }
        service.call_tool("old", "add_note", &json!({"note": "kept"})).await.unwrap();

        let args = json!({"old_session_id": "old"});
        let value = service.call_tool("new", "resume_session", &args).await.unwrap();
        assert_eq!(value, json!({"status": "resumed", "keys_migrated": 2, "instance": "mcp-server-1"}));

        let value = service.call_tool("new", "increment_counter", &none).await.unwrap();
        assert_eq!(value["counter"], 4);

        let args = json!({"old_session_id": "new"});
        let value = service.call_tool("new", "resume_session", &args).await.unwrap();
        assert_eq!(value["status"], "same_session");
        assert_eq!(value["keys_migrated"], 0);
    }

    #[tokio::test]
    async fn test_server_info_and_status_count_sessions() {
        let (_, service) = service();
        service.call_tool("a", "increment_counter", &Value::Null).await.unwrap();
        service.call_tool("b", "increment_counter", &Value::Null).await.unwrap();

        let info = service.call_tool("a", "get_server_info", &Value::Null).await.unwrap();
        assert_eq!(info, json!({"instance": "mcp-server-1", "sessions": 2}));

        let status = service.call_tool("a", "get_status", &Value::Null).await.unwrap();
        assert_eq!(status["active_sessions"], 2);
        assert!(status["uptime_seconds"].is_number());
        let timestamp = status["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let (_, service) = service();
        let err = service.call_tool("s1", "watch_everything", &Value::Null).await.unwrap_err();
        assert_eq!(err.code(), codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_corrupt_counter_reports_data_error() {
        let (store, service) = service();
        store.set("s1", "counter", r#""five""#, Duration::from_secs(60)).await.unwrap();

        let err = service.call_tool("s1", "increment_counter", &Value::Null).await.unwrap_err();
        assert_eq!(err.code(), codes::STORE_DATA_ERROR);
        let err = service.call_tool("s1", "get_counter", &Value::Null).await.unwrap_err();
        assert_eq!(err.code(), codes::STORE_DATA_ERROR);
    }

    #[tokio::test]
    async fn test_summary_resource() {
        let (_, service) = service();
        service.call_tool("abc123", "increment_counter", &Value::Null).await.unwrap();
        service.call_tool("abc123", "add_note", &json!({"note": "n"})).await.unwrap();

        let result = service.read_resource("abc123", "resource://session/abc123/summary").await.unwrap();
        let summary: Value = serde_json::from_str(&result.contents[0].text).unwrap();
        assert_eq!(summary["session_id"], "abc123");
        assert_eq!(summary["counter"], 1);
        assert_eq!(summary["notes"], json!(["n"]));
        assert!(summary["analysis_result"].is_null());
        assert!(result.contents[0].text.contains('\n'));
    }

    #[tokio::test]
    async fn test_unknown_resource() {
        let (_, service) = service();
        let err = service.read_resource("s1", "resource://nothing").await.unwrap_err();
        assert!(matches!(err, ToolError::UnknownResource(_)));
    }

    #[tokio::test]
    async fn test_summary_of_another_session_is_refused() {
        let (_, service) = service();
        service.call_tool("owner", "add_note", &json!({"note": "private"})).await.unwrap();

        let err = service.read_resource("intruder", "resource://session/owner/summary").await.unwrap_err();
        assert!(matches!(err, ToolError::ForeignResource(_)));
        assert_eq!(err.code(), codes::INVALID_PARAMS);
        assert!(!err.to_string().contains("private"));
    }

    #[test]
    fn test_unreachable_maps_to_store_unavailable() {
        let err = ToolError::from(StoreError::Unreachable("down".to_string()));
        assert!(err.is_unavailable());
        assert_eq!(err.code(), codes::STORE_UNAVAILABLE);
        let err = ToolError::from(StoreError::Command("ERR".to_string()));
        assert!(!err.is_unavailable());
        assert_eq!(err.code(), codes::INTERNAL_ERROR);
    }

    #[test]
    fn test_catalog_names() {
        let (_, service) = service();
        let names: Vec<String> = service.tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names.len(), 8);
        assert!(names.contains(&"resume_session".to_string()));
    }
}
