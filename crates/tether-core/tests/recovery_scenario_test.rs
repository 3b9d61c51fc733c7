//! End-to-end session recovery through the dispatcher.
//!
//! Two dispatchers over one shared store stand in for two service instances
//! behind a load balancer.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tether_core::protocol::{JsonRpcRequest, ToolOutput, methods};
use tether_core::server::Dispatcher;
use tether_core::service::{InstanceInfo, SessionService};
use tether_core::store::{KeyedTtlStore, MemoryStore};

fn instance(store: &Arc<MemoryStore>, id: &str) -> Dispatcher {
    let store: Arc<dyn KeyedTtlStore> = store.clone();
    Dispatcher::new(SessionService::new(store, Arc::new(InstanceInfo::new(id)), Duration::from_secs(1800)))
}

async fn initialize(dispatcher: &Dispatcher) -> String {
    let body = serde_json::to_vec(&JsonRpcRequest::new(0, methods::INITIALIZE, None)).unwrap();
    dispatcher.handle(None, &body).await.session_id.unwrap()
}

async fn call(dispatcher: &Dispatcher, session_id: &str, tool: &str, arguments: Value) -> Value {
    let request = JsonRpcRequest::new(
        1,
        methods::TOOLS_CALL,
        Some(json!({"name": tool, "arguments": arguments})),
    );
    let reply = dispatcher.handle(Some(session_id), &serde_json::to_vec(&request).unwrap()).await;
    let result = reply.body.unwrap().result.unwrap();
    serde_json::from_value::<ToolOutput>(result).unwrap().parse().unwrap()
}

#[tokio::test]
async fn test_counter_continues_on_new_instance() {
    let store = Arc::new(MemoryStore::new());
    let server_1 = instance(&store, "mcp-server-1");
    let server_2 = instance(&store, "mcp-server-2");

    let old = initialize(&server_1).await;
    for _ in 0..3 {
        call(&server_1, &old, "increment_counter", json!({})).await;
    }
    call(&server_1, &old, "add_note", json!({"note": "before failover"})).await;

    // The old session id means nothing to the second instance.
    let ping = serde_json::to_vec(&JsonRpcRequest::new(2, methods::PING, None)).unwrap();
    assert_eq!(server_2.handle(Some(&old), &ping).await.status, http::StatusCode::NOT_FOUND);

    let new = initialize(&server_2).await;
    let resumed = call(&server_2, &new, "resume_session", json!({"old_session_id": old})).await;
    assert_eq!(resumed["status"], "resumed");
    assert_eq!(resumed["keys_migrated"], 2);
    assert_eq!(resumed["instance"], "mcp-server-2");

    let counter = call(&server_2, &new, "increment_counter", json!({})).await;
    assert_eq!(counter, json!({"counter": 4, "instance": "mcp-server-2"}));
    let notes = call(&server_2, &new, "list_notes", json!({})).await;
    assert_eq!(notes["notes"], json!(["before failover"]));

    // Copy semantics: the old namespace is untouched.
    let old_counter = SessionService::new(
        store.clone(),
        Arc::new(InstanceInfo::new("probe")),
        Duration::from_secs(1800),
    )
    .session(&old)
    .get::<i64>("counter")
    .await
    .unwrap();
    assert_eq!(old_counter, Some(3));
}

#[tokio::test]
async fn test_resume_of_expired_session_starts_empty() {
    let store = Arc::new(MemoryStore::new());
    let server = instance(&store, "mcp-server-1");
    let new = initialize(&server).await;

    let resumed = call(&server, &new, "resume_session", json!({"old_session_id": "gone"})).await;
    assert_eq!(resumed["status"], "resumed");
    assert_eq!(resumed["keys_migrated"], 0);
    let counter = call(&server, &new, "get_counter", json!({})).await;
    assert_eq!(counter["counter"], 0);
}

#[tokio::test]
async fn test_summary_resource_after_resume() {
    let store = Arc::new(MemoryStore::new());
    let server = instance(&store, "mcp-server-1");
    let old = initialize(&server).await;
    call(&server, &old, "analyze_data", json!({"num_items": 3})).await;

    let new = initialize(&server).await;
    call(&server, &new, "resume_session", json!({"old_session_id": old})).await;

    let request = JsonRpcRequest::new(
        3,
        methods::RESOURCES_READ,
        Some(json!({"uri": format!("resource://session/{}/summary", new)})),
    );
    let reply = server.handle(Some(&new), &serde_json::to_vec(&request).unwrap()).await;
    let result = reply.body.unwrap().result.unwrap();
    let summary: Value = serde_json::from_str(result["contents"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(summary["analysis_result"], json!({"total_score": 9.0, "items_processed": 3}));
}
