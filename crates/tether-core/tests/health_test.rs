//! Health probe and store-outage behavior.

mod common;

use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use serde_json::json;
use tether_core::protocol::{JsonRpcRequest, codes, methods};
use tether_core::server::Dispatcher;
use tether_core::service::{HealthStatus, InstanceInfo, SessionService};

use common::SwitchableStore;

fn dispatcher(store: &Arc<SwitchableStore>) -> Dispatcher {
    Dispatcher::new(SessionService::new(
        store.clone(),
        Arc::new(InstanceInfo::new("mcp-server-1")),
        Duration::from_secs(1800),
    ))
}

#[tokio::test]
async fn test_health_degrades_when_store_is_down() {
    let store = SwitchableStore::new();
    let dispatcher = dispatcher(&store);

    let report = dispatcher.health().await;
    assert_eq!(report.status, HealthStatus::Ok);
    assert_eq!(report.store, "switchable");

    store.set_down(true);
    let report = dispatcher.health().await;
    assert_eq!(report.status, HealthStatus::Degraded);
    assert_eq!(
        serde_json::to_value(&report).unwrap(),
        json!({"status": "degraded", "instance": "mcp-server-1", "store": "unreachable"})
    );

    store.set_down(false);
    assert!(dispatcher.health().await.is_healthy());
}

#[tokio::test]
async fn test_tool_call_during_outage_is_503() {
    let store = SwitchableStore::new();
    let dispatcher = dispatcher(&store);
    let init = serde_json::to_vec(&JsonRpcRequest::new(0, methods::INITIALIZE, None)).unwrap();
    let session_id = dispatcher.handle(None, &init).await.session_id.unwrap();

    store.set_down(true);
    let request = JsonRpcRequest::new(
        1,
        methods::TOOLS_CALL,
        Some(json!({"name": "increment_counter", "arguments": {}})),
    );
    let reply = dispatcher.handle(Some(&session_id), &serde_json::to_vec(&request).unwrap()).await;
    assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(reply.body.unwrap().error.unwrap().code, codes::STORE_UNAVAILABLE);
}
