//! Client against a real server over HTTP.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tether_client::{
    BackoffPolicy, ClientError, HttpConnector, HttpTransport, ResilientClient, SessionClient,
    ToolClient,
};
use tether_core::protocol::summary_uri;
use tether_core::server::{Dispatcher, Server};
use tether_core::service::{HealthStatus, InstanceInfo, SessionService};
use tether_core::store::MemoryStore;
use tokio::sync::oneshot;

struct Running {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for Running {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn start(instance: &str) -> Running {
    let service = SessionService::new(
        Arc::new(MemoryStore::new()),
        Arc::new(InstanceInfo::new(instance)),
        Duration::from_secs(1800),
    );
    let dispatcher = Arc::new(Dispatcher::new(service));
    let server = Server::with_dispatcher("127.0.0.1:0".parse().unwrap(), dispatcher).await.unwrap();
    let addr = server.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(server.serve(async {
        let _ = rx.await;
    }));
    Running { url: format!("http://{}", addr), shutdown: Some(tx) }
}

fn transport(url: &str) -> Arc<HttpTransport> {
    Arc::new(HttpTransport::new(url, Duration::from_secs(5)).unwrap())
}

#[tokio::test]
async fn test_session_over_http() {
    let server = start("mcp-server-1").await;
    let client = SessionClient::connect(transport(&server.url)).await.unwrap();
    assert_eq!(client.instance(), "mcp-server-1");
    assert_eq!(client.session_id().len(), 32);

    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.len(), 8);
    assert!(tools.iter().any(|t| t.name == "resume_session"));

    let output = client.call_tool("increment_counter", json!({})).await.unwrap();
    assert_eq!(output.parse::<Value>().unwrap()["counter"], 1);
    client.ping().await.unwrap();

    let summary = client.read_resource(&summary_uri(&client.session_id())).await.unwrap();
    assert_eq!(summary.contents[0].mime_type.as_deref(), Some("application/json"));
    let summary: Value = serde_json::from_str(&summary.contents[0].text).unwrap();
    assert_eq!(summary["counter"], 1);
}

#[tokio::test]
async fn test_health_over_http() {
    let server = start("mcp-server-1").await;
    let report = transport(&server.url).health().await.unwrap();
    assert_eq!(report.status, HealthStatus::Ok);
    assert_eq!(report.instance, "mcp-server-1");
    assert_eq!(report.store, "memory");
}

#[tokio::test]
async fn test_closed_session_is_lost() {
    let server = start("mcp-server-1").await;
    let client = SessionClient::connect(transport(&server.url)).await.unwrap();
    client.close().await.unwrap();

    let err = client.ping().await.unwrap_err();
    assert!(matches!(err, ClientError::SessionLost(_)), "{:?}", err);
}

#[tokio::test]
async fn test_resilient_client_recovers_lost_session_over_http() {
    let server = start("mcp-server-1").await;
    let client = ResilientClient::connect(HttpConnector::new(&server.url), BackoffPolicy::immediate(3))
        .await
        .unwrap();
    client.call_tool("add_note", json!({"note": "first"})).await.unwrap();
    let old_session = client.session_id();

    client.current().close().await.unwrap();

    let output = client.call_tool("list_notes", json!({})).await.unwrap();
    assert_eq!(output.parse::<Value>().unwrap()["notes"], json!(["first"]));
    assert_ne!(client.session_id(), old_session);

    let report = client.resume_session(&client.session_id()).await.unwrap();
    assert_eq!(report.keys_migrated, 0);
}
