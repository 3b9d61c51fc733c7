//! Demo command implementation.
//!
//! Two in-process instances share one in-memory store. The first instance is
//! dropped mid-session and the resilient client carries on against the
//! second.

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use serde_json::{Value, json};
use tether_client::{BackoffPolicy, LocalConnector, ResilientClient, ToolClient};
use tether_core::server::Dispatcher;
use tether_core::service::{InstanceInfo, SessionService};
use tether_core::store::{KeyedTtlStore, MemoryStore};

const DEMO_TTL: Duration = Duration::from_secs(1800);

fn instance(store: &Arc<dyn KeyedTtlStore>, id: &str) -> Arc<Dispatcher> {
    let service = SessionService::new(Arc::clone(store), Arc::new(InstanceInfo::new(id)), DEMO_TTL);
    Arc::new(Dispatcher::new(service))
}

/// Execute the demo command.
pub async fn execute(increments: u32, retries: u32) -> anyhow::Result<()> {
    let store: Arc<dyn KeyedTtlStore> = Arc::new(MemoryStore::new());
    let server_1 = instance(&store, "mcp-server-1");
    let server_2 = instance(&store, "mcp-server-2");

    let connector = LocalConnector::new(&[Arc::clone(&server_1), Arc::clone(&server_2)]);
    let client = ResilientClient::connect(connector, BackoffPolicy::immediate(retries)).await?;
    println!("{} {}", "Connected, session:".bold(), client.session_id());

    for _ in 0..increments {
        let output: Value = client.call_tool("increment_counter", json!({})).await?.parse()?;
        println!("  increment_counter -> {}", output);
    }
    client.call_tool("add_note", json!({"note": "written before failover"})).await?;

    println!("{}", "Stopping mcp-server-1".yellow());
    drop(server_1);

    let output: Value = client.call_tool("get_counter", json!({})).await?.parse()?;
    println!("  get_counter -> {}", output);
    let output: Value = client.call_tool("list_notes", json!({})).await?.parse()?;
    println!("  list_notes -> {}", output);

    println!(
        "{} {} ({} reconnect)",
        "Recovered, session:".bold().green(),
        client.session_id(),
        client.reconnects()
    );
    Ok(())
}
