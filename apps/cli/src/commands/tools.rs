//! Tools command implementation.

use colored::Colorize;
use tether_client::ToolClient;

use super::{connect, disconnect};
use crate::Target;

/// Execute the tools command.
pub async fn execute(target: &Target) -> anyhow::Result<()> {
    let client = connect(target).await?;
    let tools = client.list_tools().await?;

    println!("{}", "Available tools:".bold().cyan());
    for tool in &tools {
        println!("  {} - {}", tool.name.green(), tool.description);
    }
    disconnect(&client).await;
    Ok(())
}
