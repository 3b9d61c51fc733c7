//! Call command implementation.

use anyhow::Context;
use colored::Colorize;
use serde_json::Value;
use tether_client::ToolClient;

use super::{connect, disconnect};
use crate::Target;

/// Execute the call command.
///
/// All repetitions share one logical session, even across a failover.
pub async fn execute(target: &Target, tool: &str, args: &str, repeat: u32) -> anyhow::Result<()> {
    let arguments: Value = serde_json::from_str(args).context("invalid --args: expected JSON")?;
    if !arguments.is_object() {
        anyhow::bail!("invalid --args: expected a JSON object");
    }

    let client = connect(target).await?;
    for _ in 0..repeat.max(1) {
        let output = client.call_tool(tool, arguments.clone()).await?;
        let text = output.text().unwrap_or_default();
        if output.is_error {
            anyhow::bail!("{} failed: {}", tool, text);
        }
        println!("{}", text);
    }
    eprintln!("{} {}", "session:".dimmed(), client.session_id());
    disconnect(&client).await;
    Ok(())
}
