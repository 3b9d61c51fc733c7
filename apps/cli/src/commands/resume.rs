//! Resume command implementation.

use colored::Colorize;
use tether_client::ToolClient;

use super::{connect, disconnect};
use crate::Target;

/// Execute the resume command.
pub async fn execute(target: &Target, previous_session_id: &str) -> anyhow::Result<()> {
    let client = connect(target).await?;
    let report = client.resume_session(previous_session_id).await?;

    println!("{} {:?}", "Status:".bold(), report.status);
    println!("  Keys migrated: {}", report.keys_migrated);
    println!("  Instance: {}", report.instance);
    println!("  New session: {}", client.session_id().green());
    disconnect(&client).await;
    Ok(())
}
