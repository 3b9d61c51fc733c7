//! Health command implementation.

use colored::Colorize;
use tether_client::HttpTransport;

use crate::Target;

/// Execute the health command.
///
/// Fails when the server is unreachable or reports itself degraded.
pub async fn execute(target: &Target, json_output: bool) -> anyhow::Result<()> {
    let transport = HttpTransport::new(target.url.clone(), target.timeout)?;
    let report = transport
        .health()
        .await
        .map_err(|e| anyhow::anyhow!("Health check against {} failed: {}", target.url, e))?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let status = if report.is_healthy() { "ok".green() } else { "degraded".red() };
        println!("{} {}", "Status:".bold(), status);
        println!("  Instance: {}", report.instance);
        println!("  Store: {}", report.store);
    }

    if !report.is_healthy() {
        anyhow::bail!("instance {} is degraded", report.instance);
    }
    Ok(())
}
