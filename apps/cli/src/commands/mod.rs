//! CLI command implementations.

pub mod call;
pub mod demo;
pub mod health;
pub mod resume;
pub mod tools;

use tether_client::{BackoffPolicy, HttpConnector, ResilientClient, SessionClient};

use crate::Target;

/// Open a resilient session against `target`.
pub async fn connect(target: &Target) -> anyhow::Result<ResilientClient<HttpConnector>> {
    let connector = HttpConnector::new(target.url.clone()).with_timeout(target.timeout);
    let policy = BackoffPolicy { max_retries: target.retries, ..BackoffPolicy::default() };
    ResilientClient::connect(connector, policy)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to {}: {}", target.url, e))
}

/// Close the session currently held by `client`, ignoring failures.
pub async fn disconnect(client: &ResilientClient<HttpConnector>) {
    let session: std::sync::Arc<SessionClient> = client.current();
    if let Err(e) = session.close().await {
        tracing::debug!(error = %e, "Failed to close session");
    }
}
