//! HTTP transport for tether servers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tether_core::protocol::{HEALTH_PATH, MCP_PATH, SESSION_HEADER};
use tether_core::service::HealthReport;
use tracing::debug;

use super::{Exchange, Transport};
use crate::error::{ClientError, ClientResult};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP transport posting JSON-RPC messages to `{base_url}/mcp`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// Server base URL, without a trailing slash.
    base_url: String,
    /// HTTP client.
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {}", e)))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { base_url, client })
    }

    fn mcp_url(&self) -> String {
        format!("{}{}", self.base_url, MCP_PATH)
    }

    /// Query the server's health probe.
    ///
    /// A degraded server answers 503 with a report; that is returned as a
    /// report, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be reached or the body is not a
    /// health report.
    pub async fn health(&self) -> ClientResult<HealthReport> {
        let response = self.client.get(format!("{}{}", self.base_url, HEALTH_PATH)).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            ClientError::Protocol(format!("unexpected health reply ({}): {}", status, e))
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn exchange(&self, session_id: Option<&str>, message: &[u8]) -> ClientResult<Exchange> {
        let mut request = self
            .client
            .post(self.mcp_url())
            .header(CONTENT_TYPE, "application/json")
            .body(message.to_vec());
        if let Some(id) = session_id {
            request = request.header(SESSION_HEADER, id);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();
        debug!(url = %self.mcp_url(), status, bytes = body.len(), "HTTP exchange");

        Ok(Exchange { status, session_id, body })
    }

    async fn terminate(&self, session_id: &str) -> ClientResult<()> {
        let response =
            self.client.delete(self.mcp_url()).header(SESSION_HEADER, session_id).send().await?;
        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(ClientError::Http { status: status.as_u16(), message: "terminate failed".to_string() })
        }
    }

    fn endpoint(&self) -> String {
        self.base_url.clone()
    }
}
