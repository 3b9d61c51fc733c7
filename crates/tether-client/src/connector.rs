//! Ways of opening a fresh session, used for the first connection and for
//! every reconnect.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tether_core::server::Dispatcher;
use tracing::debug;

use crate::client::{SessionClient, ToolClient};
use crate::error::{ClientError, ClientResult};
use crate::transport::http::{DEFAULT_REQUEST_TIMEOUT, HttpTransport};
use crate::transport::local::LocalTransport;

/// Opens new sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Client produced by a successful connect.
    type Client: ToolClient + 'static;

    /// Open a new session.
    async fn connect(&self) -> ClientResult<Self::Client>;
}

/// Connects to a server (or load balancer) over HTTP.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    base_url: String,
    timeout: Duration,
}

impl HttpConnector {
    /// Connector for `base_url` with the default request timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), timeout: DEFAULT_REQUEST_TIMEOUT }
    }

    /// Override the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Server base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Connector for HttpConnector {
    type Client = SessionClient;

    async fn connect(&self) -> ClientResult<SessionClient> {
        let transport = HttpTransport::new(self.base_url.clone(), self.timeout)?;
        SessionClient::connect(Arc::new(transport)).await
    }
}

/// Connects to the first live dispatcher among a set of in-process instances.
///
/// Stands in for a round-robin load balancer: dropping the last strong
/// reference to an instance takes it out of rotation.
#[derive(Debug, Clone, Default)]
pub struct LocalConnector {
    instances: Vec<Weak<Dispatcher>>,
}

impl LocalConnector {
    /// Connector over `instances`, tried in order.
    pub fn new(instances: &[Arc<Dispatcher>]) -> Self {
        Self { instances: instances.iter().map(Arc::downgrade).collect() }
    }

    /// Add an instance at the end of the rotation.
    pub fn push(&mut self, instance: &Arc<Dispatcher>) {
        self.instances.push(Arc::downgrade(instance));
    }
}

#[async_trait]
impl Connector for LocalConnector {
    type Client = SessionClient;

    async fn connect(&self) -> ClientResult<SessionClient> {
        let dispatcher = self
            .instances
            .iter()
            .find_map(Weak::upgrade)
            .ok_or_else(|| ClientError::Transport("no live instance".to_string()))?;
        debug!(instance = dispatcher.instance_id(), "Connecting in-process");
        SessionClient::connect(Arc::new(LocalTransport::new(&dispatcher))).await
    }
}
