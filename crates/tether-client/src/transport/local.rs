//! In-process transport straight into a [`Dispatcher`].
//!
//! The transport holds only a weak reference: once every strong handle to
//! the dispatcher is dropped the "instance" is gone and every exchange fails
//! like a refused connection.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tether_core::server::Dispatcher;

use super::{Exchange, Transport};
use crate::error::{ClientError, ClientResult};

/// Transport that calls a dispatcher in the same process.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    dispatcher: Weak<Dispatcher>,
    endpoint: String,
}

impl LocalTransport {
    /// Create a transport to `dispatcher`.
    pub fn new(dispatcher: &Arc<Dispatcher>) -> Self {
        Self {
            dispatcher: Arc::downgrade(dispatcher),
            endpoint: format!("local://{}", dispatcher.instance_id()),
        }
    }

    fn dispatcher(&self) -> ClientResult<Arc<Dispatcher>> {
        self.dispatcher
            .upgrade()
            .ok_or_else(|| ClientError::Transport(format!("{} is gone", self.endpoint)))
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn exchange(&self, session_id: Option<&str>, message: &[u8]) -> ClientResult<Exchange> {
        let dispatcher = self.dispatcher()?;
        let reply = dispatcher.handle(session_id, message).await;
        Ok(Exchange {
            status: reply.status.as_u16(),
            session_id: reply.session_id.clone(),
            body: reply.body_bytes(),
        })
    }

    async fn terminate(&self, session_id: &str) -> ClientResult<()> {
        self.dispatcher()?.terminate(Some(session_id)).await;
        Ok(())
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}
