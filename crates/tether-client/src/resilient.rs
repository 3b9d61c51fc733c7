//! Transparent failover for [`ToolClient`]s.
//!
//! [`ResilientClient`] exposes the same call surface as the client it wraps.
//! When a call fails at the transport level it backs off, opens a new
//! session through its [`Connector`], asks the server to resume the old
//! session into the new one, and replays the call.
//!
//! Only one reconnect runs at a time per client. Calls that failed on a
//! connection that has already been replaced skip straight to replay.
//!
//! # Cancellation
//!
//! Dropping a call future cancels it at its next await point. Cancelling the
//! token from [`ResilientClient::cancellation_token`] additionally aborts any
//! backoff wait with [`ClientError::Cancelled`]. Either way an abandoned
//! reconnect puts the state back to [`ConnectionState::Connected`]; the next
//! failing call starts over. A replay already sent when
//! the caller gives up may or may not have run on the server: there is no
//! exactly-once guarantee.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tether_core::protocol::{ReadResourceResult, Tool, ToolOutput};
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;
use crate::client::ToolClient;
use crate::connector::Connector;
use crate::error::{ClientError, ClientResult};

type CallFuture<'a, T> = Pin<Box<dyn Future<Output = ClientResult<T>> + Send + 'a>>;

/// Connection state of a [`ResilientClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Calls go straight to the current session.
    Connected,
    /// A reconnect or replay is in progress.
    Reconnecting,
    /// The retry budget ran out. Terminal.
    Failed,
}

struct Connection<T> {
    generation: u64,
    client: Arc<T>,
}

impl<T> Clone for Connection<T> {
    fn clone(&self) -> Self {
        Self { generation: self.generation, client: Arc::clone(&self.client) }
    }
}

enum Halt {
    Exhausted,
    Cancelled,
    Terminated,
}

/// Puts `Reconnecting` back to `Connected` unless disarmed, so a reconnect
/// that is cancelled or dropped mid-backoff does not leave the state behind.
struct RestoreOnExit<'a> {
    state: &'a watch::Sender<ConnectionState>,
    armed: bool,
}

impl<'a> RestoreOnExit<'a> {
    fn new(state: &'a watch::Sender<ConnectionState>) -> Self {
        state.send_replace(ConnectionState::Reconnecting);
        Self { state, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RestoreOnExit<'_> {
    fn drop(&mut self) {
        if self.armed {
            restore_connected(self.state);
        }
    }
}

fn restore_connected(state: &watch::Sender<ConnectionState>) {
    state.send_if_modified(|state| {
        if *state == ConnectionState::Reconnecting {
            *state = ConnectionState::Connected;
            true
        } else {
            false
        }
    });
}

/// A [`ToolClient`] that survives instance failover.
pub struct ResilientClient<C: Connector> {
    connector: C,
    policy: BackoffPolicy,
    current: watch::Sender<Connection<C::Client>>,
    gate: Mutex<()>,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
}

impl<C: Connector> ResilientClient<C> {
    /// Open the first session through `connector`.
    ///
    /// The first connect is not retried.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` for an invalid policy, or the
    /// connector's error.
    pub async fn connect(connector: C, policy: BackoffPolicy) -> ClientResult<Self> {
        policy.validate()?;
        let client = connector.connect().await?;
        info!(session_id = %client.session_id(), "Resilient client connected");

        let (current, _) = watch::channel(Connection { generation: 0, client: Arc::new(client) });
        let (state, _) = watch::channel(ConnectionState::Connected);
        Ok(Self {
            connector,
            policy,
            current,
            gate: Mutex::new(()),
            state,
            cancel: CancellationToken::new(),
        })
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Token that aborts backoff waits when cancelled.
    ///
    /// Cancellation is permanent: every later recovery fails with
    /// `ClientError::Cancelled`.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The client currently in use.
    pub fn current(&self) -> Arc<C::Client> {
        Arc::clone(&self.current.borrow().client)
    }

    /// Number of sessions opened after the first one.
    pub fn reconnects(&self) -> u64 {
        self.current.borrow().generation
    }

    /// Run `call` against the current client, recovering from transport
    /// failures. `call` may run more than once.
    async fn invoke<'a, T, F>(&self, operation: &'static str, call: F) -> ClientResult<T>
    where
        T: Send,
        F: Fn(Arc<C::Client>) -> CallFuture<'a, T> + Send + Sync,
    {
        if self.state() == ConnectionState::Failed {
            return Err(ClientError::Terminated);
        }

        let mut connection = self.current.borrow().clone();
        let original = match call(Arc::clone(&connection.client)).await {
            Err(err) if err.is_retryable() => err,
            result => {
                self.mark_connected(connection.generation);
                return result;
            }
        };
        warn!(
            operation,
            session_id = %connection.client.session_id(),
            error = %original,
            "Call failed at transport level, recovering"
        );

        let mut attempts = 0;
        loop {
            connection = match self.reconnect(&connection, &mut attempts).await {
                Ok(next) => next,
                Err(Halt::Exhausted) => {
                    return Err(ClientError::RetryBudgetExhausted {
                        attempts,
                        source: Box::new(original),
                    });
                }
                Err(Halt::Cancelled) => return Err(ClientError::Cancelled),
                Err(Halt::Terminated) => return Err(ClientError::Terminated),
            };

            match call(Arc::clone(&connection.client)).await {
                Err(err) if err.is_retryable() => {
                    warn!(
                        operation,
                        session_id = %connection.client.session_id(),
                        error = %err,
                        "Replay failed"
                    );
                }
                result => {
                    self.mark_connected(connection.generation);
                    return result;
                }
            }
        }
    }

    /// Replace `failed` with a resumed session, unless another caller
    /// already did.
    async fn reconnect(
        &self,
        failed: &Connection<C::Client>,
        attempts: &mut u32,
    ) -> Result<Connection<C::Client>, Halt> {
        let _gate = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(Halt::Cancelled),
            guard = self.gate.lock() => guard,
        };

        let current = self.current.borrow().clone();
        if current.generation != failed.generation {
            debug!(generation = current.generation, "Connection already replaced");
            return Ok(current);
        }
        if self.state() == ConnectionState::Failed {
            return Err(Halt::Terminated);
        }
        let restore = RestoreOnExit::new(&self.state);

        loop {
            if *attempts >= self.policy.max_retries {
                warn!(attempts = *attempts, "Retry budget exhausted");
                self.state.send_replace(ConnectionState::Failed);
                return Err(Halt::Exhausted);
            }
            *attempts += 1;

            let delay = self.policy.delay_for(*attempts);
            debug!(attempt = *attempts, delay_ms = delay.as_millis(), "Backing off");
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    info!(attempt = *attempts, "Reconnect cancelled");
                    return Err(Halt::Cancelled);
                }
                () = tokio::time::sleep(delay) => {}
            }

            match self.establish(&failed.client).await {
                Ok(client) => {
                    let next = Connection {
                        generation: failed.generation + 1,
                        client: Arc::new(client),
                    };
                    self.current.send_replace(next.clone());
                    // Stays `Reconnecting` until the replay lands.
                    restore.disarm();
                    return Ok(next);
                }
                Err(err) => {
                    warn!(attempt = *attempts, error = %err, "Reconnect attempt failed");
                }
            }
        }
    }

    /// Open a new session and resume `previous` into it.
    async fn establish(&self, previous: &C::Client) -> ClientResult<C::Client> {
        let previous_session_id = previous.session_id();
        let client = self.connector.connect().await?;
        let report = client.resume_session(&previous_session_id).await?;
        info!(
            previous_session_id = %previous_session_id,
            session_id = %client.session_id(),
            instance = %report.instance,
            keys_migrated = report.keys_migrated,
            "Session resumed on new connection"
        );
        Ok(client)
    }

    /// A call succeeded on `generation`. Leaves the state alone while
    /// another caller is mid-reconnect.
    fn mark_connected(&self, generation: u64) {
        if self.current.borrow().generation != generation {
            return;
        }
        if let Ok(_gate) = self.gate.try_lock() {
            restore_connected(&self.state);
        }
    }
}

impl<C: Connector + std::fmt::Debug> std::fmt::Debug for ResilientClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("connector", &self.connector)
            .field("policy", &self.policy)
            .field("state", &self.state())
            .field("session_id", &self.session_id())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<C: Connector> ToolClient for ResilientClient<C> {
    fn session_id(&self) -> String {
        self.current.borrow().client.session_id()
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> ClientResult<ToolOutput> {
        self.invoke("tools/call", |client| {
            let arguments = arguments.clone();
            Box::pin(async move { client.call_tool(name, arguments).await })
        })
        .await
    }

    async fn list_tools(&self) -> ClientResult<Vec<Tool>> {
        self.invoke("tools/list", |client| Box::pin(async move { client.list_tools().await }))
            .await
    }

    async fn read_resource(&self, uri: &str) -> ClientResult<ReadResourceResult> {
        self.invoke("resources/read", |client| {
            Box::pin(async move { client.read_resource(uri).await })
        })
        .await
    }

    async fn ping(&self) -> ClientResult<()> {
        self.invoke("ping", |client| Box::pin(async move { client.ping().await })).await
    }
}
