//! Server module for tether.
//!
//! Serves the JSON-RPC endpoint and the health probe over HTTP/1.1.

pub mod dispatch;
pub mod logging;
pub mod routes;

pub use dispatch::{DispatchReply, Dispatcher};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::Request;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use tokio::net::{TcpListener, TcpStream};
use tower::ServiceBuilder;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::service::{InstanceInfo, SessionService};
use crate::store::open_store;
use logging::RequestLoggerLayer;

/// A bound, not yet serving, tether server.
pub struct Server {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
}

impl Server {
    /// Open the configured store and bind the configured address.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or the address cannot
    /// be bound.
    pub async fn bind(config: &Config) -> Result<Self> {
        let store = open_store(&config.store).await?;
        let instance = Arc::new(InstanceInfo::new(config.server.instance_id.clone()));
        let service = SessionService::new(store, instance, config.session.ttl());
        let listener = TcpListener::bind(config.server.address).await?;
        Ok(Self { listener, dispatcher: Arc::new(Dispatcher::new(service)) })
    }

    /// Bind `address` in front of an existing dispatcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn with_dispatcher(address: SocketAddr, dispatcher: Arc<Dispatcher>) -> Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self { listener, dispatcher })
    }

    /// Address actually bound (useful with port 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// The dispatcher serving requests.
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if the local address cannot be read.
    pub async fn serve(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let addr = self.local_addr()?;
        info!(%addr, instance = self.dispatcher.instance_id(), "Tether server listening");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            debug!(%peer, "New connection");
                            let dispatcher = Arc::clone(&self.dispatcher);
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, dispatcher).await {
                                    warn!(%peer, error = %e, "Connection handler error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Error accepting connection");
                        }
                    }
                }
                () = &mut shutdown => {
                    info!("Shutdown signal received, stopping accept loop");
                    break;
                }
            }
        }
        Ok(())
    }
}

async fn handle_connection(
    stream: TcpStream,
    dispatcher: Arc<Dispatcher>,
) -> std::result::Result<(), hyper::Error> {
    let io = TokioIo::new(stream);
    let service = ServiceBuilder::new()
        .layer(RequestLoggerLayer)
        .service_fn(move |request: Request<Incoming>| routes::route(Arc::clone(&dispatcher), request));
    http1::Builder::new().serve_connection(io, TowerToHyperService::new(service)).await
}

/// Start the tether server and run until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the server fails to start or bind to the configured address.
pub async fn run(config: &Config) -> Result<()> {
    let server = Server::bind(config).await?;
    server
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
}
