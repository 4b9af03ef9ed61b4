//! Mock endpoint server

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Semaphore};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::proxy::ProxyOrchestrator;
use crate::Result;

use super::{HttpHandler, Transport, SHUTDOWN_TIMEOUT_MS};

/// Accept loop serving the mock endpoint with bounded concurrency
pub struct NetworkHandler {
    listen: SocketAddr,
    handler: Arc<HttpHandler>,
    connections: Arc<Semaphore>,
    max_connections: usize,
    shutdown_tx: broadcast::Sender<()>,
}

impl NetworkHandler {
    /// Create a network handler for the configured endpoint
    #[must_use]
    pub fn new(config: &Config, transport: Arc<dyn Transport>) -> Self {
        let orchestrator = Arc::new(ProxyOrchestrator::from_config(config, transport));
        Self::with_handler(config, HttpHandler::from_config(config, orchestrator))
    }

    /// Create a network handler around an existing request service
    #[must_use]
    pub fn with_handler(config: &Config, handler: HttpHandler) -> Self {
        let max_connections = config.limits.max_connections;
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            listen: config.server.listen,
            handler: Arc::new(handler),
            connections: Arc::new(Semaphore::new(max_connections)),
            max_connections,
            shutdown_tx,
        }
    }

    /// Sender that stops the accept loop when signalled
    #[must_use]
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Bind the configured address and serve until Ctrl-C or a shutdown signal
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.listen).await?;

        let shutdown_tx = self.shutdown_tx.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Received SIGINT, shutting down");
                    shutdown_tx.send(()).ok();
                }
                _ = shutdown_rx.recv() => {}
            }
        });

        self.serve(listener).await
    }

    /// Serve connections from `listener` until a shutdown signal
    ///
    /// # Errors
    ///
    /// Returns error if the listener address cannot be read
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        info!("Mock endpoint listening on http://{addr}");

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let Ok(permit) = Arc::clone(&self.connections).try_acquire_owned() else {
                                warn!("Connection limit reached, rejecting {}", peer_addr);
                                drop(stream);
                                continue;
                            };

                            let handler = Arc::clone(&self.handler);

                            tokio::spawn(async move {
                                let _permit = permit;
                                let service = service_fn(move |request| {
                                    let handler = Arc::clone(&handler);
                                    async move { Ok::<_, Infallible>(handler.handle(request).await) }
                                });

                                if let Err(e) = http1::Builder::new()
                                    .serve_connection(TokioIo::new(stream), service)
                                    .await
                                {
                                    debug!("Connection error from {}: {}", peer_addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Endpoint {} shutting down", addr);
                    break;
                }
            }
        }

        drop(listener);

        // In-flight connections hand their permits back as they finish
        let shutdown_timeout = Duration::from_millis(SHUTDOWN_TIMEOUT_MS);
        let all_permits = u32::try_from(self.max_connections).unwrap_or(u32::MAX);
        if tokio::time::timeout(shutdown_timeout, self.connections.acquire_many(all_permits))
            .await
            .is_err()
        {
            warn!("Shutdown timed out with connections still open");
        }

        info!("Shutdown complete");
        Ok(())
    }
}
