//! Unix-socket connection server
//!
//! Accepts local connections and spawns one session task per connection.
//! There is deliberately no connection cap, no backpressure, and no caller
//! authentication beyond filesystem permissions on the socket path.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::SinkExt;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use tb_core::config::BrokerConfig;
use tb_core::provider::ProviderFactory;
use tb_protocol::{BrokerCodec, ServerResponse};

use crate::session::Session;

/// Broker server listening on a Unix domain socket
pub struct BrokerServer<F: ProviderFactory> {
    /// Broker configuration
    config: BrokerConfig,
    /// Constructs a fresh provider for each accepted connection
    factory: Arc<F>,
    /// Cancellation token for shutdown
    cancel: CancellationToken,
}

impl<F: ProviderFactory> BrokerServer<F> {
    /// Create a new broker server
    pub fn new(config: BrokerConfig, factory: F) -> Self {
        Self {
            config,
            factory: Arc::new(factory),
            cancel: CancellationToken::new(),
        }
    }

    /// Set the shutdown token (call before run)
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run the accept loop until cancelled
    ///
    /// The socket is created fresh: a stale file from a previous run is
    /// removed before binding. On cancellation the listener stops accepting
    /// and the socket file is removed; in-flight sessions are not drained.
    pub async fn run(&self) -> Result<()> {
        let socket_path = self.config.socket_path.clone();
        remove_stale_socket(&socket_path)?;

        let listener = UnixListener::bind(&socket_path)
            .with_context(|| format!("Failed to bind to {}", socket_path.display()))?;

        tracing::info!("Broker listening on {}", socket_path.display());

        loop {
            tokio::select! {
                // Check for shutdown
                _ = self.cancel.cancelled() => {
                    tracing::info!("Broker shutting down");
                    break;
                }

                // Accept new connections
                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            self.handle_connection(stream);
                        }
                        Err(e) => {
                            tracing::error!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }

        drop(listener);
        if let Err(e) = std::fs::remove_file(&socket_path) {
            tracing::warn!("Failed to remove socket file: {}", e);
        }

        Ok(())
    }

    /// Spawn a session task for a new incoming connection
    fn handle_connection(&self, stream: UnixStream) {
        tracing::debug!("New caller connection");

        let provider = self.factory.create();
        let app_id = self.config.app_id;

        tokio::spawn(async move {
            let mut framed = Framed::new(stream, BrokerCodec::new());
            let session = Session::new(provider, app_id);

            match session.run(&mut framed).await {
                Ok(()) => {
                    tracing::debug!("Session closed");
                }
                Err(e) => {
                    // Session failures stay local to this connection. Surface
                    // the message to the caller if the socket still works.
                    tracing::warn!("Session error: {}", e);
                    let _ = framed.send(ServerResponse::error(e.to_string())).await;
                }
            }
        });
    }
}

/// Remove a leftover socket file from a previous run
fn remove_stale_socket(path: &Path) -> Result<()> {
    if path.exists() {
        tracing::debug!("Removing stale socket at {}", path.display());
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove stale socket {}", path.display()))?;
    }
    Ok(())
}
