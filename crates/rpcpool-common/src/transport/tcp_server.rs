use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};

use crate::protocol::error::{PoolError, Result};

/// Async TCP listener that hands every accepted socket to a handler task.
///
/// The dispatch server uses this to accept persistent actor connections.
pub struct TcpServer {
    listener: TcpListener,
}

impl TcpServer {
    /// Creates a new TCP server bound to the specified address.
    ///
    /// # Arguments
    /// * `bind_addr` - The address to bind to (e.g., "0.0.0.0:7010")
    pub async fn new(bind_addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| PoolError::Connection(format!("Failed to bind to {}: {}", bind_addr, e)))?;

        Ok(Self { listener })
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| PoolError::Connection(format!("Failed to get local addr: {}", e)))
    }

    /// Accepts connections forever, spawning `handler` for each one.
    ///
    /// A handler error is logged and ends only that connection.
    pub async fn run_with_handler<F, Fut>(self, handler: F) -> Result<()>
    where
        F: Fn(TcpStream, SocketAddr) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let handler = Arc::new(handler);

        loop {
            let (stream, peer_addr) = self
                .listener
                .accept()
                .await
                .map_err(|e| PoolError::Connection(format!("Failed to accept connection: {}", e)))?;

            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(%peer_addr, "Could not disable Nagle: {}", e);
            }

            tracing::debug!(%peer_addr, "Connection established");

            let handler = handler.clone();
            tokio::spawn(async move {
                if let Err(e) = handler(stream, peer_addr).await {
                    tracing::warn!(%peer_addr, "Connection error: {}", e);
                }
            });
        }
    }
}
