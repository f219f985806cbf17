//! HTTP entry point
//!
//! Every path except `/__health` is handed to [`DispatchServer::route`].
//! The request method, body and query string are ignored.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use rpcpool_common::protocol::error::{PoolError, Result};
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::dispatch::DispatchServer;
use crate::http_error::HttpError;

/// HTTP server for the dispatch entry point.
pub struct HttpServer {
    listener: TcpListener,
}

impl HttpServer {
    /// Binds the listener without serving yet, so the bound address is
    /// known before the first request arrives.
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| PoolError::Transport(format!("Failed to bind to {}: {}", addr, e)))?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| PoolError::Transport(format!("Failed to get local addr: {}", e)))
    }

    /// Serves requests until the listener fails.
    pub async fn run(self, server: Arc<DispatchServer>) -> Result<()> {
        info!("HTTP server listening on {}", self.local_addr()?);

        axum::serve(self.listener, router(server))
            .await
            .map_err(|e| PoolError::Transport(format!("Server error: {}", e)))
    }
}

/// Builds the axum application.
pub fn router(server: Arc<DispatchServer>) -> Router {
    Router::new()
        .route("/__health", get(health_check))
        .fallback(handle_dispatch)
        .layer(CorsLayer::permissive())
        .with_state(server)
}

async fn handle_dispatch(
    State(server): State<Arc<DispatchServer>>,
    uri: Uri,
) -> std::result::Result<Json<Value>, HttpError> {
    server.route(uri.path()).await.map(Json)
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
