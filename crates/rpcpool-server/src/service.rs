use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::future::select_all;
use rpcpool_common::protocol::error::Result;
use rpcpool_common::transport::TcpServer;
use rpcpool_worker::WorkerPool;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::actor_listener::run_actor_listener;
use crate::dispatch::{DispatchServer, ServerConfig};
use crate::http_server::HttpServer;

/// A dispatch server with both listeners bound and serving.
pub struct RunningServer {
    pub http_addr: SocketAddr,
    pub actor_addr: SocketAddr,
    pub server: Arc<DispatchServer>,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningServer {
    /// Waits until either listener stops, then stops the other.
    pub async fn wait(self) {
        let (result, _, remaining) = select_all(self.tasks).await;
        if let Err(e) = result {
            if !e.is_cancelled() {
                error!("Listener task failed: {}", e);
            }
        }
        for task in remaining {
            task.abort();
        }
    }

    /// Stops both listeners. Connected actor sockets are left to close on
    /// their own.
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Binds both listeners and starts serving.
///
/// When `local_pool` is given it is attached as the local actor and stays in
/// the actor pool for the server's lifetime.
pub async fn start(config: ServerConfig, local_pool: Option<Arc<WorkerPool>>) -> Result<RunningServer> {
    let server = Arc::new(DispatchServer::new(&config));
    if let Some(pool) = local_pool {
        server.attach_local_pool(pool);
    }

    let http = HttpServer::bind(&config.http_addr).await?;
    let http_addr = http.local_addr()?;
    let actors = TcpServer::new(&config.actor_addr).await?;
    let actor_addr = actors.local_addr()?;
    info!(%http_addr, %actor_addr, "Dispatch server started");

    let http_task = {
        let server = server.clone();
        tokio::spawn(async move {
            if let Err(e) = http.run(server).await {
                error!("HTTP server stopped: {}", e);
            }
        })
    };
    let actor_task = {
        let server = server.clone();
        tokio::spawn(async move {
            if let Err(e) = run_actor_listener(actors, server).await {
                error!("Actor listener stopped: {}", e);
            }
        })
    };

    Ok(RunningServer {
        http_addr,
        actor_addr,
        server,
        tasks: vec![http_task, actor_task],
    })
}
