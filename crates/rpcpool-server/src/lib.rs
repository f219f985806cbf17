//! Dispatch server for rpcpool
//!
//! Accepts HTTP requests, picks an actor at random and waits for the actor's
//! correlated reply. Actors are either an in-process worker pool or remote
//! processes holding a persistent framed TCP connection.

pub mod actor_listener;
pub mod actor_pool;
pub mod dispatch;
pub mod http_error;
pub mod http_server;
pub mod pending;
pub mod service;

pub use actor_listener::{run_actor_listener, serve_actor};
pub use actor_pool::{ActorHandle, ActorId, ActorPool, RemoteActor};
pub use dispatch::{DispatchServer, ServerConfig, EMPTY_ACTOR_POOL};
pub use http_error::HttpError;
pub use http_server::{router, HttpServer};
pub use pending::{PendingReply, PendingResponseTable, WaitError};
pub use service::{start, RunningServer};
