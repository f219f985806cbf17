use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rpcpool_common::protocol::{ActorReply, DispatchRecord, MessageSeq, JSONRPC_VERSION};
use rpcpool_worker::{RecordRunner, WorkerPool};
use serde_json::{json, Value};
use tracing::info;

use crate::actor_pool::{ActorHandle, ActorId, ActorPool};
use crate::http_error::HttpError;
use crate::pending::{PendingResponseTable, WaitError};

/// Reason reported when no actor is connected.
pub const EMPTY_ACTOR_POOL: &str = "EMPTY ACTOR POOL";

/// Configuration for a dispatch server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP entry point binds to
    pub http_addr: String,
    /// Address actor processes connect to
    pub actor_addr: String,
    /// How long an HTTP caller waits for its actor reply; `None` waits forever
    pub reply_timeout: Option<Duration>,
    /// Payload of `GET /server/infos`
    pub infos: Value,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8010".to_string(),
            actor_addr: "0.0.0.0:7010".to_string(),
            reply_timeout: Some(Duration::from_secs(60)),
            infos: Value::Null,
        }
    }
}

/// Entry point that turns HTTP paths into actor dispatches.
///
/// Owns the actor pool and the table of callers waiting for replies. Every
/// request gets a fresh sequence number; the reply that comes back from the
/// chosen actor (a local worker pool or a remote process) carries that
/// number and completes the waiting caller.
///
/// # Routing
///
/// The first path segment selects a destination:
///
/// - `worker/<command>/<args...>` dispatches to a random actor
/// - `server/infos` reports the server configuration
/// - anything else is a structured 400
///
/// Actor selection is uniform random and independent of the dispatch
/// strategy each actor applies to its own workers.
pub struct DispatchServer {
    message_seq: AtomicU64,
    actors: ActorPool,
    pending: PendingResponseTable,
    reply_timeout: Option<Duration>,
    infos: Value,
}

impl DispatchServer {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            message_seq: AtomicU64::new(0),
            actors: ActorPool::new(),
            pending: PendingResponseTable::new(),
            reply_timeout: config.reply_timeout,
            infos: config.infos.clone(),
        }
    }

    /// Registers an in-process worker pool as an actor.
    pub fn attach_local_pool(&self, pool: Arc<WorkerPool>) -> ActorId {
        let runner = RecordRunner::new(pool, "server(local)");
        let id = self.actors.add(ActorHandle::Local(Arc::new(runner)));
        info!(actors = self.actors.len(), "Local actor attached");
        id
    }

    pub fn actors(&self) -> &ActorPool {
        &self.actors
    }

    pub fn pending(&self) -> &PendingResponseTable {
        &self.pending
    }

    fn next_seq(&self) -> MessageSeq {
        self.message_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    // ========================================================================
    // Routing
    // ========================================================================

    /// Handles one request path and produces the response body.
    pub async fn route(&self, path: &str) -> Result<Value, HttpError> {
        let seq = self.next_seq();
        let mut segments = path.split('/').filter(|s| !s.is_empty()).map(str::to_string);
        let destination = segments.next();
        let rest: Vec<String> = segments.collect();

        match destination.as_deref() {
            Some("worker") => {
                let mut rest = rest.into_iter();
                let command = rest.next().unwrap_or_default();
                let reply = self.dispatch(seq, command, rest.collect()).await?;
                serde_json::to_value(reply)
                    .map_err(|e| HttpError::internal("REPLY ENCODING", e.to_string()))
            }
            Some("server") => self.server_command(seq, &rest),
            other => Err(HttpError::bad_request(
                format!("UNIMPLEMENTED DESTINATION: {}", other.unwrap_or_default()),
                format!("fullArgs: {}", rest.join(",")),
            )),
        }
    }

    fn server_command(&self, seq: MessageSeq, rest: &[String]) -> Result<Value, HttpError> {
        match rest.first().map(String::as_str) {
            Some("infos") => Ok(json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": seq,
                "result": {
                    "config": self.infos,
                    "pid": format!("server: {}", std::process::id()),
                    "actors": self.actors.len(),
                    "pending": self.pending.len(),
                },
            })),
            other => Err(HttpError::bad_request(
                other.unwrap_or_default(),
                format!("args: {}", rest.iter().skip(1).cloned().collect::<Vec<_>>().join(",")),
            )),
        }
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Sends a command to a random actor and waits for its reply.
    pub async fn dispatch(
        &self,
        seq: MessageSeq,
        command: String,
        args: Vec<String>,
    ) -> Result<ActorReply, HttpError> {
        let Some((actor_id, actor)) = self.actors.pick() else {
            return Err(HttpError::service_unavailable(
                EMPTY_ACTOR_POOL,
                "No actors available to handle requests.",
            ));
        };

        let pending = self.pending.register(seq);
        let record = DispatchRecord {
            message_seq: seq,
            command_name: command,
            args,
        };

        tracing::debug!(message_seq = seq, actor = %actor.describe(), command = %record.command_name, "Dispatching");
        if let Err(e) = actor.dispatch(record, &self.pending) {
            self.actors.remove(actor_id);
            return Err(HttpError::bad_gateway("ACTOR DISCONNECTED", e.to_string()));
        }

        match pending.wait(self.reply_timeout).await {
            Ok(reply) => Ok(reply),
            Err(WaitError::Expired) => Err(HttpError::gateway_timeout(
                "ACTOR REPLY TIMEOUT",
                format!(
                    "No reply for message {} within {}ms",
                    seq,
                    self.reply_timeout.map(|d| d.as_millis()).unwrap_or_default()
                ),
            )),
            Err(WaitError::Abandoned) => Err(HttpError::internal(
                "REPLY ABANDONED",
                format!("Message {} was dropped before its reply arrived", seq),
            )),
        }
    }

    /// Completes the caller waiting for `reply`. Unroutable replies are dropped.
    pub fn complete(&self, reply: ActorReply) -> bool {
        self.pending.complete(reply)
    }
}
