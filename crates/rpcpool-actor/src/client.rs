use std::sync::Arc;
use std::time::Duration;

use rpcpool_common::protocol::error::{PoolError, Result};
use rpcpool_common::protocol::{ActorReply, DispatchRecord};
use rpcpool_common::transport::{connect, framed};
use rpcpool_worker::{RecordRunner, WorkerPool};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// How an [`ActorClient`] retries a lost connection.
///
/// The delay is fixed. There is no growth and no retry cap: a client keeps
/// trying until it is shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
        }
    }
}

/// Connection state of an [`ActorClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorState {
    Disconnected,
    Connecting,
    Connected,
}

/// Serves a local worker pool to a dispatch server over one persistent
/// socket.
///
/// ```text
/// Disconnected -> Connecting -> Connected
///      ^              |             |
///      +--- delay ----+-------------+  (connect failure, socket error or end)
/// ```
///
/// Every dispatch record that arrives runs on its own task, so replies are
/// written back as soon as their job finishes and may overtake each other.
pub struct ActorClient {
    server_addr: String,
    runner: Arc<RecordRunner>,
    policy: ReconnectPolicy,
    state: watch::Sender<ActorState>,
    stop: watch::Sender<bool>,
}

impl ActorClient {
    pub fn new(server_addr: impl Into<String>, pool: Arc<WorkerPool>, policy: ReconnectPolicy) -> Self {
        let (state, _) = watch::channel(ActorState::Disconnected);
        let (stop, _) = watch::channel(false);
        Self {
            server_addr: server_addr.into(),
            runner: Arc::new(RecordRunner::new(pool, "actor")),
            policy,
            state,
            stop,
        }
    }

    pub fn server_addr(&self) -> &str {
        &self.server_addr
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    pub fn runner(&self) -> &Arc<RecordRunner> {
        &self.runner
    }

    pub fn state(&self) -> ActorState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<ActorState> {
        self.state.subscribe()
    }

    /// Resolves once the client reaches `target`.
    pub async fn wait_for_state(&self, target: ActorState) {
        let mut states = self.state.subscribe();
        loop {
            let current = *states.borrow_and_update();
            if current == target || states.changed().await.is_err() {
                return;
            }
        }
    }

    /// Stops [`ActorClient::run`] at its next suspension point.
    pub fn shutdown(&self) {
        self.stop.send_replace(true);
    }

    fn set_state(&self, state: ActorState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(server = %self.server_addr, ?state, "Actor state changed");
        }
    }

    /// Connects and serves until [`ActorClient::shutdown`] is called.
    pub async fn run(&self) {
        let mut stop = self.stop.subscribe();

        loop {
            let stopping = *stop.borrow();
            if stopping {
                break;
            }

            self.set_state(ActorState::Connecting);
            let connected = tokio::select! {
                result = connect(&self.server_addr) => result,
                _ = stopped(&mut stop) => break,
            };

            match connected {
                Ok(stream) => {
                    self.set_state(ActorState::Connected);
                    info!(server = %self.server_addr, "connected");
                    match self.serve(stream, &mut stop).await {
                        Ok(()) => info!(server = %self.server_addr, "Connection ended"),
                        Err(e) => warn!(server = %self.server_addr, "Connection lost: {}", e),
                    }
                }
                Err(e) => warn!(server = %self.server_addr, "Connection failed: {}", e),
            }

            self.set_state(ActorState::Disconnected);
            let stopping = *stop.borrow();
            if stopping {
                break;
            }

            info!(
                server = %self.server_addr,
                "Reconnecting in {}ms",
                self.policy.delay.as_millis()
            );
            tokio::select! {
                _ = tokio::time::sleep(self.policy.delay) => {}
                _ = stopped(&mut stop) => break,
            }
        }

        self.set_state(ActorState::Disconnected);
        info!(server = %self.server_addr, "Actor stopped");
    }

    /// Serves one connection until it ends, fails or the client stops.
    async fn serve(&self, stream: TcpStream, stop: &mut watch::Receiver<bool>) -> Result<()> {
        let (mut reader, mut writer) = framed(stream);
        let (replies, mut outgoing) = mpsc::unbounded_channel::<ActorReply>();

        let mut writer_task = tokio::spawn(async move {
            while let Some(reply) = outgoing.recv().await {
                writer.send(&reply).await?;
            }
            Ok::<(), PoolError>(())
        });

        let outcome = loop {
            tokio::select! {
                batch = reader.next_batch::<DispatchRecord>() => match batch {
                    Ok(Some(frames)) => {
                        for frame in frames {
                            match frame {
                                Ok(record) => self.spawn_record(record, replies.clone()),
                                Err(e) => error!(server = %self.server_addr, "Dropping malformed dispatch frame: {}", e),
                            }
                        }
                    }
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(e),
                },
                written = &mut writer_task => break match written {
                    Ok(result) => result,
                    Err(e) => Err(PoolError::Transport(format!("reply writer failed: {}", e))),
                },
                _ = stopped(stop) => break Ok(()),
            }
        };

        writer_task.abort();
        outcome
    }

    fn spawn_record(&self, record: DispatchRecord, replies: mpsc::UnboundedSender<ActorReply>) {
        let runner = self.runner.clone();
        tokio::spawn(async move {
            let seq = record.message_seq;
            let reply = runner.run(record).await;
            if replies.send(reply).is_err() {
                debug!(message_seq = seq, "Connection closed before reply could be sent");
            }
        });
    }
}

/// Resolves once the stop flag is set.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    loop {
        let stopping = *stop.borrow_and_update();
        if stopping {
            return;
        }
        if stop.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
