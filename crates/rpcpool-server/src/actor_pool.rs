use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::seq::IteratorRandom;
use rpcpool_common::protocol::error::{PoolError, Result};
use rpcpool_common::protocol::DispatchRecord;
use rpcpool_worker::RecordRunner;
use tokio::sync::mpsc;

use crate::pending::PendingResponseTable;

/// Key of an actor inside an [`ActorPool`].
pub type ActorId = u64;

/// Something that accepts dispatch records and eventually produces a reply.
#[derive(Clone)]
pub enum ActorHandle {
    /// Worker pool inside the server process
    Local(Arc<RecordRunner>),
    /// Actor process connected over TCP
    Remote(RemoteActor),
}

/// Write side of a connected actor socket.
#[derive(Clone)]
pub struct RemoteActor {
    peer: SocketAddr,
    outbox: mpsc::UnboundedSender<DispatchRecord>,
}

impl RemoteActor {
    pub fn new(peer: SocketAddr, outbox: mpsc::UnboundedSender<DispatchRecord>) -> Self {
        Self { peer, outbox }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl ActorHandle {
    /// Hands `record` to the actor.
    ///
    /// A local actor runs it on a spawned task and completes the reply in
    /// `replies` itself; a remote actor queues it for its socket and its
    /// reply arrives later through the connection reader.
    pub fn dispatch(&self, record: DispatchRecord, replies: &PendingResponseTable) -> Result<()> {
        match self {
            ActorHandle::Local(runner) => {
                let runner = runner.clone();
                let replies = replies.clone();
                tokio::spawn(async move {
                    let reply = runner.run(record).await;
                    replies.complete(reply);
                });
                Ok(())
            }
            ActorHandle::Remote(remote) => remote
                .outbox
                .send(record)
                .map_err(|_| PoolError::Connection(format!("actor {} is disconnected", remote.peer))),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ActorHandle::Local(_) => "local".to_string(),
            ActorHandle::Remote(remote) => format!("remote {}", remote.peer),
        }
    }
}

/// Actors currently able to take work.
#[derive(Default)]
pub struct ActorPool {
    actors: Mutex<BTreeMap<ActorId, ActorHandle>>,
    next_id: AtomicU64,
}

impl ActorPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn actors(&self) -> MutexGuard<'_, BTreeMap<ActorId, ActorHandle>> {
        self.actors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, actor: ActorHandle) -> ActorId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.actors().insert(id, actor);
        id
    }

    pub fn remove(&self, id: ActorId) -> bool {
        self.actors().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.actors().len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors().is_empty()
    }

    /// Uniform random pick.
    pub fn pick(&self) -> Option<(ActorId, ActorHandle)> {
        self.actors()
            .iter()
            .choose(&mut rand::thread_rng())
            .map(|(id, actor)| (*id, actor.clone()))
    }
}
