use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rpcpool_common::protocol::{ActorReply, MessageSeq};
use tokio::sync::oneshot;

type Entries = HashMap<MessageSeq, oneshot::Sender<ActorReply>>;

/// Callers waiting for an actor reply, keyed by message sequence number.
#[derive(Clone, Default)]
pub struct PendingResponseTable {
    entries: Arc<Mutex<Entries>>,
}

/// Why a wait ended without a reply.
#[derive(Debug, PartialEq, Eq)]
pub enum WaitError {
    /// The deadline passed first
    Expired,
    /// The entry was dropped without a reply
    Abandoned,
}

impl PendingResponseTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a responder for `seq`.
    ///
    /// The entry is removed when the returned handle is dropped, so a caller
    /// that times out or disconnects never leaves it behind.
    pub fn register(&self, seq: MessageSeq) -> PendingReply {
        let (sender, receiver) = oneshot::channel();
        if self.entries().insert(seq, sender).is_some() {
            tracing::warn!(message_seq = seq, "Replaced an existing pending entry");
        }
        PendingReply {
            table: self.clone(),
            seq,
            receiver,
        }
    }

    /// Hands `reply` to the caller waiting on its sequence number.
    ///
    /// Returns `false` when nobody is waiting; the reply is dropped.
    pub fn complete(&self, reply: ActorReply) -> bool {
        let seq = reply.id;
        let Some(sender) = self.entries().remove(&seq) else {
            tracing::warn!(message_seq = seq, "Unroutable reply: no pending entry; dropping");
            return false;
        };
        if sender.send(reply).is_err() {
            tracing::debug!(message_seq = seq, "Caller left before its reply arrived");
            return false;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn remove(&self, seq: MessageSeq) {
        self.entries().remove(&seq);
    }
}

/// One caller's side of a pending entry.
pub struct PendingReply {
    table: PendingResponseTable,
    seq: MessageSeq,
    receiver: oneshot::Receiver<ActorReply>,
}

impl PendingReply {
    pub fn seq(&self) -> MessageSeq {
        self.seq
    }

    /// Waits for the reply, up to `deadline` when one is given.
    pub async fn wait(mut self, deadline: Option<Duration>) -> Result<ActorReply, WaitError> {
        let received = match deadline {
            Some(limit) => match tokio::time::timeout(limit, &mut self.receiver).await {
                Ok(received) => received,
                Err(_) => return Err(WaitError::Expired),
            },
            None => (&mut self.receiver).await,
        };
        received.map_err(|_| WaitError::Abandoned)
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        self.table.remove(self.seq);
    }
}
