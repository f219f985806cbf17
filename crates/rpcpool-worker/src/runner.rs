use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rpcpool_common::protocol::{ActorReply, DispatchRecord};
use serde_json::Value;

use crate::pool::WorkerPool;

/// Executes dispatch records on a worker pool and builds actor replies.
///
/// Shared by the server's in-process actor and by remote actor clients so
/// both produce the same reply shape and timing metadata.
pub struct RecordRunner {
    pool: Arc<WorkerPool>,
    label: String,
    completed: AtomicU64,
}

impl RecordRunner {
    /// `label` names the actor in the `pid` field of every reply.
    pub fn new(pool: Arc<WorkerPool>, label: impl Into<String>) -> Self {
        Self {
            pool,
            label: label.into(),
            completed: AtomicU64::new(0),
        }
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Replies produced so far.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Runs one record. Failures are carried in the reply, never returned.
    pub async fn run(&self, record: DispatchRecord) -> ActorReply {
        let started = Instant::now();
        let args = record.args.into_iter().map(Value::String).collect();
        let result = self
            .pool
            .exec(&record.command_name, Value::from(record.message_seq), args)
            .await;
        let performance = started.elapsed().as_secs_f64() * 1000.0;
        let tracking = self.completed.fetch_add(1, Ordering::Relaxed) + 1;

        tracing::debug!(
            actor = %self.label,
            message_seq = record.message_seq,
            command = %record.command_name,
            ok = result.is_ok(),
            "performance: {:.2} ms",
            performance
        );

        ActorReply::new(
            record.message_seq,
            result,
            format!("{} at process: {}", self.label, std::process::id()),
            performance,
        )
        .with_tracking(tracking)
    }
}
