use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use rpcpool_common::protocol::error::{PoolError, Result};
use rpcpool_common::protocol::{JobIds, JobRef, Request, Response, RpcError};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::execution_unit::{Completion, WorkerExecutionUnit};
use crate::registry::CommandRegistry;
use crate::strategy::{DispatchStrategy, Selector};

/// Configuration for a worker pool
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Requested worker count, resolved with [`resolve_pool_size`]
    pub size: i64,
    pub strategy: DispatchStrategy,
    /// Deadline for every dispatched job; `None` waits forever
    pub job_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 4,
            strategy: DispatchStrategy::RoundRobin,
            job_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl PoolConfig {
    pub fn with_size(mut self, size: i64) -> Self {
        self.size = size;
        self
    }

    pub fn with_strategy(mut self, strategy: DispatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout = timeout;
        self
    }
}

/// Turns a requested size into a worker count.
///
/// Positive values are taken as is, zero means host parallelism and a
/// negative value means host parallelism minus its magnitude, floored at 1.
pub fn resolve_pool_size(requested: i64) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    size_for(requested, cores)
}

fn size_for(requested: i64, cores: usize) -> usize {
    match requested {
        n if n > 0 => n as usize,
        0 => cores.max(1),
        n => cores.saturating_sub(n.unsigned_abs() as usize).max(1),
    }
}

/// Caller waiting for one job.
struct PendingJob {
    reply: oneshot::Sender<std::result::Result<Value, RpcError>>,
    external_id: Value,
}

/// One execution unit as seen from the pool.
struct WorkerHandle {
    identity: usize,
    inbox: mpsc::UnboundedSender<Request>,
    in_flight: Mutex<HashMap<JobRef, PendingJob>>,
    _thread: JoinHandle<()>,
}

impl WorkerHandle {
    fn in_flight(&self) -> MutexGuard<'_, HashMap<JobRef, PendingJob>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct PoolInner {
    workers: Vec<WorkerHandle>,
    selector: Selector,
    next_job_ref: AtomicU64,
    job_timeout: Option<Duration>,
}

impl PoolInner {
    fn loads(&self) -> Vec<usize> {
        self.workers.iter().map(|w| w.in_flight().len()).collect()
    }

    /// Settles the pending job a completion refers to.
    fn complete(&self, completion: Completion) {
        let Some(worker) = self.workers.get(completion.worker) else {
            tracing::error!(worker = completion.worker, "Completion from unknown worker; dropping");
            return;
        };

        let Some(job_ref) = completion.response.id.as_u64() else {
            tracing::error!(
                worker = worker.identity,
                id = %completion.response.id,
                "Completion without a job reference; dropping"
            );
            return;
        };

        let Some(pending) = worker.in_flight().remove(&job_ref) else {
            tracing::warn!(
                worker = worker.identity,
                job_ref,
                "No pending job for completion (expired or unknown); dropping"
            );
            return;
        };

        tracing::debug!(worker = worker.identity, job_ref, external_id = %pending.external_id, "Job completed");
        if pending.reply.send(completion.response.into_result()).is_err() {
            tracing::debug!(job_ref, "Caller went away before completion");
        }
    }
}

/// Removes a job's in-flight entry unless the completion path already did.
///
/// Covers timeouts and callers that drop the `exec` future.
struct InFlightGuard<'a> {
    worker: &'a WorkerHandle,
    job_ref: JobRef,
    armed: bool,
}

impl InFlightGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.worker.in_flight().remove(&self.job_ref).is_some() {
            tracing::debug!(worker = self.worker.identity, job_ref = self.job_ref, "Abandoned job released");
        }
    }
}

/// Fixed set of worker threads fed through a dispatch strategy.
///
/// Each job gets a pool-internal reference that keys the chosen worker's
/// in-flight table. The caller's id travels alongside it in a [`JobIds`]
/// record and is restored on the way out, so caller ids may repeat or
/// collide without confusing the bookkeeping.
///
/// Must be created inside a tokio runtime: completions from all workers are
/// drained by one task on that runtime.
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// Spawns the worker threads and the completion task.
    pub fn new(config: PoolConfig, registry: Arc<dyn CommandRegistry>) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PoolError::Transport(format!("Worker pool needs a tokio runtime: {}", e)))?;

        let size = resolve_pool_size(config.size);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        let mut workers = Vec::with_capacity(size);
        for identity in 0..size {
            let (inbox, requests) = mpsc::unbounded_channel();
            let unit = WorkerExecutionUnit::new(identity, registry.clone());
            let outbox = completions_tx.clone();
            let thread = std::thread::Builder::new()
                .name(format!("rpcpool-worker-{}", identity))
                .spawn(move || unit.run(requests, outbox))?;

            workers.push(WorkerHandle {
                identity,
                inbox,
                in_flight: Mutex::new(HashMap::new()),
                _thread: thread,
            });
        }
        drop(completions_tx);

        let inner = Arc::new(PoolInner {
            workers,
            selector: Selector::new(config.strategy),
            next_job_ref: AtomicU64::new(1),
            job_timeout: config.job_timeout,
        });

        runtime.spawn(drain_completions(Arc::downgrade(&inner), completions_rx));

        tracing::info!(workers = size, strategy = %config.strategy, "Worker pool started");
        Ok(Self { inner })
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.inner.workers.len()
    }

    pub fn strategy(&self) -> DispatchStrategy {
        self.inner.selector.strategy()
    }

    /// Current in-flight count per worker, by identity.
    pub fn in_flight_counts(&self) -> Vec<usize> {
        self.inner.loads()
    }

    /// Runs `command` on a worker and waits for its result.
    ///
    /// `external_id` is the caller's id; handlers see it as the request id.
    pub async fn exec(
        &self,
        command: &str,
        external_id: Value,
        args: Vec<Value>,
    ) -> std::result::Result<Value, RpcError> {
        self.dispatch(command, external_id, args)
            .await
            .map_err(|e| match e {
                DispatchFailure::Rpc(err) => err,
                DispatchFailure::Pool(err) => RpcError::from(err),
            })
    }

    /// Same as [`WorkerPool::exec`] for a pre-built request.
    ///
    /// Array params become the argument list; any other non-null params
    /// value is passed as a single argument. The response id is always the
    /// request id.
    pub async fn exec_rpc(&self, request: Request) -> Response {
        let args = match request.params {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        };
        let result = self.exec(&request.method, request.id.clone(), args).await;
        Response::from_result(request.id, result)
    }

    async fn dispatch(
        &self,
        command: &str,
        external_id: Value,
        args: Vec<Value>,
    ) -> std::result::Result<Value, DispatchFailure> {
        let inner = &self.inner;
        let job_ref = inner.next_job_ref.fetch_add(1, Ordering::Relaxed);
        let index = inner.selector.select(&inner.loads());
        let worker = &inner.workers[index];

        let params = JobIds::new(external_id.clone(), worker.identity, job_ref).prepend_to(args)?;
        let request = Request::new(job_ref, command, params);

        let (reply, receiver) = oneshot::channel();
        worker.in_flight().insert(job_ref, PendingJob { reply, external_id });
        let mut guard = InFlightGuard {
            worker,
            job_ref,
            armed: true,
        };

        tracing::debug!(worker = worker.identity, job_ref, %command, "Dispatching job");
        if worker.inbox.send(request).is_err() {
            return Err(PoolError::Connection(format!("worker {} is not running", worker.identity)).into());
        }

        let received = match inner.job_timeout {
            Some(limit) => match tokio::time::timeout(limit, receiver).await {
                Ok(received) => received,
                Err(_) => {
                    tracing::warn!(worker = worker.identity, job_ref, %command, "Job timed out");
                    return Err(PoolError::Timeout(limit.as_millis() as u64).into());
                }
            },
            None => receiver.await,
        };

        guard.disarm();
        match received {
            Ok(result) => result.map_err(DispatchFailure::Rpc),
            Err(_) => Err(PoolError::PoolClosed.into()),
        }
    }
}

enum DispatchFailure {
    Rpc(RpcError),
    Pool(PoolError),
}

impl From<PoolError> for DispatchFailure {
    fn from(err: PoolError) -> Self {
        DispatchFailure::Pool(err)
    }
}

async fn drain_completions(pool: Weak<PoolInner>, mut completions: mpsc::UnboundedReceiver<Completion>) {
    while let Some(completion) = completions.recv().await {
        match pool.upgrade() {
            Some(inner) => inner.complete(completion),
            None => break,
        }
    }
    tracing::debug!("Completion task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Invocation, Registry};
    use serde_json::json;

    fn echo_pool(size: i64, strategy: DispatchStrategy) -> WorkerPool {
        let registry = Registry::new()
            .register("echo", |inv: &Invocation| Ok(Value::Array(inv.args.clone())))
            .register("whoami", |inv: &Invocation| Ok(json!(inv.ids.employee_number)))
            .register("sleep", |inv: &Invocation| {
                let ms = inv.arg_str(0).and_then(|s| s.parse().ok()).unwrap_or(50);
                std::thread::sleep(Duration::from_millis(ms));
                Ok(Value::Null)
            });
        let config = PoolConfig::default().with_size(size).with_strategy(strategy);
        WorkerPool::new(config, Arc::new(registry)).unwrap()
    }

    #[test]
    fn test_size_for_positive() {
        assert_eq!(size_for(3, 8), 3);
    }

    #[test]
    fn test_size_for_zero_uses_cores() {
        assert_eq!(size_for(0, 8), 8);
        assert_eq!(size_for(0, 0), 1);
    }

    #[test]
    fn test_size_for_negative_subtracts_and_floors() {
        assert_eq!(size_for(-2, 8), 6);
        assert_eq!(size_for(-8, 8), 1);
        assert_eq!(size_for(-100, 4), 1);
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let result = WorkerPool::new(PoolConfig::default(), Arc::new(Registry::new()));
        assert!(matches!(result, Err(PoolError::Transport(_))));
    }

    #[tokio::test]
    async fn test_exec_returns_result() {
        let pool = echo_pool(2, DispatchStrategy::RoundRobin);
        let result = pool.exec("echo", json!(1), vec![json!("a"), json!("b")]).await.unwrap();
        assert_eq!(result, json!(["a", "b"]));
        assert_eq!(pool.in_flight_counts(), vec![0, 0]);
    }

    #[tokio::test]
    async fn test_round_robin_spreads_sequential_jobs() {
        let pool = echo_pool(3, DispatchStrategy::RoundRobin);
        let mut seen = Vec::new();
        for i in 0..6 {
            seen.push(pool.exec("whoami", json!(i), vec![]).await.unwrap());
        }
        assert_eq!(seen, vec![json!(0), json!(1), json!(2), json!(0), json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn test_exec_rpc_keeps_caller_id() {
        let pool = echo_pool(2, DispatchStrategy::LeastBusy);
        let response = pool.exec_rpc(Request::new("abc", "echo", json!(["x"]))).await;
        assert_eq!(response.id, json!("abc"));
        assert_eq!(response.into_result().unwrap(), json!(["x"]));
    }

    #[tokio::test]
    async fn test_duplicate_caller_ids_do_not_collide() {
        let pool = Arc::new(echo_pool(2, DispatchStrategy::LeastBusy));
        let a = pool.exec("echo", json!(1), vec![json!("first")]);
        let b = pool.exec("echo", json!(1), vec![json!("second")]);
        let (a, b) = tokio::join!(a, b);
        assert_eq!(a.unwrap(), json!(["first"]));
        assert_eq!(b.unwrap(), json!(["second"]));
    }

    #[tokio::test]
    async fn test_timeout_releases_entry() {
        let registry = Registry::new().register("sleep", |_: &Invocation| {
            std::thread::sleep(Duration::from_millis(300));
            Ok(Value::Null)
        });
        let config = PoolConfig::default()
            .with_size(1)
            .with_job_timeout(Some(Duration::from_millis(50)));
        let pool = WorkerPool::new(config, Arc::new(registry)).unwrap();

        let err = pool.exec("sleep", json!(1), vec![]).await.unwrap_err();
        assert!(err.message.contains("timed out"));
        assert_eq!(pool.in_flight_counts(), vec![0]);

        // late completion is dropped, the pool keeps working
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(pool.in_flight_counts(), vec![0]);
    }

    #[tokio::test]
    async fn test_dropped_caller_releases_entry() {
        let pool = echo_pool(1, DispatchStrategy::RoundRobin);
        let call = pool.exec("sleep", json!(1), vec![json!("200")]);
        let _ = tokio::time::timeout(Duration::from_millis(20), call).await;
        assert_eq!(pool.in_flight_counts(), vec![0]);
    }

    #[tokio::test]
    async fn test_least_busy_avoids_busy_worker() {
        let pool = Arc::new(echo_pool(2, DispatchStrategy::LeastBusy));

        let busy = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.exec("sleep", json!("slow"), vec![json!("200")]).await })
        };
        tokio::task::yield_now().await;
        while pool.in_flight_counts() == vec![0, 0] {
            tokio::task::yield_now().await;
        }
        assert_eq!(pool.in_flight_counts(), vec![1, 0]);

        let who = pool.exec("whoami", json!("fast"), vec![]).await.unwrap();
        assert_eq!(who, json!(1));
        busy.await.unwrap().unwrap();
    }
}
