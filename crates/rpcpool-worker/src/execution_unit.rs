use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use rpcpool_common::protocol::{swap_id, JobIds, Request, Response, RpcError};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::registry::{CommandError, CommandRegistry};

/// A response travelling back from an execution unit to its pool.
#[derive(Debug)]
pub struct Completion {
    /// Identity of the unit that produced the response
    pub worker: usize,
    /// Response whose id is the pool's job reference
    pub response: Response,
}

/// Runs commands on a dedicated thread.
///
/// Every request carries the pool's job reference as its id. The unit swaps
/// the caller's id in while the handler runs, so handlers and error
/// responses only ever see the external id, then swaps the job reference
/// back before the response leaves the thread.
pub struct WorkerExecutionUnit {
    identity: usize,
    registry: Arc<dyn CommandRegistry>,
}

impl WorkerExecutionUnit {
    pub fn new(identity: usize, registry: Arc<dyn CommandRegistry>) -> Self {
        Self { identity, registry }
    }

    pub fn identity(&self) -> usize {
        self.identity
    }

    /// Handles one request and always produces a response.
    pub fn handle(&self, mut request: Request) -> Response {
        let ids = match JobIds::from_request(&request) {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(worker = self.identity, "Request without job ids: {}", e);
                return Response::error(request.id, RpcError::invalid_params(&e.to_string()));
            }
        };

        let job_ref = swap_id(ids.external_message_identifier, &mut request);
        let method = request.method.clone();

        let outcome = catch_unwind(AssertUnwindSafe(|| self.registry.invoke(&method, &request)));
        let result = match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(CommandError::NotFound(name))) => Err(RpcError::method_not_found(&name)),
            Ok(Err(CommandError::InvalidParams(detail))) => Err(RpcError::invalid_params(&detail)),
            Ok(Err(CommandError::Failed(err))) => {
                tracing::warn!(worker = self.identity, %method, "Command failed: {:#}", err);
                Err(RpcError::internal_error(&format!("{:#}", err)))
            }
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                tracing::error!(worker = self.identity, %method, "Command panicked: {}", detail);
                Err(RpcError::internal_error(&detail))
            }
        };

        let mut response = Response::from_result(request.id, result);
        swap_id(job_ref, &mut response);
        response
    }

    /// Serves requests until the pool drops its sender.
    pub(crate) fn run(self, mut inbox: UnboundedReceiver<Request>, outbox: UnboundedSender<Completion>) {
        let span = tracing::debug_span!("worker", identity = self.identity);
        let _entered = span.enter();
        tracing::debug!("Execution unit started");

        while let Some(request) = inbox.blocking_recv() {
            let response = self.handle(request);
            let completion = Completion {
                worker: self.identity,
                response,
            };
            if outbox.send(completion).is_err() {
                tracing::debug!("Pool stopped listening; execution unit exiting");
                return;
            }
        }

        tracing::debug!("Execution unit stopped");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "command panicked".to_string()
    }
}
