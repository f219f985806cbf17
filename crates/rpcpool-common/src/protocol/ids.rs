//! Out-of-band job identifiers.
//!
//! A worker pool never lets the caller's id reach its bookkeeping. Each job
//! gets a pool-internal reference and the request that crosses into an
//! execution unit carries a [`JobIds`] record as its first positional
//! parameter. The execution unit swaps the external id in for the duration
//! of the handler call and swaps the job reference back before replying.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::error::{PoolError, Result};
use crate::protocol::jsonrpc::{Request, Response};

/// Pool-internal correlation key for one dispatched job.
pub type JobRef = u64;

/// Identifiers carried in front of the caller arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobIds {
    /// Id chosen by the original caller
    pub external_message_identifier: Value,
    /// Identity of the worker the job was assigned to
    pub employee_number: usize,
    /// Pool-internal job reference
    pub internal_job_ref: JobRef,
}

impl JobIds {
    pub fn new(external_id: Value, worker: usize, job_ref: JobRef) -> Self {
        Self {
            external_message_identifier: external_id,
            employee_number: worker,
            internal_job_ref: job_ref,
        }
    }

    /// Reads the ids record from the first positional parameter.
    pub fn from_request(request: &Request) -> Result<Self> {
        let first = request.positional().first().ok_or_else(|| {
            PoolError::InvalidRequest(format!(
                "request '{}' carries no job ids parameter",
                request.method
            ))
        })?;
        Ok(serde_json::from_value(first.clone())?)
    }

    /// Builds the params array sent to an execution unit: ids first, then
    /// the caller arguments.
    pub fn prepend_to(&self, args: Vec<Value>) -> Result<Value> {
        let mut params = Vec::with_capacity(args.len() + 1);
        params.push(serde_json::to_value(self)?);
        params.extend(args);
        Ok(Value::Array(params))
    }
}

/// Anything with an envelope id.
pub trait Identified {
    fn id_mut(&mut self) -> &mut Value;
}

impl Identified for Request {
    fn id_mut(&mut self) -> &mut Value {
        &mut self.id
    }
}

impl Identified for Response {
    fn id_mut(&mut self) -> &mut Value {
        &mut self.id
    }
}

/// Replaces the envelope id and returns the one it held before.
pub fn swap_id<T: Identified>(new_id: Value, envelope: &mut T) -> Value {
    std::mem::replace(envelope.id_mut(), new_id)
}
