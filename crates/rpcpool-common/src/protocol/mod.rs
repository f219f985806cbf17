pub mod error;
pub mod ids;
pub mod jsonrpc;
pub mod wire;

pub use error::{PoolError, Result};
pub use ids::{swap_id, JobIds, JobRef};
pub use jsonrpc::{Outcome, Request, Response, RpcError, JSONRPC_VERSION};
pub use wire::{ActorReply, DispatchRecord, MessageSeq};
