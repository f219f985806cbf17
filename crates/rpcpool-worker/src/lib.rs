//! rpcpool Worker
//!
//! Thread-backed worker pool. Jobs are routed to execution units by a
//! [`DispatchStrategy`], each unit runs commands from a [`CommandRegistry`]
//! on its own OS thread, and completions are correlated back to callers by
//! a pool-internal job reference.

pub mod commands;
pub mod execution_unit;
pub mod pool;
pub mod registry;
pub mod runner;
pub mod strategy;

pub use commands::builtin_registry;
pub use execution_unit::{Completion, WorkerExecutionUnit};
pub use pool::{resolve_pool_size, PoolConfig, WorkerPool};
pub use registry::{Command, CommandError, CommandRegistry, Invocation, Registry};
pub use runner::RecordRunner;
pub use strategy::{DispatchStrategy, Selector};
