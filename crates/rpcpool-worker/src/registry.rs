//! Command registry
//!
//! Execution units resolve a method name to a handler through the
//! [`CommandRegistry`] capability. Handlers are plain Rust values registered
//! at startup; the registry never escapes a failure as a panic to its caller
//! and reports problems as [`CommandError`]s instead.

use std::collections::HashMap;
use std::sync::Arc;

use rpcpool_common::protocol::{JobIds, Request};
use serde_json::Value;
use thiserror::Error;

/// Failure of a registry lookup or a handler call.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("method not found: {0}")]
    NotFound(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Method-name to handler lookup used by execution units.
pub trait CommandRegistry: Send + Sync + 'static {
    /// Runs `method` for `request` and returns its result value.
    fn invoke(&self, method: &str, request: &Request) -> Result<Value, CommandError>;
}

/// Everything a command sees about the job it runs.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Id chosen by the original caller
    pub id: Value,
    pub ids: JobIds,
    /// Caller arguments, without the ids record
    pub args: Vec<Value>,
}

impl Invocation {
    /// Argument `index` as a string, if present.
    pub fn arg_str(&self, index: usize) -> Option<String> {
        self.args.get(index).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// A single named command.
pub trait Command: Send + Sync {
    fn call(&self, invocation: &Invocation) -> anyhow::Result<Value>;
}

impl<F> Command for F
where
    F: Fn(&Invocation) -> anyhow::Result<Value> + Send + Sync,
{
    fn call(&self, invocation: &Invocation) -> anyhow::Result<Value> {
        self(invocation)
    }
}

/// Registry backed by a map of named commands.
#[derive(Default, Clone)]
pub struct Registry {
    commands: HashMap<String, Arc<dyn Command>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a closure under `name`, replacing any previous entry.
    pub fn register<F>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Invocation) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.register_command(name, handler)
    }

    /// Registers a [`Command`] value under `name`.
    pub fn register_command(mut self, name: impl Into<String>, command: impl Command + 'static) -> Self {
        self.commands.insert(name.into(), Arc::new(command));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.keys().cloned().collect();
        names.sort();
        names
    }
}

impl CommandRegistry for Registry {
    fn invoke(&self, method: &str, request: &Request) -> Result<Value, CommandError> {
        let command = self
            .commands
            .get(method)
            .ok_or_else(|| CommandError::NotFound(method.to_string()))?;

        let ids = JobIds::from_request(request)
            .map_err(|e| CommandError::InvalidParams(e.to_string()))?;
        let args = request.positional().iter().skip(1).cloned().collect();

        let invocation = Invocation {
            id: request.id.clone(),
            ids,
            args,
        };
        Ok(command.call(&invocation)?)
    }
}
