//! Built-in commands registered by the binaries.

use std::time::{Duration, Instant};

use serde_json::{json, Value};

use crate::registry::{Invocation, Registry};

/// Milliseconds `delay` sleeps when no argument is given.
const DEFAULT_DELAY_MS: u64 = 100;

/// Registry preloaded with `hello-world` and `delay`.
pub fn builtin_registry() -> Registry {
    Registry::new()
        .register("hello-world", hello_world)
        .register("delay", delay)
}

/// Echoes the caller arguments back together with the worker identity.
fn hello_world(invocation: &Invocation) -> anyhow::Result<Value> {
    tracing::debug!(args = ?invocation.args, "hello-world");
    Ok(json!({
        "echo": invocation.args,
        "worker": invocation.ids.employee_number,
    }))
}

/// Blocks the worker thread for `args[0]` milliseconds, then echoes.
fn delay(invocation: &Invocation) -> anyhow::Result<Value> {
    let millis = match invocation.arg_str(0) {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|e| anyhow::anyhow!("delay expects milliseconds, got '{}': {}", raw, e))?,
        None => DEFAULT_DELAY_MS,
    };

    let started = Instant::now();
    std::thread::sleep(Duration::from_millis(millis));

    Ok(json!({
        "delayed_ms": started.elapsed().as_millis() as u64,
        "echo": invocation.args,
        "worker": invocation.ids.employee_number,
    }))
}
