//! Configuration resolution
//!
//! Every setting comes from one of three layers: the command line, the
//! environment and the built-in defaults. Outside Docker the command line
//! wins over the environment; with `RUNNING_IN_DOCKER=true` the order of
//! those two flips. Defaults always lose. Empty strings count as absent.

use rpcpool_worker::DispatchStrategy;
use serde::Serialize;
use serde_json::{json, Value};

/// Built-in values used when neither layer provides one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Defaults {
    pub http_endpoint: String,
    pub http_port: String,
    pub actor_endpoint: String,
    pub actor_port: String,
    pub threads: i64,
    pub strategy: String,
    pub job_timeout_ms: u64,
    pub reconnect_delay_ms: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            http_endpoint: "0.0.0.0".to_string(),
            http_port: "8010".to_string(),
            actor_endpoint: "0.0.0.0".to_string(),
            actor_port: "7010".to_string(),
            threads: 4,
            strategy: DispatchStrategy::RoundRobin.name().to_string(),
            job_timeout_ms: 30_000,
            reconnect_delay_ms: 5_000,
        }
    }
}

/// Values read from the environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnvValues {
    pub http_endpoint: Option<String>,
    pub http_port: Option<String>,
    pub actor_endpoint: Option<String>,
    pub actor_port: Option<String>,
    pub threads: Option<String>,
    pub strategy: Option<String>,
    pub running_in_docker: bool,
}

impl EnvValues {
    /// Reads the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads through `lookup`, so callers can supply their own environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());
        Self {
            http_endpoint: get("HTTP_ENDPOINT"),
            http_port: get("HTTP_PORT"),
            actor_endpoint: get("ACTOR_ENDPOINT"),
            actor_port: get("ACTOR_PORT"),
            threads: get("ACTOR_THREADS"),
            strategy: get("ACTOR_STRATEGY"),
            running_in_docker: get("RUNNING_IN_DOCKER").as_deref() == Some("true"),
        }
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArgValues {
    /// `host:port` of the HTTP entry point
    pub http: Option<String>,
    /// `host:port` of the actor socket
    pub actor: Option<String>,
    pub threads: Option<i64>,
    pub strategy: Option<String>,
}

/// Final configuration after applying the priority rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolved {
    pub http_endpoint: String,
    pub http_port: String,
    pub actor_endpoint: String,
    pub actor_port: String,
    pub threads: i64,
    /// Strategy name as configured, possibly unknown
    pub strategy_raw: String,
    /// Strategy the worker pool will actually use
    #[serde(serialize_with = "serialize_strategy")]
    pub strategy: DispatchStrategy,
    pub running_in_docker: bool,
}

fn serialize_strategy<S: serde::Serializer>(strategy: &DispatchStrategy, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(strategy.name())
}

impl Resolved {
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_endpoint, self.http_port)
    }

    pub fn actor_addr(&self) -> String {
        format!("{}:{}", self.actor_endpoint, self.actor_port)
    }
}

/// Splits `host:port` on its last colon. A missing half is absent.
fn split_host_port(value: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(value) = value else {
        return (None, None);
    };
    let (host, port) = match value.rsplit_once(':') {
        Some((host, port)) => (host, port),
        None => (value, ""),
    };
    let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
    (non_empty(host), non_empty(port))
}

/// Picks between the environment and the command line, then the default.
fn pick<T>(in_docker: bool, env: Option<T>, arg: Option<T>, default: T) -> T {
    let chosen = if in_docker { env.or(arg) } else { arg.or(env) };
    chosen.unwrap_or(default)
}

/// Applies the priority rule to every setting.
pub fn resolve(defaults: &Defaults, env: &EnvValues, args: &ArgValues) -> Resolved {
    let docker = env.running_in_docker;
    let (http_host, http_port) = split_host_port(args.http.as_deref());
    let (actor_host, actor_port) = split_host_port(args.actor.as_deref());

    let env_threads = env.threads.as_deref().and_then(|t| t.trim().parse::<i64>().ok());
    let arg_strategy = args.strategy.clone().filter(|s| !s.is_empty());
    let strategy_raw = pick(docker, env.strategy.clone(), arg_strategy, defaults.strategy.clone());

    Resolved {
        http_endpoint: pick(docker, env.http_endpoint.clone(), http_host, defaults.http_endpoint.clone()),
        http_port: pick(docker, env.http_port.clone(), http_port, defaults.http_port.clone()),
        actor_endpoint: pick(docker, env.actor_endpoint.clone(), actor_host, defaults.actor_endpoint.clone()),
        actor_port: pick(docker, env.actor_port.clone(), actor_port, defaults.actor_port.clone()),
        threads: pick(docker, env_threads, args.threads, defaults.threads),
        strategy: DispatchStrategy::from_name(&strategy_raw),
        strategy_raw,
        running_in_docker: docker,
    }
}

/// Payload served on `/server/infos`.
pub fn infos(defaults: &Defaults, env: &EnvValues, args: &ArgValues, resolved: &Resolved) -> Value {
    json!({
        "defaults": defaults,
        "env": env,
        "args": args,
        "is_in_docker": resolved.running_in_docker,
        "defined": resolved,
    })
}
