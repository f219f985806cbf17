//! # rpcpool CLI Entry Point
//!
//! ```bash
//! # Server with a local worker pool of 4 threads
//! rpcpool server --http 0.0.0.0:8010 --actor 0.0.0.0:7010 --threads 4
//!
//! # Remote actor using least-busy worker selection
//! rpcpool actor --connect 127.0.0.1:7010 --strategy leastbusy
//!
//! # Dispatch a command
//! curl http://127.0.0.1:8010/worker/hello-world/a/b
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use argh::FromArgs;
use rpcpool_actor::{ActorClient, ReconnectPolicy};
use rpcpool_cli::config::{self, ArgValues, Defaults, EnvValues, Resolved};
use rpcpool_server::ServerConfig;
use rpcpool_worker::{builtin_registry, PoolConfig, WorkerPool};

#[derive(FromArgs)]
/// rpcpool - HTTP to worker thread dispatch over local and remote actors
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Server(ServerArgs),
    Actor(ActorArgs),
}

/// Arguments for starting a dispatch server.
///
/// Unless `--no-local-actor` is given the server also runs its own worker
/// pool, so it can answer requests before any remote actor connects.
#[derive(FromArgs)]
#[argh(subcommand, name = "server")]
/// start a dispatch server
struct ServerArgs {
    /// HTTP address as host:port (default 0.0.0.0:8010)
    #[argh(option)]
    http: Option<String>,

    /// address actors connect to as host:port (default 0.0.0.0:7010)
    #[argh(option)]
    actor: Option<String>,

    /// worker threads of the local pool; 0 uses every core, a negative
    /// value leaves that many cores free (default 4)
    #[argh(option)]
    threads: Option<i64>,

    /// worker selection: roundrobin, random or leastbusy
    #[argh(option)]
    strategy: Option<String>,

    /// deadline of a single job in milliseconds, 0 disables it
    #[argh(option)]
    job_timeout_ms: Option<u64>,

    /// do not run a worker pool inside the server
    #[argh(switch)]
    no_local_actor: bool,
}

/// Arguments for starting a remote actor.
#[derive(FromArgs)]
#[argh(subcommand, name = "actor")]
/// start a remote actor
struct ActorArgs {
    /// server actor address as host:port (default 0.0.0.0:7010)
    #[argh(option)]
    connect: Option<String>,

    /// worker threads; same rules as for the server (default 4)
    #[argh(option)]
    threads: Option<i64>,

    /// worker selection: roundrobin, random or leastbusy
    #[argh(option)]
    strategy: Option<String>,

    /// delay between reconnect attempts in milliseconds (default 5000)
    #[argh(option)]
    reconnect_delay_ms: Option<u64>,

    /// deadline of a single job in milliseconds, 0 disables it
    #[argh(option)]
    job_timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Default to INFO, RUST_LOG overrides
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let defaults = Defaults::default();
    let env = EnvValues::from_env();

    match cli.command {
        Commands::Server(args) => run_server(args, defaults, env).await,
        Commands::Actor(args) => run_actor(args, defaults, env).await,
    }
}

fn job_timeout(requested: Option<u64>, defaults: &Defaults) -> Option<Duration> {
    match requested.unwrap_or(defaults.job_timeout_ms) {
        0 => None,
        ms => Some(Duration::from_millis(ms)),
    }
}

fn worker_pool(resolved: &Resolved, job_timeout: Option<Duration>) -> Result<Arc<WorkerPool>> {
    let config = PoolConfig::default()
        .with_size(resolved.threads)
        .with_strategy(resolved.strategy)
        .with_job_timeout(job_timeout);
    Ok(Arc::new(WorkerPool::new(config, Arc::new(builtin_registry()))?))
}

async fn run_server(args: ServerArgs, defaults: Defaults, env: EnvValues) -> Result<()> {
    let arg_values = ArgValues {
        http: args.http,
        actor: args.actor,
        threads: args.threads,
        strategy: args.strategy,
    };
    let resolved = config::resolve(&defaults, &env, &arg_values);
    if resolved.strategy.name() != resolved.strategy_raw {
        tracing::warn!(
            "Unknown strategy '{}', using {}",
            resolved.strategy_raw,
            resolved.strategy
        );
    }

    let local_pool = if args.no_local_actor {
        tracing::info!("Local actor disabled");
        None
    } else {
        Some(worker_pool(&resolved, job_timeout(args.job_timeout_ms, &defaults))?)
    };

    let server_config = ServerConfig {
        http_addr: resolved.http_addr(),
        actor_addr: resolved.actor_addr(),
        infos: config::infos(&defaults, &env, &arg_values, &resolved),
        ..ServerConfig::default()
    };

    let running = rpcpool_server::start(server_config, local_pool).await?;
    tracing::info!(
        "Serving HTTP on {} and actors on {}",
        running.http_addr,
        running.actor_addr
    );
    running.wait().await;
    Ok(())
}

async fn run_actor(args: ActorArgs, defaults: Defaults, env: EnvValues) -> Result<()> {
    let arg_values = ArgValues {
        actor: args.connect,
        threads: args.threads,
        strategy: args.strategy,
        ..ArgValues::default()
    };
    let resolved = config::resolve(&defaults, &env, &arg_values);

    let pool = worker_pool(&resolved, job_timeout(args.job_timeout_ms, &defaults))?;
    let policy = ReconnectPolicy {
        delay: Duration::from_millis(args.reconnect_delay_ms.unwrap_or(defaults.reconnect_delay_ms)),
    };

    let client = Arc::new(ActorClient::new(resolved.actor_addr(), pool, policy));
    tracing::info!("Actor connecting to {}", client.server_addr());

    let runner = client.clone();
    let task = tokio::spawn(async move { runner.run().await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down actor");
    client.shutdown();
    task.await?;
    Ok(())
}
