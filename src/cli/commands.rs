use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::app::{build_router, frontend_cors, AppState, Backends};
use crate::auth::{GoogleProvider, ProviderRegistry};
use crate::config::{AppConfig, DatabaseConfig, RedisConfig};
use crate::router::Router;
use crate::server::{AppService, HttpServer, ShutdownTrigger};

/// Command-line interface for the Todo API server
#[derive(Parser, Debug)]
#[command(name = "todo-api", version)]
#[command(about = "Todo API server", long_about = None)]
pub struct Cli {
    /// Defaults to `serve`
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the HTTP server
    Serve {
        /// Bind address; defaults to 0.0.0.0 on BACKEND_CONTAINER_PORT
        #[arg(long, env = "TODO_ADDR")]
        addr: Option<SocketAddr>,
    },
    /// Print the route table in match order and exit
    Routes,
}

/// Execute the parsed command.
///
/// # Errors
///
/// Configuration, backend connection and bind failures.
pub fn run_cli(cli: Cli) -> Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    match cli.command.unwrap_or(Commands::Serve { addr: None }) {
        Commands::Routes => {
            let router = assemble(&config, &Backends::in_memory())?;
            router.dump_routes();
            Ok(())
        }
        Commands::Serve { addr } => {
            let addr = addr.unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], config.port)));
            serve(&config, addr)
        }
    }
}

fn serve(config: &AppConfig, addr: SocketAddr) -> Result<()> {
    if config.session_secret.is_generated() {
        warn!("SESSION_SECRET not set; using a random key, sessions end on restart");
    }

    let mut backends = Backends::in_memory();
    let closer = match &config.database {
        Some(db) => Some(open_database(db, &mut backends)?),
        None => {
            info!("POSTGRES_HOST not set; using the in-memory store");
            None
        }
    };
    match &config.redis {
        Some(redis) => open_sessions(redis, &mut backends)?,
        None => info!("REDIS_HOST not set; using in-memory sessions"),
    }

    let router = Arc::new(assemble(config, &backends)?);
    for route in router.routes() {
        info!(method = %route.method(), template = %route.template(), "Route");
    }

    let handle = HttpServer::new(AppService::new(router), config.workers)
        .start(addr)
        .with_context(|| format!("failed to bind {addr}"))?;
    watch_signals(handle.shutdown_trigger())?;

    let joined = handle.join();
    if let Some(close) = closer {
        close();
    }
    joined.map_err(|_| anyhow!("an HTTP worker panicked"))
}

/// Wire state, providers and middleware into a router.
fn assemble(config: &AppConfig, backends: &Backends) -> Result<Router> {
    let mut providers = ProviderRegistry::new();
    match &config.google {
        Some(creds) => {
            providers.register(Arc::new(GoogleProvider::new(creds.clone())?));
        }
        None => warn!("Google OAuth not configured; login is disabled"),
    }

    let state = Arc::new(AppState::new(backends, providers, config)?);
    let cors = frontend_cors(&config.frontend_url)?;
    Ok(build_router(state, cors)?)
}

type Closer = Box<dyn FnOnce()>;

#[cfg(feature = "postgres")]
fn open_database(db: &DatabaseConfig, backends: &mut Backends) -> Result<Closer> {
    let store = Arc::new(
        crate::store::PgStore::connect(db)
            .with_context(|| format!("failed to connect to PostgreSQL at {}:{}", db.host, db.port))?,
    );
    store.migrate().context("failed to apply database schema")?;
    backends.todos = store.clone();
    backends.users = store.clone();
    backends.tx = store.clone();
    Ok(Box::new(move || store.close()))
}

#[cfg(not(feature = "postgres"))]
fn open_database(db: &DatabaseConfig, _backends: &mut Backends) -> Result<Closer> {
    Err(anyhow!(
        "POSTGRES_HOST={} is set but this build lacks the `postgres` feature",
        db.host
    ))
}

#[cfg(feature = "redis")]
fn open_sessions(redis: &RedisConfig, backends: &mut Backends) -> Result<()> {
    let store = crate::auth::RedisSessionStore::connect(&redis.url())
        .with_context(|| format!("failed to connect to Redis at {}:{}", redis.host, redis.port))?;
    backends.sessions = Arc::new(store);
    info!(host = %redis.host, port = redis.port, "Redis session store ready");
    Ok(())
}

#[cfg(not(feature = "redis"))]
fn open_sessions(redis: &RedisConfig, _backends: &mut Backends) -> Result<()> {
    Err(anyhow!(
        "REDIS_HOST={} is set but this build lacks the `redis` feature",
        redis.host
    ))
}

#[cfg(unix)]
fn watch_signals(trigger: ShutdownTrigger) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("failed to install signal handlers")?;
    std::thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                info!(signal, "Shutdown signal received");
                trigger.trigger();
            }
        })
        .context("failed to spawn signal thread")?;
    Ok(())
}

#[cfg(not(unix))]
fn watch_signals(_trigger: ShutdownTrigger) -> Result<()> {
    Ok(())
}
