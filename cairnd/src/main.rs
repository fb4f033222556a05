//! Cairn Daemon
//!
//! Runs one named pipeline over the event log until interrupted.
//!
//! # Usage
//!
//! ```bash
//! # Start with default configuration (in-memory store)
//! cargo run -p cairnd
//!
//! # Against PostgreSQL
//! DATABASE_URL=postgres://localhost/cairn cargo run -p cairnd --features postgres
//!
//! # Database maintenance
//! cargo run -p cairnd --features postgres -- db migrate
//! ```
//!
//! # Environment Variables
//!
//! - `CAIRN_ENV`: Environment (test, development, production)
//! - `CAIRN_PIPELINE_NAME`: Checkpoint name (default: default)
//! - `CAIRN_BATCH_SIZE`: Events per fetch (default: 100)
//! - `CAIRN_CHECKPOINT_THRESHOLD`: Progress between checkpoints (default: 50)
//! - `CAIRN_WORKERS`: Concurrent handlers (default: 8)
//! - `CAIRN_MAX_IN_FLIGHT`: Fetched-but-unfinished limit (default: 1000)
//! - `CAIRN_POLL_INTERVAL_MS`: Idle poll interval (default: 200)
//! - `CAIRN_DRAIN_TIMEOUT_MS`: Shutdown drain limit (default: 30000)
//! - `CAIRN_STALL_WARNING_MS`: Held frontier before a stall warning (default: 30000)
//! - `CAIRN_LOG_FORMAT`: pretty or json (default: pretty)
//! - `DATABASE_URL`: PostgreSQL connection (requires the `postgres` feature)

use cairnd::{Config, Daemon, LogFormat};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(config.log_format)?;

    if args.get(1).map(String::as_str) == Some("db") {
        return run_db(args).await;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        pipeline = %config.pipeline.name,
        "Cairn Daemon"
    );

    let summary = run_daemon(config).await?;
    info!(
        fetched = summary.fetched,
        processed = summary.processed,
        failed = summary.failed,
        stall_warnings = summary.stall_warnings,
        "Shutdown complete"
    );

    Ok(())
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("cairnd=info".parse()?)
        .add_directive("cairn_pipeline=info".parse()?);

    match format {
        LogFormat::Json => tracing_subscriber::registry().with(filter).with(fmt::layer().json()).init(),
        LogFormat::Pretty => tracing_subscriber::registry().with(filter).with(fmt::layer()).init(),
    }

    Ok(())
}

#[cfg(feature = "postgres")]
async fn run_daemon(config: Config) -> anyhow::Result<cairn_pipeline::StatsSnapshot> {
    if config.database_url.is_some() {
        return Ok(Daemon::connect(config).await?.run().await?);
    }

    warn!("DATABASE_URL not set, using in-memory store");
    Ok(Daemon::new_memory(config).run().await?)
}

#[cfg(not(feature = "postgres"))]
async fn run_daemon(config: Config) -> anyhow::Result<cairn_pipeline::StatsSnapshot> {
    if config.database_url.is_some() {
        warn!("DATABASE_URL ignored: built without the `postgres` feature");
    }

    Ok(Daemon::new_memory(config).run().await?)
}

#[cfg(feature = "postgres")]
async fn run_db(args: Vec<String>) -> anyhow::Result<()> {
    cairnd::db::run_db_command(args).await
}

#[cfg(not(feature = "postgres"))]
async fn run_db(_args: Vec<String>) -> anyhow::Result<()> {
    anyhow::bail!("db commands require the `postgres` feature")
}
