mod commands;
mod config;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use kvlock::{LockManager, LockMode};
use tracing_subscriber::EnvFilter;

use crate::commands::lock::LockArgs;
use crate::config::CliConfig;

#[derive(Parser)]
#[command(name = "kvlock", version, about = "Distributed lock tool for Redis")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, global = true, env = "KVLOCK_CONFIG")]
    config: Option<PathBuf>,

    /// Redis URL; repeat for a quorum lock over several instances.
    #[arg(long = "redis", global = true, env = "KVLOCK_REDIS", value_delimiter = ',')]
    backends: Vec<String>,

    /// Key namespace shared by every backend.
    #[arg(long, global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ping every configured backend.
    Health {
        /// Overall time budget in milliseconds.
        #[arg(long, default_value_t = 2000)]
        timeout_ms: u64,
    },
    /// Acquire, hold and release a lock on the first backend.
    Acquire(LockArgs),
    /// Acquire, hold and release a lock on a majority of backends.
    Quorum(LockArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let file = match &cli.config {
        Some(path) => CliConfig::load(path)?,
        None => CliConfig::default(),
    };
    let urls = file.backend_urls(&cli.backends);
    let backends = kvlock_redis::connect_all(&urls, &file.redis_template(cli.namespace.as_deref()))?;
    let manager = LockManager::new(backends)?.with_defaults(file.lock_defaults());

    match cli.command {
        Command::Health { timeout_ms } => {
            commands::health::run(&manager, Duration::from_millis(timeout_ms)).await
        }
        Command::Acquire(args) => commands::lock::run(&manager, &args, LockMode::Single).await,
        Command::Quorum(args) => commands::lock::run(&manager, &args, LockMode::Quorum).await,
    }
}
