//! MangaHub CLI - chat with other readers from the terminal.
//!
//! This is the main binary entry point. See the `mangahub` library for the
//! chat client itself.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mangahub::{commands, Config};
use mimalloc::MiMalloc;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// How long runtime shutdown waits for blocking tasks.
///
/// A pending stdin read can't be cancelled, so waiting for it would hang.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(200);

// CLI
#[derive(Parser)]
#[command(name = "mangahub")]
#[command(version)]
#[command(about = "MangaHub command-line client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Join the chat (general room, or a manga discussion room)
    Join {
        /// Manga to discuss; omit for the general room
        #[arg(long)]
        manga_id: Option<String>,
    },
    /// Print recent chat messages without joining
    History {
        /// Manga room; omit for the general room
        #[arg(long)]
        manga_id: Option<String>,
        /// Number of messages (defaults to the configured history_limit)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show or change configuration
    Config {
        /// Key to show or set (server_url, history_limit)
        key: Option<String>,
        /// New value for the key
        value: Option<String>,
    },
}

/// Log destination: MANGAHUB_LOG_FILE, else the config dir, else /tmp.
fn log_path() -> PathBuf {
    if let Ok(path) = std::env::var("MANGAHUB_LOG_FILE") {
        PathBuf::from(path)
    } else if let Ok(config_dir) = Config::config_dir() {
        config_dir.join("mangahub.log")
    } else {
        PathBuf::from("/tmp/mangahub.log")
    }
}

fn init_logging() -> Result<()> {
    // File logging so log lines never interleave with the chat transcript
    let log_path = log_path();
    let log_file = std::fs::File::create(&log_path)
        .with_context(|| format!("Failed to create log file at {}", log_path.display()))?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .format_timestamp_secs()
        .init();
    Ok(())
}

async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Join { manga_id } => {
            let config = Config::load()?;
            commands::join::run(&config, manga_id.as_deref()).await?;
        }
        Commands::History { manga_id, limit } => {
            let config = Config::load()?;
            commands::history::run(&config, manga_id.as_deref(), limit).await?;
        }
        Commands::Config { key, value } => match (key, value) {
            (None, _) => commands::config::show(&Config::load()?)?,
            (Some(key), None) => commands::config::get(&Config::load()?, &key)?,
            (Some(key), Some(value)) => commands::config::set(&key, &value)?,
        },
    }
    Ok(())
}

fn main() -> Result<()> {
    init_logging()?;

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        log::error!("PANIC: {:?}", panic_info);
        default_hook(panic_info);
    }));

    let cli = Cli::parse();
    log::info!("mangahub v{} starting", env!("CARGO_PKG_VERSION"));

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let result = runtime.block_on(dispatch(cli.command));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    result
}
