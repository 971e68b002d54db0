use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer};
use tubegrab::config::{ConfigStore, Settings};

mod cli;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the preferences file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the settings file (TOML)
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: cli::Command,
}

fn env_filter() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy()
}

/// Logs to stderr in the configured format and to a daily rolling file.
/// The returned guard flushes the file writer when dropped.
fn init_tracing(settings: &Settings) -> Option<WorkerGuard> {
    let console = if settings.get_logging_format() == "json" {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(env_filter())
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(env_filter())
            .boxed()
    };

    let log_dir = settings.log_directory();
    let (file, guard) = match std::fs::create_dir_all(&log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(&log_dir, "tubegrab.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(env_filter());
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .init();

    if guard.is_none() {
        warn!("Could not create log directory {}", log_dir.display());
    }

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (settings, settings_path) =
        Settings::load(args.settings.as_deref()).context("Failed to load settings")?;

    let _log_guard = init_tracing(&settings);

    info!("Starting tubegrab...");
    match &settings_path {
        Some(path) => info!("Loaded settings from: {}", path.display()),
        None => info!("No settings file found, using defaults"),
    }

    let store = ConfigStore::locate(args.config.as_deref());
    info!("Using preferences at: {}", store.path().display());

    cli::run(args.command, settings, store).await
}
