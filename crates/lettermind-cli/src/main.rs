//! lettermind - command-line account client for the lettermind letter assistant.
//!
//! Signs users in (password, registration, demo or Google identity token),
//! keeps the session between runs and manages the per-provider API keys
//! stored by the backend.

mod cli;
mod commands;

use std::io;
use std::path::Path;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lettermind_core::Config;

use cli::Cli;
use commands::Context;

/// Log file prefix inside the data directory's `logs/` folder
const LOG_FILE_PREFIX: &str = "lettermind";

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr and, when the data directory is usable, to a daily
/// rolling file. The returned guard must live until exit so buffered lines
/// are flushed.
fn init_tracing(data_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let appender = data_dir.and_then(|dir| {
        RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(LOG_FILE_PREFIX)
            .filename_suffix("log")
            .build(dir.join("logs"))
            .ok()
    });
    let (file_layer, guard) = match appender {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Before the config, so warnings about bad settings are shown
    let data_dir = Config::data_dir().ok();
    let _log_guard = init_tracing(data_dir.as_deref());
    info!(version = env!("CARGO_PKG_VERSION"), "lettermind starting");

    let config = Config::load()?;

    let ctx = Context::new(config, cli.backend_url.as_deref()).await?;
    commands::run(ctx, cli.command).await
}
