//! Application entry point for the `sensorflow-ingest` batch tool.
//!
//! This binary orchestrates one ingestion run:
//! - Parsing command-line arguments
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Handing off to [`cli::run`], which reads the CSV, connects to
//!   PostgreSQL (unless `--dry-run`), and processes every row
//! - Reporting the batch summary and choosing the exit code
//!
//! # Environment Variables
//! - `DATABASE_URL` (required unless `--dry-run`) – PostgreSQL connection string
//! - `DB_POOL_MAX` (optional) – maximum number of DB connections (default: 5)
//! - `PROCEDURE_VERSION` (optional) – provenance tag (default: `v1`)
//! - `CONSISTENCY_CHECK_PRESSURE` (optional) – compare pressure jumps (default: true)
//! - `INGEST_LOG_LEVEL` (optional) – log verbosity (default: `info`)
//! - `INGEST_SPAN_EVENTS` (optional) – span event mode for tracing
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use std::{env, process::ExitCode};

use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use sensorflow_ingest::cli::{self, Cli};
use sensorflow_ingest::config;

// ---

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // ---
    let cli = Cli::parse();
    dotenv().ok();
    init_tracing(cli.log_file.as_deref())?;

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let report = cli::run(cli, cfg).await?;

    // stdout carries dry-run records, so the summary goes to stderr.
    eprintln!("{}", report);

    if report.is_clean() {
        tracing::info!("Processing finished successfully");
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::error!("{} rows failed to persist", report.rows_failed);
        Ok(ExitCode::FAILURE)
    }
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Output to `log_file` (appending, no colors) when given, else stderr
/// - Color output on stderr controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `INGEST_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by `RUST_LOG`, else the `INGEST_LOG_LEVEL` env var
///
/// Called once at startup before any logging or tracing macros are invoked.
fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    // ---
    let span_events = match env::var("INGEST_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stderr().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to INGEST_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("INGEST_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn"))
    };

    let builder = tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .compact();

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_ansi(use_color).with_writer(std::io::stderr).init(),
    }

    Ok(())
}
