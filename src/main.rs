//! Application entry point for the `rackmon` telemetry core.
//!
//! This binary orchestrates the full startup sequence:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Establishing a PostgreSQL connection pool
//! - Creating the database schema if it does not exist
//! - Binding the device-facing TCP ingest listener
//! - Spawning the flush timer and the retention jobs
//! - Mounting the operator HTTP surface via the `routes` gateway (EMBP)
//!
//! # Environment Variables
//! - `DATABASE_URL` (**required**) – PostgreSQL connection string
//! - `TCP_BIND_ADDR` / `HTTP_BIND_ADDR` (optional) – listener addresses
//! - `RACKMON_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `RACKMON_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! See `config.rs` for the full variable list.

use std::env;
use std::io::IsTerminal;
use std::time::Duration;

use anyhow::Result;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use rackmon::{buffer, config, ingest, retention, routes, schema, Engine};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    tracing::info!("Attempting to connect to database: {}", cfg.db_url);

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .connect(&cfg.db_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database '{}': {}", cfg.db_url, e))?;

    tracing::info!("Successfully connected to database");

    schema::create_schema(&pool).await?;

    let engine = Engine::new(cfg.clone(), pool)?;

    // Write-behind flush timer, independent of any connection
    buffer::spawn_flush_timer(
        engine.buffer.clone(),
        engine.store.clone(),
        Duration::from_secs(u64::from(cfg.flush_interval_secs)),
    );

    // Best-effort background retention
    retention::spawn_db_cap(engine.store.clone(), i64::from(cfg.max_reading_docs));
    retention::spawn_log_cleanup(cfg.log_dir.clone(), cfg.log_retention_days);

    // Device-facing TCP ingest
    let tcp_listener = tokio::net::TcpListener::bind(&cfg.tcp_bind).await?;
    tokio::spawn(ingest::run_listener(engine.clone(), tcp_listener));

    // Operator HTTP surface via the routes gateway (EMBP)
    let app = routes::router(engine);
    tracing::info!("HTTP surface listening on {}", cfg.http_bind);
    let http_listener = tokio::net::TcpListener::bind(&cfg.http_bind).await?;
    axum::serve(http_listener, app).await?;

    Ok(())
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `RACKMON_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by the `RACKMON_LOG_LEVEL` env var
///
/// This should be called once at application startup before any logging
/// or tracing macros are invoked. It installs the subscriber globally
/// for the lifetime of the process.
fn init_tracing() {
    // ---
    let span_events = match env::var("RACKMON_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to RACKMON_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("RACKMON_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
