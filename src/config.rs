//! Configuration loader for the `rackmon` telemetry core.
//!
//! This module centralizes all runtime configuration values and their
//! defaults, loading from environment variables (with optional `.env` file
//! support provided by the caller). By consolidating configuration logic
//! here, we avoid scattering `env::var` calls throughout the codebase.

use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Read an optional string environment variable with a default value.
macro_rules! env_or {
    ($var_name:expr, $default:expr) => {
        env::var($var_name).unwrap_or_else(|_| $default.to_string())
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent
/// configuration snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Bind address for the device-facing TCP listener.
    pub tcp_bind: String,

    /// Bind address for the operator-facing HTTP surface.
    pub http_bind: String,

    /// Buffered readings that force an immediate bulk insert.
    pub bulk_save_limit: u32,

    /// Seconds between timer-driven buffer flushes.
    pub flush_interval_secs: u32,

    /// Stored-reading count above which the hourly cap job prunes.
    pub max_reading_docs: u32,

    /// Decoded frames between acknowledgement replies to one device.
    pub ack_frame_interval: u32,

    /// Directory for the hourly `.inc` log files (pruned by the daily job).
    pub log_dir: PathBuf,

    /// Directory where camera snapshots are written.
    pub snaps_dir: PathBuf,

    /// Log files older than this many days are deleted.
    pub log_retention_days: u32,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `TCP_BIND_ADDR` – device listener bind address (default: 0.0.0.0:4000)
/// - `HTTP_BIND_ADDR` – HTTP bind address (default: 0.0.0.0:5000)
/// - `BULK_SAVE_LIMIT` – buffer flush threshold (default: 1000)
/// - `FLUSH_INTERVAL_SECS` – flush timer period (default: 5)
/// - `MAX_READING_DOCS` – stored reading cap (default: 10000)
/// - `ACK_FRAME_INTERVAL` – frames between device acks (default: 40)
/// - `LOG_DIR` – alarm log directory (default: ./logs)
/// - `SNAPS_DIR` – snapshot directory (default: ./snaps)
/// - `LOG_RETENTION_DAYS` – log file age limit (default: 3)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let tcp_bind = env_or!("TCP_BIND_ADDR", "0.0.0.0:4000");
    let http_bind = env_or!("HTTP_BIND_ADDR", "0.0.0.0:5000");
    let bulk_save_limit = parse_env_u32!("BULK_SAVE_LIMIT", 1000);
    let flush_interval_secs = parse_env_u32!("FLUSH_INTERVAL_SECS", 5);
    let max_reading_docs = parse_env_u32!("MAX_READING_DOCS", 10_000);
    let ack_frame_interval = parse_env_u32!("ACK_FRAME_INTERVAL", 40);
    let log_dir = PathBuf::from(env_or!("LOG_DIR", "./logs"));
    let snaps_dir = PathBuf::from(env_or!("SNAPS_DIR", "./snaps"));
    let log_retention_days = parse_env_u32!("LOG_RETENTION_DAYS", 3);

    Ok(Config {
        db_url,
        db_pool_max,
        tcp_bind,
        http_bind,
        bulk_save_limit,
        flush_interval_secs,
        max_reading_docs,
        ack_frame_interval,
        log_dir,
        snaps_dir,
        log_retention_days,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords while showing
    /// all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        // Mask the password in the database URL for security
        let masked_db_url = if let Some(at_pos) = self.db_url.rfind('@') {
            if let Some(colon_pos) = self.db_url[..at_pos].rfind(':') {
                format!(
                    "{}:****{}",
                    &self.db_url[..colon_pos],
                    &self.db_url[at_pos..]
                )
            } else {
                self.db_url.clone()
            }
        } else {
            self.db_url.clone()
        };

        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL        : {}", masked_db_url);
        tracing::info!("  DB_POOL_MAX         : {}", self.db_pool_max);
        tracing::info!("  TCP_BIND_ADDR       : {}", self.tcp_bind);
        tracing::info!("  HTTP_BIND_ADDR      : {}", self.http_bind);
        tracing::info!("  BULK_SAVE_LIMIT     : {}", self.bulk_save_limit);
        tracing::info!("  FLUSH_INTERVAL_SECS : {}", self.flush_interval_secs);
        tracing::info!("  MAX_READING_DOCS    : {}", self.max_reading_docs);
        tracing::info!("  ACK_FRAME_INTERVAL  : {}", self.ack_frame_interval);
        tracing::info!("  LOG_DIR             : {}", self.log_dir.display());
        tracing::info!("  SNAPS_DIR           : {}", self.snaps_dir.display());
        tracing::info!("  LOG_RETENTION_DAYS  : {}", self.log_retention_days);
    }
}
