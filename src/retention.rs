//! Background retention jobs.
//!
//! Hourly: cap the stored reading count by deleting everything older than
//! the N-th most recent reading's timestamp. Daily: prune `.inc` data and
//! alarm log files older than the configured number of days. Both are best-effort:
//! failures are logged, never propagated, and the next scheduled run
//! proceeds regardless.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::store::ReadingStore;

const HOURLY: Duration = Duration::from_secs(60 * 60);
const DAILY: Duration = Duration::from_secs(24 * 60 * 60);

// ---

/// Spawn the hourly count-cap job. Runs once immediately, then every hour.
pub fn spawn_db_cap(store: Arc<ReadingStore>, max_docs: i64) -> JoinHandle<()> {
    // ---
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HOURLY);
        loop {
            ticker.tick().await;
            if let Err(err) = cap_reading_count(&store, max_docs).await {
                warn!("reading count cap failed: {err:#}");
            }
        }
    })
}

/// Spawn the daily log-file pruning job. Runs once immediately, then every
/// 24 hours.
pub fn spawn_log_cleanup(dir: PathBuf, max_age_days: u32) -> JoinHandle<()> {
    // ---
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(DAILY);
        loop {
            ticker.tick().await;
            let cutoff = SystemTime::now() - Duration::from_secs(u64::from(max_age_days) * 86_400);
            match prune_log_files(&dir, cutoff).await {
                Ok(0) => {}
                Ok(n) => info!("pruned {n} expired log files"),
                Err(err) => warn!("log cleanup failed: {err:#}"),
            }
        }
    })
}

// ---

/// Delete readings beyond the count cap, bounded by count rather than
/// calendar age: the boundary is the timestamp of the `max_docs`-th most
/// recent reading.
pub async fn cap_reading_count(store: &ReadingStore, max_docs: i64) -> Result<()> {
    // ---
    let total = store.count().await?;
    if total == 0 {
        debug!("no stored readings, nothing to cap");
        return Ok(());
    }
    if total <= max_docs {
        return Ok(());
    }

    let Some(boundary) = store.nth_most_recent_timestamp(max_docs).await? else {
        warn!("unable to determine boundary timestamp for capping");
        return Ok(());
    };

    let deleted = store.delete_older_than(boundary).await?;
    info!("count cap: deleted {deleted} readings older than {boundary}");
    Ok(())
}

/// Delete `.inc` files under `dir` whose mtime is before `cutoff`.
///
/// A missing directory is fine: there is nothing to delete yet.
pub async fn prune_log_files(dir: &Path, cutoff: SystemTime) -> Result<usize> {
    // ---
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err.into()),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("inc") {
            continue;
        }
        let modified = match entry.metadata().await.and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(err) => {
                warn!("skipping {}: {err}", path.display());
                continue;
            }
        };
        if modified < cutoff {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!("deleted expired log file {}", path.display());
                    removed += 1;
                }
                Err(err) => warn!("failed to delete {}: {err}", path.display()),
            }
        }
    }
    Ok(removed)
}
