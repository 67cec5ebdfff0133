//! Fire-and-forget camera snapshot trigger.
//!
//! Invoked when a frame's control byte requests a capture while the door
//! is open. The capture runs as a spawned task with its own error boundary;
//! the decode loop never awaits it and never sees its result.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::store::{CameraInfo, ReadingStore};

// ---

/// Spawn a capture task for the device. Returns immediately.
pub fn spawn_capture(
    store: Arc<ReadingStore>,
    client: reqwest::Client,
    snaps_dir: PathBuf,
    mac: String,
) {
    // ---
    tokio::spawn(async move {
        if let Err(err) = capture(&store, &client, &snaps_dir, &mac).await {
            warn!("snapshot capture for {mac} failed: {err:#}");
        }
    });
}

/// Resolve the device's camera descriptor and run the matching capture
/// routine.
async fn capture(
    store: &ReadingStore,
    client: &reqwest::Client,
    snaps_dir: &Path,
    mac: &str,
) -> Result<()> {
    // ---
    let Some(camera) = store.camera_for_device(mac).await? else {
        bail!("no camera registered for device");
    };

    info!("capturing snapshot for {mac} via {} camera", camera.kind);
    if camera.kind == "H" {
        capture_rtsp(snaps_dir, mac, &camera).await
    } else {
        capture_cgi(client, snaps_dir, mac, &camera).await
    }
}

/// Grab one frame from an RTSP camera with ffmpeg.
async fn capture_rtsp(snaps_dir: &Path, mac: &str, camera: &CameraInfo) -> Result<()> {
    // ---
    let path = snapshot_path(snaps_dir, mac).await?;
    let status = tokio::process::Command::new("ffmpeg")
        .args(["-rtsp_transport", "tcp"])
        .args(["-i", &format!("rtsp://{}/media/video1", camera.address)])
        .args(["-frames:v", "1"])
        .arg(&path)
        .status()
        .await
        .context("failed to launch ffmpeg")?;

    if !status.success() {
        bail!("ffmpeg exited with {status}");
    }
    info!("snapshot captured: {}", path.display());
    Ok(())
}

/// Fetch a still image from the camera's CGI snapshot endpoint.
///
/// The camera needs a moment to wake its imaging pipeline after the door
/// event, hence the fixed delay before the request.
async fn capture_cgi(
    client: &reqwest::Client,
    snaps_dir: &Path,
    mac: &str,
    camera: &CameraInfo,
) -> Result<()> {
    // ---
    tokio::time::sleep(Duration::from_secs(3)).await;

    let url = format!("https://{}/CGI/command/snap?channel=01", camera.address);
    let image = client
        .get(&url)
        .timeout(Duration::from_secs(10))
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;

    let path = snapshot_path(snaps_dir, mac).await?;
    tokio::fs::write(&path, &image).await?;
    info!("snapshot captured: {}", path.display());
    Ok(())
}

/// Per-device output path, `<snaps_dir>/<mac tail>/image_<stamp>.jpg`,
/// creating the directory as needed.
async fn snapshot_path(snaps_dir: &Path, mac: &str) -> Result<PathBuf> {
    // ---
    // Last three octets are enough to tell racks apart on disk
    let tail = mac.get(9..).unwrap_or(mac).replace(':', "_");
    let dir = snaps_dir.join(tail);
    tokio::fs::create_dir_all(&dir).await?;

    let stamp = Utc::now().format("%d_%m_%y_%H_%M_%S");
    Ok(dir.join(format!("image_{stamp}.jpg")))
}
