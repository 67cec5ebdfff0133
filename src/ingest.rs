//! Device-facing TCP ingest.
//!
//! One listener accepts connections; each connection runs its own task with
//! a private frame decoder feeding the telemetry translator and alarm
//! engine. Decoded readings enter the shared write-behind buffer in strict
//! arrival order for that connection. Any unexpected error in the decode
//! loop tears the connection down; the device is expected to reconnect.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::alarms::compute_alarms;
use crate::buffer;
use crate::inc_log;
use crate::engine::Engine;
use crate::frame::FrameDecoder;
use crate::registry::ConnectionHandle;
use crate::snapshot;
use crate::telemetry::{translate, DecodeError};

// ---

/// Accept loop. Runs for the life of the process.
pub async fn run_listener(engine: Arc<Engine>, listener: TcpListener) -> Result<()> {
    // ---
    info!("TCP ingest listening on {}", listener.local_addr()?);
    loop {
        let (socket, peer) = listener.accept().await?;
        debug!("new TCP connection from {peer}");
        let engine = engine.clone();
        tokio::spawn(async move {
            match handle_connection(engine, socket, peer).await {
                Ok(()) => debug!("connection {peer} closed"),
                Err(err) => warn!("connection {peer} closed with error: {err:#}"),
            }
        });
    }
}

/// Per-connection state: the decoder accumulator, the shared write handle,
/// the ack rate-limit countdown, and the identifiers this connection has
/// registered (needed for identity-checked deregistration on close).
struct Connection {
    handle: ConnectionHandle,
    decoder: FrameDecoder,
    ack_countdown: u32,
    registered: HashSet<String>,
}

async fn handle_connection(
    engine: Arc<Engine>,
    socket: TcpStream,
    peer: SocketAddr,
) -> Result<()> {
    // ---
    let (mut reader, writer) = socket.into_split();
    let mut conn = Connection {
        handle: ConnectionHandle::new(peer, writer),
        decoder: FrameDecoder::new(),
        ack_countdown: 0,
        registered: HashSet::new(),
    };

    let mut chunk = [0u8; 2048];
    let result = loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break Ok(()),
            Ok(n) => n,
            Err(err) => break Err(err.into()),
        };

        conn.decoder.push(&chunk[..n]);
        if let Err(err) = process_buffered_frames(&engine, &mut conn).await {
            // Corrupt decoder state is not trusted to self-heal mid-stream
            break Err(err);
        }
    };

    // Deregister only the exact handle owned by this connection; a newer
    // reconnection under the same identifier stays registered.
    for mac in &conn.registered {
        engine.registry.remove(mac, conn.handle.conn_id());
    }

    result
}

/// Drain every complete frame currently in the accumulator.
async fn process_buffered_frames(engine: &Arc<Engine>, conn: &mut Connection) -> Result<()> {
    // ---
    while let Some(frame) = conn.decoder.next_frame() {
        let (mut reading, signals) = match translate(&frame, Utc::now()) {
            Ok(decoded) => decoded,
            Err(err @ DecodeError::ValueOutOfRange { .. }) => {
                // Single bad frame; the connection continues
                warn!("skipping frame from {}: {err}", conn.handle.peer());
                continue;
            }
            Err(err @ DecodeError::BadIdentifier) => {
                warn!("skipping frame from {}: {err}", conn.handle.peer());
                continue;
            }
        };

        if signals.ack_requested && conn.ack_countdown == 0 {
            send_ack(&conn.handle).await;
            conn.ack_countdown = engine.config.ack_frame_interval;
        }
        conn.ack_countdown = conn.ack_countdown.saturating_sub(1);

        if signals.snapshot_requested {
            snapshot::spawn_capture(
                engine.store.clone(),
                engine.http.clone(),
                engine.config.snaps_dir.clone(),
                reading.mac.clone(),
            );
        }

        let alarms = compute_alarms(&reading, &engine.thresholds);
        reading.threshold_alarms = alarms.flags;
        engine.record_alarms(&reading.mac, alarms.active.clone());

        if !alarms.is_clear() {
            let dir = engine.config.log_dir.clone();
            let mac = reading.mac.clone();
            let fans = reading.fan_status;
            let when = reading.timestamp;
            tokio::spawn(async move {
                if let Err(err) =
                    inc_log::append_alarms(&dir, &mac, &alarms.active, &fans, when).await
                {
                    warn!("failed to write alarm log for {mac}: {err:#}");
                }
            });
        }

        // Hourly data log, fire-and-forget like the alarm log
        {
            let dir = engine.config.log_dir.clone();
            let entry = reading.clone();
            tokio::spawn(async move {
                if let Err(err) = inc_log::append_reading(&dir, &entry).await {
                    warn!("failed to write data log for {}: {err:#}", entry.mac);
                }
            });
        }

        // Every valid frame refreshes the registry entry, so a reconnected
        // device replaces its stale mapping on the first frame
        engine
            .registry
            .register(&reading.mac, conn.handle.clone());
        conn.registered.insert(reading.mac.clone());

        let stats = conn.decoder.stats();
        if stats.frames % 512 == 1 {
            debug!(
                "{} | temp {}C | humidity {}% | input {}V | {} frames, {} bytes discarded",
                reading.mac,
                reading.inside_temperature,
                reading.humidity,
                reading.input_voltage,
                stats.frames,
                stats.discarded_bytes,
            );
        }

        if let Some(batch) = engine.buffer.append(reading) {
            // Bulk insert off the decode path; losing the batch on a
            // storage error is accepted
            let store = engine.store.clone();
            tokio::spawn(async move {
                buffer::flush(&store, batch).await;
            });
        }
    }
    Ok(())
}

/// Reply with the lightweight timestamp acknowledgement frame.
async fn send_ack(handle: &ConnectionHandle) {
    // ---
    let msg = format!("%X000{}$", Utc::now().format("%d/%m/%y %H:%M:%S"));
    debug!("sending ack to {}: {msg}", handle.peer());
    match handle.write(msg.as_bytes()).await {
        Ok(true) => {}
        Ok(false) => warn!("backpressure: ack to {} queued", handle.peer()),
        Err(err) => warn!("failed to send ack to {}: {err}", handle.peer()),
    }
}
