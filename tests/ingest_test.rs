//! End-to-end ingest tests: raw TCP bytes in, registry / buffer / alarm
//! state out. The PostgreSQL pool is created lazily and never connected;
//! the bulk-save threshold is kept high so no flush reaches storage.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use rackmon::frame::{layout, FRAME_LEN, MAC_LEN};
use rackmon::{ingest, Config, Engine};

// ---

const MAC: &str = "AA:BB:CC:DD:EE:01";
const MAC_LOWER: &str = "aa:bb:cc:dd:ee:01";

fn test_config() -> Config {
    // ---
    Config {
        db_url: "postgres://rackmon@localhost/rackmon_test".to_string(),
        db_pool_max: 1,
        tcp_bind: "127.0.0.1:0".to_string(),
        http_bind: "127.0.0.1:0".to_string(),
        bulk_save_limit: 100_000,
        flush_interval_secs: 3600,
        max_reading_docs: 10_000,
        ack_frame_interval: 40,
        log_dir: std::env::temp_dir().join("rackmon-test-logs"),
        snaps_dir: std::env::temp_dir().join("rackmon-test-snaps"),
        log_retention_days: 3,
    }
}

async fn start_engine() -> Result<(Arc<Engine>, std::net::SocketAddr)> {
    // ---
    let config = test_config();
    let pool = PgPoolOptions::new().connect_lazy(&config.db_url)?;
    let engine = Engine::new(config, pool)?;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(ingest::run_listener(engine.clone(), listener));
    Ok((engine, addr))
}

fn build_frame(mac: &str) -> Vec<u8> {
    // ---
    let mut bytes = vec![0u8; FRAME_LEN];
    bytes[..MAC_LEN].copy_from_slice(mac.as_bytes());
    put_f32(&mut bytes, layout::HUMIDITY, 50.0);
    put_f32(&mut bytes, layout::INSIDE_TEMPERATURE, 25.0);
    put_f32(&mut bytes, layout::OUTSIDE_TEMPERATURE, 30.0);
    put_f32(&mut bytes, layout::OUTPUT_VOLTAGE, 50.0);
    put_f32(&mut bytes, layout::INPUT_VOLTAGE, 52.0);
    put_f32(&mut bytes, layout::BATTERY_BACKUP, 120.0);
    bytes
}

fn put_f32(bytes: &mut [u8], offset: usize, value: f32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Poll until `check` passes or the deadline expires.
async fn wait_for(mut check: impl FnMut() -> bool) {
    // ---
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within deadline");
}

// ---

#[tokio::test]
async fn frames_register_the_device_and_fill_the_buffer() -> Result<()> {
    // ---
    let (engine, addr) = start_engine().await?;
    let mut device = TcpStream::connect(addr).await?;

    device.write_all(&build_frame(MAC)).await?;
    device.write_all(&build_frame(MAC)).await?;
    device.flush().await?;

    let buffer = engine.buffer.clone();
    wait_for(move || buffer.len() == 2).await;

    // Registry key is the normalized (lower-case) identifier
    assert_eq!(engine.connected_identifiers(), vec![MAC_LOWER.to_string()]);
    assert!(engine.active_alarms(MAC).is_empty());
    Ok(())
}

#[tokio::test]
async fn junk_between_frames_is_resynchronized() -> Result<()> {
    // ---
    let (engine, addr) = start_engine().await?;
    let mut device = TcpStream::connect(addr).await?;

    let mut stream = vec![0xEEu8; 20];
    stream.extend_from_slice(&build_frame(MAC));
    stream.extend_from_slice(&[0xEE; 5]);
    stream.extend_from_slice(&build_frame(MAC));
    device.write_all(&stream).await?;
    device.flush().await?;

    let buffer = engine.buffer.clone();
    wait_for(move || buffer.len() == 2).await;
    Ok(())
}

#[tokio::test]
async fn out_of_range_frames_never_reach_the_buffer() -> Result<()> {
    // ---
    let (engine, addr) = start_engine().await?;
    let mut device = TcpStream::connect(addr).await?;

    let mut bad = build_frame(MAC);
    put_f32(&mut bad, layout::INSIDE_TEMPERATURE, f32::NAN);
    device.write_all(&bad).await?;

    let mut huge = build_frame(MAC);
    put_f32(&mut huge, layout::INPUT_VOLTAGE, 2.0e9);
    device.write_all(&huge).await?;

    device.write_all(&build_frame(MAC)).await?;
    device.flush().await?;

    let buffer = engine.buffer.clone();
    wait_for(move || buffer.len() == 1).await;

    // Only the valid frame survived
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(engine.buffer.len(), 1);
    Ok(())
}

#[tokio::test]
async fn valid_frames_append_to_the_hourly_data_log() -> Result<()> {
    // ---
    let dir = tempfile::tempdir()?;
    let mut config = test_config();
    config.log_dir = dir.path().to_path_buf();
    let pool = PgPoolOptions::new().connect_lazy(&config.db_url)?;
    let engine = Engine::new(config, pool)?;
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(ingest::run_listener(engine.clone(), listener));

    let mut device = TcpStream::connect(addr).await?;
    device.write_all(&build_frame(MAC)).await?;
    device.flush().await?;

    let path = dir.path().to_path_buf();
    wait_for(move || {
        std::fs::read_dir(&path)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
    })
    .await;

    let entry = std::fs::read_dir(dir.path())?.next().unwrap()?;
    let name = entry.file_name().into_string().unwrap();
    assert!(name.ends_with(".inc"), "unexpected log file: {name}");
    assert!(!name.contains("Alarm"), "clear frame must not alarm: {name}");

    let content = std::fs::read_to_string(entry.path())?;
    assert!(content.contains("MAC: aa:bb:cc:dd:ee:01"));
    assert!(content.contains("\"humidity\":50.0"));
    Ok(())
}

#[tokio::test]
async fn alarm_frames_surface_on_the_alarm_board() -> Result<()> {
    // ---
    let (engine, addr) = start_engine().await?;
    let mut device = TcpStream::connect(addr).await?;

    let mut frame = build_frame(MAC);
    frame[layout::FIRE_ALARM] = 1;
    put_f32(&mut frame, layout::HUMIDITY, 99.5);
    device.write_all(&frame).await?;
    device.flush().await?;

    let board = engine.clone();
    wait_for(move || !board.active_alarms(MAC).is_empty()).await;

    let alarms = engine.active_alarms(MAC);
    assert!(alarms.contains(&"Fire Alarm".to_string()));
    assert!(alarms.contains(&"Humidity: 99.5".to_string()));
    Ok(())
}

#[tokio::test]
async fn disconnect_removes_only_this_connection() -> Result<()> {
    // ---
    let (engine, addr) = start_engine().await?;

    // Connection A registers, then a reconnection B replaces the entry
    let mut conn_a = TcpStream::connect(addr).await?;
    conn_a.write_all(&build_frame(MAC)).await?;
    let buffer = engine.buffer.clone();
    wait_for(move || buffer.len() == 1).await;

    let mut conn_b = TcpStream::connect(addr).await?;
    conn_b.write_all(&build_frame(MAC)).await?;
    let buffer = engine.buffer.clone();
    wait_for(move || buffer.len() == 2).await;

    // A's delayed close must not evict B's registration
    drop(conn_a);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(engine.connected_identifiers(), vec![MAC_LOWER.to_string()]);

    drop(conn_b);
    let registry = engine.clone();
    wait_for(move || registry.connected_identifiers().is_empty()).await;
    Ok(())
}

#[tokio::test]
async fn ack_control_byte_gets_a_timestamp_reply() -> Result<()> {
    // ---
    let (_engine, addr) = start_engine().await?;
    let mut device = TcpStream::connect(addr).await?;

    let mut frame = build_frame(MAC);
    frame[layout::CONTROL] = 0x31;
    device.write_all(&frame).await?;
    device.flush().await?;

    let mut reply = vec![0u8; 64];
    let n = tokio::time::timeout(Duration::from_secs(2), device.read(&mut reply)).await??;
    let reply = std::str::from_utf8(&reply[..n])?;
    assert!(reply.starts_with("%X000"), "unexpected reply: {reply}");
    assert!(reply.ends_with('$'));
    Ok(())
}

#[tokio::test]
async fn acks_are_rate_limited() -> Result<()> {
    // ---
    let (_engine, addr) = start_engine().await?;
    let mut device = TcpStream::connect(addr).await?;

    // Ten back-to-back ack requests, well under the 40-frame interval
    let mut frame = build_frame(MAC);
    frame[layout::CONTROL] = 0x31;
    for _ in 0..10 {
        device.write_all(&frame).await?;
    }
    device.flush().await?;

    let mut first = vec![0u8; 256];
    let n = tokio::time::timeout(Duration::from_secs(2), device.read(&mut first)).await??;
    assert!(std::str::from_utf8(&first[..n])?.starts_with("%X000"));

    // No further reply arrives for the remaining frames
    let mut more = vec![0u8; 256];
    let second = tokio::time::timeout(Duration::from_millis(300), device.read(&mut more)).await;
    assert!(second.is_err(), "ack was not rate limited");
    Ok(())
}

#[tokio::test]
async fn command_dispatch_reaches_the_device() -> Result<()> {
    // ---
    let (engine, addr) = start_engine().await?;
    let mut device = TcpStream::connect(addr).await?;

    device.write_all(&build_frame(MAC)).await?;
    let buffer = engine.buffer.clone();
    wait_for(move || buffer.len() == 1).await;

    let outcome = engine.dispatch_command(MAC, "FAN3ON").await;
    assert!(outcome.is_sent());

    let mut buf = [0u8; 6];
    device.read_exact(&mut buf).await?;
    assert_eq!(&buf, b"FAN3ON");
    Ok(())
}
