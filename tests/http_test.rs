//! Operator HTTP surface tests against a live in-process server.
//!
//! The storage pool is lazy and never connected; none of these endpoints
//! touch the database.

use std::sync::Arc;

use anyhow::Result;
use reqwest::Client;
use sqlx::postgres::PgPoolOptions;

use rackmon::{routes, Config, Engine};

// ---

async fn serve() -> Result<(Arc<Engine>, String)> {
    // ---
    let config = Config {
        db_url: "postgres://rackmon@localhost/rackmon_test".to_string(),
        db_pool_max: 1,
        tcp_bind: "127.0.0.1:0".to_string(),
        http_bind: "127.0.0.1:0".to_string(),
        bulk_save_limit: 1000,
        flush_interval_secs: 3600,
        max_reading_docs: 10_000,
        ack_frame_interval: 40,
        log_dir: std::env::temp_dir().join("rackmon-test-logs"),
        snaps_dir: std::env::temp_dir().join("rackmon-test-snaps"),
        log_retention_days: 3,
    };
    let pool = PgPoolOptions::new().connect_lazy(&config.db_url)?;
    let engine = Engine::new(config, pool)?;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let base = format!("http://{}", listener.local_addr()?);
    let app = routes::router(engine.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Ok((engine, base))
}

#[tokio::test]
async fn health_endpoint_responds_ok() -> Result<()> {
    // ---
    let (_engine, base) = serve().await?;
    let body: serde_json::Value = Client::new()
        .get(format!("{base}/health"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn devices_endpoint_lists_connected_identifiers() -> Result<()> {
    // ---
    let (_engine, base) = serve().await?;
    let devices: Vec<String> = Client::new()
        .get(format!("{base}/api/devices"))
        .send()
        .await?
        .json()
        .await?;
    assert!(devices.is_empty());
    Ok(())
}

#[tokio::test]
async fn thresholds_endpoint_serves_the_static_table() -> Result<()> {
    // ---
    let (_engine, base) = serve().await?;
    let body: serde_json::Value = Client::new()
        .get(format!("{base}/api/thresholds"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["inside_temperature"]["max"], 75.0);
    assert_eq!(body["battery_backup"]["min"], 10.0);
    Ok(())
}

#[tokio::test]
async fn alarms_for_unknown_device_is_an_empty_list() -> Result<()> {
    // ---
    let (_engine, base) = serve().await?;
    let alarms: Vec<String> = Client::new()
        .get(format!("{base}/api/device/aa:bb:cc:dd:ee:ff/alarms"))
        .send()
        .await?
        .json()
        .await?;
    assert!(alarms.is_empty());
    Ok(())
}

#[tokio::test]
async fn command_to_unconnected_device_is_404() -> Result<()> {
    // ---
    let (_engine, base) = serve().await?;
    let response = Client::new()
        .post(format!("{base}/command"))
        .json(&serde_json::json!({
            "mac": "AA:BB:CC:DD:EE:FF",
            "command": "FAN1ON",
        }))
        .send()
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["message"], "Device aa:bb:cc:dd:ee:ff not connected");
    Ok(())
}
