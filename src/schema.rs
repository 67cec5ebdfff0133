//! Database schema management for `rackmon`.
//!
//! Ensures required tables and indexes exist before ingest starts.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the `readings` table for decoded telemetry and the `devices`
/// table holding per-device metadata (the admin CRUD layer owns its rows;
/// ingest only reads the camera columns). Safe to call on every startup;
/// no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    // Decoded telemetry, written in bulk by the write-behind buffer
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS readings (
            id                        BIGSERIAL PRIMARY KEY,
            mac                       TEXT        NOT NULL,
            humidity                  REAL        NOT NULL,
            inside_temperature        REAL        NOT NULL,
            outside_temperature       REAL        NOT NULL,
            lock_status               TEXT        NOT NULL,
            door_status               TEXT        NOT NULL,
            water_logging             BOOLEAN     NOT NULL,
            water_leakage             BOOLEAN     NOT NULL,
            output_voltage            REAL        NOT NULL,
            input_voltage             REAL        NOT NULL,
            battery_backup            REAL        NOT NULL,
            alarm_active              BOOLEAN     NOT NULL,
            fire_alarm                BOOLEAN     NOT NULL,
            fan_level1_running        BOOLEAN     NOT NULL,
            fan_level2_running        BOOLEAN     NOT NULL,
            fan_level3_running        BOOLEAN     NOT NULL,
            fan_level4_running        BOOLEAN     NOT NULL,
            fan1_status               SMALLINT    NOT NULL,
            fan2_status               SMALLINT    NOT NULL,
            fan3_status               SMALLINT    NOT NULL,
            fan4_status               SMALLINT    NOT NULL,
            fan5_status               SMALLINT    NOT NULL,
            fan6_status               SMALLINT    NOT NULL,
            extended_status           BIGINT      NOT NULL,
            inside_temperature_alarm  BOOLEAN     NOT NULL,
            outside_temperature_alarm BOOLEAN     NOT NULL,
            humidity_alarm            BOOLEAN     NOT NULL,
            input_voltage_alarm       BOOLEAN     NOT NULL,
            output_voltage_alarm      BOOLEAN     NOT NULL,
            battery_backup_alarm      BOOLEAN     NOT NULL,
            timestamp                 TIMESTAMPTZ NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Device metadata; ingest reads only the camera columns
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS devices (
            mac          TEXT PRIMARY KEY,
            location_id  TEXT,
            address      TEXT,
            latitude     DOUBLE PRECISION,
            longitude    DOUBLE PRECISION,
            camera_kind  TEXT,
            camera_addr  TEXT
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Basic indexes for the cleanup boundary scan and per-device queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_readings_timestamp
            ON readings (timestamp);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_readings_mac
            ON readings (mac);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
