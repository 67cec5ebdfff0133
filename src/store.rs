//! Persistence layer for readings and device metadata.
//!
//! Exposes the narrow insert-many / count / boundary / delete-many surface
//! the ingest core needs, over the PostgreSQL pool. Queries are plain
//! `sqlx::query` with binds; the schema is created idempotently at startup
//! by [`crate::schema`].

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, QueryBuilder, Row};

use crate::models::Reading;

// ---

/// Camera descriptor attached to a registered device, consumed by the
/// snapshot trigger.
#[derive(Debug, Clone)]
pub struct CameraInfo {
    /// Camera make code, e.g. `"H"` for the RTSP-only units.
    pub kind: String,
    /// Network address of the camera.
    pub address: String,
}

/// Storage handle for the readings write path and device metadata lookups.
#[derive(Clone)]
pub struct ReadingStore {
    pool: PgPool,
}

impl ReadingStore {
    pub fn new(pool: PgPool) -> Self {
        ReadingStore { pool }
    }

    /// Bulk-insert one flushed batch in a single statement.
    pub async fn insert_many(&self, readings: &[Reading]) -> Result<()> {
        // ---
        if readings.is_empty() {
            return Ok(());
        }

        let mut qb: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
            "INSERT INTO readings (
                mac, humidity, inside_temperature, outside_temperature,
                lock_status, door_status, water_logging, water_leakage,
                output_voltage, input_voltage, battery_backup,
                alarm_active, fire_alarm,
                fan_level1_running, fan_level2_running, fan_level3_running, fan_level4_running,
                fan1_status, fan2_status, fan3_status, fan4_status, fan5_status, fan6_status,
                extended_status,
                inside_temperature_alarm, outside_temperature_alarm, humidity_alarm,
                input_voltage_alarm, output_voltage_alarm, battery_backup_alarm,
                timestamp
            ) ",
        );

        qb.push_values(readings, |mut b, r| {
            b.push_bind(&r.mac)
                .push_bind(r.humidity)
                .push_bind(r.inside_temperature)
                .push_bind(r.outside_temperature)
                .push_bind(r.lock_status.as_str())
                .push_bind(r.door_status.as_str())
                .push_bind(r.water_logging)
                .push_bind(r.water_leakage)
                .push_bind(r.output_voltage)
                .push_bind(r.input_voltage)
                .push_bind(r.battery_backup)
                .push_bind(r.alarm_active)
                .push_bind(r.fire_alarm)
                .push_bind(r.fan_level1_running)
                .push_bind(r.fan_level2_running)
                .push_bind(r.fan_level3_running)
                .push_bind(r.fan_level4_running)
                .push_bind(r.fan_status[0].as_i16())
                .push_bind(r.fan_status[1].as_i16())
                .push_bind(r.fan_status[2].as_i16())
                .push_bind(r.fan_status[3].as_i16())
                .push_bind(r.fan_status[4].as_i16())
                .push_bind(r.fan_status[5].as_i16())
                .push_bind(r.extended_status as i64)
                .push_bind(r.threshold_alarms.inside_temperature)
                .push_bind(r.threshold_alarms.outside_temperature)
                .push_bind(r.threshold_alarms.humidity)
                .push_bind(r.threshold_alarms.input_voltage)
                .push_bind(r.threshold_alarms.output_voltage)
                .push_bind(r.threshold_alarms.battery_backup)
                .push_bind(r.timestamp);
        });

        qb.build().execute(&self.pool).await?;
        Ok(())
    }

    /// Total number of stored readings.
    pub async fn count(&self) -> Result<i64> {
        // ---
        let row = sqlx::query("SELECT COUNT(*) FROM readings")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    /// Timestamp of the `n`-th most recent reading, if one exists.
    ///
    /// Used as the count-cap boundary: everything strictly older than it is
    /// eligible for deletion.
    pub async fn nth_most_recent_timestamp(&self, n: i64) -> Result<Option<DateTime<Utc>>> {
        // ---
        let row = sqlx::query(
            r#"
            SELECT timestamp FROM readings
            ORDER BY timestamp DESC
            OFFSET $1 LIMIT 1
            "#,
        )
        .bind(n - 1)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .map(|r| r.try_get::<DateTime<Utc>, _>("timestamp"))
            .transpose()?)
    }

    /// Delete every reading strictly older than `cutoff`; returns the count.
    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        // ---
        let result = sqlx::query("DELETE FROM readings WHERE timestamp < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Camera descriptor for a registered device, if the device is known
    /// and has a camera attached.
    pub async fn camera_for_device(&self, mac: &str) -> Result<Option<CameraInfo>> {
        // ---
        let row = sqlx::query("SELECT camera_kind, camera_addr FROM devices WHERE mac = $1")
            .bind(mac)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let kind: Option<String> = row.try_get("camera_kind")?;
        let addr: Option<String> = row.try_get("camera_addr")?;
        match (kind, addr) {
            (Some(kind), Some(address)) => Ok(Some(CameraInfo {
                kind: kind.trim().to_string(),
                address: address.trim().to_string(),
            })),
            _ => Ok(None),
        }
    }
}
