//! Append-only hourly `.inc` log files.
//!
//! Two logs live under the configured log directory: every valid frame
//! appends its numeric data to `<day>_<month>_<hour>.inc`, and every frame
//! that yields active alarms appends one line to
//! `<day>_<month>_<hour>_Alarm.inc`. The daily retention job prunes both
//! by age.

use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Datelike, Timelike, Utc};
use tokio::io::AsyncWriteExt;

use crate::models::{FanHealth, Reading};

// ---

/// Hourly data log file name, e.g. `7_3_14.inc`.
pub fn data_file_name(now: &DateTime<Utc>) -> String {
    format!("{}_{}_{}.inc", now.day(), now.month(), now.hour())
}

/// Hourly alarm log file name, e.g. `7_3_14_Alarm.inc`.
pub fn alarm_file_name(now: &DateTime<Utc>) -> String {
    format!("{}_{}_{}_Alarm.inc", now.day(), now.month(), now.hour())
}

/// Append the numeric data of one decoded reading to the hourly data file.
pub async fn append_reading(dir: &Path, reading: &Reading) -> Result<()> {
    // ---
    let data = serde_json::json!({
        "humidity": reading.humidity,
        "insideTemperature": reading.inside_temperature,
        "outsideTemperature": reading.outside_temperature,
        "inputVoltage": reading.input_voltage,
        "outputVoltage": reading.output_voltage,
        "batteryBackup": reading.battery_backup,
    });
    let stamp = reading.timestamp.format("%d/%m/%y %H:%M:%S");
    let line = format!("[{stamp}] | MAC: {} | Data: {data}\n", reading.mac);
    append_line(dir, &data_file_name(&reading.timestamp), &line).await
}

/// Append one alarm line for a device.
///
/// The fan status codes are included only when at least one fan reports
/// faulty.
pub async fn append_alarms(
    dir: &Path,
    mac: &str,
    active: &[String],
    fan_status: &[FanHealth; 6],
    now: DateTime<Utc>,
) -> Result<()> {
    // ---
    let alarms = active.join(", ");
    let stamp = now.format("%d/%m/%y %H:%M:%S");
    let line = if fan_status.iter().any(|f| f.is_faulty()) {
        let codes: Vec<String> = fan_status.iter().map(|f| f.as_i16().to_string()).collect();
        format!(
            "[{stamp}] | MAC: {mac} | {alarms} | Fan Status: {}\n",
            codes.join(",")
        )
    } else {
        format!("[{stamp}] | MAC: {mac} | {alarms}\n")
    };

    append_line(dir, &alarm_file_name(&now), &line).await
}

async fn append_line(dir: &Path, file: &str, line: &str) -> Result<()> {
    // ---
    tokio::fs::create_dir_all(dir).await?;
    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(dir.join(file))
        .await?;
    file.write_all(line.as_bytes()).await?;
    Ok(())
}
