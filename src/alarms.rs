//! Alarm engine: pure evaluation of a reading against static thresholds.
//!
//! Deterministic and side-effect free so the same function serves live
//! telemetry and historical re-computation. A numeric metric alarms only
//! strictly outside its `[min, max]` range; battery backup has no upper
//! alarm. Status alarms (water, lock, door, fire) come straight from their
//! wire fields with no hysteresis.

use serde::{Deserialize, Serialize};

use crate::models::{Reading, ThresholdConfig};

// ---

/// Per-metric threshold alarm flags, persisted alongside the reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdAlarms {
    pub inside_temperature: bool,
    pub outside_temperature: bool,
    pub humidity: bool,
    pub input_voltage: bool,
    pub output_voltage: bool,
    pub battery_backup: bool,
}

/// Result of one alarm evaluation.
#[derive(Debug, Clone, Default)]
pub struct AlarmState {
    pub flags: ThresholdAlarms,
    /// Human-readable descriptions for downstream logging; ordering is not
    /// significant.
    pub active: Vec<String>,
}

impl AlarmState {
    pub fn is_clear(&self) -> bool {
        self.active.is_empty()
    }
}

// ---

/// Evaluate every threshold and status alarm for one reading.
pub fn compute_alarms(reading: &Reading, thresholds: &ThresholdConfig) -> AlarmState {
    // ---
    let flags = ThresholdAlarms {
        inside_temperature: thresholds
            .inside_temperature
            .is_violated(reading.inside_temperature),
        outside_temperature: thresholds
            .outside_temperature
            .is_violated(reading.outside_temperature),
        humidity: thresholds.humidity.is_violated(reading.humidity),
        input_voltage: thresholds.input_voltage.is_violated(reading.input_voltage),
        output_voltage: thresholds
            .output_voltage
            .is_violated(reading.output_voltage),
        // Lower bound only: a long backup never alarms
        battery_backup: reading.battery_backup < thresholds.battery_backup.min,
    };

    let mut active = Vec::new();
    if flags.inside_temperature {
        active.push(format!("Inside Temperature: {}", reading.inside_temperature));
    }
    if flags.outside_temperature {
        active.push(format!(
            "Outside Temperature: {}",
            reading.outside_temperature
        ));
    }
    if flags.humidity {
        active.push(format!("Humidity: {}", reading.humidity));
    }
    if flags.input_voltage {
        active.push(format!("Input Voltage: {}", reading.input_voltage));
    }
    if flags.output_voltage {
        active.push(format!("Output Voltage: {}", reading.output_voltage));
    }
    if flags.battery_backup {
        active.push(format!("Battery Backup: {}", reading.battery_backup));
    }

    if reading.water_logging {
        active.push("Water Logging Alarm".to_string());
    }
    if reading.water_leakage {
        active.push("Water Leakage Alarm".to_string());
    }
    if reading.door_status.is_open() {
        active.push("Door Alarm".to_string());
    }
    if reading.lock_status.is_open() {
        active.push("Lock Alarm".to_string());
    }
    if reading.fire_alarm {
        active.push("Fire Alarm".to_string());
    }

    AlarmState { flags, active }
}
