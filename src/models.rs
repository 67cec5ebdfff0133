//! Data models for the rack telemetry pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alarms::ThresholdAlarms;

// ---

/// State of a lock or door sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PortalState {
    Open,
    Closed,
}

impl PortalState {
    /// Wire encoding: byte value 1 means open, anything else closed.
    pub fn from_byte(b: u8) -> Self {
        if b == 1 {
            PortalState::Open
        } else {
            PortalState::Closed
        }
    }

    pub fn is_open(self) -> bool {
        matches!(self, PortalState::Open)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PortalState::Open => "OPEN",
            PortalState::Closed => "CLOSED",
        }
    }
}

/// Per-fan health code carried in the 2-bit fields of the fan status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FanHealth {
    Off,
    Healthy,
    Faulty,
}

impl FanHealth {
    /// Extract the health code for fan `index` (0..6) from the status word.
    ///
    /// The reserved bit pattern 3 reads as faulty.
    pub fn from_status_word(word: u16, index: usize) -> Self {
        match (word >> (index * 2)) & 0x03 {
            0 => FanHealth::Off,
            1 => FanHealth::Healthy,
            _ => FanHealth::Faulty,
        }
    }

    pub fn as_i16(self) -> i16 {
        match self {
            FanHealth::Off => 0,
            FanHealth::Healthy => 1,
            FanHealth::Faulty => 2,
        }
    }

    pub fn is_faulty(self) -> bool {
        matches!(self, FanHealth::Faulty)
    }
}

/// One decoded telemetry reading from a rack monitoring unit.
///
/// Produced by [`crate::telemetry::translate`] from a validated 58-byte
/// frame; the threshold alarm flags are filled in afterwards by the alarm
/// engine before the reading enters the write-behind buffer.
#[derive(Debug, Clone, Serialize)]
pub struct Reading {
    // ---
    /// Canonical device identifier: lower-case colon-separated MAC.
    pub mac: String,
    pub humidity: f32,
    pub inside_temperature: f32,
    pub outside_temperature: f32,
    pub lock_status: PortalState,
    pub door_status: PortalState,
    pub water_logging: bool,
    pub water_leakage: bool,
    pub output_voltage: f32,
    pub input_voltage: f32,
    pub battery_backup: f32,
    pub alarm_active: bool,
    pub fire_alarm: bool,
    pub fan_level1_running: bool,
    pub fan_level2_running: bool,
    pub fan_level3_running: bool,
    pub fan_level4_running: bool,
    /// Independent health code per fan, six fans.
    pub fan_status: [FanHealth; 6],
    /// Failure / lock-attempt counters and HUPS sub-system status bits.
    pub extended_status: u32,
    pub threshold_alarms: ThresholdAlarms,
    pub timestamp: DateTime<Utc>,
}

/// One `{min, max}` threshold pair for a numeric metric.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricRange {
    pub min: f32,
    pub max: f32,
}

impl MetricRange {
    /// A value alarms only strictly outside `[min, max]`; both bounds are
    /// themselves in range.
    pub fn is_violated(&self, value: f32) -> bool {
        value > self.max || value < self.min
    }
}

/// Static per-metric threshold configuration.
///
/// Supplied once at process start and read-only during operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub inside_temperature: MetricRange,
    pub outside_temperature: MetricRange,
    pub humidity: MetricRange,
    pub input_voltage: MetricRange,
    pub output_voltage: MetricRange,
    pub battery_backup: MetricRange,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        ThresholdConfig {
            inside_temperature: MetricRange {
                min: -10.0,
                max: 75.0,
            },
            outside_temperature: MetricRange {
                min: -20.0,
                max: 85.0,
            },
            humidity: MetricRange {
                min: 10.0,
                max: 95.0,
            },
            input_voltage: MetricRange {
                min: 40.0,
                max: 65.0,
            },
            output_voltage: MetricRange {
                min: 45.0,
                max: 55.0,
            },
            // Battery backup only has a lower alarm; max is kept for chart
            // normalization downstream.
            battery_backup: MetricRange {
                min: 10.0,
                max: 13.0,
            },
        }
    }
}
