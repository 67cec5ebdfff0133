//! Pure translation from a validated 58-byte frame to a [`Reading`].
//!
//! Field offsets live in [`crate::frame::layout`]; this module is the only
//! place that interprets them. Translation is side-effect free: the control
//! byte's ack/snapshot signals are returned to the caller, which owns the
//! socket write and the capture task.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::frame::{layout, RawFrame};
use crate::models::{FanHealth, PortalState, Reading};

// ---

/// Control byte value requesting a timestamp acknowledgement reply.
pub const CONTROL_ACK: u8 = 0x31;

/// Control byte value that, combined with an open door, requests a camera
/// snapshot.
pub const CONTROL_SNAPSHOT: u8 = 0x43;

/// Numeric fields outside this magnitude are physically impossible and mark
/// the frame as garbage.
pub const MAX_FIELD_MAGNITUDE: f32 = 100_000.0;

/// Why a frame was rejected by the translator.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed device identifier")]
    BadIdentifier,
    #[error("{metric} out of physical bounds: {value}")]
    ValueOutOfRange { metric: &'static str, value: f32 },
}

/// Out-of-band signals carried by the frame's control byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlSignals {
    /// Device asked for a timestamp acknowledgement reply.
    pub ack_requested: bool,
    /// Door is open and the device asked for a camera snapshot.
    pub snapshot_requested: bool,
}

// ---

/// Map a validated frame to a reading plus its control signals.
///
/// The frame is dropped (error returned, nothing persisted) if any of the
/// six core floats is NaN or exceeds [`MAX_FIELD_MAGNITUDE`] in magnitude.
/// Threshold alarm flags on the returned reading are left unset; the alarm
/// engine fills them in.
pub fn translate(
    frame: &RawFrame,
    timestamp: DateTime<Utc>,
) -> Result<(Reading, ControlSignals), DecodeError> {
    // ---
    let mac = std::str::from_utf8(frame.mac_bytes())
        .map_err(|_| DecodeError::BadIdentifier)?
        .to_ascii_lowercase();

    let humidity = checked_f32(frame, layout::HUMIDITY, "humidity")?;
    let inside_temperature = checked_f32(frame, layout::INSIDE_TEMPERATURE, "insideTemperature")?;
    let outside_temperature =
        checked_f32(frame, layout::OUTSIDE_TEMPERATURE, "outsideTemperature")?;
    let output_voltage = checked_f32(frame, layout::OUTPUT_VOLTAGE, "outputVoltage")?;
    let input_voltage = checked_f32(frame, layout::INPUT_VOLTAGE, "inputVoltage")?;
    let battery_backup = checked_f32(frame, layout::BATTERY_BACKUP, "batteryBackup")?;

    let door_status = PortalState::from_byte(frame.byte_at(layout::DOOR_STATUS));
    let control = frame.byte_at(layout::CONTROL);
    let fan_word = frame.u16_at(layout::FAN_STATUS);
    let mut fan_status = [FanHealth::Off; 6];
    for (i, status) in fan_status.iter_mut().enumerate() {
        *status = FanHealth::from_status_word(fan_word, i);
    }

    let reading = Reading {
        mac,
        humidity,
        inside_temperature,
        outside_temperature,
        lock_status: PortalState::from_byte(frame.byte_at(layout::LOCK_STATUS)),
        door_status,
        water_logging: frame.byte_at(layout::WATER_LOGGING) != 0,
        water_leakage: frame.byte_at(layout::WATER_LEAKAGE) != 0,
        output_voltage,
        input_voltage,
        battery_backup,
        alarm_active: frame.byte_at(layout::ALARM_ACTIVE) != 0,
        fire_alarm: frame.byte_at(layout::FIRE_ALARM) != 0,
        fan_level1_running: frame.byte_at(layout::FAN_LEVEL_RUNNING) != 0,
        fan_level2_running: frame.byte_at(layout::FAN_LEVEL_RUNNING + 1) != 0,
        fan_level3_running: frame.byte_at(layout::FAN_LEVEL_RUNNING + 2) != 0,
        fan_level4_running: frame.byte_at(layout::FAN_LEVEL_RUNNING + 3) != 0,
        fan_status,
        extended_status: frame.u32_at(layout::EXTENDED_STATUS),
        threshold_alarms: Default::default(),
        timestamp,
    };

    let signals = ControlSignals {
        ack_requested: control == CONTROL_ACK,
        snapshot_requested: control == CONTROL_SNAPSHOT && door_status.is_open(),
    };

    Ok((reading, signals))
}

/// Read a float field, reject NaN / out-of-bounds, round to two decimals.
fn checked_f32(frame: &RawFrame, offset: usize, metric: &'static str) -> Result<f32, DecodeError> {
    // ---
    let value = frame.f32_at(offset);
    if value.is_nan() || value.abs() > MAX_FIELD_MAGNITUDE {
        return Err(DecodeError::ValueOutOfRange { metric, value });
    }
    Ok((value * 100.0).round() / 100.0)
}
