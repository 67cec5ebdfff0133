//! Write-behind buffer for decoded readings.
//!
//! Appends are O(1) and never block on I/O. A flush is triggered either by
//! the bulk threshold (checked on every append) or by a fixed-interval
//! timer, whichever fires first. Both triggers swap the buffer for an empty
//! one under the lock and bulk-insert the snapshot outside it, so
//! concurrent producers never wait behind a slow storage call and a batch
//! can never be flushed twice.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::models::Reading;
use crate::store::ReadingStore;

// ---

/// Ordered, append-only buffer of readings awaiting persistence.
pub struct ReadingBuffer {
    limit: usize,
    inner: Mutex<Vec<Reading>>,
}

impl ReadingBuffer {
    /// `limit` is the bulk-save threshold: an append that reaches it hands
    /// the whole batch back to the caller for flushing.
    pub fn new(limit: usize) -> Self {
        ReadingBuffer {
            limit: limit.max(1),
            inner: Mutex::new(Vec::new()),
        }
    }

    /// Append one reading. Returns the drained batch when the threshold is
    /// reached, otherwise `None`.
    pub fn append(&self, reading: Reading) -> Option<Vec<Reading>> {
        let mut readings = self.inner.lock().unwrap();
        readings.push(reading);
        if readings.len() >= self.limit {
            Some(std::mem::take(&mut *readings))
        } else {
            None
        }
    }

    /// Swap the buffer for an empty one and return the snapshot.
    ///
    /// Readings appended after the swap land in the fresh buffer and belong
    /// to the next flush.
    pub fn drain(&self) -> Vec<Reading> {
        std::mem::take(&mut *self.inner.lock().unwrap())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---

/// Bulk-insert one drained batch, logging and dropping it on failure.
///
/// Telemetry is best-effort: losing one batch on a storage error must not
/// crash ingestion or block subsequent appends.
pub async fn flush(store: &ReadingStore, batch: Vec<Reading>) {
    // ---
    if batch.is_empty() {
        return;
    }
    let count = batch.len();
    match store.insert_many(&batch).await {
        Ok(()) => debug!("flushed {count} readings"),
        Err(err) => error!("bulk save error, dropping {count} readings: {err:#}"),
    }
}

/// Spawn the periodic flush task. Runs for the life of the process,
/// independent of any connection.
pub fn spawn_flush_timer(
    buffer: Arc<ReadingBuffer>,
    store: Arc<ReadingStore>,
    period: Duration,
) -> JoinHandle<()> {
    // ---
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let batch = buffer.drain();
            flush(&store, batch).await;
        }
    })
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::{FanHealth, PortalState};
    use chrono::Utc;

    fn reading(mac: &str) -> Reading {
        // ---
        Reading {
            mac: mac.to_string(),
            humidity: 50.0,
            inside_temperature: 25.0,
            outside_temperature: 30.0,
            lock_status: PortalState::Closed,
            door_status: PortalState::Closed,
            water_logging: false,
            water_leakage: false,
            output_voltage: 50.0,
            input_voltage: 52.0,
            battery_backup: 120.0,
            alarm_active: false,
            fire_alarm: false,
            fan_level1_running: false,
            fan_level2_running: false,
            fan_level3_running: false,
            fan_level4_running: false,
            fan_status: [FanHealth::Off; 6],
            extended_status: 0,
            threshold_alarms: Default::default(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn threshold_triggers_exactly_one_batch() {
        // ---
        let buffer = ReadingBuffer::new(3);
        assert!(buffer.append(reading("aa:bb:cc:dd:ee:01")).is_none());
        assert!(buffer.append(reading("aa:bb:cc:dd:ee:02")).is_none());

        let batch = buffer.append(reading("aa:bb:cc:dd:ee:03")).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].mac, "aa:bb:cc:dd:ee:01");
        assert_eq!(batch[2].mac, "aa:bb:cc:dd:ee:03");

        // Buffer is empty immediately after the swap
        assert!(buffer.is_empty());
    }

    #[test]
    fn appends_after_swap_land_in_the_next_batch() {
        // ---
        let buffer = ReadingBuffer::new(2);
        buffer.append(reading("aa:bb:cc:dd:ee:01"));
        let first = buffer.append(reading("aa:bb:cc:dd:ee:02")).unwrap();
        assert_eq!(first.len(), 2);

        buffer.append(reading("aa:bb:cc:dd:ee:03"));
        assert_eq!(buffer.len(), 1);
        let second = buffer.drain();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].mac, "aa:bb:cc:dd:ee:03");
    }

    #[test]
    fn drain_on_empty_buffer_is_a_noop() {
        // ---
        let buffer = ReadingBuffer::new(10);
        assert!(buffer.drain().is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn preserves_arrival_order() {
        // ---
        let buffer = ReadingBuffer::new(100);
        for i in 0..10 {
            buffer.append(reading(&format!("aa:bb:cc:dd:ee:{i:02x}")));
        }
        let batch = buffer.drain();
        let macs: Vec<_> = batch.iter().map(|r| r.mac.as_str()).collect();
        assert_eq!(macs[0], "aa:bb:cc:dd:ee:00");
        assert_eq!(macs[9], "aa:bb:cc:dd:ee:09");
    }
}
