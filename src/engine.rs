//! Shared engine state for the telemetry core.
//!
//! One [`Engine`] is built at startup and shared (via `Arc`) between the
//! TCP ingest listener, the HTTP surface, and the background jobs. It also
//! carries the operator-facing operations consumed by the HTTP layer:
//! command dispatch, connected-identifier listing, and active-alarm lookup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use sqlx::PgPool;

use crate::buffer::ReadingBuffer;
use crate::config::Config;
use crate::models::ThresholdConfig;
use crate::registry::{CommandDispatcher, DeviceRegistry, DispatchOutcome};
use crate::store::ReadingStore;

// ---

/// Shared state and operator-facing operations.
pub struct Engine {
    pub config: Config,
    pub thresholds: ThresholdConfig,
    pub registry: Arc<DeviceRegistry>,
    pub dispatcher: CommandDispatcher,
    pub buffer: Arc<ReadingBuffer>,
    pub store: Arc<ReadingStore>,
    pub http: reqwest::Client,
    /// Latest active-alarm descriptions per device, kept so the HTTP layer
    /// never needs a storage round trip for them.
    alarm_board: Mutex<HashMap<String, Vec<String>>>,
}

impl Engine {
    pub fn new(config: Config, pool: PgPool) -> Result<Arc<Self>> {
        // ---
        let registry = Arc::new(DeviceRegistry::new());
        let dispatcher = CommandDispatcher::new(registry.clone());
        let buffer = Arc::new(ReadingBuffer::new(config.bulk_save_limit as usize));
        let store = Arc::new(ReadingStore::new(pool));

        // Rack cameras serve self-signed certificates
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Arc::new(Engine {
            config,
            thresholds: ThresholdConfig::default(),
            registry,
            dispatcher,
            buffer,
            store,
            http,
            alarm_board: Mutex::new(HashMap::new()),
        }))
    }

    /// Send a raw command string to a connected device.
    pub async fn dispatch_command(&self, mac: &str, command: &str) -> DispatchOutcome {
        self.dispatcher.send(mac, command.as_bytes()).await
    }

    /// Identifiers of all currently connected devices.
    pub fn connected_identifiers(&self) -> Vec<String> {
        self.registry.connected_ids()
    }

    /// Latest active-alarm descriptions for a device; empty if the device
    /// is unknown or alarm-free.
    pub fn active_alarms(&self, mac: &str) -> Vec<String> {
        // ---
        let mac = mac.to_ascii_lowercase();
        self.alarm_board
            .lock()
            .unwrap()
            .get(&mac)
            .cloned()
            .unwrap_or_default()
    }

    /// Record the alarm evaluation result of the latest frame for a device.
    pub(crate) fn record_alarms(&self, mac: &str, active: Vec<String>) {
        self.alarm_board
            .lock()
            .unwrap()
            .insert(mac.to_string(), active);
    }
}
