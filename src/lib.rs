//! Telemetry ingest core for equipment-rack monitoring units.
//!
//! Rack units stream 58-byte binary frames over persistent TCP connections.
//! This crate decodes those frames (resynchronizing after corruption),
//! computes alarm state against static thresholds, keeps a registry of live
//! device connections for inbound command dispatch, and batches decoded
//! readings into PostgreSQL on a write-behind buffer.
//!
//! Module layout follows the Explicit Module Boundary Pattern (EMBP): each
//! concern lives in its own module, `engine` ties the shared pieces together,
//! and `routes` exposes the operator-facing HTTP surface as a subrouter
//! gateway.

pub mod alarms;
pub mod buffer;
pub mod config;
pub mod engine;
pub mod frame;
pub mod inc_log;
pub mod ingest;
pub mod models;
pub mod registry;
pub mod retention;
pub mod routes;
pub mod schema;
pub mod snapshot;
pub mod store;
pub mod telemetry;

pub use config::Config;
pub use engine::Engine;
pub use models::{FanHealth, PortalState, Reading, ThresholdConfig};
pub use registry::{CommandDispatcher, ConnectionHandle, DeviceRegistry, DispatchOutcome};
