//! Operator-facing HTTP surface, assembled as a subrouter gateway (EMBP).
//!
//! Only the interfaces the telemetry core itself exposes live here:
//! command dispatch, connected-device listing, active-alarm lookup, and the
//! threshold table. User and device administration belongs to the external
//! CRUD layer.

use std::sync::Arc;

use axum::Router;

use crate::engine::Engine;

mod command;
mod devices;
mod health;

// ---

pub fn router(engine: Arc<Engine>) -> Router {
    // ---
    Router::new()
        .merge(command::router())
        .merge(devices::router())
        .merge(health::router())
        .with_state(engine)
}
