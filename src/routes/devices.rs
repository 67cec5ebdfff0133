//! Connected-device, alarm, and threshold read endpoints.

use std::sync::Arc;

use axum::{
    extract::Path, extract::State, routing::get, Json, Router,
};

use crate::engine::Engine;
use crate::models::ThresholdConfig;

// ---

pub fn router() -> Router<Arc<Engine>> {
    // ---
    Router::new()
        .route("/api/devices", get(connected_devices))
        .route("/api/device/{mac}/alarms", get(device_alarms))
        .route("/api/thresholds", get(thresholds))
}

/// Handle `GET /api/devices`: identifiers of all live connections.
async fn connected_devices(State(engine): State<Arc<Engine>>) -> Json<Vec<String>> {
    Json(engine.connected_identifiers())
}

/// Handle `GET /api/device/{mac}/alarms`: latest active-alarm descriptions
/// for one device. Unknown devices yield an empty list rather than a 404 so
/// dashboards can poll without special-casing.
async fn device_alarms(
    State(engine): State<Arc<Engine>>,
    Path(mac): Path<String>,
) -> Json<Vec<String>> {
    Json(engine.active_alarms(&mac))
}

/// Handle `GET /api/thresholds`: the static threshold table.
async fn thresholds(State(engine): State<Arc<Engine>>) -> Json<ThresholdConfig> {
    Json(engine.thresholds)
}
