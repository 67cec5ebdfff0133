//! Outbound device command endpoint.

use std::sync::Arc;

use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router,
};
use serde::Deserialize;
use tracing::info;

use crate::engine::Engine;
use crate::registry::DispatchOutcome;

// ---

pub fn router() -> Router<Arc<Engine>> {
    // ---
    Router::new().route("/command", post(handler))
}

/// Request body for `POST /command`.
///
/// The command string format is owned by the device firmware protocol;
/// this layer forwards it as raw bytes.
#[derive(Debug, Deserialize)]
struct CommandRequest {
    mac: String,
    command: String,
}

async fn handler(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<CommandRequest>,
) -> impl IntoResponse {
    // ---
    let mac = req.mac.to_ascii_lowercase();

    match engine.dispatch_command(&mac, &req.command).await {
        DispatchOutcome::Sent => {
            info!("sent command {:?} to {mac}", req.command);
            (
                StatusCode::OK,
                Json(serde_json::json!({ "message": format!("Command sent to {mac}") })),
            )
                .into_response()
        }
        DispatchOutcome::NotConnected => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "message": format!("Device {mac} not connected") })),
        )
            .into_response(),
        DispatchOutcome::WriteError(err) => {
            tracing::error!("failed to send command to {mac}: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "message": format!("Error sending command to {mac}") })),
            )
                .into_response()
        }
    }
}
