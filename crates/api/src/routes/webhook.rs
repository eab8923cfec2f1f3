//! Test webhook receiver — a loopback endpoint for exercising deliveries.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;

use skycast_common::error::AppError;

use crate::middleware::auth::AuthToken;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/api/webhook/test/notifications",
        post(receive_notification),
    )
}

/// POST /api/webhook/test/notifications — Log and echo a delivered payload.
async fn receive_notification(
    State(_state): State<AppState>,
    _auth: AuthToken,
    Json(notification): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    tracing::info!(payload = %notification, "Test webhook received notification");

    Ok(Json(json!({
        "message": "notification received",
        "data": notification
    })))
}
