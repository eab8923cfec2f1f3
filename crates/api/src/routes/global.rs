//! Global (recurring) notification administration routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::NaiveTime;
use uuid::Uuid;

use skycast_common::error::AppError;
use skycast_common::types::{Frequency, GlobalNotification};

use crate::middleware::auth::AuthToken;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notifications/global", post(create_global_notification))
        .route("/api/notifications/global", get(list_global_notifications))
        .route(
            "/api/notifications/global/{id}",
            patch(update_global_notification),
        )
}

/// Payload for creating a recurring definition.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CreateGlobalNotificationRequest {
    /// Fire time in "HH:MM" (24h) format.
    pub time_of_day: String,
    pub frequency: Frequency,
}

/// Payload for activating/deactivating a definition.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct UpdateGlobalNotificationRequest {
    pub active: bool,
}

/// POST /api/notifications/global — Create a recurring definition.
async fn create_global_notification(
    State(state): State<AppState>,
    _auth: AuthToken,
    Json(request): Json<CreateGlobalNotificationRequest>,
) -> Result<(StatusCode, Json<GlobalNotification>), AppError> {
    let time_of_day = NaiveTime::parse_from_str(&request.time_of_day, "%H:%M")
        .map_err(|_| AppError::Validation("time_of_day must be in HH:MM format".to_string()))?;

    let definition = state.global.create(time_of_day, request.frequency).await?;
    Ok((StatusCode::CREATED, Json(definition)))
}

/// GET /api/notifications/global — List active definitions.
async fn list_global_notifications(
    State(state): State<AppState>,
    _auth: AuthToken,
) -> Result<Json<Vec<GlobalNotification>>, AppError> {
    let definitions = state.global.list_active().await?;
    Ok(Json(definitions))
}

/// PATCH /api/notifications/global/:id — Activate or deactivate a definition.
async fn update_global_notification(
    State(state): State<AppState>,
    _auth: AuthToken,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateGlobalNotificationRequest>,
) -> Result<Json<GlobalNotification>, AppError> {
    let definition = state.global.set_active(id, request.active).await?;
    Ok(Json(definition))
}
