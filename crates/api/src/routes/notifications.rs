//! One-off notification scheduling routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use skycast_common::error::AppError;
use skycast_common::types::Notification;

use crate::middleware::auth::AuthToken;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", post(schedule_notification))
        .route("/api/notifications/{user_id}", get(list_user_notifications))
}

/// Payload for scheduling a one-off notification.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ScheduleNotificationRequest {
    pub user_id: Uuid,
    pub location_id: Uuid,
    pub scheduled_for: DateTime<Utc>,
}

/// POST /api/notifications — Schedule a notification for a user.
async fn schedule_notification(
    State(state): State<AppState>,
    _auth: AuthToken,
    Json(request): Json<ScheduleNotificationRequest>,
) -> Result<(StatusCode, Json<Notification>), AppError> {
    let notification = state
        .notifications
        .schedule(request.user_id, request.location_id, request.scheduled_for)
        .await?;

    Ok((StatusCode::CREATED, Json(notification)))
}

/// GET /api/notifications/:user_id — List a user's notifications.
async fn list_user_notifications(
    State(state): State<AppState>,
    _auth: AuthToken,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<Notification>>, AppError> {
    let notifications = state.notifications.list_for_user(user_id).await?;
    Ok(Json(notifications))
}
