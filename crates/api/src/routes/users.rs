//! User management routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use uuid::Uuid;

use skycast_common::error::AppError;
use skycast_common::types::User;

use crate::middleware::auth::AuthToken;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users", post(create_user))
        .route("/api/users", get(list_users))
        .route("/api/users/{id}", patch(update_user))
        .route("/api/users/{id}/opt-out", patch(set_opt_out))
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub location_id: Uuid,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub location_id: Option<Uuid>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct OptOutRequest {
    pub opt_out: bool,
}

/// POST /api/users — Register a new subscriber.
async fn create_user(
    State(state): State<AppState>,
    _auth: AuthToken,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = state
        .users
        .create(request.name, request.email, request.location_id)
        .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /api/users — List all users.
async fn list_users(
    State(state): State<AppState>,
    _auth: AuthToken,
) -> Result<Json<Vec<User>>, AppError> {
    let users = state.users.list().await?;
    Ok(Json(users))
}

/// PATCH /api/users/:id — Update a user's name and/or home location.
async fn update_user(
    State(state): State<AppState>,
    _auth: AuthToken,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    let user = state
        .users
        .update(id, request.name, request.location_id)
        .await?;
    Ok(Json(user))
}

/// PATCH /api/users/:id/opt-out — Flip the delivery opt-out flag.
async fn set_opt_out(
    State(state): State<AppState>,
    _auth: AuthToken,
    Path(id): Path<Uuid>,
    Json(request): Json<OptOutRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.users.set_opt_out(id, request.opt_out).await?;
    Ok(Json(serde_json::json!({ "opt_out": request.opt_out })))
}
