pub mod global;
pub mod health;
pub mod locations;
pub mod notifications;
pub mod users;
pub mod webhook;

use axum::Router;

use crate::state::AppState;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(notifications::router())
        .merge(global::router())
        .merge(users::router())
        .merge(locations::router())
        .merge(webhook::router())
        .with_state(state)
}
