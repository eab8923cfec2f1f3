//! Static bearer-token authentication.
//!
//! The API is protected by a single service token (`API_TOKEN`). Use the
//! `AuthToken` extractor on protected routes:
//!
//! ```ignore
//! async fn handler(_auth: AuthToken) -> impl IntoResponse {
//!     // only reached with a valid Authorization header
//! }
//! ```

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use skycast_common::error::AppError;

use crate::state::AppState;

/// Marker extractor proving the request carried a valid bearer token.
#[derive(Debug, Clone, Copy)]
pub struct AuthToken;

impl FromRequestParts<AppState> for AuthToken {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let expected = &state.config.api_token;
        if expected.is_empty() {
            return Err(AppError::Config("API token not configured".to_string()));
        }

        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        match header.strip_prefix("Bearer ") {
            Some(token) if token == expected => Ok(AuthToken),
            _ => Err(AppError::Auth("Missing or invalid token".to_string())),
        }
    }
}
