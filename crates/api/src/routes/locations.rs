//! Location search and forecast routes.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use skycast_common::error::AppError;
use skycast_common::types::{ForecastSnapshot, Location};

use crate::middleware::auth::AuthToken;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/locations", get(search_locations))
        .route("/api/locations/{id}/forecast", get(get_forecast))
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SearchLocationsQuery {
    pub city: String,
}

/// GET /api/locations?city= — Search locations by city name.
async fn search_locations(
    State(state): State<AppState>,
    _auth: AuthToken,
    Query(query): Query<SearchLocationsQuery>,
) -> Result<Json<Vec<Location>>, AppError> {
    if query.city.is_empty() {
        return Err(AppError::Validation("city must not be empty".to_string()));
    }

    let locations = state.weather.search_locations(&query.city).await?;
    Ok(Json(locations))
}

/// GET /api/locations/:id/forecast — Current forecast for a stored location.
async fn get_forecast(
    State(state): State<AppState>,
    _auth: AuthToken,
    Path(id): Path<Uuid>,
) -> Result<Json<ForecastSnapshot>, AppError> {
    let forecast = state.weather.get_forecast(id).await?;
    Ok(Json(forecast))
}
