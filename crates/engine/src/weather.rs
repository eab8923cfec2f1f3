//! Weather service — location-aware forecast assembly.
//!
//! Resolves a stored location to its provider code, fetches the multi-day
//! forecast, and enriches each day with the wave forecast where the
//! provider has one (coastal locations only; inland failures are ignored).

use std::sync::Arc;

use uuid::Uuid;

use skycast_common::error::AppError;
use skycast_common::types::{ForecastSnapshot, Location};
use skycast_provider::ForecastProvider;

use crate::store::LocationStore;

pub struct WeatherService {
    locations: Arc<dyn LocationStore>,
    provider: Arc<dyn ForecastProvider>,
}

impl WeatherService {
    pub fn new(locations: Arc<dyn LocationStore>, provider: Arc<dyn ForecastProvider>) -> Self {
        Self {
            locations,
            provider,
        }
    }

    /// Fetch a fresh forecast snapshot for a stored location.
    pub async fn get_forecast(&self, location_id: Uuid) -> Result<ForecastSnapshot, AppError> {
        let location = self.locations.find_by_id(location_id).await?;
        let forecast = self.provider.get_forecast(location.code).await?;

        let mut forecasts = forecast.forecasts;
        for day in &mut forecasts {
            // Wave data is best-effort; most locations have none.
            if let Ok(wave) = self.provider.get_wave_forecast(location.code, day.date).await {
                day.wave = Some(wave);
            }
        }

        Ok(ForecastSnapshot::new(
            location.id,
            forecast.name,
            forecast.state,
            forecasts,
        ))
    }

    /// Search locations by city name, preferring already-known locations and
    /// caching new provider results by code.
    pub async fn search_locations(&self, city: &str) -> Result<Vec<Location>, AppError> {
        if let Ok(known) = self.locations.find_by_name_and_state(city, "").await {
            return Ok(vec![known]);
        }

        let found = self.provider.search_locations(city).await?;

        let mut results = Vec::with_capacity(found.len());
        for location in found {
            match self.locations.find_by_code(location.code).await {
                Ok(existing) => results.push(existing),
                Err(AppError::NotFound(_)) => {
                    if let Err(err) = self.locations.create(&location).await {
                        tracing::warn!(
                            code = location.code,
                            error = %err,
                            "Failed to cache provider location"
                        );
                    }
                    results.push(location);
                }
                Err(err) => return Err(err),
            }
        }

        Ok(results)
    }
}
