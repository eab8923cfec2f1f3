//! Forecast provider gateway.
//!
//! Wraps the upstream weather API behind the `ForecastProvider` trait:
//! location search, multi-day forecasts, and wave forecasts for coastal
//! locations. Implementations must map transport and decoding failures to
//! `AppError::Provider` so callers can treat the provider as a single
//! "unavailable" failure mode.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;

use skycast_common::error::AppError;
use skycast_common::types::{DailyForecast, Location, WaveForecast, WavePeriod};

/// Forecast data for one location as returned by the provider.
///
/// Carries the provider's own naming; callers attach their location id when
/// embedding this into a notification snapshot.
#[derive(Debug, Clone)]
pub struct ProviderForecast {
    pub name: String,
    pub state: String,
    pub forecasts: Vec<DailyForecast>,
}

/// Capability interface over the upstream weather API.
#[async_trait]
pub trait ForecastProvider: Send + Sync {
    /// Search locations by (partial) city name.
    async fn search_locations(&self, query: &str) -> Result<Vec<Location>, AppError>;

    /// Fetch the multi-day forecast for a provider location code.
    async fn get_forecast(&self, code: i32) -> Result<ProviderForecast, AppError>;

    /// Fetch the wave forecast for a provider location code on a given day.
    /// Fails for inland locations; callers treat this as best-effort.
    async fn get_wave_forecast(&self, code: i32, date: NaiveDate) -> Result<WaveForecast, AppError>;
}

#[derive(Debug, Deserialize)]
struct LocationDto {
    code: i32,
    name: String,
    state: String,
}

#[derive(Debug, Deserialize)]
struct DailyForecastDto {
    date: NaiveDate,
    min_temp: f64,
    max_temp: f64,
    forecast: String,
    uv_index: f64,
}

impl From<DailyForecastDto> for DailyForecast {
    fn from(dto: DailyForecastDto) -> Self {
        DailyForecast {
            date: dto.date,
            min_temp: dto.min_temp,
            max_temp: dto.max_temp,
            forecast: dto.forecast,
            uv_index: dto.uv_index,
            wave: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ForecastResponseDto {
    name: String,
    state: String,
    forecasts: Vec<DailyForecastDto>,
}

#[derive(Debug, Deserialize)]
struct WavePeriodDto {
    swell: String,
    height_m: f64,
    direction: String,
    wind_speed_kmh: f64,
    wind_direction: String,
}

impl From<WavePeriodDto> for WavePeriod {
    fn from(dto: WavePeriodDto) -> Self {
        WavePeriod {
            swell: dto.swell,
            height_m: dto.height_m,
            direction: dto.direction,
            wind_speed_kmh: dto.wind_speed_kmh,
            wind_direction: dto.wind_direction,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WaveResponseDto {
    morning: WavePeriodDto,
    afternoon: WavePeriodDto,
    night: WavePeriodDto,
}

/// HTTP client for the upstream weather API.
pub struct HttpForecastProvider {
    base_url: String,
    client: reqwest::Client,
}

impl HttpForecastProvider {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    fn unavailable(err: impl std::fmt::Display) -> AppError {
        AppError::Provider(err.to_string())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        query: &[(&str, String)],
    ) -> Result<T, AppError> {
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(Self::unavailable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Provider(format!(
                "unexpected status {} from {}",
                status, url
            )));
        }

        response.json::<T>().await.map_err(Self::unavailable)
    }
}

#[async_trait]
impl ForecastProvider for HttpForecastProvider {
    async fn search_locations(&self, query: &str) -> Result<Vec<Location>, AppError> {
        let url = format!("{}/v1/locations", self.base_url);
        let cities: Vec<LocationDto> = self
            .get_json(url, &[("search", query.to_string())])
            .await?;

        // Entries the provider returns with unusable fields are skipped.
        let locations = cities
            .into_iter()
            .filter_map(|c| Location::new(c.code, c.name, c.state).ok())
            .collect();

        Ok(locations)
    }

    async fn get_forecast(&self, code: i32) -> Result<ProviderForecast, AppError> {
        let url = format!("{}/v1/locations/{}/forecast", self.base_url, code);
        let response: ForecastResponseDto = self.get_json(url, &[]).await?;
        tracing::debug!(code, days = response.forecasts.len(), "Forecast fetched");

        Ok(ProviderForecast {
            name: response.name,
            state: response.state,
            forecasts: response.forecasts.into_iter().map(Into::into).collect(),
        })
    }

    async fn get_wave_forecast(&self, code: i32, date: NaiveDate) -> Result<WaveForecast, AppError> {
        let url = format!("{}/v1/locations/{}/waves", self.base_url, code);
        let response: WaveResponseDto = self
            .get_json(url, &[("date", date.format("%Y-%m-%d").to_string())])
            .await?;

        Ok(WaveForecast {
            morning: response.morning.into(),
            afternoon: response.afternoon.into(),
            night: response.night.into(),
        })
    }
}
