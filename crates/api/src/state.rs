//! Shared application state for the Axum API server.

use std::sync::Arc;

use skycast_common::config::AppConfig;
use skycast_engine::notification::NotificationService;
use skycast_engine::scheduler::GlobalNotificationEngine;
use skycast_engine::user::UserService;
use skycast_engine::weather::WeatherService;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub notifications: Arc<NotificationService>,
    pub global: Arc<GlobalNotificationEngine>,
    pub users: Arc<UserService>,
    pub weather: Arc<WeatherService>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        notifications: Arc<NotificationService>,
        global: Arc<GlobalNotificationEngine>,
        users: Arc<UserService>,
        weather: Arc<WeatherService>,
    ) -> Self {
        Self {
            config,
            notifications,
            global,
            users,
            weather,
        }
    }
}
