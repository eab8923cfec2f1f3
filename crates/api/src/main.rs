//! Skycast API server binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use skycast_common::config::AppConfig;
use skycast_common::db::create_pool;
use skycast_common::redis_pool::create_redis_pool;

use skycast_engine::notification::NotificationService;
use skycast_engine::pg::{
    PgGlobalNotificationStore, PgLocationStore, PgNotificationStore, PgUserStore,
};
use skycast_engine::queue::RedisDeliveryQueue;
use skycast_engine::scheduler::GlobalNotificationEngine;
use skycast_engine::store::{
    GlobalNotificationStore, LocationStore, NotificationStore, UserStore,
};
use skycast_engine::user::UserService;
use skycast_engine::weather::WeatherService;
use skycast_provider::{ForecastProvider, HttpForecastProvider};

use skycast_api::routes::create_router;
use skycast_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("skycast_api=debug,skycast_engine=debug,tower_http=debug")
        }))
        .init();

    tracing::info!("Starting Skycast API server...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Create database connection pool
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    tracing::info!("Database pool created");

    // Run migrations
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    // Create Redis connection
    let redis = create_redis_pool(&config.redis_url).await?;
    tracing::info!("Redis connection established");

    // Stores and collaborators
    let notifications: Arc<dyn NotificationStore> =
        Arc::new(PgNotificationStore::new(pool.clone()));
    let users: Arc<dyn UserStore> = Arc::new(PgUserStore::new(pool.clone()));
    let locations: Arc<dyn LocationStore> = Arc::new(PgLocationStore::new(pool.clone()));
    let definitions: Arc<dyn GlobalNotificationStore> =
        Arc::new(PgGlobalNotificationStore::new(pool.clone()));

    let provider: Arc<dyn ForecastProvider> = Arc::new(HttpForecastProvider::new(
        config.weather_api_base_url.clone(),
    ));
    let weather = Arc::new(WeatherService::new(locations, provider));
    let queue = Arc::new(RedisDeliveryQueue::new(redis));

    // Services
    let notification_service = Arc::new(NotificationService::new(
        notifications.clone(),
        users.clone(),
        weather.clone(),
        queue.clone(),
    ));
    let global_engine = Arc::new(GlobalNotificationEngine::new(
        definitions,
        users.clone(),
        notifications,
        weather.clone(),
        queue,
        Duration::from_secs(config.scheduler_poll_interval_secs),
    ));
    let user_service = Arc::new(UserService::new(users));

    // Build application state
    let state = AppState::new(
        config.clone(),
        notification_service,
        global_engine,
        user_service,
        weather,
    );

    // Build router
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received shutdown signal, stopping gracefully...");
        })
        .await?;

    tracing::info!("Skycast API server stopped.");
    Ok(())
}
