//! Skycast notifier binary — runs the recurring scheduler and the delivery
//! queue consumer as one process with graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use skycast_common::config::AppConfig;
use skycast_common::db;
use skycast_common::redis_pool;

use skycast_engine::notification::NotificationService;
use skycast_engine::pg::{
    PgGlobalNotificationStore, PgLocationStore, PgNotificationStore, PgUserStore,
};
use skycast_engine::queue::{DeliveryQueue, RedisDeliveryQueue};
use skycast_engine::scheduler::GlobalNotificationEngine;
use skycast_engine::store::{
    GlobalNotificationStore, LocationStore, NotificationStore, UserStore,
};
use skycast_engine::weather::WeatherService;
use skycast_provider::{ForecastProvider, HttpForecastProvider};

use skycast_notifier::webhook::WebhookNotifier;
use skycast_notifier::worker::DeliveryWorker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skycast_notifier=info,skycast_engine=info".into()),
        )
        .json()
        .init();

    tracing::info!("Skycast notifier starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Connect to database
    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;

    // Run migrations
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    // Connect to Redis (delivery queue transport)
    let redis = redis_pool::create_redis_pool(&config.redis_url).await?;

    // Stores
    let notifications: Arc<dyn NotificationStore> =
        Arc::new(PgNotificationStore::new(pool.clone()));
    let users: Arc<dyn UserStore> = Arc::new(PgUserStore::new(pool.clone()));
    let locations: Arc<dyn LocationStore> = Arc::new(PgLocationStore::new(pool.clone()));
    let definitions: Arc<dyn GlobalNotificationStore> =
        Arc::new(PgGlobalNotificationStore::new(pool.clone()));

    // Collaborators
    let provider: Arc<dyn ForecastProvider> = Arc::new(HttpForecastProvider::new(
        config.weather_api_base_url.clone(),
    ));
    let weather = Arc::new(WeatherService::new(locations, provider));
    let queue = Arc::new(RedisDeliveryQueue::new(redis));

    // Re-enqueue anything persisted but never queued (e.g. an enqueue
    // skipped during an earlier fan-out).
    let notification_service = NotificationService::new(
        notifications.clone(),
        users.clone(),
        weather.clone(),
        queue.clone(),
    );
    if let Err(err) = notification_service.reconcile_pending().await {
        tracing::warn!(error = %err, "Pending-notification reconciliation failed");
    }

    let engine = GlobalNotificationEngine::new(
        definitions,
        users.clone(),
        notifications.clone(),
        weather.clone(),
        queue.clone(),
        Duration::from_secs(config.scheduler_poll_interval_secs),
    );

    let worker = Arc::new(DeliveryWorker::new(
        notifications,
        users,
        weather,
        Arc::new(WebhookNotifier::new(
            config.webhook_url.clone(),
            Some(config.api_token.clone()),
        )),
    ));

    // Both loops observe the same shutdown signal, fed by Ctrl+C.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal, stopping gracefully...");
            let _ = shutdown_tx.send(true);
        }
    });

    let (scheduler_result, consumer_result) = tokio::join!(
        engine.run(shutdown_rx.clone()),
        queue.consume(worker, shutdown_rx),
    );
    scheduler_result?;
    consumer_result?;

    queue.close().await?;
    tracing::info!("Skycast notifier stopped.");
    Ok(())
}
