//! Recurring scheduler — the global notification engine.
//!
//! Wakes on a fixed interval (60s by default, never above the minute
//! resolution of `time_of_day`), and for every active definition that is
//! due fans out one Pending notification per active user, enqueuing each on
//! the delivery queue. `last_execution` is the dedup checkpoint: it is only
//! advanced after the fan-out, and a definition never executes twice for
//! the same eligible period.
//!
//! Runs as a single active instance; a second concurrent scheduler would
//! produce duplicate fan-outs.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use tokio::sync::watch;
use uuid::Uuid;

use skycast_common::error::AppError;
use skycast_common::types::{Frequency, GlobalNotification, Notification};

use crate::queue::DeliveryQueue;
use crate::store::{GlobalNotificationStore, NotificationStore, UserStore};
use crate::weather::WeatherService;

/// Fan-out notifications are scheduled this many seconds into the future,
/// giving the queue a short grace window before delivery is due.
const FANOUT_SCHEDULE_DELAY_SECS: i64 = 120;

pub struct GlobalNotificationEngine {
    definitions: Arc<dyn GlobalNotificationStore>,
    users: Arc<dyn UserStore>,
    notifications: Arc<dyn NotificationStore>,
    weather: Arc<WeatherService>,
    queue: Arc<dyn DeliveryQueue>,
    poll_interval: Duration,
}

impl GlobalNotificationEngine {
    pub fn new(
        definitions: Arc<dyn GlobalNotificationStore>,
        users: Arc<dyn UserStore>,
        notifications: Arc<dyn NotificationStore>,
        weather: Arc<WeatherService>,
        queue: Arc<dyn DeliveryQueue>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            definitions,
            users,
            notifications,
            weather,
            queue,
            poll_interval,
        }
    }

    /// Create a new active recurring definition.
    pub async fn create(
        &self,
        time_of_day: NaiveTime,
        frequency: Frequency,
    ) -> Result<GlobalNotification, AppError> {
        let definition = GlobalNotification::new(time_of_day, frequency);
        self.definitions.create(&definition).await?;

        tracing::info!(
            definition_id = %definition.id,
            time_of_day = %time_of_day.format("%H:%M"),
            frequency = %frequency,
            "Global notification definition created"
        );

        Ok(definition)
    }

    pub async fn list_active(&self) -> Result<Vec<GlobalNotification>, AppError> {
        self.definitions.find_active().await
    }

    /// Administrative activation/deactivation. Definitions are never deleted.
    pub async fn set_active(
        &self,
        id: Uuid,
        active: bool,
    ) -> Result<GlobalNotification, AppError> {
        self.definitions.set_active(id, active).await
    }

    /// One scheduler tick: fan out every definition that is due at `now`.
    ///
    /// A persistence failure inside a fan-out propagates and aborts the
    /// whole tick, leaving `last_execution` untouched so the definition can
    /// re-fire on a later matching tick.
    pub async fn process_tick(&self, now: DateTime<Utc>) -> Result<(), AppError> {
        let definitions = self.definitions.find_active().await?;

        for definition in definitions {
            if !definition.should_execute(now) {
                continue;
            }
            self.fan_out(&definition, now).await?;
        }

        Ok(())
    }

    async fn fan_out(
        &self,
        definition: &GlobalNotification,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let users = match self.users.find_all_active().await {
            Ok(users) => users,
            Err(err) => {
                tracing::error!(
                    definition_id = %definition.id,
                    error = %err,
                    "Failed to load users for fan-out"
                );
                return Ok(());
            }
        };

        tracing::info!(
            definition_id = %definition.id,
            users = users.len(),
            "Fanning out global notification"
        );

        let scheduled_for = now + chrono::Duration::seconds(FANOUT_SCHEDULE_DELAY_SECS);

        for user in &users {
            let forecast = match self.weather.get_forecast(user.location_id).await {
                Ok(forecast) => forecast,
                Err(err) => {
                    // One user's provider failure never blocks the rest; the
                    // partial fan-out is accepted and not retried here.
                    tracing::warn!(
                        user_id = %user.id,
                        error = %err,
                        "Skipping user, forecast fetch failed"
                    );
                    continue;
                }
            };

            let notification =
                Notification::new(user.id, user.location_id, forecast, scheduled_for)?;
            self.notifications.create(&notification).await?;

            if let Err(err) = self.queue.publish(&notification).await {
                // Persisted but not enqueued; reconciliation republishes it.
                tracing::warn!(
                    notification_id = %notification.id,
                    error = %err,
                    "Failed to enqueue notification"
                );
                continue;
            }
        }

        if let Err(err) = self
            .definitions
            .update_last_execution(definition.id, now)
            .await
        {
            // Tick not remembered: the definition may re-fire on a later
            // matching tick. Degraded, not fatal.
            tracing::error!(
                definition_id = %definition.id,
                error = %err,
                "Failed to record definition execution"
            );
        }

        Ok(())
    }

    /// Run the scheduler loop until the shutdown signal fires.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), AppError> {
        let mut ticker = tokio::time::interval(self.poll_interval);

        tracing::info!(
            interval_secs = self.poll_interval.as_secs(),
            "Global notification scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.process_tick(Utc::now()).await {
                        tracing::error!(error = %err, "Scheduler tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("Global notification scheduler stopped");
                        return Ok(());
                    }
                }
            }
        }
    }
}
