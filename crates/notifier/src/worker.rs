//! Queue consumer worker — turns a dequeued notification into an attempted
//! delivery and a final persisted status.
//!
//! Every failure is returned to the queue layer, which owns the retry and
//! dead-letter decisions. The single exception is a persistence failure
//! after a successful send: the delivery already happened, so the message
//! is acknowledged and the mismatch is only logged (at-least-once, not
//! exactly-once).

use std::sync::Arc;

use async_trait::async_trait;

use skycast_common::error::AppError;
use skycast_common::types::{Notification, NotificationStatus};
use skycast_engine::queue::DeliveryHandler;
use skycast_engine::store::{NotificationStore, UserStore};
use skycast_engine::weather::WeatherService;

use crate::webhook::Notifier;

pub struct DeliveryWorker {
    notifications: Arc<dyn NotificationStore>,
    users: Arc<dyn UserStore>,
    weather: Arc<WeatherService>,
    notifier: Arc<dyn Notifier>,
}

impl DeliveryWorker {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        users: Arc<dyn UserStore>,
        weather: Arc<WeatherService>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            notifications,
            users,
            weather,
            notifier,
        }
    }

    /// Mark the notification failed, persist the status, and hand the
    /// original error back to the queue layer.
    async fn fail(&self, notification: &mut Notification, err: AppError) -> AppError {
        notification.mark_failed();
        if let Err(persist_err) = self
            .notifications
            .update_status(notification.id, notification.status, None)
            .await
        {
            tracing::error!(
                notification_id = %notification.id,
                error = %persist_err,
                "Failed to persist failure status"
            );
        }
        err
    }
}

#[async_trait]
impl DeliveryHandler for DeliveryWorker {
    async fn handle(&self, mut notification: Notification) -> Result<(), AppError> {
        tracing::info!(notification_id = %notification.id, "Processing notification delivery");

        // A non-pending payload is a duplicate or stale delivery; the stored
        // record is terminal and must not be touched again.
        if notification.status != NotificationStatus::Pending {
            tracing::warn!(
                notification_id = %notification.id,
                status = %notification.status,
                "Dropping delivery for non-pending notification"
            );
            return Err(AppError::InvalidStatus);
        }

        // The queue requeues not-yet-due messages; this is the last line of
        // defense if one is dequeued ahead of schedule anyway.
        if !notification.is_ready_to_send() {
            tracing::warn!(
                notification_id = %notification.id,
                scheduled_for = %notification.scheduled_for,
                "Dequeued ahead of schedule, returning to queue"
            );
            return Err(AppError::InvalidSchedule);
        }

        // Opt-out is consulted at delivery time, not just at scheduling.
        let user = match self.users.find_by_id(notification.user_id).await {
            Ok(user) => user,
            Err(err) => return Err(self.fail(&mut notification, err).await),
        };
        if user.opt_out {
            // Terminal business rejection. The queue still retries it — the
            // transport has no opt-out awareness — but the outcome will not
            // change.
            return Err(self.fail(&mut notification, AppError::UserOptOut).await);
        }

        // Content may have gone stale between enqueue and delivery.
        match self.weather.get_forecast(notification.location_id).await {
            Ok(forecast) => notification.content = forecast,
            Err(err) => return Err(self.fail(&mut notification, err).await),
        }

        if let Err(err) = notification.validate_for_sending() {
            return Err(self.fail(&mut notification, err).await);
        }

        if let Err(err) = self.notifier.send(&notification).await {
            return Err(self.fail(&mut notification, err).await);
        }

        notification.mark_sent();
        if let Err(err) = self
            .notifications
            .update_status(notification.id, notification.status, notification.sent_at)
            .await
        {
            // Failing the message now would trigger a duplicate send.
            tracing::error!(
                notification_id = %notification.id,
                error = %err,
                "Notification delivered but status not persisted"
            );
        } else {
            tracing::info!(notification_id = %notification.id, "Notification sent");
        }

        Ok(())
    }
}
