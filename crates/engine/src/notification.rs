//! One-off notification scheduling.
//!
//! `schedule` is the API-triggered path: every step is sequential and the
//! first failure aborts the whole operation, so nothing is ever enqueued
//! without having been persisted first.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use skycast_common::error::AppError;
use skycast_common::types::Notification;

use crate::queue::DeliveryQueue;
use crate::store::{NotificationStore, UserStore};
use crate::weather::WeatherService;

pub struct NotificationService {
    notifications: Arc<dyn NotificationStore>,
    users: Arc<dyn UserStore>,
    weather: Arc<WeatherService>,
    queue: Arc<dyn DeliveryQueue>,
}

impl NotificationService {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        users: Arc<dyn UserStore>,
        weather: Arc<WeatherService>,
        queue: Arc<dyn DeliveryQueue>,
    ) -> Self {
        Self {
            notifications,
            users,
            weather,
            queue,
        }
    }

    /// Schedule a one-off notification for a user.
    pub async fn schedule(
        &self,
        user_id: Uuid,
        location_id: Uuid,
        scheduled_for: DateTime<Utc>,
    ) -> Result<Notification, AppError> {
        let user = self.users.find_by_id(user_id).await?;
        if user.opt_out {
            return Err(AppError::UserOptOut);
        }

        let forecast = self.weather.get_forecast(location_id).await?;
        let notification = Notification::new(user_id, location_id, forecast, scheduled_for)?;

        self.notifications.create(&notification).await?;
        self.queue.publish(&notification).await?;

        tracing::info!(
            notification_id = %notification.id,
            user_id = %user_id,
            scheduled_for = %notification.scheduled_for,
            "Notification scheduled"
        );

        Ok(notification)
    }

    /// List a user's notifications. The user must exist.
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Notification>, AppError> {
        self.users.find_by_id(user_id).await?;
        self.notifications.find_by_user(user_id).await
    }

    /// Persist a notification's current status.
    pub async fn update_status(&self, notification: &Notification) -> Result<(), AppError> {
        self.notifications
            .update_status(notification.id, notification.status, notification.sent_at)
            .await
    }

    /// Re-enqueue due Pending notifications that never reached the queue
    /// (e.g. an enqueue skipped during a fan-out). Only Pending records are
    /// ever republished; duplicates are absorbed by at-least-once delivery.
    pub async fn reconcile_pending(&self) -> Result<usize, AppError> {
        let due = self.notifications.find_due_pending(Utc::now()).await?;

        let mut republished = 0;
        for notification in &due {
            if let Err(err) = self.queue.publish(notification).await {
                tracing::warn!(
                    notification_id = %notification.id,
                    error = %err,
                    "Failed to re-enqueue pending notification"
                );
                continue;
            }
            republished += 1;
        }

        if republished > 0 {
            tracing::info!(republished, "Re-enqueued pending notifications");
        }
        Ok(republished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Timelike};
    use std::sync::atomic::Ordering;

    use skycast_common::types::NotificationStatus;

    use crate::testing::{
        MemoryDeliveryQueue, MemoryLocationStore, MemoryNotificationStore, MemoryUserStore,
        StubForecastProvider, sample_location, sample_user,
    };

    struct Harness {
        service: NotificationService,
        notifications: Arc<MemoryNotificationStore>,
        users: Arc<MemoryUserStore>,
        provider: Arc<StubForecastProvider>,
        queue: Arc<MemoryDeliveryQueue>,
        weather: Arc<WeatherService>,
        user_id: Uuid,
        location_id: Uuid,
    }

    fn harness() -> Harness {
        let notifications = Arc::new(MemoryNotificationStore::default());
        let users = Arc::new(MemoryUserStore::default());
        let locations = Arc::new(MemoryLocationStore::default());
        let provider = Arc::new(StubForecastProvider::default());
        let queue = Arc::new(MemoryDeliveryQueue::default());

        let location = sample_location(100);
        let location_id = location.id;
        locations.locations.lock().unwrap().push(location);

        let user = sample_user(location_id);
        let user_id = user.id;
        users.users.lock().unwrap().push(user);

        let weather = Arc::new(WeatherService::new(locations, provider.clone()));
        let service = NotificationService::new(
            notifications.clone(),
            users.clone(),
            weather.clone(),
            queue.clone(),
        );

        Harness {
            service,
            notifications,
            users,
            provider,
            queue,
            weather,
            user_id,
            location_id,
        }
    }

    #[tokio::test]
    async fn test_schedule_creates_pending_and_publishes() {
        let h = harness();
        let scheduled_for = Utc::now() + Duration::minutes(10);

        let notification = h
            .service
            .schedule(h.user_id, h.location_id, scheduled_for)
            .await
            .unwrap();

        assert_eq!(notification.status, NotificationStatus::Pending);
        assert_eq!(notification.scheduled_for.nanosecond(), 0);
        assert!(notification.scheduled_for > notification.created_at);

        assert_eq!(h.notifications.notifications.lock().unwrap().len(), 1);
        let published = h.queue.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].id, notification.id);
    }

    #[tokio::test]
    async fn test_schedule_rejects_opted_out_user() {
        let h = harness();
        h.users.users.lock().unwrap()[0].opt_out = true;

        let err = h
            .service
            .schedule(h.user_id, h.location_id, Utc::now() + Duration::minutes(10))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::UserOptOut));
        assert!(h.notifications.notifications.lock().unwrap().is_empty());
        assert!(h.queue.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_schedule_rejects_past_time() {
        let h = harness();

        let err = h
            .service
            .schedule(h.user_id, h.location_id, Utc::now() - Duration::minutes(1))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidSchedule));
        assert!(h.notifications.notifications.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_schedule_unknown_user() {
        let h = harness();

        let err = h
            .service
            .schedule(Uuid::new_v4(), h.location_id, Utc::now() + Duration::minutes(10))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_schedule_provider_failure_persists_nothing() {
        let h = harness();
        h.provider.fail_all.store(true, Ordering::SeqCst);

        let err = h
            .service
            .schedule(h.user_id, h.location_id, Utc::now() + Duration::minutes(10))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Provider(_)));
        assert!(h.notifications.notifications.lock().unwrap().is_empty());
        assert!(h.queue.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_schedule_publish_failure_surfaces_after_persist() {
        let h = harness();
        h.queue.fail_publish.store(true, Ordering::SeqCst);

        let result = h
            .service
            .schedule(h.user_id, h.location_id, Utc::now() + Duration::minutes(10))
            .await;

        assert!(result.is_err());
        // Persisted before the enqueue attempt; reconciliation picks it up.
        assert_eq!(h.notifications.notifications.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_for_user_requires_existing_user() {
        let h = harness();
        let err = h.service.list_for_user(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reconcile_republishes_only_due_pending() {
        let h = harness();

        let snapshot = h.weather.get_forecast(h.location_id).await.unwrap();

        let mut due = Notification::new(
            h.user_id,
            h.location_id,
            snapshot.clone(),
            Utc::now() + Duration::minutes(5),
        )
        .unwrap();
        due.scheduled_for = Utc::now() - Duration::minutes(5);

        let mut sent = due.clone();
        sent.id = Uuid::new_v4();
        sent.mark_sent();

        let future = Notification::new(
            h.user_id,
            h.location_id,
            snapshot,
            Utc::now() + Duration::minutes(30),
        )
        .unwrap();

        {
            let mut stored = h.notifications.notifications.lock().unwrap();
            stored.push(due.clone());
            stored.push(sent);
            stored.push(future);
        }

        let republished = h.service.reconcile_pending().await.unwrap();

        assert_eq!(republished, 1);
        let published = h.queue.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].id, due.id);
    }
}
