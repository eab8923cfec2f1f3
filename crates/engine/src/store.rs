//! Persistence capability interfaces.
//!
//! Each trait is the narrow set of operations one entity needs, so services
//! and workers can run against in-memory fakes in tests. The Postgres
//! implementations live in [`crate::pg`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use skycast_common::error::AppError;
use skycast_common::types::{GlobalNotification, Location, Notification, NotificationStatus, User};

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create(&self, notification: &Notification) -> Result<(), AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Notification, AppError>;

    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<Notification>, AppError>;

    /// Pending notifications whose schedule has passed at `now`.
    async fn find_due_pending(&self, now: DateTime<Utc>) -> Result<Vec<Notification>, AppError>;

    /// Update the delivery status. A missing row is reported as
    /// `AppError::NotFound`, distinct from other failures.
    async fn update_status(
        &self,
        id: Uuid,
        status: NotificationStatus,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, user: &User) -> Result<(), AppError>;

    async fn update(&self, user: &User) -> Result<(), AppError>;

    async fn find_all(&self) -> Result<Vec<User>, AppError>;

    /// Users who have not opted out of notifications.
    async fn find_all_active(&self) -> Result<Vec<User>, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<User, AppError>;

    async fn set_opt_out(&self, id: Uuid, opt_out: bool) -> Result<(), AppError>;
}

#[async_trait]
pub trait LocationStore: Send + Sync {
    async fn create(&self, location: &Location) -> Result<(), AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Location, AppError>;

    async fn find_by_code(&self, code: i32) -> Result<Location, AppError>;

    /// Lookup by name, optionally narrowed by state (empty = any).
    async fn find_by_name_and_state(&self, name: &str, state: &str)
    -> Result<Location, AppError>;
}

#[async_trait]
pub trait GlobalNotificationStore: Send + Sync {
    async fn create(&self, definition: &GlobalNotification) -> Result<(), AppError>;

    async fn find_active(&self) -> Result<Vec<GlobalNotification>, AppError>;

    async fn update_last_execution(
        &self,
        id: Uuid,
        executed_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn set_active(&self, id: Uuid, active: bool) -> Result<GlobalNotification, AppError>;
}
