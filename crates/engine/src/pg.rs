//! Postgres implementations of the store traits.
//!
//! Schema lives in `migrations/`. Status and frequency columns are plain
//! `text`; notification content is a `jsonb` snapshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use skycast_common::error::AppError;
use skycast_common::types::{
    ForecastSnapshot, GlobalNotification, Location, Notification, NotificationStatus, User,
};

use crate::store::{GlobalNotificationStore, LocationStore, NotificationStore, UserStore};

/// Row shape for `notifications`; the jsonb content column needs a wrapper
/// before it becomes the domain type.
#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    user_id: Uuid,
    location_id: Uuid,
    content: Json<ForecastSnapshot>,
    status: NotificationStatus,
    scheduled_for: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Notification {
            id: row.id,
            user_id: row.user_id,
            location_id: row.location_id,
            content: row.content.0,
            status: row.status,
            scheduled_for: row.scheduled_for,
            sent_at: row.sent_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn create(&self, notification: &Notification) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO notifications
                (id, user_id, location_id, content, status, scheduled_for, sent_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(notification.location_id)
        .bind(Json(&notification.content))
        .bind(notification.status.to_string())
        .bind(notification.scheduled_for)
        .bind(notification.sent_at)
        .bind(notification.created_at)
        .bind(notification.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Notification, AppError> {
        let row: NotificationRow = sqlx::query_as("SELECT * FROM notifications WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Notification {} not found", id)))?;

        Ok(row.into())
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<Notification>, AppError> {
        let rows: Vec<NotificationRow> = sqlx::query_as(
            "SELECT * FROM notifications WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_due_pending(&self, now: DateTime<Utc>) -> Result<Vec<Notification>, AppError> {
        let rows: Vec<NotificationRow> = sqlx::query_as(
            r#"
            SELECT * FROM notifications
            WHERE status = $1 AND scheduled_for <= $2
            ORDER BY scheduled_for
            "#,
        )
        .bind(NotificationStatus::Pending.to_string())
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: NotificationStatus,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = $2, sent_at = COALESCE($3, sent_at), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(sent_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Notification {} not found", id)));
        }

        Ok(())
    }
}

pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, user: &User) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, location_id, name, email, opt_out, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user.id)
        .bind(user.location_id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.opt_out)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, user: &User) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET name = $2, email = $3, location_id = $4, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.location_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", user.id)));
        }

        Ok(())
    }

    async fn find_all(&self) -> Result<Vec<User>, AppError> {
        let users: Vec<User> = sqlx::query_as("SELECT * FROM users ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;

        Ok(users)
    }

    async fn find_all_active(&self) -> Result<Vec<User>, AppError> {
        let users: Vec<User> =
            sqlx::query_as("SELECT * FROM users WHERE opt_out = false ORDER BY created_at")
                .fetch_all(&self.pool)
                .await?;

        Ok(users)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<User, AppError> {
        let user: User = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;

        Ok(user)
    }

    async fn set_opt_out(&self, id: Uuid, opt_out: bool) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE users SET opt_out = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(opt_out)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", id)));
        }

        tracing::info!(user_id = %id, opt_out, "User opt-out updated");
        Ok(())
    }
}

pub struct PgLocationStore {
    pool: PgPool,
}

impl PgLocationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LocationStore for PgLocationStore {
    async fn create(&self, location: &Location) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO locations (id, code, name, state)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (code) DO NOTHING
            "#,
        )
        .bind(location.id)
        .bind(location.code)
        .bind(&location.name)
        .bind(&location.state)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Location, AppError> {
        let location: Location = sqlx::query_as("SELECT * FROM locations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Location {} not found", id)))?;

        Ok(location)
    }

    async fn find_by_code(&self, code: i32) -> Result<Location, AppError> {
        let location: Location = sqlx::query_as("SELECT * FROM locations WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Location code {} not found", code)))?;

        Ok(location)
    }

    async fn find_by_name_and_state(
        &self,
        name: &str,
        state: &str,
    ) -> Result<Location, AppError> {
        let location: Location = sqlx::query_as(
            r#"
            SELECT * FROM locations
            WHERE LOWER(name) = LOWER($1) AND ($2 = '' OR state = $2)
            LIMIT 1
            "#,
        )
        .bind(name)
        .bind(state)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Location '{}' not found", name)))?;

        Ok(location)
    }
}

pub struct PgGlobalNotificationStore {
    pool: PgPool,
}

impl PgGlobalNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GlobalNotificationStore for PgGlobalNotificationStore {
    async fn create(&self, definition: &GlobalNotification) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO global_notifications
                (id, time_of_day, frequency, active, last_execution, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(definition.id)
        .bind(definition.time_of_day)
        .bind(definition.frequency.to_string())
        .bind(definition.active)
        .bind(definition.last_execution)
        .bind(definition.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_active(&self) -> Result<Vec<GlobalNotification>, AppError> {
        let definitions: Vec<GlobalNotification> = sqlx::query_as(
            "SELECT * FROM global_notifications WHERE active = true ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(definitions)
    }

    async fn update_last_execution(
        &self,
        id: Uuid,
        executed_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let result =
            sqlx::query("UPDATE global_notifications SET last_execution = $2 WHERE id = $1")
                .bind(id)
                .bind(executed_at)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Global notification {} not found",
                id
            )));
        }

        Ok(())
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<GlobalNotification, AppError> {
        let definition: GlobalNotification = sqlx::query_as(
            r#"
            UPDATE global_notifications
            SET active = $2
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(active)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Global notification {} not found", id)))?;

        tracing::info!(definition_id = %id, active, "Global notification definition updated");
        Ok(definition)
    }
}
