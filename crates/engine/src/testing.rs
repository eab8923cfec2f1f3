//! In-memory fakes for the capability traits, shared by unit tests across
//! the workspace. Not wired into any production path.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use uuid::Uuid;

use skycast_common::error::AppError;
use skycast_common::types::{
    DailyForecast, GlobalNotification, Location, Notification, NotificationStatus, User,
};
use skycast_provider::{ForecastProvider, ProviderForecast};

use crate::queue::{DeliveryHandler, DeliveryQueue};
use crate::store::{GlobalNotificationStore, LocationStore, NotificationStore, UserStore};

#[derive(Default)]
pub struct MemoryNotificationStore {
    pub notifications: Mutex<Vec<Notification>>,
    pub fail_create: AtomicBool,
    pub fail_update: AtomicBool,
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn create(&self, notification: &Notification) -> Result<(), AppError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(AppError::Internal("create failed".to_string()));
        }
        self.notifications.lock().unwrap().push(notification.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Notification, AppError> {
        self.notifications
            .lock()
            .unwrap()
            .iter()
            .find(|n| n.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Notification {} not found", id)))
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<Notification>, AppError> {
        Ok(self
            .notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_due_pending(&self, now: DateTime<Utc>) -> Result<Vec<Notification>, AppError> {
        Ok(self
            .notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.status == NotificationStatus::Pending && n.scheduled_for <= now)
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: NotificationStatus,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(AppError::Internal("update failed".to_string()));
        }
        let mut notifications = self.notifications.lock().unwrap();
        let notification = notifications
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Notification {} not found", id)))?;
        notification.status = status;
        if sent_at.is_some() {
            notification.sent_at = sent_at;
        }
        notification.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryUserStore {
    pub users: Mutex<Vec<User>>,
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, user: &User) -> Result<(), AppError> {
        self.users.lock().unwrap().push(user.clone());
        Ok(())
    }

    async fn update(&self, user: &User) -> Result<(), AppError> {
        let mut users = self.users.lock().unwrap();
        let existing = users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.id)))?;
        *existing = user.clone();
        Ok(())
    }

    async fn find_all(&self) -> Result<Vec<User>, AppError> {
        Ok(self.users.lock().unwrap().clone())
    }

    async fn find_all_active(&self) -> Result<Vec<User>, AppError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| !u.opt_out)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<User, AppError> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
    }

    async fn set_opt_out(&self, id: Uuid, opt_out: bool) -> Result<(), AppError> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;
        user.opt_out = opt_out;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryLocationStore {
    pub locations: Mutex<Vec<Location>>,
}

#[async_trait]
impl LocationStore for MemoryLocationStore {
    async fn create(&self, location: &Location) -> Result<(), AppError> {
        self.locations.lock().unwrap().push(location.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Location, AppError> {
        self.locations
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Location {} not found", id)))
    }

    async fn find_by_code(&self, code: i32) -> Result<Location, AppError> {
        self.locations
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.code == code)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Location code {} not found", code)))
    }

    async fn find_by_name_and_state(
        &self,
        name: &str,
        state: &str,
    ) -> Result<Location, AppError> {
        self.locations
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.name.eq_ignore_ascii_case(name) && (state.is_empty() || l.state == state))
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Location '{}' not found", name)))
    }
}

#[derive(Default)]
pub struct MemoryGlobalNotificationStore {
    pub definitions: Mutex<Vec<GlobalNotification>>,
    pub fail_update_last_execution: AtomicBool,
}

#[async_trait]
impl GlobalNotificationStore for MemoryGlobalNotificationStore {
    async fn create(&self, definition: &GlobalNotification) -> Result<(), AppError> {
        self.definitions.lock().unwrap().push(definition.clone());
        Ok(())
    }

    async fn find_active(&self) -> Result<Vec<GlobalNotification>, AppError> {
        Ok(self
            .definitions
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.active)
            .cloned()
            .collect())
    }

    async fn update_last_execution(
        &self,
        id: Uuid,
        executed_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if self.fail_update_last_execution.load(Ordering::SeqCst) {
            return Err(AppError::Internal("update failed".to_string()));
        }
        let mut definitions = self.definitions.lock().unwrap();
        let definition = definitions
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Global notification {} not found", id)))?;
        definition.last_execution = Some(executed_at);
        Ok(())
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<GlobalNotification, AppError> {
        let mut definitions = self.definitions.lock().unwrap();
        let definition = definitions
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Global notification {} not found", id)))?;
        definition.active = active;
        Ok(definition.clone())
    }
}

/// Stub provider returning a fixed one-day forecast, with per-code and
/// global failure switches.
#[derive(Default)]
pub struct StubForecastProvider {
    pub fail_all: AtomicBool,
    pub fail_codes: Mutex<HashSet<i32>>,
    pub search_results: Mutex<Vec<Location>>,
}

#[async_trait]
impl ForecastProvider for StubForecastProvider {
    async fn search_locations(&self, _query: &str) -> Result<Vec<Location>, AppError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(AppError::Provider("provider down".to_string()));
        }
        Ok(self.search_results.lock().unwrap().clone())
    }

    async fn get_forecast(&self, code: i32) -> Result<ProviderForecast, AppError> {
        if self.fail_all.load(Ordering::SeqCst) || self.fail_codes.lock().unwrap().contains(&code)
        {
            return Err(AppError::Provider("provider down".to_string()));
        }
        Ok(ProviderForecast {
            name: "Testville".to_string(),
            state: "TS".to_string(),
            forecasts: vec![DailyForecast {
                date: Utc::now().date_naive(),
                min_temp: 19.0,
                max_temp: 28.0,
                forecast: "Clear".to_string(),
                uv_index: 7.0,
                wave: None,
            }],
        })
    }

    async fn get_wave_forecast(
        &self,
        _code: i32,
        _date: chrono::NaiveDate,
    ) -> Result<skycast_common::types::WaveForecast, AppError> {
        Err(AppError::Provider("no wave forecast".to_string()))
    }
}

/// Queue fake recording published notifications.
#[derive(Default)]
pub struct MemoryDeliveryQueue {
    pub published: Mutex<Vec<Notification>>,
    pub fail_publish: AtomicBool,
}

#[async_trait]
impl DeliveryQueue for MemoryDeliveryQueue {
    async fn publish(&self, notification: &Notification) -> Result<(), AppError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(AppError::Internal("publish failed".to_string()));
        }
        self.published.lock().unwrap().push(notification.clone());
        Ok(())
    }

    async fn consume(
        &self,
        _handler: std::sync::Arc<dyn DeliveryHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), AppError> {
        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), AppError> {
        Ok(())
    }
}

pub fn sample_location(code: i32) -> Location {
    Location::new(code, format!("City {}", code), "TS".to_string()).unwrap()
}

pub fn sample_user(location_id: Uuid) -> User {
    User::new(
        "Marina".to_string(),
        format!("{}@example.com", Uuid::new_v4()),
        location_id,
    )
    .unwrap()
}
