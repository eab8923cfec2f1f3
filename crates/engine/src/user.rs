//! User service — subscriber management.

use std::sync::Arc;

use uuid::Uuid;

use skycast_common::error::AppError;
use skycast_common::types::User;

use crate::store::UserStore;

pub struct UserService {
    users: Arc<dyn UserStore>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    pub async fn create(
        &self,
        name: String,
        email: String,
        location_id: Uuid,
    ) -> Result<User, AppError> {
        let user = User::new(name, email, location_id)?;
        self.users.create(&user).await?;

        tracing::info!(user_id = %user.id, "User created");
        Ok(user)
    }

    /// Update a user's name and/or home location. Omitted fields keep their
    /// current value.
    pub async fn update(
        &self,
        id: Uuid,
        name: Option<String>,
        location_id: Option<Uuid>,
    ) -> Result<User, AppError> {
        let mut user = self.users.find_by_id(id).await?;

        if let Some(name) = name {
            if name.is_empty() {
                return Err(AppError::Validation("name must not be empty".to_string()));
            }
            user.name = name;
        }
        if let Some(location_id) = location_id {
            if location_id.is_nil() {
                return Err(AppError::InvalidLocation);
            }
            user.location_id = location_id;
        }

        self.users.update(&user).await?;
        Ok(user)
    }

    pub async fn list(&self) -> Result<Vec<User>, AppError> {
        self.users.find_all().await
    }

    /// Flip the opt-out flag; an opted-out user receives no deliveries.
    pub async fn set_opt_out(&self, id: Uuid, opt_out: bool) -> Result<(), AppError> {
        self.users.set_opt_out(id, opt_out).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::{MemoryUserStore, sample_user};

    #[tokio::test]
    async fn test_create_and_opt_out() {
        let store = Arc::new(MemoryUserStore::default());
        let service = UserService::new(store.clone());

        let user = service
            .create(
                "Marina".to_string(),
                "marina@example.com".to_string(),
                Uuid::new_v4(),
            )
            .await
            .unwrap();
        assert!(!user.opt_out);

        service.set_opt_out(user.id, true).await.unwrap();
        assert!(store.users.lock().unwrap()[0].opt_out);
    }

    #[tokio::test]
    async fn test_update_keeps_omitted_fields() {
        let store = Arc::new(MemoryUserStore::default());
        let existing = sample_user(Uuid::new_v4());
        store.users.lock().unwrap().push(existing.clone());
        let service = UserService::new(store.clone());

        let updated = service
            .update(existing.id, Some("Renamed".to_string()), None)
            .await
            .unwrap();

        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.location_id, existing.location_id);
        assert_eq!(updated.email, existing.email);
    }
}
