//! Outbound notifier — pushes a rendered notification to the recipient
//! channel. Fire-and-forget beyond the success/failure outcome.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use skycast_common::error::AppError;
use skycast_common::types::Notification;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), AppError>;
}

/// Delivers notifications as JSON POSTs to a configured webhook endpoint.
pub struct WebhookNotifier {
    webhook_url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(webhook_url: String, auth_token: Option<String>) -> Self {
        Self {
            webhook_url,
            auth_token,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), AppError> {
        let payload = json!({
            "id": notification.id,
            "user_id": notification.user_id,
            "message": notification.render_message(),
            "content": notification.content,
            "timestamp": notification.created_at,
        });

        let mut request = self.client.post(&self.webhook_url).json(&payload);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|err| AppError::Delivery(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Delivery(format!(
                "webhook returned status {}",
                status
            )));
        }

        tracing::debug!(notification_id = %notification.id, "Webhook delivered");
        Ok(())
    }
}
