//! Delivery queue — durable at-least-once transport for notifications.
//!
//! Three Redis list lanes: primary (`notifications:send`), retry
//! (`notifications:retry`) and dead-letter (`notifications:dlq`). Messages
//! are wrapped in a [`DeliveryEnvelope`] carrying the attempt counter as
//! transport metadata, outside the notification payload itself.
//!
//! Readers move each message into a per-lane processing list (`BLMOVE`) and
//! only remove it after routing the outcome, so a consumer crash leaves the
//! message on the processing list and [`RedisDeliveryQueue::consume`]
//! recovers it on the next start. That gives at-least-once, never
//! exactly-once: a crash between delivery and removal redelivers.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use skycast_common::error::AppError;
use skycast_common::types::Notification;

pub const PRIMARY_LANE: &str = "notifications:send";
pub const RETRY_LANE: &str = "notifications:retry";
pub const DEAD_LETTER_LANE: &str = "notifications:dlq";

/// Delivery attempt budget. A message whose counter reaches this value is
/// moved to the dead-letter lane and never redelivered automatically.
pub const MAX_DELIVERY_ATTEMPTS: u32 = 3;

/// Transport envelope: the serialized notification plus its attempt counter.
/// Exists only in transit; the counter is never persisted with the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryEnvelope {
    pub attempt: u32,
    pub notification: Notification,
}

/// Consumer-side handler a queue delivers ready notifications to.
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn handle(&self, notification: Notification) -> Result<(), AppError>;
}

/// Durable notification transport.
#[async_trait]
pub trait DeliveryQueue: Send + Sync {
    /// Serialize and place a notification on the primary lane.
    async fn publish(&self, notification: &Notification) -> Result<(), AppError>;

    /// Deliver messages from the primary and retry lanes to `handler` until
    /// `shutdown` flips to true. The two lanes are read concurrently; a
    /// single lane never processes two messages at once.
    async fn consume(
        &self,
        handler: Arc<dyn DeliveryHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), AppError>;

    /// Release transport resources. Idempotent, best-effort; correctness
    /// must not depend on it being called.
    async fn close(&self) -> Result<(), AppError>;
}

/// Routing decision for a message after a failed handling attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    /// Republish to the retry lane with the incremented counter.
    Retry { attempt: u32 },
    /// Retry budget exhausted; park on the dead-letter lane.
    DeadLetter,
}

impl RetryStep {
    /// Decide what happens after a failure of a message that carried
    /// `attempt` when it was dequeued.
    pub fn after_failure(attempt: u32) -> Self {
        let next = attempt + 1;
        if next >= MAX_DELIVERY_ATTEMPTS {
            RetryStep::DeadLetter
        } else {
            RetryStep::Retry { attempt: next }
        }
    }
}

/// Redis-backed implementation of [`DeliveryQueue`].
#[derive(Clone)]
pub struct RedisDeliveryQueue {
    redis: ConnectionManager,
}

impl RedisDeliveryQueue {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    fn processing_lane(lane: &str) -> String {
        format!("{}:processing", lane)
    }

    /// Move messages stranded on a processing list by an earlier crash back
    /// onto their lane so they are redelivered.
    async fn recover_lane(&self, lane: &str) -> Result<(), AppError> {
        let mut redis = self.redis.clone();
        let processing = Self::processing_lane(lane);
        let mut recovered = 0u32;

        loop {
            let moved: Option<String> = redis::cmd("LMOVE")
                .arg(&processing)
                .arg(lane)
                .arg("RIGHT")
                .arg("LEFT")
                .query_async(&mut redis)
                .await?;
            if moved.is_none() {
                break;
            }
            recovered += 1;
        }

        if recovered > 0 {
            tracing::warn!(lane, recovered, "Recovered unacknowledged messages");
        }
        Ok(())
    }

    /// Sequentially read one lane until shutdown. Blocking reads are bounded
    /// to one second so the shutdown signal is observed promptly.
    async fn consume_lane(
        &self,
        lane: &'static str,
        handler: Arc<dyn DeliveryHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), AppError> {
        let mut redis = self.redis.clone();
        let processing = Self::processing_lane(lane);

        tracing::info!(lane, "Delivery lane reader started");

        while !*shutdown.borrow() {
            let popped: Result<Option<String>, redis::RedisError> = redis::cmd("BLMOVE")
                .arg(lane)
                .arg(&processing)
                .arg("RIGHT")
                .arg("LEFT")
                .arg(1.0)
                .query_async(&mut redis)
                .await;

            let body = match popped {
                Ok(Some(body)) => body,
                Ok(None) => continue,
                Err(err) => {
                    tracing::error!(lane, error = %err, "Lane read failed, backing off");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    continue;
                }
            };

            if let Err(err) = self
                .handle_message(lane, &processing, body, handler.as_ref(), &mut redis)
                .await
            {
                // The message stays on the processing list and is recovered
                // on the next consumer start.
                tracing::error!(lane, error = %err, "Failed to route message outcome");
            }
        }

        tracing::info!(lane, "Delivery lane reader stopped");
        Ok(())
    }

    async fn handle_message(
        &self,
        lane: &str,
        processing: &str,
        body: String,
        handler: &dyn DeliveryHandler,
        redis: &mut ConnectionManager,
    ) -> Result<(), AppError> {
        let envelope = match serde_json::from_str::<DeliveryEnvelope>(&body) {
            Ok(envelope) => envelope,
            Err(err) => {
                // Malformed payloads are unretriable; drop them permanently.
                tracing::warn!(lane, error = %err, "Discarding malformed queue message");
                return Self::ack(redis, processing, &body).await;
            }
        };

        if envelope.notification.scheduled_for > Utc::now() {
            // Not due yet: back onto its lane for redelivery. Immediate
            // requeue with no backoff; the transport stays simple at the
            // cost of busy redelivery close to the schedule.
            let _: i64 = redis::cmd("LPUSH")
                .arg(lane)
                .arg(&body)
                .query_async(redis)
                .await?;
            return Self::ack(redis, processing, &body).await;
        }

        let notification_id = envelope.notification.id;
        match handler.handle(envelope.notification.clone()).await {
            Ok(()) => {
                tracing::info!(notification_id = %notification_id, lane, "Notification handled");
            }
            Err(err) => match RetryStep::after_failure(envelope.attempt) {
                RetryStep::Retry { attempt } => {
                    tracing::warn!(
                        notification_id = %notification_id,
                        lane,
                        attempt,
                        error = %err,
                        "Delivery failed, republishing to retry lane"
                    );
                    let retry = DeliveryEnvelope {
                        attempt,
                        notification: envelope.notification,
                    };
                    let _: i64 = redis::cmd("LPUSH")
                        .arg(RETRY_LANE)
                        .arg(serde_json::to_string(&retry)?)
                        .query_async(redis)
                        .await?;
                }
                RetryStep::DeadLetter => {
                    tracing::error!(
                        notification_id = %notification_id,
                        lane,
                        error = %err,
                        "Retry budget exhausted, moving to dead-letter lane"
                    );
                    let dead = DeliveryEnvelope {
                        attempt: envelope.attempt + 1,
                        notification: envelope.notification,
                    };
                    let _: i64 = redis::cmd("LPUSH")
                        .arg(DEAD_LETTER_LANE)
                        .arg(serde_json::to_string(&dead)?)
                        .query_async(redis)
                        .await?;
                }
            },
        }

        Self::ack(redis, processing, &body).await
    }

    /// Permanently remove a handled message from its processing list.
    async fn ack(
        redis: &mut ConnectionManager,
        processing: &str,
        body: &str,
    ) -> Result<(), AppError> {
        let _: i64 = redis::cmd("LREM")
            .arg(processing)
            .arg(1)
            .arg(body)
            .query_async(redis)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DeliveryQueue for RedisDeliveryQueue {
    async fn publish(&self, notification: &Notification) -> Result<(), AppError> {
        let envelope = DeliveryEnvelope {
            attempt: 0,
            notification: notification.clone(),
        };
        let payload = serde_json::to_string(&envelope)?;

        let mut redis = self.redis.clone();
        let _: i64 = redis::cmd("LPUSH")
            .arg(PRIMARY_LANE)
            .arg(payload)
            .query_async(&mut redis)
            .await?;

        tracing::debug!(notification_id = %notification.id, "Notification published");
        Ok(())
    }

    async fn consume(
        &self,
        handler: Arc<dyn DeliveryHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), AppError> {
        self.recover_lane(PRIMARY_LANE).await?;
        self.recover_lane(RETRY_LANE).await?;

        let (primary, retry) = tokio::join!(
            self.consume_lane(PRIMARY_LANE, handler.clone(), shutdown.clone()),
            self.consume_lane(RETRY_LANE, handler, shutdown),
        );
        primary?;
        retry?;
        Ok(())
    }

    async fn close(&self) -> Result<(), AppError> {
        // The connection manager tears down its multiplexed connections on
        // drop; there is nothing to release explicitly. Callable repeatedly.
        tracing::debug!("Delivery queue closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use skycast_common::types::ForecastSnapshot;
    use uuid::Uuid;

    #[test]
    fn test_retry_step_increments_until_budget() {
        assert_eq!(RetryStep::after_failure(0), RetryStep::Retry { attempt: 1 });
        assert_eq!(RetryStep::after_failure(1), RetryStep::Retry { attempt: 2 });
        assert_eq!(RetryStep::after_failure(2), RetryStep::DeadLetter);
        assert_eq!(RetryStep::after_failure(7), RetryStep::DeadLetter);
    }

    #[test]
    fn test_third_consecutive_failure_dead_letters() {
        // First failure of a fresh message carries attempt 0.
        let mut attempt = 0;
        let mut steps = Vec::new();
        for _ in 0..3 {
            let step = RetryStep::after_failure(attempt);
            if let RetryStep::Retry { attempt: next } = step {
                attempt = next;
            }
            steps.push(step);
        }

        assert_eq!(
            steps,
            vec![
                RetryStep::Retry { attempt: 1 },
                RetryStep::Retry { attempt: 2 },
                RetryStep::DeadLetter,
            ]
        );
    }

    #[test]
    fn test_envelope_keeps_attempt_outside_payload() {
        let notification = Notification::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            ForecastSnapshot::new(Uuid::new_v4(), "Natal".into(), "RN".into(), vec![]),
            Utc::now() + Duration::minutes(3),
        )
        .unwrap();

        let envelope = DeliveryEnvelope {
            attempt: 2,
            notification,
        };
        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&envelope).unwrap()).unwrap();

        assert_eq!(value["attempt"], 2);
        assert!(value["notification"].get("attempt").is_none());
        assert_eq!(value["notification"]["status"], "pending");
    }
}
