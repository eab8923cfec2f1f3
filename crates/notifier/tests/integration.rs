//! Integration tests for the Redis delivery queue.
//!
//! Requires a running Redis instance. The lanes are shared keys, so run
//! single-threaded:
//!
//! ```bash
//! REDIS_URL="redis://localhost:6379" \
//!   cargo test -p skycast-notifier --test integration -- --ignored --test-threads=1 --nocapture
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use redis::aio::ConnectionManager;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use skycast_common::error::AppError;
use skycast_common::redis_pool::create_redis_pool;
use skycast_common::types::{ForecastSnapshot, Notification};
use skycast_engine::queue::{
    DEAD_LETTER_LANE, DeliveryHandler, DeliveryQueue, PRIMARY_LANE, RETRY_LANE,
    RedisDeliveryQueue,
};

/// Handler that fails its first `fail_first` invocations, then succeeds.
struct ScriptedHandler {
    fail_first: u32,
    calls: AtomicU32,
}

impl ScriptedHandler {
    fn new(fail_first: u32) -> Arc<Self> {
        Arc::new(Self {
            fail_first,
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl DeliveryHandler for ScriptedHandler {
    async fn handle(&self, _notification: Notification) -> Result<(), AppError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            Err(AppError::Delivery("scripted failure".to_string()))
        } else {
            Ok(())
        }
    }
}

async fn connect() -> ConnectionManager {
    let url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    create_redis_pool(&url).await.unwrap()
}

async fn flush_lanes(redis: &mut ConnectionManager) {
    for lane in [PRIMARY_LANE, RETRY_LANE, DEAD_LETTER_LANE] {
        let _: i64 = redis::cmd("DEL")
            .arg(lane)
            .arg(format!("{}:processing", lane))
            .query_async(redis)
            .await
            .unwrap();
    }
}

async fn lane_len(redis: &mut ConnectionManager, lane: &str) -> i64 {
    redis::cmd("LLEN").arg(lane).query_async(redis).await.unwrap()
}

fn due_notification() -> Notification {
    let mut notification = Notification::new(
        Uuid::new_v4(),
        Uuid::new_v4(),
        ForecastSnapshot::new(Uuid::new_v4(), "Recife".to_string(), "PE".to_string(), vec![]),
        Utc::now() + ChronoDuration::minutes(5),
    )
    .unwrap();
    notification.scheduled_for = Utc::now() - ChronoDuration::seconds(5);
    notification
}

fn spawn_consumer(
    queue: &RedisDeliveryQueue,
    handler: Arc<dyn DeliveryHandler>,
) -> (watch::Sender<bool>, JoinHandle<Result<(), AppError>>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = queue.clone();
    let handle = tokio::spawn(async move { consumer.consume(handler, shutdown_rx).await });
    (shutdown_tx, handle)
}

/// Poll `check` every 100ms until it returns true or `secs` elapse.
async fn wait_until<F: FnMut() -> bool>(mut check: F, secs: u64) -> bool {
    for _ in 0..(secs * 10) {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

#[tokio::test]
#[ignore]
async fn test_published_notification_is_delivered_once() {
    let mut redis = connect().await;
    flush_lanes(&mut redis).await;
    let queue = RedisDeliveryQueue::new(redis.clone());

    queue.publish(&due_notification()).await.unwrap();

    let handler = ScriptedHandler::new(0);
    let (shutdown, handle) = spawn_consumer(&queue, handler.clone());

    assert!(
        wait_until(|| handler.calls.load(Ordering::SeqCst) == 1, 5).await,
        "handler should receive the message"
    );

    shutdown.send(true).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(lane_len(&mut redis, PRIMARY_LANE).await, 0);
    assert_eq!(lane_len(&mut redis, RETRY_LANE).await, 0);
    assert_eq!(lane_len(&mut redis, DEAD_LETTER_LANE).await, 0);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
#[ignore]
async fn test_three_failures_move_message_to_dead_letter() {
    let mut redis = connect().await;
    flush_lanes(&mut redis).await;
    let queue = RedisDeliveryQueue::new(redis.clone());

    queue.publish(&due_notification()).await.unwrap();

    let handler = ScriptedHandler::new(u32::MAX);
    let (shutdown, handle) = spawn_consumer(&queue, handler.clone());

    // Poll the dead-letter lane from a dedicated connection.
    let mut probe = connect().await;
    let mut dead = 0;
    for _ in 0..100 {
        dead = lane_len(&mut probe, DEAD_LETTER_LANE).await;
        if dead == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    shutdown.send(true).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(dead, 1, "message should be parked on the dead-letter lane");
    assert_eq!(handler.calls.load(Ordering::SeqCst), 3, "three attempts, no more");
    assert_eq!(lane_len(&mut redis, PRIMARY_LANE).await, 0);
    assert_eq!(lane_len(&mut redis, RETRY_LANE).await, 0);
}

#[tokio::test]
#[ignore]
async fn test_two_failures_then_success_never_dead_letters() {
    let mut redis = connect().await;
    flush_lanes(&mut redis).await;
    let queue = RedisDeliveryQueue::new(redis.clone());

    queue.publish(&due_notification()).await.unwrap();

    let handler = ScriptedHandler::new(2);
    let (shutdown, handle) = spawn_consumer(&queue, handler.clone());

    assert!(
        wait_until(|| handler.calls.load(Ordering::SeqCst) == 3, 10).await,
        "two retries then a success"
    );
    // Give the final ack a moment to land.
    tokio::time::sleep(Duration::from_millis(300)).await;

    shutdown.send(true).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(lane_len(&mut redis, DEAD_LETTER_LANE).await, 0);
    assert_eq!(lane_len(&mut redis, PRIMARY_LANE).await, 0);
    assert_eq!(lane_len(&mut redis, RETRY_LANE).await, 0);
}

#[tokio::test]
#[ignore]
async fn test_future_message_redelivered_until_due() {
    let mut redis = connect().await;
    flush_lanes(&mut redis).await;
    let queue = RedisDeliveryQueue::new(redis.clone());

    let notification = Notification::new(
        Uuid::new_v4(),
        Uuid::new_v4(),
        ForecastSnapshot::new(Uuid::new_v4(), "Recife".to_string(), "PE".to_string(), vec![]),
        Utc::now() + ChronoDuration::seconds(3),
    )
    .unwrap();
    queue.publish(&notification).await.unwrap();

    let handler = ScriptedHandler::new(0);
    let (shutdown, handle) = spawn_consumer(&queue, handler.clone());

    // Still ahead of schedule: requeued, never handed to the handler.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);

    assert!(
        wait_until(|| handler.calls.load(Ordering::SeqCst) == 1, 10).await,
        "delivered once the schedule passes"
    );

    shutdown.send(true).unwrap();
    handle.await.unwrap().unwrap();
}
