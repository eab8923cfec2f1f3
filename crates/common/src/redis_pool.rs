use redis::Client;
use redis::aio::ConnectionManager;

/// Connect to Redis and return the shared async connection manager the
/// delivery queue lanes run over.
pub async fn create_redis_pool(redis_url: &str) -> anyhow::Result<ConnectionManager> {
    let client = Client::open(redis_url)?;
    let mut manager = ConnectionManager::new(client).await?;

    // Fail fast on a bad endpoint instead of on the first queue operation.
    let _: String = redis::cmd("PING").query_async(&mut manager).await?;

    tracing::info!("Connected to Redis");
    Ok(manager)
}
