use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string (delivery queue transport)
    pub redis_url: String,

    /// Base URL of the upstream weather forecast provider
    pub weather_api_base_url: String,

    /// Webhook endpoint notifications are delivered to
    pub webhook_url: String,

    /// Static bearer token protecting the API (also sent on outbound webhooks)
    pub api_token: String,

    /// TCP port the API server binds to (default: 8080)
    pub api_port: u16,

    /// Recurring scheduler polling interval in seconds (default: 60).
    /// Must stay at or below one minute — definitions fire on minute match.
    pub scheduler_poll_interval_secs: u64,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            weather_api_base_url: std::env::var("WEATHER_API_BASE_URL").map_err(|_| {
                anyhow::anyhow!("WEATHER_API_BASE_URL environment variable is required")
            })?,
            webhook_url: std::env::var("WEBHOOK_URL")
                .map_err(|_| anyhow::anyhow!("WEBHOOK_URL environment variable is required"))?,
            api_token: std::env::var("API_TOKEN")
                .map_err(|_| anyhow::anyhow!("API_TOKEN environment variable is required"))?,
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("API_PORT must be a valid u16"))?,
            scheduler_poll_interval_secs: std::env::var("SCHEDULER_POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("SCHEDULER_POLL_INTERVAL_SECS must be a valid u64"))?,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
        })
    }
}
