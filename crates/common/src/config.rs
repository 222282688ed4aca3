use serde::Deserialize;

/// Which `QueueStore` implementation backs the queue document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    Memory,
    Redis,
    Postgres,
}

impl std::str::FromStr for QueueBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(QueueBackend::Memory),
            "redis" => Ok(QueueBackend::Redis),
            "postgres" => Ok(QueueBackend::Postgres),
            other => Err(anyhow::anyhow!(
                "QUEUE_BACKEND must be one of memory, redis, postgres (got '{}')",
                other
            )),
        }
    }
}

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Where the queue document lives (default: memory)
    pub queue_backend: QueueBackend,

    /// Redis connection string, used for the processing lock and the redis backend
    pub redis_url: String,

    /// PostgreSQL connection string (required for the postgres backend)
    pub database_url: Option<String>,

    /// Maximum number of PostgreSQL connections in the pool (default: 5)
    pub db_max_connections: u32,

    /// Redis key / Postgres document name holding the queue
    pub queue_key: String,

    /// JWT secret for operator authentication
    pub jwt_secret: String,

    /// JWT token expiry in hours
    pub jwt_expiry_hours: u64,

    /// HTTP listen port
    pub api_port: u16,

    /// How often the tick worker looks for due ticks, in milliseconds
    pub tick_interval_ms: u64,

    /// Resend API key for email delivery
    pub resend_api_key: Option<String>,

    /// Email sender address
    pub email_from: Option<String>,

    /// Per-request timeout for outbound transport calls
    pub http_timeout_secs: u64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let queue_backend: QueueBackend = std::env::var("QUEUE_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .parse()?;
        let database_url = std::env::var("DATABASE_URL").ok();
        if queue_backend == QueueBackend::Postgres && database_url.is_none() {
            return Err(anyhow::anyhow!(
                "DATABASE_URL environment variable is required when QUEUE_BACKEND=postgres"
            ));
        }

        Ok(Self {
            queue_backend,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            database_url,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            queue_key: std::env::var("QUEUE_KEY").unwrap_or_else(|_| "herald:queue".to_string()),
            jwt_secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?,
            jwt_expiry_hours: std::env::var("JWT_EXPIRY_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("JWT_EXPIRY_HOURS must be a valid u64"))?,
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("API_PORT must be a valid u16"))?,
            tick_interval_ms: std::env::var("TICK_INTERVAL_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("TICK_INTERVAL_MS must be a valid u64"))?,
            resend_api_key: std::env::var("RESEND_API_KEY").ok(),
            email_from: std::env::var("EMAIL_FROM").ok(),
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("HTTP_TIMEOUT_SECS must be a valid u64"))?,
        })
    }
}
