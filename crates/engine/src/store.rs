//! Whole-document persistence of the active queue.
//!
//! Every mutation is a full load → mutate → save of the entry list. There is
//! no per-entry version token: concurrent writers race and the last `save`
//! wins. Implementations must replace the document atomically.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use sqlx::PgPool;
use tokio::sync::Mutex;

use herald_common::error::AppError;
use herald_common::types::Entry;

#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn load(&self) -> Result<Vec<Entry>, AppError>;
    async fn save(&self, entries: &[Entry]) -> Result<(), AppError>;
}

/// Process-local store for single-node deployments and tests.
#[derive(Debug, Default)]
pub struct InMemoryQueueStore {
    entries: Mutex<Vec<Entry>>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<Entry>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn load(&self) -> Result<Vec<Entry>, AppError> {
        Ok(self.entries.lock().await.clone())
    }

    async fn save(&self, entries: &[Entry]) -> Result<(), AppError> {
        *self.entries.lock().await = entries.to_vec();
        Ok(())
    }
}

/// The queue as one JSON string under a single Redis key.
pub struct RedisQueueStore {
    redis: ConnectionManager,
    key: String,
}

impl RedisQueueStore {
    pub fn new(redis: ConnectionManager, key: impl Into<String>) -> Self {
        Self {
            redis,
            key: key.into(),
        }
    }
}

#[async_trait]
impl QueueStore for RedisQueueStore {
    async fn load(&self) -> Result<Vec<Entry>, AppError> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = conn.get(&self.key).await?;
        match raw {
            Some(document) => Ok(serde_json::from_str(&document)?),
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, entries: &[Entry]) -> Result<(), AppError> {
        let document = serde_json::to_string(entries)?;
        let mut conn = self.redis.clone();
        conn.set::<_, _, ()>(&self.key, document).await?;
        Ok(())
    }
}

/// The queue as a JSONB document, one row per queue name.
pub struct PgQueueStore {
    pool: PgPool,
    name: String,
}

impl PgQueueStore {
    /// Connect the store and make sure its table exists.
    pub async fn new(pool: PgPool, name: impl Into<String>) -> Result<Self, AppError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS herald_queue (
                name TEXT PRIMARY KEY,
                document JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self {
            pool,
            name: name.into(),
        })
    }
}

#[async_trait]
impl QueueStore for PgQueueStore {
    async fn load(&self) -> Result<Vec<Entry>, AppError> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT document FROM herald_queue WHERE name = $1")
                .bind(&self.name)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((document,)) => Ok(serde_json::from_value(document)?),
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, entries: &[Entry]) -> Result<(), AppError> {
        let document = serde_json::to_value(entries)?;
        sqlx::query(
            r#"
            INSERT INTO herald_queue (name, document, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (name) DO UPDATE SET document = EXCLUDED.document, updated_at = NOW()
            "#,
        )
        .bind(&self.name)
        .bind(document)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
