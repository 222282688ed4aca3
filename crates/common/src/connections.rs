//! Connections to the shared queue backends.

use std::time::Duration;

use anyhow::Context;
use redis::Client;
use redis::aio::ConnectionManager;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Open a PostgreSQL pool for the postgres queue backend.
///
/// Pass `AppConfig::db_max_connections` for `max_connections` (default 5).
pub async fn connect_postgres(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
        .with_context(|| format!("Failed to connect to PostgreSQL at {}", redact(database_url)))?;

    tracing::info!(max_connections, url = %redact(database_url), "Connected to PostgreSQL");
    Ok(pool)
}

/// Open a Redis connection manager and check it answers `PING`.
///
/// Used for the processing lock and, with the redis backend, the queue itself.
pub async fn connect_redis(redis_url: &str) -> anyhow::Result<ConnectionManager> {
    let client = Client::open(redis_url)
        .with_context(|| format!("Invalid Redis URL {}", redact(redis_url)))?;
    let mut manager = ConnectionManager::new(client)
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", redact(redis_url)))?;

    let _: String = redis::cmd("PING").query_async(&mut manager).await?;

    tracing::info!(url = %redact(redis_url), "Connected to Redis");
    Ok(manager)
}

/// Hide credentials in a connection URL before it is logged.
pub fn redact(url: &str) -> String {
    if let Some((scheme, rest)) = url.split_once("://")
        && let Some((_, host)) = rest.rsplit_once('@')
    {
        format!("{}://***@{}", scheme, host)
    } else {
        url.to_string()
    }
}
