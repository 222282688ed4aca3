//! Herald API server binary entrypoint.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use herald_common::config::{AppConfig, QueueBackend};
use herald_common::connections::{connect_postgres, connect_redis};
use herald_engine::clock::{Clock, SystemClock};
use herald_engine::history::TracingHistory;
use herald_engine::lock::{InMemoryLock, QueueLock, RedisLock};
use herald_engine::store::{InMemoryQueueStore, PgQueueStore, QueueStore, RedisQueueStore};
use herald_notifier::ChannelRouter;

use herald_api::routes::create_router;
use herald_api::state::AppState;
use herald_api::worker::TickWorker;

const DEFAULT_LOG_FILTER: &str =
    "herald_api=info,herald_engine=info,herald_notifier=info,tower_http=info";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Pick the queue store and lock for the configured backend.
///
/// The in-memory backend keeps the lock in-process too; the shared backends
/// serialize passes across processes through Redis.
async fn build_backend(
    config: &AppConfig,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<(Arc<dyn QueueStore>, Arc<dyn QueueLock>)> {
    match config.queue_backend {
        QueueBackend::Memory => {
            tracing::warn!("Using in-memory queue store; entries are lost on restart");
            let store: Arc<dyn QueueStore> = Arc::new(InMemoryQueueStore::new());
            let lock: Arc<dyn QueueLock> = Arc::new(InMemoryLock::new(clock));
            Ok((store, lock))
        }
        QueueBackend::Redis => {
            let redis = connect_redis(&config.redis_url).await?;
            let store: Arc<dyn QueueStore> =
                Arc::new(RedisQueueStore::new(redis.clone(), config.queue_key.clone()));
            let lock: Arc<dyn QueueLock> = Arc::new(RedisLock::new(redis));
            Ok((store, lock))
        }
        QueueBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for the postgres backend"))?;
            let pool = connect_postgres(database_url, config.db_max_connections).await?;
            let store: Arc<dyn QueueStore> =
                Arc::new(PgQueueStore::new(pool, config.queue_key.clone()).await?);
            let redis = connect_redis(&config.redis_url).await?;
            let lock: Arc<dyn QueueLock> = Arc::new(RedisLock::new(redis));
            Ok((store, lock))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    tracing::info!("Starting Herald API server...");

    // Load configuration
    let config = AppConfig::from_env()?;
    tracing::info!(backend = ?config.queue_backend, "Configuration loaded");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (store, lock) = build_backend(&config, clock.clone()).await?;
    let transport = Arc::new(ChannelRouter::from_config(&config)?);

    // Build application state
    let state = AppState::new(
        config.clone(),
        store,
        lock,
        transport,
        Arc::new(TracingHistory),
        clock,
    );

    let worker = TickWorker::new(state.clone(), config.tick_interval_ms);
    worker.restore().await?;

    // Build router
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("API server listening on {}", addr);

    // Run with graceful shutdown on Ctrl+C
    tokio::select! {
        result = axum::serve(listener, app).into_future() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "API server exited with error");
                return Err(e.into());
            }
        }
        _ = worker.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
    }

    tracing::info!("Herald API server stopped.");
    Ok(())
}
