//! Liveness endpoint; unauthenticated.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use herald_engine::store::QueueStore;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Always 200 while the process serves requests. `queue` reports whether the
/// store answered, so a dead backend is visible without failing liveness.
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let queue = match state.store.load().await {
        Ok(entries) => json!({ "status": "ok", "entries": entries.len() }),
        Err(e) => {
            tracing::warn!(error = %e, "Queue store unavailable during health check");
            json!({ "status": "unavailable" })
        }
    };

    Json(json!({
        "status": "ok",
        "service": "herald-api",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": format!("{:?}", state.config.queue_backend).to_lowercase(),
        "queue": queue,
        "next_processing_at": state.ticks.next_processing_at(),
    }))
}
