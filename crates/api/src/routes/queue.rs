//! Operator routes over the notification queue.

use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use herald_common::error::AppError;
use herald_common::types::{ChannelKey, Entry};
use herald_engine::resolution::ResolutionOutcome;
use herald_engine::snapshot::QueueSnapshot;

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/queue", get(snapshot))
        .route("/api/queue", post(enqueue))
        .route("/api/queue/{id}", delete(delete_entry))
        .route("/api/queue/{id}/retry", post(retry_entry))
        .route("/api/queue/{id}/acknowledge", post(acknowledge))
        .route("/api/queue/{id}/resolve", post(resolve))
}

#[derive(Debug, Default, Deserialize)]
pub struct AcknowledgeRequest {
    #[serde(default)]
    pub channel: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResolveRequest {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResolutionResponse {
    pub entry: Entry,
    /// True only on the call that made the entry fully resolved.
    pub completed: bool,
}

impl From<ResolutionOutcome> for ResolutionResponse {
    fn from(outcome: ResolutionOutcome) -> Self {
        Self {
            entry: outcome.entry,
            completed: outcome.completed,
        }
    }
}

/// Blank channel names mean "the whole entry".
fn channel_key(channel: Option<&str>) -> Option<ChannelKey> {
    channel
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(ChannelKey::from)
}

/// GET /api/queue — Dashboard snapshot of every queued entry.
async fn snapshot(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<QueueSnapshot>, AppError> {
    Ok(Json(state.service.snapshot().await?))
}

/// POST /api/queue — Admit an entry. Returns `null` when admission rejects it.
async fn enqueue(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(candidate): Json<Value>,
) -> Result<Json<Option<Entry>>, AppError> {
    let entry = state.service.enqueue(&candidate).await?;
    if entry.is_none() {
        tracing::info!(user_id = %auth.user_id, "Enqueue rejected: no usable channels");
    }
    Ok(Json(entry))
}

/// POST /api/queue/:id/retry — Reset every enabled channel and retry now.
async fn retry_entry(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Entry>, AppError> {
    let entry = state.service.retry_entry(&id).await?;
    tracing::info!(entry_id = %id, actor = auth.actor(), "Manual retry requested");
    Ok(Json(entry))
}

/// DELETE /api/queue/:id — Drop an entry from the queue.
async fn delete_entry(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    state.service.delete_entry(&id).await?;
    tracing::info!(entry_id = %id, actor = auth.actor(), "Entry deleted by operator");
    Ok(Json(json!({"deleted": true})))
}

/// POST /api/queue/:id/acknowledge — Acknowledge an entry or one channel.
async fn acknowledge(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<AcknowledgeRequest>,
) -> Result<Json<ResolutionResponse>, AppError> {
    let channel = channel_key(body.channel.as_deref());
    let outcome = state
        .service
        .acknowledge(&id, channel.as_ref(), Some(auth.actor()))
        .await?;
    Ok(Json(outcome.into()))
}

/// POST /api/queue/:id/resolve — Resolve an entry or one channel, with optional notes.
async fn resolve(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<ResolveRequest>,
) -> Result<Json<ResolutionResponse>, AppError> {
    let channel = channel_key(body.channel.as_deref());
    let outcome = state
        .service
        .resolve(&id, channel.as_ref(), Some(auth.actor()), body.notes.as_deref())
        .await?;
    Ok(Json(outcome.into()))
}
