//! Read-only collaborators: the acknowledgment gate consulted by reminders
//! and the actor resolver used to stamp operator actions.

use std::sync::Arc;

use async_trait::async_trait;

use herald_common::error::AppError;

use crate::store::QueueStore;

/// Answers whether an operator has already responded to an entry.
#[async_trait]
pub trait ReceiptGate: Send + Sync {
    async fn is_acknowledged(&self, entry_id: &str) -> Result<bool, AppError>;
    async fn is_resolved(&self, entry_id: &str) -> Result<bool, AppError>;
}

/// Gate derived from the resolution block stored on each entry.
///
/// An entry that is no longer in the queue is neither acknowledged nor resolved.
pub struct QueueReceiptGate {
    store: Arc<dyn QueueStore>,
}

impl QueueReceiptGate {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ReceiptGate for QueueReceiptGate {
    async fn is_acknowledged(&self, entry_id: &str) -> Result<bool, AppError> {
        let entries = self.store.load().await?;
        Ok(entries
            .iter()
            .find(|e| e.id == entry_id)
            .is_some_and(|e| e.resolution.acknowledged_at.is_some()))
    }

    async fn is_resolved(&self, entry_id: &str) -> Result<bool, AppError> {
        let entries = self.store.load().await?;
        Ok(entries
            .iter()
            .find(|e| e.id == entry_id)
            .is_some_and(|e| e.resolution.resolved_at.is_some()))
    }
}

/// Turns an optional user identity into the display name stamped on
/// acknowledgment and resolution steps.
pub trait ActorResolver: Send + Sync {
    fn resolve(&self, user: Option<&str>) -> String;
}

/// Uses the supplied identity verbatim, or `"system"` when there is none.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticActorResolver;

pub const SYSTEM_ACTOR: &str = "system";

impl ActorResolver for StaticActorResolver {
    fn resolve(&self, user: Option<&str>) -> String {
        match user.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => SYSTEM_ACTOR.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::normalize;
    use crate::store::InMemoryQueueStore;

    #[test]
    fn test_static_actor_resolver() {
        let resolver = StaticActorResolver;
        assert_eq!(resolver.resolve(Some("ops-alice")), "ops-alice");
        assert_eq!(resolver.resolve(Some("  ")), SYSTEM_ACTOR);
        assert_eq!(resolver.resolve(None), SYSTEM_ACTOR);
    }

    #[tokio::test]
    async fn test_queue_gate_reads_resolution_block() {
        let entry = normalize(
            &serde_json::json!({
                "id": "acked",
                "channels": {"internal": {}},
                "resolution": {"acknowledged_at": 50}
            }),
            100,
        )
        .unwrap();
        let store: Arc<dyn QueueStore> = Arc::new(InMemoryQueueStore::with_entries(vec![entry]));
        let gate = QueueReceiptGate::new(store);

        assert!(gate.is_acknowledged("acked").await.unwrap());
        assert!(!gate.is_resolved("acked").await.unwrap());
        assert!(!gate.is_acknowledged("missing").await.unwrap());
    }
}
