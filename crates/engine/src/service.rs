//! Admin operations over the queue.
//!
//! Each operation is a full load → mutate → persist of the whole queue and
//! takes no lock; a concurrent processing pass may overwrite it (last writer wins).

use std::sync::Arc;

use serde_json::Value;

use herald_common::error::AppError;
use herald_common::types::{ChannelKey, ChannelStatus, Entry};

use crate::admission::{ADMISSION_DELAY_SECS, normalize};
use crate::clock::Clock;
use crate::resolution::{ResolutionOutcome, ResolutionTracker};
use crate::snapshot::QueueSnapshot;
use crate::store::QueueStore;
use crate::tick::TickScheduler;

pub struct QueueService {
    store: Arc<dyn QueueStore>,
    resolution: ResolutionTracker,
    ticks: Arc<dyn TickScheduler>,
    clock: Arc<dyn Clock>,
}

impl QueueService {
    pub fn new(
        store: Arc<dyn QueueStore>,
        resolution: ResolutionTracker,
        ticks: Arc<dyn TickScheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            resolution,
            ticks,
            clock,
        }
    }

    /// Admit a candidate entry. `Ok(None)` means admission rejected it and
    /// the queue was not touched.
    pub async fn enqueue(&self, candidate: &Value) -> Result<Option<Entry>, AppError> {
        let now = self.clock.now();
        let Some(entry) = normalize(candidate, now) else {
            tracing::debug!("Entry rejected at admission: no usable channels");
            return Ok(None);
        };

        let mut entries = self.store.load().await?;
        entries.retain(|e| e.id != entry.id);
        entries.push(entry.clone());
        self.store.save(&entries).await?;

        self.ticks
            .schedule_processing_if_idle(now + ADMISSION_DELAY_SECS);
        if entry.reminders.active
            && let Some(at) = entry.reminders.next_at
        {
            self.ticks.schedule_reminder(&entry.id, at);
        }

        tracing::info!(
            entry_id = %entry.id,
            event = %entry.event,
            severity = %entry.severity,
            channels = entry.channels.len(),
            "Entry enqueued"
        );
        Ok(Some(entry))
    }

    /// Reset every enabled channel to `pending` and make the entry due now.
    pub async fn retry_entry(&self, entry_id: &str) -> Result<Entry, AppError> {
        let now = self.clock.now();
        let mut entries = self.store.load().await?;
        let entry = entries
            .iter_mut()
            .find(|e| e.id == entry_id)
            .ok_or_else(|| not_found(entry_id))?;

        for channel in entry.channels.values_mut().filter(|c| c.enabled) {
            channel.status = ChannelStatus::Pending;
            channel.attempts = 0;
            channel.last_error.clear();
            channel.last_error_at = None;
            channel.completed_at = None;
            channel.failed_at = None;
            channel.next_attempt_at = None;
        }
        entry.last_error.clear();
        entry.last_attempt_at = None;
        entry.next_attempt_at = now;
        entry.updated_at = now;

        let remind_at = if entry.resolution.acknowledged_at.is_none()
            && entry.resolution.resolved_at.is_none()
        {
            entry.reminders.active = true;
            entry.reminders.attempts = 0;
            let at = now + entry.reminders.base_interval;
            entry.reminders.next_at = Some(at);
            Some(at)
        } else {
            None
        };

        let retried = entry.clone();
        self.store.save(&entries).await?;

        self.ticks.schedule_processing(now);
        if let Some(at) = remind_at {
            self.ticks.schedule_reminder(entry_id, at);
        }

        tracing::info!(entry_id, "Entry reset for retry");
        Ok(retried)
    }

    /// Remove an entry from the queue regardless of its state.
    pub async fn delete_entry(&self, entry_id: &str) -> Result<(), AppError> {
        let mut entries = self.store.load().await?;
        let before = entries.len();
        entries.retain(|e| e.id != entry_id);
        if entries.len() == before {
            return Err(not_found(entry_id));
        }
        self.store.save(&entries).await?;
        self.ticks.cancel_reminder(entry_id);
        tracing::info!(entry_id, "Entry deleted");
        Ok(())
    }

    pub async fn acknowledge(
        &self,
        entry_id: &str,
        channel: Option<&ChannelKey>,
        user: Option<&str>,
    ) -> Result<ResolutionOutcome, AppError> {
        self.resolution.acknowledge(entry_id, channel, user).await
    }

    pub async fn resolve(
        &self,
        entry_id: &str,
        channel: Option<&ChannelKey>,
        user: Option<&str>,
        notes: Option<&str>,
    ) -> Result<ResolutionOutcome, AppError> {
        self.resolution.resolve(entry_id, channel, user, notes).await
    }

    pub async fn snapshot(&self) -> Result<QueueSnapshot, AppError> {
        let entries = self.store.load().await?;
        Ok(QueueSnapshot::build(&entries, self.clock.now()))
    }
}

fn not_found(entry_id: &str) -> AppError {
    AppError::NotFound(format!("Entry {} not found", entry_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::clock::ManualClock;
    use crate::collaborators::StaticActorResolver;
    use crate::history::MemoryHistory;
    use crate::store::InMemoryQueueStore;
    use crate::tick::TickQueue;
    use crate::transport::{DeliveryResult, OutboundMessage, Transport};
    use async_trait::async_trait;
    use herald_common::types::Fields;

    const NOW: i64 = 1_700_000_000;

    struct Silent;

    #[async_trait]
    impl Transport for Silent {
        async fn send(
            &self,
            _channel: &ChannelKey,
            _addressing: &Fields,
            _message: &OutboundMessage<'_>,
        ) -> DeliveryResult {
            DeliveryResult::ok()
        }
    }

    fn service() -> (QueueService, Arc<InMemoryQueueStore>, Arc<TickQueue>, Arc<ManualClock>) {
        let store = Arc::new(InMemoryQueueStore::new());
        let ticks = Arc::new(TickQueue::new());
        let clock = Arc::new(ManualClock::new(NOW));
        let tracker = ResolutionTracker::new(
            store.clone(),
            Arc::new(StaticActorResolver),
            Arc::new(MemoryHistory::new()),
            Arc::new(Silent),
            clock.clone(),
        );
        let service = QueueService::new(store.clone(), tracker, ticks.clone(), clock.clone());
        (service, store, ticks, clock)
    }

    #[tokio::test]
    async fn test_enqueue_schedules_processing_and_reminder() {
        let (service, store, ticks, _) = service();
        let entry = service
            .enqueue(&json!({"id": "e1", "severity": "warning", "channels": {"email": {}}}))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(store.load().await.unwrap(), vec![entry]);
        assert_eq!(ticks.next_processing_at(), Some(NOW + ADMISSION_DELAY_SECS));
        assert_eq!(ticks.reminder_at("e1"), Some(NOW + 600));
    }

    #[tokio::test]
    async fn test_enqueue_rejection_leaves_queue_alone() {
        let (service, store, ticks, _) = service();
        assert!(service.enqueue(&json!({"channels": {}})).await.unwrap().is_none());
        assert!(store.load().await.unwrap().is_empty());
        assert_eq!(ticks.next_processing_at(), None);
    }

    #[tokio::test]
    async fn test_enqueue_replaces_same_id() {
        let (service, store, _, _) = service();
        service
            .enqueue(&json!({"id": "e1", "title": "old", "channels": {"email": {}}}))
            .await
            .unwrap();
        service
            .enqueue(&json!({"id": "e1", "title": "new", "channels": {"email": {}}}))
            .await
            .unwrap();
        let entries = store.load().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "new");
    }

    #[tokio::test]
    async fn test_retry_resets_enabled_channels() {
        let (service, store, ticks, clock) = service();
        service
            .enqueue(&json!({"id": "e1", "channels": {
                "email": {"status": "failed", "attempts": 5, "last_error": "bounce", "failed_at": NOW},
                "sms": {"enabled": false}
            }}))
            .await
            .unwrap();
        clock.advance(100);

        let entry = service.retry_entry("e1").await.unwrap();
        let email = &entry.channels[&ChannelKey::Email];
        assert_eq!(email.status, ChannelStatus::Pending);
        assert_eq!(email.attempts, 0);
        assert!(email.last_error.is_empty());
        assert_eq!(email.failed_at, None);
        assert_eq!(entry.channels[&ChannelKey::Sms].status, ChannelStatus::Disabled);
        assert_eq!(entry.next_attempt_at, NOW + 100);
        assert_eq!(ticks.next_processing_at(), Some(NOW + 100));
        assert_eq!(store.load().await.unwrap()[0], entry);
    }

    #[tokio::test]
    async fn test_retry_keeps_reminders_silent_once_acknowledged() {
        let (service, _, ticks, _) = service();
        service
            .enqueue(&json!({"id": "e1", "channels": {"email": {}}}))
            .await
            .unwrap();
        service.acknowledge("e1", None, Some("alice")).await.unwrap();
        ticks.cancel_reminder("e1");

        service.retry_entry("e1").await.unwrap();
        assert_eq!(ticks.reminder_at("e1"), None);
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let (service, _, _, _) = service();
        assert!(matches!(service.retry_entry("nope").await, Err(AppError::NotFound(_))));
        assert!(matches!(service.delete_entry("nope").await, Err(AppError::NotFound(_))));
        assert!(matches!(
            service.resolve("nope", None, None, None).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_entry_and_reminder() {
        let (service, store, ticks, _) = service();
        service
            .enqueue(&json!({"id": "e1", "channels": {"email": {}}}))
            .await
            .unwrap();
        service.delete_entry("e1").await.unwrap();
        assert!(store.load().await.unwrap().is_empty());
        assert_eq!(ticks.reminder_at("e1"), None);
    }
}
