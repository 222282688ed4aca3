//! Reminder scheduler.
//!
//! Reminders nag operators about entries nobody has acknowledged yet. They are
//! ticked per entry id, independently of the processing loop, and never attempt
//! delivery themselves. Once the receipt gate reports an acknowledgment or a
//! resolution, the entry's reminders are switched off for good.

use std::sync::Arc;

use herald_common::error::AppError;

use crate::backoff::reminder_delay;
use crate::clock::Clock;
use crate::collaborators::ReceiptGate;
use crate::history::{HistoryRecord, HistorySeverity, HistorySink};
use crate::store::QueueStore;
use crate::tick::TickScheduler;

/// Reminders fired before the history record is raised to `failure`.
pub const REMINDER_FAILURE_THRESHOLD: u32 = 3;

/// What one reminder tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReminderOutcome {
    /// Reminder fired; the next one is due at `next_at`.
    Fired { attempts: u32, next_at: i64 },
    /// Operator has responded; reminders were deactivated.
    Silenced,
    /// Reminders were already inactive.
    Inactive,
    /// Entry is in a quiet period; the tick was pushed to `until`.
    Deferred { until: i64 },
    /// Entry is no longer queued.
    Missing,
}

pub struct ReminderScheduler {
    store: Arc<dyn QueueStore>,
    gate: Arc<dyn ReceiptGate>,
    history: Arc<dyn HistorySink>,
    ticks: Arc<dyn TickScheduler>,
    clock: Arc<dyn Clock>,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<dyn QueueStore>,
        gate: Arc<dyn ReceiptGate>,
        history: Arc<dyn HistorySink>,
        ticks: Arc<dyn TickScheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            gate,
            history,
            ticks,
            clock,
        }
    }

    /// Handle one reminder tick for `entry_id`.
    pub async fn tick(&self, entry_id: &str) -> Result<ReminderOutcome, AppError> {
        let now = self.clock.now();

        if self.gate.is_acknowledged(entry_id).await? || self.gate.is_resolved(entry_id).await? {
            self.deactivate(entry_id).await?;
            self.ticks.cancel_reminder(entry_id);
            tracing::debug!(entry_id, "Reminders silenced: entry acknowledged or resolved");
            return Ok(ReminderOutcome::Silenced);
        }

        let mut entries = self.store.load().await?;
        let Some(entry) = entries.iter_mut().find(|e| e.id == entry_id) else {
            self.ticks.cancel_reminder(entry_id);
            tracing::debug!(entry_id, "Reminder tick for entry no longer queued");
            return Ok(ReminderOutcome::Missing);
        };

        if !entry.reminders.active {
            return Ok(ReminderOutcome::Inactive);
        }

        if let Some(until) = entry.quiet_until
            && until > now
        {
            self.ticks.schedule_reminder(entry_id, until);
            return Ok(ReminderOutcome::Deferred { until });
        }

        entry.reminders.attempts += 1;
        entry.reminders.last_triggered_at = Some(now);
        let next_at = now + reminder_delay(&entry.reminders);
        entry.reminders.next_at = Some(next_at);
        let attempts = entry.reminders.attempts;
        let message = format!(
            "Entry {} ({}) still unacknowledged (reminder #{})",
            entry.id, entry.title, attempts
        );

        self.store.save(&entries).await?;

        let severity = if attempts >= REMINDER_FAILURE_THRESHOLD {
            HistorySeverity::Failure
        } else {
            HistorySeverity::Warning
        };
        self.history
            .record(HistoryRecord::new("reminder", severity, message));
        tracing::info!(entry_id, attempts, next_at, "Reminder fired");

        self.ticks.schedule_reminder(entry_id, next_at);
        Ok(ReminderOutcome::Fired { attempts, next_at })
    }

    async fn deactivate(&self, entry_id: &str) -> Result<(), AppError> {
        let mut entries = self.store.load().await?;
        let Some(entry) = entries.iter_mut().find(|e| e.id == entry_id) else {
            return Ok(());
        };
        if !entry.reminders.active && entry.reminders.next_at.is_none() {
            return Ok(());
        }
        entry.reminders.active = false;
        entry.reminders.next_at = None;
        self.store.save(&entries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::admission::normalize;
    use crate::clock::ManualClock;
    use crate::history::MemoryHistory;
    use crate::store::InMemoryQueueStore;
    use crate::tick::TickQueue;

    const NOW: i64 = 1_700_000_000;

    #[derive(Default)]
    struct FakeGate {
        acknowledged: Mutex<HashSet<String>>,
    }

    #[async_trait]
    impl ReceiptGate for FakeGate {
        async fn is_acknowledged(&self, entry_id: &str) -> Result<bool, AppError> {
            Ok(self.acknowledged.lock().unwrap().contains(entry_id))
        }

        async fn is_resolved(&self, _entry_id: &str) -> Result<bool, AppError> {
            Ok(false)
        }
    }

    struct Harness {
        store: Arc<InMemoryQueueStore>,
        gate: Arc<FakeGate>,
        history: Arc<MemoryHistory>,
        ticks: Arc<TickQueue>,
        clock: Arc<ManualClock>,
        scheduler: ReminderScheduler,
    }

    fn harness(severity: &str) -> Harness {
        let entry = normalize(
            &json!({"id": "e1", "title": "Disk full", "severity": severity, "channels": {"email": {}}}),
            NOW,
        )
        .unwrap();
        let store = Arc::new(InMemoryQueueStore::with_entries(vec![entry]));
        let gate = Arc::new(FakeGate::default());
        let history = Arc::new(MemoryHistory::new());
        let ticks = Arc::new(TickQueue::new());
        let clock = Arc::new(ManualClock::new(NOW));
        let scheduler = ReminderScheduler::new(
            store.clone(),
            gate.clone(),
            history.clone(),
            ticks.clone(),
            clock.clone(),
        );
        Harness {
            store,
            gate,
            history,
            ticks,
            clock,
            scheduler,
        }
    }

    #[tokio::test]
    async fn test_reminders_back_off() {
        let h = harness("critical");
        h.clock.set(NOW + 300);

        let first = h.scheduler.tick("e1").await.unwrap();
        assert_eq!(first, ReminderOutcome::Fired { attempts: 1, next_at: NOW + 300 + 600 });
        assert_eq!(h.ticks.reminder_at("e1"), Some(NOW + 900));

        h.clock.set(NOW + 900);
        let second = h.scheduler.tick("e1").await.unwrap();
        assert_eq!(second, ReminderOutcome::Fired { attempts: 2, next_at: NOW + 900 + 1_200 });

        let stored = &h.store.load().await.unwrap()[0];
        assert_eq!(stored.reminders.attempts, 2);
        assert_eq!(stored.reminders.last_triggered_at, Some(NOW + 900));
        assert_eq!(h.history.in_category("reminder").len(), 2);
    }

    #[tokio::test]
    async fn test_acknowledgment_silences_reminders() {
        let h = harness("info");
        h.scheduler.tick("e1").await.unwrap();
        assert!(h.ticks.reminder_at("e1").is_some());

        h.gate.acknowledged.lock().unwrap().insert("e1".to_string());
        assert_eq!(h.scheduler.tick("e1").await.unwrap(), ReminderOutcome::Silenced);
        assert_eq!(h.ticks.reminder_at("e1"), None);

        let stored = &h.store.load().await.unwrap()[0];
        assert!(!stored.reminders.active);
        assert_eq!(stored.reminders.next_at, None);

        // Still silent on any later tick.
        assert_eq!(h.scheduler.tick("e1").await.unwrap(), ReminderOutcome::Silenced);
        assert_eq!(h.history.in_category("reminder").len(), 1);
    }

    #[tokio::test]
    async fn test_inactive_reminders_do_nothing() {
        let h = harness("info");
        let mut entries = h.store.load().await.unwrap();
        entries[0].reminders.active = false;
        h.store.save(&entries).await.unwrap();

        assert_eq!(h.scheduler.tick("e1").await.unwrap(), ReminderOutcome::Inactive);
        assert!(h.history.records().is_empty());
    }

    #[tokio::test]
    async fn test_missing_entry_stops_reminders() {
        let h = harness("info");
        h.ticks.schedule_reminder("gone", NOW);
        assert_eq!(h.scheduler.tick("gone").await.unwrap(), ReminderOutcome::Missing);
        assert_eq!(h.ticks.reminder_at("gone"), None);
    }

    #[tokio::test]
    async fn test_quiet_period_defers_reminder() {
        let h = harness("info");
        let mut entries = h.store.load().await.unwrap();
        entries[0].quiet_until = Some(NOW + 1_000);
        h.store.save(&entries).await.unwrap();

        assert_eq!(
            h.scheduler.tick("e1").await.unwrap(),
            ReminderOutcome::Deferred { until: NOW + 1_000 }
        );
        assert_eq!(h.ticks.reminder_at("e1"), Some(NOW + 1_000));
    }

    #[tokio::test]
    async fn test_repeated_reminders_escalate_history_severity() {
        let h = harness("critical");
        for _ in 0..REMINDER_FAILURE_THRESHOLD {
            h.scheduler.tick("e1").await.unwrap();
        }
        let records = h.history.in_category("reminder");
        assert_eq!(records[0].severity, HistorySeverity::Warning);
        assert_eq!(records[2].severity, HistorySeverity::Failure);
    }
}
