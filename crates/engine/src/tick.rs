//! One-shot tick scheduling.
//!
//! The engine never sleeps; it tells a `TickScheduler` when it next wants the
//! processing loop or an entry's reminder to run, and something outside calls
//! back at that time. `TickQueue` is the in-process implementation polled by
//! the API worker.

use std::collections::HashMap;
use std::sync::Mutex;

/// Work a due tick asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    Process,
    Remind(String),
}

pub trait TickScheduler: Send + Sync {
    /// Run the processing loop at `at`, replacing any earlier request.
    fn schedule_processing(&self, at: i64);

    /// Run the processing loop at `at` unless a run is already scheduled.
    fn schedule_processing_if_idle(&self, at: i64);

    /// Fire the reminder for `entry_id` at `at`, replacing any earlier request.
    fn schedule_reminder(&self, entry_id: &str, at: i64);

    fn cancel_reminder(&self, entry_id: &str);
}

#[derive(Debug, Default)]
struct TickState {
    processing_at: Option<i64>,
    reminders: HashMap<String, i64>,
}

/// In-memory tick schedule.
#[derive(Debug, Default)]
pub struct TickQueue {
    state: Mutex<TickState>,
}

impl TickQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, TickState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Remove and return every tick due at or before `now`.
    ///
    /// The processing tick, if due, comes first; reminders follow in
    /// scheduled order.
    pub fn due(&self, now: i64) -> Vec<Tick> {
        let mut state = self.state();
        let mut ticks = Vec::new();

        if state.processing_at.is_some_and(|at| at <= now) {
            state.processing_at = None;
            ticks.push(Tick::Process);
        }

        let mut reminders: Vec<(String, i64)> = state
            .reminders
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(id, at)| (id.clone(), *at))
            .collect();
        reminders.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        for (id, _) in reminders {
            state.reminders.remove(&id);
            ticks.push(Tick::Remind(id));
        }

        ticks
    }

    pub fn next_processing_at(&self) -> Option<i64> {
        self.state().processing_at
    }

    pub fn reminder_at(&self, entry_id: &str) -> Option<i64> {
        self.state().reminders.get(entry_id).copied()
    }
}

impl TickScheduler for TickQueue {
    fn schedule_processing(&self, at: i64) {
        self.state().processing_at = Some(at);
    }

    fn schedule_processing_if_idle(&self, at: i64) {
        let mut state = self.state();
        if state.processing_at.is_none() {
            state.processing_at = Some(at);
        }
    }

    fn schedule_reminder(&self, entry_id: &str, at: i64) {
        self.state().reminders.insert(entry_id.to_string(), at);
    }

    fn cancel_reminder(&self, entry_id: &str) {
        self.state().reminders.remove(entry_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_tick_if_idle_keeps_existing() {
        let ticks = TickQueue::new();
        ticks.schedule_processing_if_idle(115);
        ticks.schedule_processing_if_idle(200);
        assert_eq!(ticks.next_processing_at(), Some(115));

        ticks.schedule_processing(150);
        assert_eq!(ticks.next_processing_at(), Some(150));
    }

    #[test]
    fn test_due_drains_in_order() {
        let ticks = TickQueue::new();
        ticks.schedule_processing(100);
        ticks.schedule_reminder("b", 90);
        ticks.schedule_reminder("a", 80);
        ticks.schedule_reminder("later", 500);

        assert!(ticks.due(79).is_empty());
        let due = ticks.due(100);
        assert_eq!(
            due,
            vec![
                Tick::Process,
                Tick::Remind("a".to_string()),
                Tick::Remind("b".to_string()),
            ]
        );
        assert!(ticks.due(100).is_empty());
        assert_eq!(ticks.reminder_at("later"), Some(500));
    }

    #[test]
    fn test_cancel_reminder() {
        let ticks = TickQueue::new();
        ticks.schedule_reminder("a", 10);
        ticks.cancel_reminder("a");
        assert!(ticks.due(1_000).is_empty());
    }
}
