//! Tick worker: the in-process tick source for the engine.
//!
//! Polls the tick queue on a fixed interval and runs whatever is due. Errors
//! from a pass or a reminder are logged and the work is retried on a later
//! tick; they never stop the worker.

use std::time::Duration;

use herald_common::error::AppError;
use herald_engine::backoff::REMINDER_FLOOR_SECS;
use herald_engine::processor::MIN_TICK_DELAY_SECS;
use herald_engine::store::QueueStore;
use herald_engine::tick::{Tick, TickScheduler};

use crate::state::AppState;

/// What one `run_due` call did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickSummary {
    pub passes: usize,
    pub reminders: usize,
    pub failures: usize,
}

pub struct TickWorker {
    state: AppState,
    interval: Duration,
}

impl TickWorker {
    pub fn new(state: AppState, interval_ms: u64) -> Self {
        Self {
            state,
            interval: Duration::from_millis(interval_ms.max(1)),
        }
    }

    /// Re-arm ticks for entries already persisted, e.g. after a restart.
    pub async fn restore(&self) -> Result<usize, AppError> {
        let entries = self.state.store.load().await?;
        if entries.is_empty() {
            return Ok(0);
        }

        let now = self.state.clock.now();
        self.state.ticks.schedule_processing(now);
        for entry in &entries {
            if entry.reminders.active
                && let Some(at) = entry.reminders.next_at
            {
                self.state.ticks.schedule_reminder(&entry.id, at);
            }
        }
        tracing::info!(entries = entries.len(), "Restored ticks for persisted queue");
        Ok(entries.len())
    }

    /// Run every tick due at the current time.
    pub async fn run_due(&self) -> TickSummary {
        let now = self.state.clock.now();
        let mut summary = TickSummary::default();

        for tick in self.state.ticks.due(now) {
            match tick {
                Tick::Process => {
                    summary.passes += 1;
                    if let Err(e) = self.state.processor.run_pass().await {
                        summary.failures += 1;
                        tracing::error!(error = %e, "Processing pass failed, retrying on next tick");
                        self.state
                            .ticks
                            .schedule_processing_if_idle(now + MIN_TICK_DELAY_SECS);
                    }
                }
                Tick::Remind(entry_id) => {
                    summary.reminders += 1;
                    if let Err(e) = self.state.reminders.tick(&entry_id).await {
                        summary.failures += 1;
                        tracing::error!(entry_id = %entry_id, error = %e, "Reminder tick failed");
                        self.state
                            .ticks
                            .schedule_reminder(&entry_id, now + REMINDER_FLOOR_SECS);
                    }
                }
            }
        }

        summary
    }

    /// Poll forever. Runs until the task is cancelled.
    pub async fn run(&self) {
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            "Tick worker started"
        );
        loop {
            let summary = self.run_due().await;
            if summary.passes + summary.reminders > 0 {
                tracing::debug!(
                    passes = summary.passes,
                    reminders = summary.reminders,
                    failures = summary.failures,
                    "Ticks handled"
                );
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
