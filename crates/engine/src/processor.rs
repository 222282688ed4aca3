//! Processing loop.
//!
//! One pass, guarded by a TTL lock:
//! 1. Load the whole queue
//! 2. Drive every channel of each due entry through the state machine
//!    (at most `PASS_ENTRY_CAP` entries per pass; the rest are carried forward)
//! 3. Drop entries whose enabled channels have all settled, recording a completion
//! 4. Save the whole queue back
//! 5. After releasing the lock, schedule the next pass

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;

use herald_common::error::AppError;
use herald_common::types::{ChannelKey, ChannelStatus, Entry};

use crate::channel::{ChannelStep, advance};
use crate::clock::Clock;
use crate::history::{HistoryRecord, HistorySeverity, HistorySink};
use crate::lock::QueueLock;
use crate::store::QueueStore;
use crate::tick::TickScheduler;
use crate::transport::{OutboundMessage, Transport};

/// Name of the lock serializing processing passes.
pub const LOCK_NAME: &str = "herald:queue:lock";

/// Lock TTL; bounds how long a crashed pass can block the next one.
pub const LOCK_TTL: Duration = Duration::from_secs(45);

/// Entries that may reach the transport in a single pass.
pub const PASS_ENTRY_CAP: usize = 5;

/// Shortest delay before the next pass when entries remain.
pub const MIN_TICK_DELAY_SECS: i64 = 15;

/// Longest delay before the next pass when entries remain.
pub const MAX_TICK_DELAY_SECS: i64 = 60;

/// Final per-channel statuses of an entry leaving the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRecord {
    pub entry_id: String,
    pub event: String,
    pub outcomes: Vec<(ChannelKey, ChannelStatus)>,
}

impl CompletionRecord {
    fn from_entry(entry: &Entry) -> Self {
        Self {
            entry_id: entry.id.clone(),
            event: entry.event.clone(),
            outcomes: entry
                .channels
                .iter()
                .map(|(key, channel)| (key.clone(), channel.status))
                .collect(),
        }
    }

    fn any_failed(&self) -> bool {
        self.outcomes
            .iter()
            .any(|(_, status)| *status == ChannelStatus::Failed)
    }
}

impl std::fmt::Display for CompletionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pairs: Vec<String> = self
            .outcomes
            .iter()
            .map(|(key, status)| format!("{}:{}", key, status))
            .collect();
        f.write_str(&pairs.join(", "))
    }
}

/// Summary of one `run_pass` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Another pass held the lock; nothing was read or written.
    pub lock_contended: bool,
    /// Entries that reached the transport this pass.
    pub processed: usize,
    pub completed: Vec<CompletionRecord>,
    /// Entries still queued after the pass.
    pub remaining: usize,
    /// When the next pass was scheduled: after a contended lock, or when
    /// entries remain.
    pub next_tick_at: Option<i64>,
}

/// Drives queued entries through delivery.
pub struct QueueProcessor {
    store: Arc<dyn QueueStore>,
    lock: Arc<dyn QueueLock>,
    transport: Arc<dyn Transport>,
    history: Arc<dyn HistorySink>,
    ticks: Arc<dyn TickScheduler>,
    clock: Arc<dyn Clock>,
}

impl QueueProcessor {
    pub fn new(
        store: Arc<dyn QueueStore>,
        lock: Arc<dyn QueueLock>,
        transport: Arc<dyn Transport>,
        history: Arc<dyn HistorySink>,
        ticks: Arc<dyn TickScheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            lock,
            transport,
            history,
            ticks,
            clock,
        }
    }

    /// Run one processing pass.
    ///
    /// When another pass holds the lock this returns at once with
    /// `lock_contended` set and re-arms the next pass, so a holder that
    /// crashed is retried once its TTL lapses. The lock is released on every
    /// path out of the pass, including store failures and a panicking
    /// transport; both are returned as errors after release.
    pub async fn run_pass(&self) -> Result<PassReport, AppError> {
        let Some(token) = self.lock.acquire(LOCK_NAME, LOCK_TTL).await? else {
            let retry_at = self.clock.now() + MIN_TICK_DELAY_SECS;
            self.ticks.schedule_processing_if_idle(retry_at);
            tracing::debug!(retry_at, "Processing pass skipped, lock held");
            return Ok(PassReport {
                lock_contended: true,
                next_tick_at: Some(retry_at),
                ..PassReport::default()
            });
        };

        let result = match AssertUnwindSafe(self.process_locked()).catch_unwind().await {
            Ok(result) => result,
            Err(_) => Err(AppError::Internal("processing pass panicked".to_string())),
        };

        match self.lock.release(LOCK_NAME, &token).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!("Queue lock expired before the pass finished"),
            Err(e) => tracing::warn!(error = %e, "Failed to release queue lock; it will expire"),
        }

        let report = result?;
        if let Some(at) = report.next_tick_at {
            self.ticks.schedule_processing(at);
        }

        tracing::debug!(
            processed = report.processed,
            completed = report.completed.len(),
            remaining = report.remaining,
            next_tick_at = ?report.next_tick_at,
            "Processing pass finished"
        );
        Ok(report)
    }

    async fn process_locked(&self) -> Result<PassReport, AppError> {
        let now = self.clock.now();
        let entries = self.store.load().await?;

        let mut kept = Vec::with_capacity(entries.len());
        let mut report = PassReport::default();

        for mut entry in entries {
            if report.processed >= PASS_ENTRY_CAP || !is_due(&entry, now) {
                kept.push(entry);
                continue;
            }

            if self.process_entry(&mut entry, now).await {
                report.processed += 1;
            }

            if entry.is_terminal() {
                let record = CompletionRecord::from_entry(&entry);
                self.history.record(HistoryRecord::new(
                    "notification",
                    if record.any_failed() {
                        HistorySeverity::Warning
                    } else {
                        HistorySeverity::Success
                    },
                    format!("Entry {} ({}) finished: {}", entry.id, entry.event, record),
                ));
                tracing::info!(entry_id = %entry.id, outcome = %record, "Entry completed");
                report.completed.push(record);
            } else {
                kept.push(entry);
            }
        }

        self.store.save(&kept).await?;

        report.remaining = kept.len();
        if !kept.is_empty() {
            report.next_tick_at = Some(now + next_tick_delay(&kept, now));
        }
        Ok(report)
    }

    /// Advance every channel of a due entry. Returns whether any channel
    /// reached the transport.
    async fn process_entry(&self, entry: &mut Entry, now: i64) -> bool {
        let message = OutboundMessage {
            title: &entry.title,
            subject: &entry.subject,
            lines: &entry.lines,
            body: &entry.body,
            severity: entry.severity,
        };

        let mut attempted = false;
        let mut next_attempt: Option<i64> = None;
        let mut last_error: Option<String> = None;

        for (key, channel) in entry.channels.iter_mut() {
            let step = advance(key, channel, &message, self.transport.as_ref(), now).await;
            attempted |= step.attempted();
            if let Some(at) = step.next_attempt_at() {
                next_attempt = Some(next_attempt.map_or(at, |current| current.min(at)));
            }

            match step {
                ChannelStep::Delivered => {
                    tracing::info!(entry_id = %entry.id, channel = %key, "Channel delivered");
                    self.history.record(HistoryRecord::new(
                        "notification",
                        HistorySeverity::Success,
                        format!("{} delivered for entry {}", key, entry.id),
                    ));
                }
                ChannelStep::Retrying {
                    attempts,
                    next_attempt_at,
                    error,
                } => {
                    tracing::warn!(
                        entry_id = %entry.id,
                        channel = %key,
                        attempts,
                        next_attempt_at,
                        error = %error,
                        "Channel delivery failed, will retry"
                    );
                    self.history.record(HistoryRecord::new(
                        "notification",
                        HistorySeverity::Warning,
                        format!(
                            "{} failed for entry {} (attempt {}): {}",
                            key, entry.id, attempts, error
                        ),
                    ));
                    last_error = Some(error);
                }
                ChannelStep::Exhausted { attempts, error } => {
                    tracing::error!(
                        entry_id = %entry.id,
                        channel = %key,
                        attempts,
                        error = %error,
                        "Channel delivery failed permanently"
                    );
                    self.history.record(HistoryRecord::new(
                        "notification",
                        HistorySeverity::Failure,
                        format!(
                            "{} permanently failed for entry {} after {} attempts: {}",
                            key, entry.id, attempts, error
                        ),
                    ));
                    last_error = Some(error);
                }
                ChannelStep::Disabled | ChannelStep::Settled | ChannelStep::Waiting(_) => {}
            }
        }

        if let Some(error) = last_error {
            entry.last_error = error;
        }
        if attempted {
            entry.last_attempt_at = Some(now);
        }
        entry.next_attempt_at = next_attempt.unwrap_or(now);
        entry.updated_at = now;
        attempted
    }
}

/// Whether a pass should look at `entry` at `now`.
pub fn is_due(entry: &Entry, now: i64) -> bool {
    if entry.quiet_until.is_some_and(|until| until > now) {
        return false;
    }
    entry.next_attempt_at <= now
}

/// Seconds until the next pass: time to the nearest pending attempt,
/// clamped to `[MIN_TICK_DELAY_SECS, MAX_TICK_DELAY_SECS]`.
pub fn next_tick_delay(entries: &[Entry], now: i64) -> i64 {
    entries
        .iter()
        .map(|e| e.next_attempt_at.max(e.quiet_until.unwrap_or(i64::MIN)))
        .min()
        .map(|nearest| (nearest - now).clamp(MIN_TICK_DELAY_SECS, MAX_TICK_DELAY_SECS))
        .unwrap_or(MAX_TICK_DELAY_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::normalize;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn entry_due_at(id: &str, next_attempt_at: i64) -> Entry {
        normalize(
            &json!({"id": id, "next_attempt_at": next_attempt_at, "channels": {"internal": {}}}),
            NOW,
        )
        .unwrap()
    }

    #[test]
    fn test_is_due_respects_quiet_period() {
        let mut e = entry_due_at("a", NOW - 1);
        assert!(is_due(&e, NOW));
        e.quiet_until = Some(NOW + 30);
        assert!(!is_due(&e, NOW));
        e.quiet_until = Some(NOW);
        assert!(is_due(&e, NOW));
    }

    #[test]
    fn test_next_tick_delay_is_clamped() {
        assert_eq!(next_tick_delay(&[], NOW), MAX_TICK_DELAY_SECS);
        assert_eq!(next_tick_delay(&[entry_due_at("a", NOW - 100)], NOW), 15);
        assert_eq!(next_tick_delay(&[entry_due_at("a", NOW + 40)], NOW), 40);
        assert_eq!(next_tick_delay(&[entry_due_at("a", NOW + 480)], NOW), 60);
        assert_eq!(
            next_tick_delay(&[entry_due_at("a", NOW + 480), entry_due_at("b", NOW + 20)], NOW),
            20
        );
    }

    #[test]
    fn test_completion_record_display() {
        let record = CompletionRecord {
            entry_id: "e".into(),
            event: "backup".into(),
            outcomes: vec![
                (ChannelKey::Email, ChannelStatus::Completed),
                (ChannelKey::Sms, ChannelStatus::Failed),
            ],
        };
        assert_eq!(record.to_string(), "email:completed, sms:failed");
        assert!(record.any_failed());
    }
}
