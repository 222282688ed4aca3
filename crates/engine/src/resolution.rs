//! Acknowledgment and resolution tracking.
//!
//! Resolution is orthogonal to delivery: acknowledging or resolving never
//! touches a channel's delivery `status`. Every operation is a full
//! load → mutate → save of the queue and is not guarded by the processing lock.
//!
//! An entry counts as fully resolved when `resolution.resolved_at` is set or
//! every enabled channel carries its own `resolved_at`. The transition of that
//! predicate from false to true, measured against the state loaded before the
//! mutation, emits exactly one resolution-completed event.

use std::sync::Arc;

use chrono::DateTime;

use herald_common::error::AppError;
use herald_common::types::{
    ChannelKey, Entry, Fields, ResolutionStatus, ResolutionStep, StepKind,
};

use crate::clock::Clock;
use crate::collaborators::ActorResolver;
use crate::history::{HistoryRecord, HistorySeverity, HistorySink};
use crate::store::QueueStore;
use crate::transport::{OutboundMessage, Transport};

/// Longest note kept after sanitization, in characters.
pub const MAX_NOTE_CHARS: usize = 2_000;

/// Result of an acknowledge/resolve call.
#[derive(Debug, Clone)]
pub struct ResolutionOutcome {
    /// The entry as persisted after the mutation.
    pub entry: Entry,
    /// True only on the call that made the entry fully resolved.
    pub completed: bool,
}

/// Fully resolved: entry-level resolution, or every enabled channel resolved.
pub fn is_fully_resolved(entry: &Entry) -> bool {
    if entry.resolution.resolved_at.is_some() {
        return true;
    }
    let mut enabled = entry.channels.values().filter(|c| c.enabled).peekable();
    enabled.peek().is_some() && enabled.all(|c| c.resolved_at.is_some())
}

/// Aggregate status as a pure function of the resolution block.
pub fn derive_status(entry: &Entry) -> ResolutionStatus {
    if entry.resolution.resolved_at.is_some() {
        ResolutionStatus::Resolved
    } else if entry.resolution.acknowledged_at.is_some() {
        ResolutionStatus::Acknowledged
    } else {
        ResolutionStatus::Pending
    }
}

/// Render resolution steps oldest first, one per line.
pub fn render_summary(steps: &[ResolutionStep]) -> String {
    steps
        .iter()
        .map(|step| {
            format!(
                "{} — {}: {}",
                format_timestamp(step.timestamp),
                step.actor,
                step.summary
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_timestamp(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Recompute every denormalized resolution field from `entry.resolution`.
pub fn refresh_derived(entry: &mut Entry) {
    entry.acknowledged_at = entry.resolution.acknowledged_at;
    entry.resolved_at = entry.resolution.resolved_at;
    entry.resolution_status = derive_status(entry);
    let summary = render_summary(&entry.resolution.steps);
    entry.resolution.summary = summary.clone();
    entry.resolution_summary = summary;
}

/// Trim, strip control characters (newlines survive), cap length.
/// Returns `None` when nothing printable is left.
pub fn sanitize_note(note: &str) -> Option<String> {
    let cleaned: String = note
        .trim()
        .chars()
        .filter(|c| *c == '\n' || !c.is_control())
        .take(MAX_NOTE_CHARS)
        .collect();
    let cleaned = cleaned.trim().to_string();
    if cleaned.is_empty() { None } else { Some(cleaned) }
}

/// Records operator acknowledgment and resolution against queued entries.
pub struct ResolutionTracker {
    store: Arc<dyn QueueStore>,
    actors: Arc<dyn ActorResolver>,
    history: Arc<dyn HistorySink>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
}

impl ResolutionTracker {
    pub fn new(
        store: Arc<dyn QueueStore>,
        actors: Arc<dyn ActorResolver>,
        history: Arc<dyn HistorySink>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            actors,
            history,
            transport,
            clock,
        }
    }

    /// Acknowledge an entry, or one of its channels when `channel` is given.
    ///
    /// First acknowledgment wins; later calls leave timestamps and actors alone.
    pub async fn acknowledge(
        &self,
        entry_id: &str,
        channel: Option<&ChannelKey>,
        user: Option<&str>,
    ) -> Result<ResolutionOutcome, AppError> {
        let actor = self.actors.resolve(user);
        let now = self.clock.now();
        self.mutate(entry_id, channel, &actor, |entry| {
            acknowledge_in_place(entry, channel, &actor, now);
        })
        .await
    }

    /// Resolve an entry, or one of its channels when `channel` is given.
    pub async fn resolve(
        &self,
        entry_id: &str,
        channel: Option<&ChannelKey>,
        user: Option<&str>,
        notes: Option<&str>,
    ) -> Result<ResolutionOutcome, AppError> {
        let actor = self.actors.resolve(user);
        let now = self.clock.now();
        let note = notes.and_then(sanitize_note);
        self.mutate(entry_id, channel, &actor, |entry| {
            resolve_in_place(entry, channel, &actor, note.as_deref(), now);
        })
        .await
    }

    async fn mutate(
        &self,
        entry_id: &str,
        channel: Option<&ChannelKey>,
        actor: &str,
        apply: impl FnOnce(&mut Entry),
    ) -> Result<ResolutionOutcome, AppError> {
        let mut entries = self.store.load().await?;
        let entry = entries
            .iter_mut()
            .find(|e| e.id == entry_id)
            .ok_or_else(|| AppError::NotFound(format!("Entry {} not found", entry_id)))?;
        if let Some(key) = channel
            && !entry.channels.contains_key(key)
        {
            return Err(AppError::NotFound(format!(
                "Channel {} not found on entry {}",
                key, entry_id
            )));
        }

        let was_resolved = is_fully_resolved(entry);
        apply(entry);
        refresh_derived(entry);
        let completed = !was_resolved && is_fully_resolved(entry);
        entry.updated_at = self.clock.now();
        let snapshot = entry.clone();

        self.store.save(&entries).await?;

        if completed {
            self.emit_completed(&snapshot, actor).await;
        }

        Ok(ResolutionOutcome {
            entry: snapshot,
            completed,
        })
    }

    async fn emit_completed(&self, entry: &Entry, actor: &str) {
        let summary = if entry.resolution_summary.is_empty() {
            "no summary".to_string()
        } else {
            entry.resolution_summary.clone()
        };

        self.history.record(HistoryRecord::new(
            "resolution",
            HistorySeverity::Success,
            format!("Entry {} ({}) resolved by {}: {}", entry.id, entry.title, actor, summary),
        ));
        tracing::info!(entry_id = %entry.id, actor, "Entry fully resolved");

        let subject = format!("Resolved: {}", entry.title);
        let lines: Vec<String> = std::iter::once(format!("Resolved by {}", actor))
            .chain(summary.lines().map(str::to_string))
            .collect();
        let message = OutboundMessage {
            title: &subject,
            subject: &subject,
            lines: &lines,
            body: &summary,
            severity: entry.severity,
        };
        let result = self
            .transport
            .send(&ChannelKey::Internal, &Fields::new(), &message)
            .await;
        if !result.success {
            tracing::warn!(
                entry_id = %entry.id,
                error = %result.error_text(),
                "Resolution notification failed"
            );
        }
    }
}

fn acknowledge_in_place(entry: &mut Entry, channel: Option<&ChannelKey>, actor: &str, now: i64) {
    let mut newly_acknowledged = false;

    match channel.and_then(|key| entry.channels.get_mut(key)) {
        Some(ch) => {
            if ch.acknowledged_at.is_none() {
                ch.acknowledged_at = Some(now);
                ch.acknowledged_by = Some(actor.to_string());
                newly_acknowledged = true;
            }
        }
        None => {
            if entry.acknowledged_by.is_none() && entry.resolution.acknowledged_at.is_none() {
                newly_acknowledged = true;
            }
        }
    }

    if entry.resolution.acknowledged_at.is_none() {
        entry.resolution.acknowledged_at = Some(now);
        entry.acknowledged_by = Some(actor.to_string());
    }

    if newly_acknowledged {
        let summary = match channel {
            Some(key) => format!("Acknowledged {}", key),
            None => "Acknowledged".to_string(),
        };
        entry.resolution.steps.push(ResolutionStep {
            timestamp: now,
            actor: actor.to_string(),
            summary,
            kind: StepKind::Acknowledged,
        });
    }
}

fn resolve_in_place(
    entry: &mut Entry,
    channel: Option<&ChannelKey>,
    actor: &str,
    note: Option<&str>,
    now: i64,
) {
    let newly_resolved = match channel.and_then(|key| entry.channels.get_mut(key)) {
        Some(ch) => {
            let fresh = ch.resolved_at.is_none();
            if fresh {
                ch.resolved_at = Some(now);
            }
            if ch.acknowledged_at.is_none() {
                ch.acknowledged_at = Some(now);
                ch.acknowledged_by = Some(actor.to_string());
            }
            if let Some(note) = note {
                ch.resolution_notes = Some(note.to_string());
            }
            fresh
        }
        None => entry.resolution.resolved_at.is_none(),
    };

    if entry.resolution.acknowledged_at.is_none() {
        entry.resolution.acknowledged_at = Some(now);
        entry.acknowledged_by = Some(actor.to_string());
    }

    if let Some(note) = note {
        let line = match channel {
            Some(key) => format!("[{}] {}", key, note),
            None => note.to_string(),
        };
        entry.resolution_notes.push(line);
    }

    // Entry-scope resolution is immediate; channel-scope only once every
    // enabled channel has been resolved individually.
    let entry_resolved = match channel {
        None => true,
        Some(_) => entry
            .channels
            .values()
            .filter(|c| c.enabled)
            .all(|c| c.resolved_at.is_some()),
    };
    if entry_resolved && entry.resolution.resolved_at.is_none() {
        entry.resolution.resolved_at = Some(now);
    }

    let scope = match channel {
        Some(key) => format!("Resolved {}", key),
        None => "Resolved".to_string(),
    };
    if newly_resolved {
        let summary = match note {
            Some(note) => format!("{}: {}", scope, note),
            None => scope,
        };
        entry.resolution.steps.push(ResolutionStep {
            timestamp: now,
            actor: actor.to_string(),
            summary,
            kind: StepKind::Resolved,
        });
    } else if let Some(note) = note {
        entry.resolution.steps.push(ResolutionStep {
            timestamp: now,
            actor: actor.to_string(),
            summary: note.to_string(),
            kind: StepKind::Note,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::normalize;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn entry() -> Entry {
        normalize(
            &json!({
                "id": "e1",
                "title": "Disk full",
                "channels": {"email": {}, "slack": {}, "sms": {"enabled": false}}
            }),
            NOW,
        )
        .unwrap()
    }

    #[test]
    fn test_status_derivation() {
        let mut e = entry();
        assert_eq!(derive_status(&e), ResolutionStatus::Pending);
        e.resolution.acknowledged_at = Some(NOW);
        assert_eq!(derive_status(&e), ResolutionStatus::Acknowledged);
        e.resolution.resolved_at = Some(NOW);
        assert_eq!(derive_status(&e), ResolutionStatus::Resolved);
    }

    #[test]
    fn test_summary_rendering() {
        let steps = vec![
            ResolutionStep {
                timestamp: 0,
                actor: "alice".into(),
                summary: "Acknowledged".into(),
                kind: StepKind::Acknowledged,
            },
            ResolutionStep {
                timestamp: 60,
                actor: "bob".into(),
                summary: "Resolved".into(),
                kind: StepKind::Resolved,
            },
        ];
        assert_eq!(
            render_summary(&steps),
            "1970-01-01 00:00:00 UTC — alice: Acknowledged\n1970-01-01 00:01:00 UTC — bob: Resolved"
        );
    }

    #[test]
    fn test_sanitize_note() {
        assert_eq!(sanitize_note("  restarted\u{0007} nginx \n"), Some("restarted nginx".into()));
        assert_eq!(sanitize_note("line one\nline two"), Some("line one\nline two".into()));
        assert_eq!(sanitize_note(" \t "), None);
        assert_eq!(sanitize_note(&"x".repeat(5_000)).unwrap().len(), MAX_NOTE_CHARS);
    }

    #[test]
    fn test_fully_resolved_ignores_disabled_channels() {
        let mut e = entry();
        assert!(!is_fully_resolved(&e));
        e.channels.get_mut(&ChannelKey::Email).unwrap().resolved_at = Some(NOW);
        assert!(!is_fully_resolved(&e));
        e.channels.get_mut(&ChannelKey::Slack).unwrap().resolved_at = Some(NOW);
        assert!(is_fully_resolved(&e));
    }

    #[test]
    fn test_first_acknowledgment_wins() {
        let mut e = entry();
        acknowledge_in_place(&mut e, None, "alice", NOW);
        acknowledge_in_place(&mut e, None, "bob", NOW + 60);
        refresh_derived(&mut e);

        assert_eq!(e.resolution.acknowledged_at, Some(NOW));
        assert_eq!(e.acknowledged_by.as_deref(), Some("alice"));
        assert_eq!(e.resolution.steps.len(), 1);
        assert_eq!(e.resolution_status, ResolutionStatus::Acknowledged);
    }

    #[test]
    fn test_channel_resolution_prefixes_notes() {
        let mut e = entry();
        resolve_in_place(&mut e, Some(&ChannelKey::Email), "alice", Some("mailbox cleared"), NOW);
        refresh_derived(&mut e);

        let email = &e.channels[&ChannelKey::Email];
        assert_eq!(email.resolved_at, Some(NOW));
        assert_eq!(email.acknowledged_at, Some(NOW));
        assert_eq!(e.resolution_notes, vec!["[email] mailbox cleared".to_string()]);
        assert_eq!(e.resolution.resolved_at, None);
        assert_eq!(e.resolution_status, ResolutionStatus::Acknowledged);

        resolve_in_place(&mut e, Some(&ChannelKey::Slack), "alice", None, NOW + 5);
        refresh_derived(&mut e);
        assert_eq!(e.resolution.resolved_at, Some(NOW + 5));
        assert_eq!(e.resolution_status, ResolutionStatus::Resolved);
    }

    #[test]
    fn test_resolve_leaves_delivery_status_alone() {
        let mut e = entry();
        let before: Vec<_> = e.channels.values().map(|c| c.status).collect();
        resolve_in_place(&mut e, None, "alice", None, NOW);
        let after: Vec<_> = e.channels.values().map(|c| c.status).collect();
        assert_eq!(before, after);
    }
}
