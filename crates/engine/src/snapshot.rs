//! Read-only projection of the queue for dashboards.
//!
//! Computed on demand from the entries; never persisted.

use serde::Serialize;

use herald_common::types::{
    Channel, ChannelKey, ChannelStatus, Entry, Reminders, ResolutionStatus, Severity,
};

/// Entry-level delivery status derived from its channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateStatus {
    Pending,
    Retrying,
    Completed,
    Failed,
    /// Every enabled channel settled, some completed and some failed.
    Partial,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelSummary {
    pub key: ChannelKey,
    pub enabled: bool,
    pub status: ChannelStatus,
    pub attempts: u32,
    pub last_error: String,
    pub last_error_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub failed_at: Option<i64>,
    pub next_attempt_at: Option<i64>,
    pub escalation: bool,
    pub acknowledged_at: Option<i64>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<i64>,
    pub resolution_notes: Option<String>,
}

impl ChannelSummary {
    fn new(key: &ChannelKey, channel: &Channel) -> Self {
        Self {
            key: key.clone(),
            enabled: channel.enabled,
            status: channel.status,
            attempts: channel.attempts,
            last_error: channel.last_error.clone(),
            last_error_at: channel.last_error_at,
            completed_at: channel.completed_at,
            failed_at: channel.failed_at,
            next_attempt_at: channel.next_attempt_at,
            escalation: channel.escalation,
            acknowledged_at: channel.acknowledged_at,
            acknowledged_by: channel.acknowledged_by.clone(),
            resolved_at: channel.resolved_at,
            resolution_notes: channel.resolution_notes.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntrySummary {
    pub id: String,
    pub event: String,
    pub title: String,
    pub severity: Severity,
    pub status: AggregateStatus,
    pub attempts: u32,
    pub created_at: i64,
    pub updated_at: i64,
    pub next_attempt_at: i64,
    pub last_attempt_at: Option<i64>,
    pub last_error: String,
    pub quiet_until: Option<i64>,
    pub channels: Vec<ChannelSummary>,
    pub resolution_status: ResolutionStatus,
    pub resolution_summary: String,
    pub acknowledged_at: Option<i64>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<i64>,
    pub resolution_notes: Vec<String>,
    pub reminders: Reminders,
}

impl From<&Entry> for EntrySummary {
    fn from(entry: &Entry) -> Self {
        Self {
            id: entry.id.clone(),
            event: entry.event.clone(),
            title: entry.title.clone(),
            severity: entry.severity,
            status: aggregate_status(entry),
            attempts: entry.channels.values().map(|c| c.attempts).sum(),
            created_at: entry.created_at,
            updated_at: entry.updated_at,
            next_attempt_at: entry.next_attempt_at,
            last_attempt_at: entry.last_attempt_at,
            last_error: entry.last_error.clone(),
            quiet_until: entry.quiet_until,
            channels: entry
                .channels
                .iter()
                .map(|(key, channel)| ChannelSummary::new(key, channel))
                .collect(),
            resolution_status: entry.resolution_status,
            resolution_summary: entry.resolution_summary.clone(),
            acknowledged_at: entry.acknowledged_at,
            acknowledged_by: entry.acknowledged_by.clone(),
            resolved_at: entry.resolved_at,
            resolution_notes: entry.resolution_notes.clone(),
            reminders: entry.reminders.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueSnapshot {
    pub generated_at: i64,
    pub entries: Vec<EntrySummary>,
}

impl QueueSnapshot {
    pub fn build(entries: &[Entry], now: i64) -> Self {
        Self {
            generated_at: now,
            entries: entries.iter().map(EntrySummary::from).collect(),
        }
    }
}

pub fn aggregate_status(entry: &Entry) -> AggregateStatus {
    let enabled: Vec<ChannelStatus> = entry
        .channels
        .values()
        .filter(|c| c.enabled)
        .map(|c| c.status)
        .collect();

    if enabled.iter().all(|s| s.is_settled()) {
        let completed = enabled.iter().filter(|s| **s == ChannelStatus::Completed).count();
        return match completed {
            n if n == enabled.len() => AggregateStatus::Completed,
            0 => AggregateStatus::Failed,
            _ => AggregateStatus::Partial,
        };
    }

    if enabled.contains(&ChannelStatus::Retry) {
        AggregateStatus::Retrying
    } else {
        AggregateStatus::Pending
    }
}
