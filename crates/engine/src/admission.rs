//! Admission: validate and normalize a candidate entry before it joins the queue.
//!
//! Input is loosely-typed JSON. Each field is read with a strict type; a field
//! of the wrong type is dropped and replaced by its default instead of being
//! coerced. An entry without at least one well-formed channel is rejected.
//!
//! Normalization is idempotent: serializing a normalized entry and
//! normalizing it again yields the same entry.

use std::collections::BTreeMap;

use serde_json::Value;
use uuid::Uuid;

use herald_common::types::{
    Channel, ChannelKey, ChannelStatus, Entry, Escalation, EscalationStep, Fields, Reminders,
    Resolution, ResolutionStatus, ResolutionStep, Severity, StepKind,
};

use crate::backoff::{MAX_ATTEMPTS, REMINDER_MAX_INTERVAL_SECS, REMINDER_MULTIPLIER};
use crate::resolution::refresh_derived;

/// Delay between admission and the first processing pass.
pub const ADMISSION_DELAY_SECS: i64 = 15;

/// Channel fields owned by the state machine; everything else is addressing.
const CHANNEL_FIELDS: &[&str] = &[
    "enabled",
    "status",
    "attempts",
    "last_error",
    "last_error_at",
    "completed_at",
    "failed_at",
    "next_attempt_at",
    "escalation",
    "acknowledged_at",
    "acknowledged_by",
    "resolved_at",
    "resolution_notes",
];

/// Reminder base interval by severity.
pub fn reminder_base_interval(severity: Severity) -> i64 {
    match severity {
        Severity::Critical => 5 * 60,
        Severity::Warning => 10 * 60,
        Severity::Info => 15 * 60,
    }
}

/// Normalize a candidate entry. `None` means the entry is rejected.
pub fn normalize(candidate: &Value, now: i64) -> Option<Entry> {
    let obj = candidate.as_object()?;

    let channels = normalize_channels(obj.get("channels")?, now)?;

    let severity = str_field(obj, "severity")
        .and_then(Severity::parse)
        .unwrap_or_default();
    let created_at = int_field(obj, "created_at").unwrap_or(now);

    let mut resolution = obj
        .get("resolution")
        .and_then(Value::as_object)
        .map(normalize_resolution)
        .unwrap_or_default();
    // Flat timestamps from older producers fill gaps in the resolution block.
    if resolution.acknowledged_at.is_none() {
        resolution.acknowledged_at = int_field(obj, "acknowledged_at");
    }
    if resolution.resolved_at.is_none() {
        resolution.resolved_at = int_field(obj, "resolved_at");
    }

    let mut entry = Entry {
        id: str_field(obj, "id")
            .filter(|id| !id.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        event: string_or_empty(obj, "event"),
        title: string_or_empty(obj, "title"),
        subject: string_or_empty(obj, "subject"),
        lines: string_list(obj.get("lines")),
        body: string_or_empty(obj, "body"),
        context: obj
            .get("context")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
        severity,
        created_at,
        updated_at: int_field(obj, "updated_at").unwrap_or(created_at),
        next_attempt_at: int_field(obj, "next_attempt_at").unwrap_or(now),
        last_attempt_at: int_field(obj, "last_attempt_at"),
        last_error: string_or_empty(obj, "last_error"),
        quiet_until: int_field(obj, "quiet_until"),
        escalation: obj
            .get("escalation")
            .and_then(Value::as_object)
            .map(normalize_escalation),
        reminders: normalize_reminders(
            obj.get("reminders").and_then(Value::as_object),
            severity,
            now,
        ),
        resolution,
        acknowledged_at: None,
        acknowledged_by: str_field(obj, "acknowledged_by").map(str::to_string),
        resolved_at: None,
        resolution_notes: match obj.get("resolution_notes") {
            Some(Value::String(note)) if !note.is_empty() => vec![note.clone()],
            other => string_list(other),
        },
        resolution_status: ResolutionStatus::Pending,
        resolution_summary: String::new(),
        channels,
    };
    refresh_derived(&mut entry);
    Some(entry)
}

/// Re-run admission on an already-typed entry.
pub fn renormalize(entry: &Entry, now: i64) -> Option<Entry> {
    let value = serde_json::to_value(entry).ok()?;
    normalize(&value, now)
}

fn normalize_channels(value: &Value, now: i64) -> Option<BTreeMap<ChannelKey, Channel>> {
    let map = value.as_object()?;
    let channels: BTreeMap<ChannelKey, Channel> = map
        .iter()
        .filter(|(key, _)| !key.trim().is_empty())
        .filter_map(|(key, raw)| {
            let raw = raw.as_object()?;
            Some((ChannelKey::from(key.as_str()), normalize_channel(raw, now)))
        })
        .collect();

    if channels.is_empty() {
        None
    } else {
        Some(channels)
    }
}

fn normalize_channel(raw: &Fields, now: i64) -> Channel {
    let enabled = raw.get("enabled").and_then(Value::as_bool).unwrap_or(true);
    let attempts = raw
        .get("attempts")
        .and_then(Value::as_u64)
        .map(|n| n.min(u64::from(MAX_ATTEMPTS)) as u32)
        .unwrap_or(0);
    let status = str_field(raw, "status")
        .and_then(ChannelStatus::parse)
        .unwrap_or_default();
    let status = match (enabled, status) {
        (false, _) => ChannelStatus::Disabled,
        (true, ChannelStatus::Disabled) => ChannelStatus::Pending,
        // Out of attempts: nothing left to retry.
        (true, ChannelStatus::Pending | ChannelStatus::Retry) if attempts >= MAX_ATTEMPTS => {
            ChannelStatus::Failed
        }
        (true, other) => other,
    };
    let failed_at = match int_field(raw, "failed_at") {
        None if status == ChannelStatus::Failed => Some(now),
        other => other,
    };

    let addressing: Fields = raw
        .iter()
        .filter(|(field, _)| !CHANNEL_FIELDS.contains(&field.as_str()))
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect();

    Channel {
        enabled,
        status,
        attempts,
        last_error: string_or_empty(raw, "last_error"),
        last_error_at: int_field(raw, "last_error_at"),
        completed_at: int_field(raw, "completed_at"),
        failed_at,
        next_attempt_at: int_field(raw, "next_attempt_at"),
        escalation: raw
            .get("escalation")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        acknowledged_at: int_field(raw, "acknowledged_at"),
        acknowledged_by: str_field(raw, "acknowledged_by").map(str::to_string),
        resolved_at: int_field(raw, "resolved_at"),
        resolution_notes: str_field(raw, "resolution_notes").map(str::to_string),
        addressing,
    }
}

fn normalize_escalation(raw: &Fields) -> Escalation {
    let steps = raw
        .get("steps")
        .and_then(Value::as_array)
        .map(|steps| {
            steps
                .iter()
                .filter_map(Value::as_object)
                .map(|step| EscalationStep {
                    label: string_or_empty(step, "label"),
                    channels: channel_keys(step.get("channels")),
                    delay: non_negative(step, "delay"),
                })
                .collect()
        })
        .unwrap_or_default();

    Escalation {
        channels: channel_keys(raw.get("channels")),
        delay: non_negative(raw, "delay"),
        only_critical: raw
            .get("only_critical")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        strategy: string_or_empty(raw, "strategy"),
        steps,
    }
}

fn normalize_reminders(raw: Option<&Fields>, severity: Severity, now: i64) -> Reminders {
    let empty = Fields::new();
    let raw = raw.unwrap_or(&empty);

    let base_interval = int_field(raw, "base_interval")
        .filter(|secs| *secs > 0)
        .unwrap_or_else(|| reminder_base_interval(severity));

    Reminders {
        attempts: raw
            .get("attempts")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0),
        base_interval,
        next_at: match raw.get("next_at") {
            // An explicit null means "nothing scheduled" and must survive re-admission.
            Some(Value::Null) => None,
            Some(value) => value.as_i64().or(Some(now + base_interval)),
            None => Some(now + base_interval),
        },
        last_triggered_at: int_field(raw, "last_triggered_at"),
        active: raw.get("active").and_then(Value::as_bool).unwrap_or(true),
        backoff_multiplier: raw
            .get("backoff_multiplier")
            .and_then(Value::as_f64)
            .filter(|m| m.is_finite() && *m >= 1.0)
            .unwrap_or(REMINDER_MULTIPLIER),
        max_interval: int_field(raw, "max_interval")
            .filter(|secs| *secs > 0)
            .unwrap_or(REMINDER_MAX_INTERVAL_SECS),
    }
}

fn normalize_resolution(raw: &Fields) -> Resolution {
    let steps = raw
        .get("steps")
        .and_then(Value::as_array)
        .map(|steps| {
            steps
                .iter()
                .filter_map(Value::as_object)
                .filter_map(|step| {
                    let kind = match str_field(step, "type")? {
                        "acknowledged" => StepKind::Acknowledged,
                        "resolved" => StepKind::Resolved,
                        "note" => StepKind::Note,
                        _ => return None,
                    };
                    Some(ResolutionStep {
                        timestamp: int_field(step, "timestamp")?,
                        actor: string_or_empty(step, "actor"),
                        summary: string_or_empty(step, "summary"),
                        kind,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Resolution {
        acknowledged_at: int_field(raw, "acknowledged_at"),
        resolved_at: int_field(raw, "resolved_at"),
        steps,
        summary: String::new(),
    }
}

fn str_field<'a>(obj: &'a Fields, field: &str) -> Option<&'a str> {
    obj.get(field).and_then(Value::as_str)
}

fn string_or_empty(obj: &Fields, field: &str) -> String {
    str_field(obj, field).unwrap_or_default().to_string()
}

fn int_field(obj: &Fields, field: &str) -> Option<i64> {
    obj.get(field).and_then(Value::as_i64)
}

fn non_negative(obj: &Fields, field: &str) -> i64 {
    int_field(obj, field).filter(|n| *n >= 0).unwrap_or(0)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn channel_keys(value: Option<&Value>) -> Vec<ChannelKey> {
    string_list(value)
        .into_iter()
        .filter(|key| !key.trim().is_empty())
        .map(ChannelKey::from)
        .collect()
}
