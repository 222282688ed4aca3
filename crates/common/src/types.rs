use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Opaque key/value bag (channel addressing, entry context).
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Entry severity levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Critical,
}

impl Severity {
    /// Parse a severity label; anything outside the closed set is `None`.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "info" => Some(Severity::Info),
            "warning" => Some(Severity::Warning),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Delivery transport a channel targets.
///
/// Keys outside the known set are kept verbatim in `Unknown` so they survive
/// a load/save cycle; delivering to one always fails.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChannelKey {
    Email,
    Slack,
    Discord,
    Teams,
    Sms,
    Internal,
    Unknown(String),
}

impl ChannelKey {
    pub fn as_str(&self) -> &str {
        match self {
            ChannelKey::Email => "email",
            ChannelKey::Slack => "slack",
            ChannelKey::Discord => "discord",
            ChannelKey::Teams => "teams",
            ChannelKey::Sms => "sms",
            ChannelKey::Internal => "internal",
            ChannelKey::Unknown(key) => key,
        }
    }
}

impl From<&str> for ChannelKey {
    fn from(key: &str) -> Self {
        match key {
            "email" => ChannelKey::Email,
            "slack" => ChannelKey::Slack,
            "discord" => ChannelKey::Discord,
            "teams" => ChannelKey::Teams,
            "sms" => ChannelKey::Sms,
            "internal" => ChannelKey::Internal,
            other => ChannelKey::Unknown(other.to_string()),
        }
    }
}

impl From<String> for ChannelKey {
    fn from(key: String) -> Self {
        ChannelKey::from(key.as_str())
    }
}

impl From<ChannelKey> for String {
    fn from(key: ChannelKey) -> Self {
        key.as_str().to_string()
    }
}

impl std::fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery status of one channel within one entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    #[default]
    Pending,
    Retry,
    Completed,
    Failed,
    Disabled,
}

impl ChannelStatus {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(ChannelStatus::Pending),
            "retry" => Some(ChannelStatus::Retry),
            "completed" => Some(ChannelStatus::Completed),
            "failed" => Some(ChannelStatus::Failed),
            "disabled" => Some(ChannelStatus::Disabled),
            _ => None,
        }
    }

    /// `completed` and `failed` end delivery for an enabled channel.
    pub fn is_settled(self) -> bool {
        matches!(self, ChannelStatus::Completed | ChannelStatus::Failed)
    }
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelStatus::Pending => write!(f, "pending"),
            ChannelStatus::Retry => write!(f, "retry"),
            ChannelStatus::Completed => write!(f, "completed"),
            ChannelStatus::Failed => write!(f, "failed"),
            ChannelStatus::Disabled => write!(f, "disabled"),
        }
    }
}

/// Aggregate human-resolution state of an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStatus {
    #[default]
    Pending,
    Acknowledged,
    Resolved,
}

impl std::fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionStatus::Pending => write!(f, "pending"),
            ResolutionStatus::Acknowledged => write!(f, "acknowledged"),
            ResolutionStatus::Resolved => write!(f, "resolved"),
        }
    }
}

/// Delivery state for one entry on one transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub enabled: bool,
    pub status: ChannelStatus,
    pub attempts: u32,
    #[serde(default)]
    pub last_error: String,
    pub last_error_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub failed_at: Option<i64>,
    pub next_attempt_at: Option<i64>,
    /// Marks a channel added by escalation; has no effect on delivery.
    #[serde(default)]
    pub escalation: bool,
    pub acknowledged_at: Option<i64>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<i64>,
    pub resolution_notes: Option<String>,
    /// Transport-specific addressing (`recipients`, `webhook_url`, ...).
    #[serde(flatten)]
    pub addressing: Fields,
}

impl Channel {
    /// A fresh, enabled, never-attempted channel.
    pub fn new() -> Self {
        Self {
            enabled: true,
            status: ChannelStatus::Pending,
            attempts: 0,
            last_error: String::new(),
            last_error_at: None,
            completed_at: None,
            failed_at: None,
            next_attempt_at: None,
            escalation: false,
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            resolution_notes: None,
            addressing: Fields::new(),
        }
    }

    pub fn with_address(mut self, field: &str, value: serde_json::Value) -> Self {
        self.addressing.insert(field.to_string(), value);
        self
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::new()
    }
}

/// One step of an escalation ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationStep {
    pub label: String,
    pub channels: Vec<ChannelKey>,
    pub delay: i64,
}

/// Declarative description of escalation channels.
///
/// The channels themselves are already part of `Entry::channels`, flagged
/// with `Channel::escalation`; this block only records the intent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    pub channels: Vec<ChannelKey>,
    pub delay: i64,
    pub only_critical: bool,
    pub strategy: String,
    pub steps: Vec<EscalationStep>,
}

/// Reminder bookkeeping; reminders nag operators, they never deliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminders {
    pub attempts: u32,
    pub base_interval: i64,
    pub next_at: Option<i64>,
    pub last_triggered_at: Option<i64>,
    pub active: bool,
    pub backoff_multiplier: f64,
    pub max_interval: i64,
}

/// What kind of operator action a resolution step records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Acknowledged,
    Resolved,
    Note,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionStep {
    pub timestamp: i64,
    pub actor: String,
    pub summary: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub acknowledged_at: Option<i64>,
    pub resolved_at: Option<i64>,
    #[serde(default)]
    pub steps: Vec<ResolutionStep>,
    #[serde(default)]
    pub summary: String,
}

/// The unit of notification work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub event: String,
    pub title: String,
    pub subject: String,
    pub lines: Vec<String>,
    pub body: String,
    pub context: Fields,
    pub severity: Severity,
    pub created_at: i64,
    pub updated_at: i64,
    pub next_attempt_at: i64,
    pub last_attempt_at: Option<i64>,
    #[serde(default)]
    pub last_error: String,
    pub quiet_until: Option<i64>,
    pub escalation: Option<Escalation>,
    pub reminders: Reminders,
    pub resolution: Resolution,
    pub acknowledged_at: Option<i64>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<i64>,
    #[serde(default)]
    pub resolution_notes: Vec<String>,
    pub resolution_status: ResolutionStatus,
    #[serde(default)]
    pub resolution_summary: String,
    pub channels: BTreeMap<ChannelKey, Channel>,
}

impl Entry {
    /// True once every enabled channel has settled; disabled channels never block.
    pub fn is_terminal(&self) -> bool {
        self.channels
            .values()
            .filter(|c| c.enabled)
            .all(|c| c.status.is_settled())
    }
}
