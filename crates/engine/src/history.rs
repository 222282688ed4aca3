//! Audit trail of queue outcomes.

use std::sync::Mutex;

/// Severity attached to a history record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistorySeverity {
    Success,
    Info,
    Warning,
    Failure,
}

impl std::fmt::Display for HistorySeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HistorySeverity::Success => write!(f, "success"),
            HistorySeverity::Info => write!(f, "info"),
            HistorySeverity::Warning => write!(f, "warning"),
            HistorySeverity::Failure => write!(f, "failure"),
        }
    }
}

/// One (category, severity, message) audit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub category: String,
    pub severity: HistorySeverity,
    pub message: String,
}

impl HistoryRecord {
    pub fn new(
        category: impl Into<String>,
        severity: HistorySeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            severity,
            message: message.into(),
        }
    }
}

/// Receives audit records. Recording must not fail the caller.
pub trait HistorySink: Send + Sync {
    fn record(&self, record: HistoryRecord);
}

/// Writes history as `tracing` events under the `herald::history` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHistory;

impl HistorySink for TracingHistory {
    fn record(&self, record: HistoryRecord) {
        let HistoryRecord {
            category,
            severity,
            message,
        } = record;
        match severity {
            HistorySeverity::Failure => {
                tracing::error!(target: "herald::history", %category, %severity, "{}", message)
            }
            HistorySeverity::Warning => {
                tracing::warn!(target: "herald::history", %category, %severity, "{}", message)
            }
            HistorySeverity::Success | HistorySeverity::Info => {
                tracing::info!(target: "herald::history", %category, %severity, "{}", message)
            }
        }
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    records: Mutex<Vec<HistoryRecord>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<HistoryRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Records in `category`, oldest first.
    pub fn in_category(&self, category: &str) -> Vec<HistoryRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.category == category)
            .collect()
    }
}

impl HistorySink for MemoryHistory {
    fn record(&self, record: HistoryRecord) {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record);
    }
}
