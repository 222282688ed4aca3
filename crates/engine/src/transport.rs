//! Delivery seam: the engine asks a `Transport` to push one message to one channel.

use async_trait::async_trait;

use herald_common::types::{ChannelKey, Fields, Severity};

/// Fallback error text when a transport reports failure without a reason.
pub const UNKNOWN_ERROR: &str = "unknown error";

/// Content handed to a transport; borrowed from the entry being processed.
#[derive(Debug, Clone, Copy)]
pub struct OutboundMessage<'a> {
    pub title: &'a str,
    pub subject: &'a str,
    pub lines: &'a [String],
    pub body: &'a str,
    pub severity: Severity,
}

/// Outcome of a single send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResult {
    pub success: bool,
    pub message: Option<String>,
}

impl DeliveryResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }

    /// Failure text to record, defaulting to `UNKNOWN_ERROR` when blank.
    pub fn error_text(&self) -> String {
        match self.message.as_deref().map(str::trim) {
            Some(msg) if !msg.is_empty() => msg.to_string(),
            _ => UNKNOWN_ERROR.to_string(),
        }
    }
}

/// Delivers a message over one channel.
///
/// Failures are returned as data; they drive the retry state machine and
/// must never be raised as errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        channel: &ChannelKey,
        addressing: &Fields,
        message: &OutboundMessage<'_>,
    ) -> DeliveryResult;
}
