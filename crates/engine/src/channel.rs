//! Per-channel delivery state machine.
//!
//! ```text
//! pending ─┬─> completed
//!          ├─> retry ──┬─> completed
//!          │           ├─> retry
//!          │           └─> failed
//!          └─> failed
//! completed / failed / disabled are terminal
//! ```

use herald_common::types::{Channel, ChannelKey, ChannelStatus};

use crate::backoff::{is_exhausted, retry_delay};
use crate::transport::{DeliveryResult, OutboundMessage, Transport};

/// What happened to one channel during one processing pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStep {
    /// Channel is switched off; forced to `disabled`.
    Disabled,
    /// Already `completed`/`failed`; nothing to do.
    Settled,
    /// Not due yet; carries the channel's own `next_attempt_at`.
    Waiting(i64),
    Delivered,
    Retrying {
        attempts: u32,
        next_attempt_at: i64,
        error: String,
    },
    Exhausted {
        attempts: u32,
        error: String,
    },
}

impl ChannelStep {
    /// Whether the transport was invoked for this step.
    pub fn attempted(&self) -> bool {
        matches!(
            self,
            ChannelStep::Delivered | ChannelStep::Retrying { .. } | ChannelStep::Exhausted { .. }
        )
    }

    /// Timestamp this channel contributes to the entry's next attempt.
    pub fn next_attempt_at(&self) -> Option<i64> {
        match self {
            ChannelStep::Waiting(at) => Some(*at),
            ChannelStep::Retrying {
                next_attempt_at, ..
            } => Some(*next_attempt_at),
            _ => None,
        }
    }
}

/// Decide whether `channel` needs a transport call at `now`.
///
/// Returns `Some(step)` when the pass must not deliver (and applies the
/// `disabled` coercion), `None` when the channel is due.
pub fn precheck(channel: &mut Channel, now: i64) -> Option<ChannelStep> {
    if !channel.enabled {
        channel.status = ChannelStatus::Disabled;
        return Some(ChannelStep::Disabled);
    }
    if channel.status.is_settled() {
        return Some(ChannelStep::Settled);
    }
    if let Some(at) = channel.next_attempt_at
        && at > now
    {
        return Some(ChannelStep::Waiting(at));
    }
    None
}

/// Fold a transport result into the channel's bookkeeping.
pub fn apply_result(channel: &mut Channel, result: &DeliveryResult, now: i64) -> ChannelStep {
    if result.success {
        channel.status = ChannelStatus::Completed;
        channel.completed_at = Some(now);
        channel.last_error.clear();
        channel.next_attempt_at = None;
        return ChannelStep::Delivered;
    }

    let error = result.error_text();
    channel.attempts += 1;
    channel.last_error = error.clone();
    channel.last_error_at = Some(now);

    if is_exhausted(channel.attempts) {
        channel.status = ChannelStatus::Failed;
        channel.failed_at = Some(now);
        channel.next_attempt_at = None;
        ChannelStep::Exhausted {
            attempts: channel.attempts,
            error,
        }
    } else {
        let next_attempt_at = now + retry_delay(channel.attempts);
        channel.status = ChannelStatus::Retry;
        channel.next_attempt_at = Some(next_attempt_at);
        ChannelStep::Retrying {
            attempts: channel.attempts,
            next_attempt_at,
            error,
        }
    }
}

/// Run one state-machine transition for `channel`, calling the transport if due.
pub async fn advance(
    key: &ChannelKey,
    channel: &mut Channel,
    message: &OutboundMessage<'_>,
    transport: &dyn Transport,
    now: i64,
) -> ChannelStep {
    if let Some(step) = precheck(channel, now) {
        return step;
    }
    let result = transport.send(key, &channel.addressing, message).await;
    apply_result(channel, &result, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::MAX_ATTEMPTS;

    const NOW: i64 = 10_000;

    #[test]
    fn test_disabled_channel_is_forced_disabled() {
        let mut channel = Channel::new();
        channel.enabled = false;
        assert_eq!(precheck(&mut channel, NOW), Some(ChannelStep::Disabled));
        assert_eq!(channel.status, ChannelStatus::Disabled);
    }

    #[test]
    fn test_settled_channels_are_skipped() {
        for status in [ChannelStatus::Completed, ChannelStatus::Failed] {
            let mut channel = Channel::new();
            channel.status = status;
            assert_eq!(precheck(&mut channel, NOW), Some(ChannelStep::Settled));
            assert_eq!(channel.status, status);
        }
    }

    #[test]
    fn test_future_attempt_waits() {
        let mut channel = Channel::new();
        channel.status = ChannelStatus::Retry;
        channel.next_attempt_at = Some(NOW + 30);
        assert_eq!(precheck(&mut channel, NOW), Some(ChannelStep::Waiting(NOW + 30)));

        channel.next_attempt_at = Some(NOW);
        assert_eq!(precheck(&mut channel, NOW), None);
    }

    #[test]
    fn test_success_completes() {
        let mut channel = Channel::new();
        channel.last_error = "previous".to_string();
        let step = apply_result(&mut channel, &DeliveryResult::ok(), NOW);
        assert_eq!(step, ChannelStep::Delivered);
        assert_eq!(channel.status, ChannelStatus::Completed);
        assert_eq!(channel.completed_at, Some(NOW));
        assert!(channel.last_error.is_empty());
    }

    #[test]
    fn test_failure_schedules_backoff() {
        let mut channel = Channel::new();
        let step = apply_result(&mut channel, &DeliveryResult::failed("timeout"), NOW);
        assert_eq!(
            step,
            ChannelStep::Retrying {
                attempts: 1,
                next_attempt_at: NOW + 60,
                error: "timeout".to_string(),
            }
        );
        assert_eq!(channel.status, ChannelStatus::Retry);
        assert_eq!(channel.last_error_at, Some(NOW));

        apply_result(&mut channel, &DeliveryResult::failed(""), NOW + 60);
        assert_eq!(channel.attempts, 2);
        assert_eq!(channel.next_attempt_at, Some(NOW + 60 + 120));
        assert_eq!(channel.last_error, "unknown error");
    }

    #[test]
    fn test_fifth_failure_is_terminal() {
        let mut channel = Channel::new();
        let mut now = NOW;
        for _ in 0..MAX_ATTEMPTS - 1 {
            apply_result(&mut channel, &DeliveryResult::failed("down"), now);
            now = channel.next_attempt_at.unwrap();
        }
        let step = apply_result(&mut channel, &DeliveryResult::failed("down"), now);
        assert_eq!(
            step,
            ChannelStep::Exhausted {
                attempts: MAX_ATTEMPTS,
                error: "down".to_string(),
            }
        );
        assert_eq!(channel.status, ChannelStatus::Failed);
        assert_eq!(channel.failed_at, Some(now));
        assert_eq!(channel.next_attempt_at, None);
        assert_eq!(precheck(&mut channel, now + 10_000), Some(ChannelStep::Settled));
    }
}
