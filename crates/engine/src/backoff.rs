//! Retry and reminder backoff policies.
//!
//! Channel retries: `min(60 * 2^(attempts-1), 900)` seconds, so
//! 60, 120, 240, 480, 900. The fifth failure is terminal before the
//! capped delay is ever used.
//!
//! Reminders: `min(max_interval, max(base_interval, round(base * multiplier^attempts)))`,
//! never below 60 seconds.

use herald_common::types::Reminders;

/// Failed attempts after which a channel is permanently `failed`.
pub const MAX_ATTEMPTS: u32 = 5;

/// First retry delay in seconds.
pub const RETRY_BASE_SECS: i64 = 60;

/// Upper bound on a single retry delay.
pub const RETRY_CAP_SECS: i64 = 900;

/// Default reminder backoff multiplier.
pub const REMINDER_MULTIPLIER: f64 = 2.0;

/// Default ceiling for the gap between two reminders (24h).
pub const REMINDER_MAX_INTERVAL_SECS: i64 = 86_400;

/// No reminder is ever scheduled sooner than this.
pub const REMINDER_FLOOR_SECS: i64 = 60;

/// Delay before the next attempt of a channel that has failed `attempts` times.
pub fn retry_delay(attempts: u32) -> i64 {
    if attempts == 0 {
        return RETRY_BASE_SECS;
    }
    // 2^4 * 60 already exceeds the cap; clamp the exponent to avoid overflow.
    let exponent = (attempts - 1).min(10);
    (RETRY_BASE_SECS * (1i64 << exponent)).min(RETRY_CAP_SECS)
}

/// Whether a channel with this many failures must stop retrying.
pub fn is_exhausted(attempts: u32) -> bool {
    attempts >= MAX_ATTEMPTS
}

/// Delay until the next reminder, given reminder state with `attempts`
/// already incremented for the reminder being fired.
pub fn reminder_delay(reminders: &Reminders) -> i64 {
    let base = reminders.base_interval.max(1);
    let exponent = i32::try_from(reminders.attempts).unwrap_or(i32::MAX);
    let grown = (base as f64 * reminders.backoff_multiplier.powi(exponent)).round();
    let grown = if grown.is_finite() && grown < i64::MAX as f64 {
        grown as i64
    } else {
        i64::MAX
    };

    grown
        .max(base)
        .min(reminders.max_interval)
        .max(REMINDER_FLOOR_SECS)
}
