//! Reliable notification delivery queue.
//!
//! Entries are admitted into a persisted queue, each channel is driven
//! through a retry/backoff state machine by a lock-guarded processing pass,
//! unacknowledged entries are nagged on their own reminder schedule, and
//! operator acknowledgment/resolution is tracked per channel and per entry.

pub mod admission;
pub mod backoff;
pub mod channel;
pub mod clock;
pub mod collaborators;
pub mod history;
pub mod lock;
pub mod processor;
pub mod reminder;
pub mod resolution;
pub mod service;
pub mod snapshot;
pub mod store;
pub mod tick;
pub mod transport;
