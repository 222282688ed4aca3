//! Delivery transports for the Herald queue.
//!
//! `ChannelRouter` implements the engine's `Transport` seam and hands each
//! channel to its sender:
//! - Slack / Discord / Teams incoming webhooks
//! - Email via the Resend HTTP API
//! - `internal`, which always succeeds

pub mod email;
pub mod render;
pub mod router;
pub mod webhook;

pub use router::{ChannelRouter, ChannelSender};
