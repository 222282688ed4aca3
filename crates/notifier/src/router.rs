//! Channel routing: picks the sender registered for a channel key.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use herald_common::config::AppConfig;
use herald_common::error::AppError;
use herald_common::types::{ChannelKey, Fields};
use herald_engine::transport::{DeliveryResult, OutboundMessage, Transport};

use crate::email::ResendEmailSender;
use crate::webhook::{WebhookPlatform, WebhookSender};

/// Failure text for channel keys outside the known set.
pub const UNKNOWN_CHANNEL: &str = "unknown channel";

/// Delivers over one concrete channel.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    async fn send(&self, addressing: &Fields, message: &OutboundMessage<'_>) -> DeliveryResult;
}

/// `Transport` that dispatches to per-channel senders.
///
/// `internal` always succeeds. Unknown keys and known keys without a
/// registered sender fail like any other delivery and go through retry.
#[derive(Default)]
pub struct ChannelRouter {
    senders: HashMap<ChannelKey, Arc<dyn ChannelSender>>,
}

impl ChannelRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sender(mut self, key: ChannelKey, sender: Arc<dyn ChannelSender>) -> Self {
        self.senders.insert(key, sender);
        self
    }

    /// Webhook senders for Slack, Discord and Teams, plus email when Resend
    /// credentials are configured.
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let mut router = Self::new();
        for (key, platform) in [
            (ChannelKey::Slack, WebhookPlatform::Slack),
            (ChannelKey::Discord, WebhookPlatform::Discord),
            (ChannelKey::Teams, WebhookPlatform::Teams),
        ] {
            router = router.with_sender(key, Arc::new(WebhookSender::new(client.clone(), platform)));
        }

        match (&config.resend_api_key, &config.email_from) {
            (Some(api_key), Some(from)) => {
                router = router.with_sender(
                    ChannelKey::Email,
                    Arc::new(ResendEmailSender::new(client, api_key.clone(), from.clone())),
                );
            }
            _ => tracing::warn!("RESEND_API_KEY or EMAIL_FROM not set, email channel disabled"),
        }

        Ok(router)
    }

    pub fn has_sender(&self, key: &ChannelKey) -> bool {
        self.senders.contains_key(key)
    }
}

#[async_trait]
impl Transport for ChannelRouter {
    async fn send(
        &self,
        channel: &ChannelKey,
        addressing: &Fields,
        message: &OutboundMessage<'_>,
    ) -> DeliveryResult {
        match channel {
            ChannelKey::Internal => {
                tracing::debug!(subject = message.subject, "Internal notification recorded");
                DeliveryResult::ok()
            }
            ChannelKey::Unknown(key) => {
                tracing::warn!(channel = %key, "No transport for unknown channel");
                DeliveryResult::failed(UNKNOWN_CHANNEL)
            }
            known => match self.senders.get(known) {
                Some(sender) => sender.send(addressing, message).await,
                None => DeliveryResult::failed(format!("{} channel not configured", known)),
            },
        }
    }
}
