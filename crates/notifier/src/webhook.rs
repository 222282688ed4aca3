//! Chat webhooks: Slack, Discord and Microsoft Teams.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use herald_common::types::Fields;
use herald_engine::transport::{DeliveryResult, OutboundMessage};

use crate::render::{body_text, headline, message_text};
use crate::router::ChannelSender;

/// Addressing field holding the incoming-webhook URL.
pub const WEBHOOK_URL_FIELD: &str = "webhook_url";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookPlatform {
    Slack,
    Discord,
    Teams,
}

impl WebhookPlatform {
    /// JSON body in the shape each platform's incoming webhook expects.
    pub fn payload(self, message: &OutboundMessage<'_>) -> Value {
        match self {
            WebhookPlatform::Slack => json!({ "text": message_text(message) }),
            WebhookPlatform::Discord => json!({ "content": message_text(message) }),
            WebhookPlatform::Teams => json!({
                "title": headline(message),
                "text": body_text(message),
            }),
        }
    }
}

impl std::fmt::Display for WebhookPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebhookPlatform::Slack => write!(f, "slack"),
            WebhookPlatform::Discord => write!(f, "discord"),
            WebhookPlatform::Teams => write!(f, "teams"),
        }
    }
}

pub struct WebhookSender {
    client: Client,
    platform: WebhookPlatform,
}

impl WebhookSender {
    pub fn new(client: Client, platform: WebhookPlatform) -> Self {
        Self { client, platform }
    }
}

#[async_trait]
impl ChannelSender for WebhookSender {
    async fn send(&self, addressing: &Fields, message: &OutboundMessage<'_>) -> DeliveryResult {
        let Some(url) = addressing
            .get(WEBHOOK_URL_FIELD)
            .and_then(Value::as_str)
            .filter(|url| !url.trim().is_empty())
        else {
            return DeliveryResult::failed("missing webhook_url");
        };

        let response = match self
            .client
            .post(url)
            .json(&self.platform.payload(message))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(platform = %self.platform, error = %e, "Webhook request failed");
                return DeliveryResult::failed(e.to_string());
            }
        };

        let status = response.status();
        if status.is_success() {
            tracing::debug!(platform = %self.platform, "Webhook delivered");
            DeliveryResult::ok()
        } else {
            tracing::warn!(platform = %self.platform, status = %status, "Webhook rejected");
            DeliveryResult::failed(format!("HTTP {}", status.as_u16()))
        }
    }
}
