//! Email delivery through the Resend HTTP API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use herald_common::types::Fields;
use herald_engine::transport::{DeliveryResult, OutboundMessage};

use crate::render::{body_text, headline};
use crate::router::ChannelSender;

pub const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

/// Addressing field holding the recipient list.
pub const RECIPIENTS_FIELD: &str = "recipients";

#[derive(Debug, Serialize, PartialEq)]
struct ResendRequest<'a> {
    from: &'a str,
    to: Vec<String>,
    subject: String,
    text: String,
}

pub struct ResendEmailSender {
    client: Client,
    api_key: String,
    from: String,
    endpoint: String,
}

impl ResendEmailSender {
    pub fn new(client: Client, api_key: String, from: String) -> Self {
        Self {
            client,
            api_key,
            from,
            endpoint: RESEND_ENDPOINT.to_string(),
        }
    }

    /// Point at a different API base, e.g. a local test server.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Recipients from addressing: a string list or a single string.
pub fn recipients(addressing: &Fields) -> Vec<String> {
    match addressing.get(RECIPIENTS_FIELD) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(single)) if !single.trim().is_empty() => {
            vec![single.trim().to_string()]
        }
        _ => Vec::new(),
    }
}

#[async_trait]
impl ChannelSender for ResendEmailSender {
    async fn send(&self, addressing: &Fields, message: &OutboundMessage<'_>) -> DeliveryResult {
        let to = recipients(addressing);
        if to.is_empty() {
            return DeliveryResult::failed("no email recipients");
        }

        let request = ResendRequest {
            from: &self.from,
            to,
            subject: headline(message),
            text: body_text(message),
        };

        let response = match self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Resend request failed");
                return DeliveryResult::failed(e.to_string());
            }
        };

        let status = response.status();
        if status.is_success() {
            tracing::debug!(recipients = request.to.len(), "Email accepted by Resend");
            DeliveryResult::ok()
        } else {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "Resend rejected email");
            DeliveryResult::failed(format!("HTTP {}", status.as_u16()))
        }
    }
}
