//! Outbound HTTP webhook delivery.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::core::{Channel, ChannelDeliveryError, DeliveryStrategy, NotificationPayload};

/// Header carrying the notification type.
pub const NOTIFICATION_TYPE_HEADER: &str = "X-Notification-Type";
/// Header carrying the notification priority.
pub const NOTIFICATION_PRIORITY_HEADER: &str = "X-Notification-Priority";

/// POSTs the payload as JSON to the channel's endpoint.
#[derive(Debug, Clone)]
pub struct WebhookStrategy {
    client: Client,
}

impl WebhookStrategy {
    /// Build a strategy whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Use an existing client.
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeliveryStrategy for WebhookStrategy {
    async fn deliver(
        &self,
        channel: &Channel,
        payload: &NotificationPayload,
    ) -> Result<(), ChannelDeliveryError> {
        let endpoint = channel
            .endpoint
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ChannelDeliveryError::MissingEndpoint(channel.id.clone()))?;

        let response = self
            .client
            .post(endpoint)
            .header(NOTIFICATION_TYPE_HEADER, payload.kind.as_str())
            .header(NOTIFICATION_PRIORITY_HEADER, payload.priority.as_str())
            .json(payload)
            .send()
            .await
            .map_err(|e| ChannelDeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(channel = %channel.id, %endpoint, status = status.as_u16(), "webhook delivered");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ChannelDeliveryError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
