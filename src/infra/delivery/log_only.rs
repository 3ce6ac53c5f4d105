//! Placeholder backend for push and email channels.

use async_trait::async_trait;
use tracing::info;

use crate::core::{Channel, ChannelDeliveryError, DeliveryStrategy, NotificationPayload};

/// Logs the notification and reports success.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOnlyStrategy;

#[async_trait]
impl DeliveryStrategy for LogOnlyStrategy {
    async fn deliver(
        &self,
        channel: &Channel,
        payload: &NotificationPayload,
    ) -> Result<(), ChannelDeliveryError> {
        info!(
            channel = %channel.id,
            kind = channel.kind.as_str(),
            endpoint = channel.endpoint.as_deref().unwrap_or_default(),
            notification = %payload.kind,
            topic = %payload.topic,
            priority = %payload.priority,
            "notification delivered (log only)"
        );
        Ok(())
    }
}
