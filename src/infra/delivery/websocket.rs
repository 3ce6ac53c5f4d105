//! Local real-time fan-out over a tokio broadcast channel.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use crate::core::{Channel, ChannelDeliveryError, DeliveryStrategy, NotificationPayload};

/// Publishes notifications to every connected websocket client.
///
/// Having no receivers is not an error.
#[derive(Debug, Clone)]
pub struct WebsocketStrategy {
    sender: broadcast::Sender<NotificationPayload>,
}

impl WebsocketStrategy {
    /// Publish on the given broadcast feed.
    pub const fn new(sender: broadcast::Sender<NotificationPayload>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl DeliveryStrategy for WebsocketStrategy {
    async fn deliver(
        &self,
        channel: &Channel,
        payload: &NotificationPayload,
    ) -> Result<(), ChannelDeliveryError> {
        let receivers = self.sender.send(payload.clone()).unwrap_or(0);
        debug!(
            channel = %channel.id,
            notification = %payload.kind,
            receivers,
            "broadcast notification"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ChannelKind, NotificationType};

    #[tokio::test]
    async fn test_broadcast_without_receivers_succeeds() {
        let (tx, _) = broadcast::channel(4);
        let strategy = WebsocketStrategy::new(tx);
        let channel = Channel::new("ws", ChannelKind::Websocket);
        let payload = NotificationPayload::new(NotificationType::SessionUpdate, "t");
        assert!(strategy.deliver(&channel, &payload).await.is_ok());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_receiver() {
        let (tx, mut rx) = broadcast::channel(4);
        let strategy = WebsocketStrategy::new(tx);
        let channel = Channel::new("ws", ChannelKind::Websocket);
        let payload = NotificationPayload::new(NotificationType::SessionRequest, "topic-1");
        strategy.deliver(&channel, &payload).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().topic, "topic-1");
    }
}
