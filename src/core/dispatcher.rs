//! Sequential notification queue with concurrent, settle-all channel fan-out.
//!
//! Notifications are delivered strictly in FIFO order, one at a time. Each one
//! fans out to every enabled channel whose filters accept it; channel failures
//! are logged and counted against the channel but never stop the others or
//! reach the sender.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use crate::config::DispatcherConfig;
use crate::core::{
    Channel, ChannelDeliveryError, ChannelKind, ChannelRegistry, ChannelSummary, DispatchError,
    EventBus, NotificationPayload, NotificationType, Spawn, Subscription, SubscriptionId,
};
use crate::infra::delivery::{LogOnlyStrategy, WebhookStrategy, WebsocketStrategy};
use crate::runtime::TokioSpawner;
use crate::util::clock::now_ms;
use crate::util::panic::panic_message;

/// Delivery backend for one channel kind.
#[async_trait]
pub trait DeliveryStrategy: Send + Sync + 'static {
    /// Deliver a notification to one channel.
    async fn deliver(
        &self,
        channel: &Channel,
        payload: &NotificationPayload,
    ) -> Result<(), ChannelDeliveryError>;
}

/// Result of sending one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum DeliveryOutcome {
    /// Every matching channel was attempted. Individual channels may have failed.
    Delivered {
        /// Number of channels attempted.
        attempted: usize,
    },
    /// Removed by `clear_queue` before delivery.
    Discarded,
}

/// Resolves once a queued notification has been delivered or discarded.
#[derive(Debug)]
pub struct DeliveryReceipt {
    rx: oneshot::Receiver<usize>,
}

impl Future for DeliveryReceipt {
    type Output = DeliveryOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|result| {
            result.map_or(DeliveryOutcome::Discarded, |attempted| {
                DeliveryOutcome::Delivered { attempted }
            })
        })
    }
}

/// Snapshot returned by [`NotificationDispatcher::get_stats`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherStats {
    /// Notifications waiting for delivery.
    pub queue_depth: usize,
    /// Whether a drain is in progress.
    pub draining: bool,
    /// Per-channel summaries sorted by id.
    pub channels: Vec<ChannelSummary>,
    /// Notifications accepted since creation.
    pub enqueued: u64,
    /// Successful channel deliveries since creation.
    pub delivered: u64,
    /// Failed channel deliveries since creation.
    pub failed: u64,
}

#[derive(Debug, Default)]
struct DispatcherCounters {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

/// Ownership of the single-flight drain flag. Released on drop, so a drain
/// task that panics or is cancelled never leaves the flag set.
struct DrainGuard<'a> {
    draining: &'a AtomicBool,
    held: bool,
}

impl DrainGuard<'_> {
    fn release(&mut self) {
        self.draining.store(false, Ordering::Release);
        self.held = false;
    }

    /// Take the flag back. Fails if another drain already owns it.
    fn reacquire(&mut self) -> bool {
        self.held = self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        self.held
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if self.held {
            self.draining.store(false, Ordering::Release);
        }
    }
}

struct QueuedNotification {
    payload: NotificationPayload,
    done: oneshot::Sender<usize>,
}

struct DispatcherInner<S> {
    channels: RwLock<ChannelRegistry>,
    queue: Mutex<VecDeque<QueuedNotification>>,
    draining: AtomicBool,
    strategies: RwLock<HashMap<ChannelKind, Arc<dyn DeliveryStrategy>>>,
    subscribers: EventBus<NotificationPayload>,
    websocket: broadcast::Sender<NotificationPayload>,
    counters: DispatcherCounters,
    spawner: S,
}

/// FIFO notification dispatcher.
///
/// Cloning yields another handle to the same dispatcher.
pub struct NotificationDispatcher<S = TokioSpawner> {
    inner: Arc<DispatcherInner<S>>,
}

impl<S> Clone for NotificationDispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> NotificationDispatcher<S>
where
    S: Spawn + Send + Sync + 'static,
{
    /// Create a dispatcher with the default strategy for every channel kind.
    pub fn new(config: DispatcherConfig, spawner: S) -> Result<Self, DispatchError> {
        config.validate().map_err(DispatchError::InvalidConfig)?;
        let webhook = WebhookStrategy::new(Duration::from_secs(config.webhook_timeout_secs))
            .map_err(|e| DispatchError::InvalidConfig(format!("webhook client: {e}")))?;
        let (websocket, _) = broadcast::channel(config.websocket_buffer);

        let mut strategies: HashMap<ChannelKind, Arc<dyn DeliveryStrategy>> = HashMap::new();
        strategies.insert(
            ChannelKind::Websocket,
            Arc::new(WebsocketStrategy::new(websocket.clone())),
        );
        strategies.insert(ChannelKind::Webhook, Arc::new(webhook));
        strategies.insert(ChannelKind::Push, Arc::new(LogOnlyStrategy));
        strategies.insert(ChannelKind::Email, Arc::new(LogOnlyStrategy));

        Ok(Self {
            inner: Arc::new(DispatcherInner {
                channels: RwLock::new(ChannelRegistry::new()),
                queue: Mutex::new(VecDeque::new()),
                draining: AtomicBool::new(false),
                strategies: RwLock::new(strategies),
                subscribers: EventBus::new(),
                websocket,
                counters: DispatcherCounters::default(),
                spawner,
            }),
        })
    }

    /// Replace the delivery strategy for a channel kind.
    #[must_use]
    pub fn with_strategy<D>(self, kind: ChannelKind, strategy: D) -> Self
    where
        D: DeliveryStrategy,
    {
        self.inner.strategies.write().insert(kind, Arc::new(strategy));
        self
    }

    /// Register a channel, replacing any channel with the same id.
    pub fn add_channel(&self, channel: Channel) -> Result<(), DispatchError> {
        if channel.id.trim().is_empty() {
            return Err(DispatchError::InvalidChannel("channel id must not be empty".into()));
        }
        info!(
            channel = %channel.id,
            kind = channel.kind.as_str(),
            enabled = channel.enabled,
            "adding notification channel"
        );
        if let Some(previous) = self.inner.channels.write().insert(channel) {
            debug!(channel = %previous.id, "replaced existing channel");
        }
        Ok(())
    }

    /// Remove a channel. Returns `true` if it existed.
    pub fn remove_channel(&self, id: &str) -> bool {
        let removed = self.inner.channels.write().remove(id).is_some();
        if removed {
            info!(channel = %id, "removed notification channel");
        }
        removed
    }

    /// Enable or disable a channel. Returns `false` if the id is unknown.
    pub fn set_channel_enabled(&self, id: &str, enabled: bool) -> bool {
        self.inner.channels.write().set_enabled(id, enabled)
    }

    /// Current definition of a channel.
    pub fn channel(&self, id: &str) -> Option<Channel> {
        self.inner.channels.read().get(id).cloned()
    }

    /// Queue a notification and wait until every matching channel was attempted.
    pub async fn send_notification(
        &self,
        payload: NotificationPayload,
    ) -> Result<DeliveryOutcome, DispatchError> {
        Ok(self.enqueue(payload)?.await)
    }

    /// Queue a notification and return a receipt for its delivery.
    ///
    /// Subscribers are notified before this returns.
    pub fn enqueue(&self, mut payload: NotificationPayload) -> Result<DeliveryReceipt, DispatchError> {
        if payload.topic.trim().is_empty() {
            return Err(DispatchError::InvalidPayload("topic must not be empty".into()));
        }
        payload.stamp(now_ms());

        let (done, rx) = oneshot::channel();
        let depth = {
            let mut queue = self.inner.queue.lock();
            queue.push_back(QueuedNotification {
                payload: payload.clone(),
                done,
            });
            queue.len()
        };
        self.inner.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        debug!(
            notification = %payload.kind,
            topic = %payload.topic,
            priority = %payload.priority,
            depth,
            "notification queued"
        );

        self.inner.subscribers.emit(&payload);
        self.ensure_draining();
        Ok(DeliveryReceipt { rx })
    }

    /// Observe every enqueued notification of the given types.
    pub fn subscribe<I, F>(&self, types: I, callback: F) -> Subscription<NotificationPayload>
    where
        I: IntoIterator<Item = NotificationType>,
        F: Fn(&NotificationPayload) + Send + Sync + 'static,
    {
        let id = self.inner.subscribers.subscribe(types, callback);
        self.inner.subscribers.subscription(id)
    }

    /// Observe every enqueued notification.
    pub fn subscribe_all<F>(&self, callback: F) -> Subscription<NotificationPayload>
    where
        F: Fn(&NotificationPayload) + Send + Sync + 'static,
    {
        let id = self.inner.subscribers.subscribe_all(callback);
        self.inner.subscribers.subscription(id)
    }

    /// Remove a subscriber by id. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.subscribers.unsubscribe(id)
    }

    /// Receiver for notifications delivered to websocket channels.
    pub fn subscribe_websocket(&self) -> broadcast::Receiver<NotificationPayload> {
        self.inner.websocket.subscribe()
    }

    /// Queue depth, drain flag, channel summaries, and lifetime totals.
    pub fn get_stats(&self) -> DispatcherStats {
        let counters = &self.inner.counters;
        DispatcherStats {
            queue_depth: self.inner.queue.lock().len(),
            draining: self.inner.draining.load(Ordering::Acquire),
            channels: self.inner.channels.read().summaries(),
            enqueued: counters.enqueued.load(Ordering::Relaxed),
            delivered: counters.delivered.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Discard every undelivered notification. Their receipts resolve as
    /// [`DeliveryOutcome::Discarded`]. Returns how many were removed.
    pub fn clear_queue(&self) -> usize {
        let removed: Vec<QueuedNotification> = self.inner.queue.lock().drain(..).collect();
        let count = removed.len();
        drop(removed);
        info!(removed = count, "cleared notification queue");
        count
    }

    fn ensure_draining(&self) {
        if self
            .inner
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let dispatcher = self.clone();
            self.inner.spawner.spawn(async move { dispatcher.drain().await });
        }
    }

    fn pop(&self) -> Option<QueuedNotification> {
        self.inner.queue.lock().pop_front()
    }

    async fn drain(self) {
        let mut guard = DrainGuard {
            draining: &self.inner.draining,
            held: true,
        };
        loop {
            while let Some(item) = self.pop() {
                let attempted = self.deliver(&item.payload).await;
                // The sender may have stopped waiting; delivery still happened.
                let _ = item.done.send(attempted);
            }

            guard.release();
            let empty = self.inner.queue.lock().is_empty();
            // Enqueued after the last pop; resume unless another drain already did.
            if empty || !guard.reacquire() {
                break;
            }
        }
    }

    /// Fan a notification out to every matching channel. Returns how many were attempted.
    async fn deliver(&self, payload: &NotificationPayload) -> usize {
        let channels = self.inner.channels.read().matching(payload.kind);
        if channels.is_empty() {
            debug!(notification = %payload.kind, topic = %payload.topic, "no matching channels");
            return 0;
        }

        let attempts = channels.iter().map(|channel| {
            let strategy = self.inner.strategies.read().get(&channel.kind).cloned();
            async move {
                let result = match strategy {
                    Some(strategy) => AssertUnwindSafe(strategy.deliver(channel, payload))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| {
                            Err(ChannelDeliveryError::Panicked(panic_message(panic.as_ref())))
                        }),
                    None => Err(ChannelDeliveryError::Rejected(format!(
                        "no delivery strategy for {}",
                        channel.kind.as_str()
                    ))),
                };
                (channel, result)
            }
        });
        let results = join_all(attempts).await;

        {
            let mut registry = self.inner.channels.write();
            for (channel, result) in &results {
                registry.record_outcome(&channel.id, result.is_ok());
            }
        }

        for (channel, result) in &results {
            match result {
                Ok(()) => {
                    self.inner.counters.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    self.inner.counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        channel = %channel.id,
                        kind = channel.kind.as_str(),
                        notification = %payload.kind,
                        topic = %payload.topic,
                        error = %err,
                        "channel delivery failed"
                    );
                }
            }
        }
        results.len()
    }
}
