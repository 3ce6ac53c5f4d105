//! Notification payloads, channel definitions, and the channel registry.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Fixed set of notification kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    /// A peer proposed a new session.
    SessionProposal,
    /// A request arrived on an established session.
    SessionRequest,
    /// Session metadata or namespaces changed.
    SessionUpdate,
    /// A session was deleted by a peer.
    SessionDelete,
    /// A session expired.
    SessionExpire,
    /// A background job completed.
    JobCompleted,
    /// A background job failed permanently.
    JobFailed,
    /// Operator-facing system alert.
    SystemAlert,
}

impl NotificationType {
    /// Wire name, as used in the `X-Notification-Type` header.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SessionProposal => "session_proposal",
            Self::SessionRequest => "session_request",
            Self::SessionUpdate => "session_update",
            Self::SessionDelete => "session_delete",
            Self::SessionExpire => "session_expire",
            Self::JobCompleted => "job_completed",
            Self::JobFailed => "job_failed",
            Self::SystemAlert => "system_alert",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification urgency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    /// Informational.
    Low,
    /// Default urgency.
    #[default]
    Normal,
    /// Needs attention.
    High,
}

impl NotificationPriority {
    /// Wire name, as used in the `X-Notification-Priority` header.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

impl fmt::Display for NotificationPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification travelling through the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// Notification kind; drives channel filters.
    #[serde(rename = "type")]
    pub kind: NotificationType,
    /// Subject of the notification (session topic, job id, ...).
    pub topic: String,
    /// Free-form body.
    #[serde(default)]
    pub data: serde_json::Value,
    /// Milliseconds since epoch. `0` means unset and is stamped at enqueue.
    #[serde(default)]
    pub timestamp: u128,
    /// Urgency.
    #[serde(default)]
    pub priority: NotificationPriority,
}

impl NotificationPayload {
    /// Create a payload with normal priority, no data, and an unset timestamp.
    pub fn new(kind: NotificationType, topic: impl Into<String>) -> Self {
        Self {
            kind,
            topic: topic.into(),
            data: serde_json::Value::Null,
            timestamp: 0,
            priority: NotificationPriority::Normal,
        }
    }

    /// Attach a data body.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Set the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set an explicit timestamp.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: u128) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Fill the timestamp if unset.
    pub(crate) fn stamp(&mut self, now_ms: u128) {
        if self.timestamp == 0 {
            self.timestamp = now_ms;
        }
    }
}

/// Delivery mechanism of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Local real-time fan-out to connected websocket clients.
    Websocket,
    /// Outbound HTTP POST.
    Webhook,
    /// Mobile push.
    Push,
    /// Email.
    Email,
}

impl ChannelKind {
    /// Lowercase name for logs and summaries.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Websocket => "websocket",
            Self::Webhook => "webhook",
            Self::Push => "push",
            Self::Email => "email",
        }
    }
}

/// A configured delivery target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Unique identifier.
    pub id: String,
    /// Delivery mechanism.
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    /// Target address (URL for webhooks).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Disabled channels receive nothing.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// When present, only these notification types are delivered.
    #[serde(default)]
    pub filters: Option<HashSet<NotificationType>>,
}

fn default_enabled() -> bool {
    true
}

impl Channel {
    /// An enabled, unfiltered channel without endpoint.
    pub fn new(id: impl Into<String>, kind: ChannelKind) -> Self {
        Self {
            id: id.into(),
            kind,
            endpoint: None,
            enabled: true,
            filters: None,
        }
    }

    /// Set the endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Restrict delivery to the given notification types.
    #[must_use]
    pub fn with_filters(mut self, filters: impl IntoIterator<Item = NotificationType>) -> Self {
        self.filters = Some(filters.into_iter().collect());
        self
    }

    /// Set the enabled flag.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Whether this channel's filters accept the notification type.
    pub fn accepts(&self, kind: NotificationType) -> bool {
        self.filters.as_ref().is_none_or(|f| f.contains(&kind))
    }

    /// Whether a notification of this type should be delivered here.
    pub fn matches(&self, kind: NotificationType) -> bool {
        self.enabled && self.accepts(kind)
    }
}

/// Per-channel delivery summary reported in dispatcher stats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSummary {
    /// Channel identifier.
    pub id: String,
    /// Delivery mechanism.
    pub kind: ChannelKind,
    /// Enabled flag.
    pub enabled: bool,
    /// Successful deliveries since registration.
    pub delivered: u64,
    /// Failed deliveries since registration.
    pub failed: u64,
}

#[derive(Debug)]
struct ChannelEntry {
    channel: Channel,
    delivered: u64,
    failed: u64,
}

/// Mapping of channel id to channel configuration.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: HashMap<String, ChannelEntry>,
}

impl ChannelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a channel. Replacing resets its delivery counters.
    /// Returns the previous definition, if any.
    pub fn insert(&mut self, channel: Channel) -> Option<Channel> {
        self.channels
            .insert(
                channel.id.clone(),
                ChannelEntry {
                    channel,
                    delivered: 0,
                    failed: 0,
                },
            )
            .map(|entry| entry.channel)
    }

    /// Remove a channel by id.
    pub fn remove(&mut self, id: &str) -> Option<Channel> {
        self.channels.remove(id).map(|entry| entry.channel)
    }

    /// Look up a channel by id.
    pub fn get(&self, id: &str) -> Option<&Channel> {
        self.channels.get(id).map(|entry| &entry.channel)
    }

    /// Toggle a channel. Returns `false` if the id is unknown.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> bool {
        self.channels.get_mut(id).is_some_and(|entry| {
            entry.channel.enabled = enabled;
            true
        })
    }

    /// Snapshot of every channel that should receive a notification of `kind`.
    pub fn matching(&self, kind: NotificationType) -> Vec<Channel> {
        let mut matched: Vec<Channel> = self
            .channels
            .values()
            .filter(|entry| entry.channel.matches(kind))
            .map(|entry| entry.channel.clone())
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        matched
    }

    /// Count one delivery outcome against a channel. Unknown ids are ignored.
    pub fn record_outcome(&mut self, id: &str, success: bool) {
        if let Some(entry) = self.channels.get_mut(id) {
            if success {
                entry.delivered += 1;
            } else {
                entry.failed += 1;
            }
        }
    }

    /// Summaries sorted by channel id.
    pub fn summaries(&self) -> Vec<ChannelSummary> {
        let mut result: Vec<ChannelSummary> = self
            .channels
            .values()
            .map(|entry| ChannelSummary {
                id: entry.channel.id.clone(),
                kind: entry.channel.kind,
                enabled: entry.channel.enabled,
                delivered: entry.delivered,
                failed: entry.failed,
            })
            .collect();
        result.sort_by(|a, b| a.id.cmp(&b.id));
        result
    }

    /// Number of registered channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether no channel is registered.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unfiltered_channel_matches_everything() {
        let channel = Channel::new("ws", ChannelKind::Websocket);
        assert!(channel.matches(NotificationType::SessionRequest));
        assert!(channel.matches(NotificationType::SystemAlert));
    }

    #[test]
    fn test_filtered_channel() {
        let channel = Channel::new("audit", ChannelKind::Webhook)
            .with_filters([NotificationType::SessionDelete]);
        assert!(channel.matches(NotificationType::SessionDelete));
        assert!(!channel.matches(NotificationType::SessionRequest));
    }

    #[test]
    fn test_disabled_channel_matches_nothing() {
        let channel = Channel::new("off", ChannelKind::Push).enabled(false);
        assert!(channel.accepts(NotificationType::SessionRequest));
        assert!(!channel.matches(NotificationType::SessionRequest));
    }

    #[test]
    fn test_registry_last_write_wins() {
        let mut registry = ChannelRegistry::new();
        registry.insert(Channel::new("a", ChannelKind::Push));
        registry.record_outcome("a", true);
        let previous = registry.insert(Channel::new("a", ChannelKind::Email));

        assert_eq!(previous.map(|c| c.kind), Some(ChannelKind::Push));
        assert_eq!(registry.len(), 1);
        let summary = &registry.summaries()[0];
        assert_eq!(summary.kind, ChannelKind::Email);
        assert_eq!(summary.delivered, 0);
    }

    #[test]
    fn test_registry_matching_and_toggle() {
        let mut registry = ChannelRegistry::new();
        registry.insert(Channel::new("b", ChannelKind::Websocket));
        registry.insert(
            Channel::new("a", ChannelKind::Webhook).with_filters([NotificationType::JobFailed]),
        );

        let ids: Vec<String> = registry
            .matching(NotificationType::JobFailed)
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);

        assert!(registry.set_enabled("b", false));
        assert!(!registry.set_enabled("missing", false));
        assert!(registry.matching(NotificationType::SessionUpdate).is_empty());
    }

    #[test]
    fn test_payload_defaults_from_json() {
        let payload: NotificationPayload =
            serde_json::from_str(r#"{"type":"session_request","topic":"t1"}"#).unwrap();
        assert_eq!(payload.kind, NotificationType::SessionRequest);
        assert_eq!(payload.priority, NotificationPriority::Normal);
        assert_eq!(payload.timestamp, 0);

        let mut stamped = payload.clone();
        stamped.stamp(42);
        assert_eq!(stamped.timestamp, 42);
        let mut explicit = payload.with_timestamp(7);
        explicit.stamp(42);
        assert_eq!(explicit.timestamp, 7);
    }
}
