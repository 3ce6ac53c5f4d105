//! Typed publish/subscribe for lifecycle and notification events.
//!
//! Listeners register for a set of event kinds and are invoked synchronously,
//! in registration order, on the thread that emits. The listener list is
//! snapshotted before dispatch, so a listener may subscribe, unsubscribe, or
//! call back into the emitting component. A panicking listener is logged and
//! skipped; the remaining listeners and the emitter carry on.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::{Job, NotificationPayload, NotificationType};
use crate::util::panic::panic_message;

/// An event that can be routed by kind.
pub trait BusEvent: Send + Sync + 'static {
    /// Discriminant used for subscription filters.
    type Kind: Copy + Eq + Send + Sync + 'static;

    /// Kind of this event.
    fn kind(&self) -> Self::Kind;
}

/// Identifier returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Listener<E: BusEvent> {
    id: SubscriptionId,
    /// `None` listens to every kind.
    kinds: Option<Vec<E::Kind>>,
    callback: Callback<E>,
}

impl<E: BusEvent> Listener<E> {
    fn wants(&self, kind: E::Kind) -> bool {
        self.kinds.as_ref().is_none_or(|k| k.contains(&kind))
    }
}

struct BusInner<E: BusEvent> {
    listeners: RwLock<Vec<Listener<E>>>,
    next_id: AtomicU64,
}

/// Registry of typed listener lists.
///
/// Cloning yields another handle to the same registry.
pub struct EventBus<E: BusEvent> {
    inner: Arc<BusInner<E>>,
}

impl<E: BusEvent> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: BusEvent> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl<E: BusEvent> EventBus<E> {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                listeners: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    fn register(&self, kinds: Option<Vec<E::Kind>>, callback: Callback<E>) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.write().push(Listener {
            id,
            kinds,
            callback,
        });
        id
    }

    /// Listen to the given event kinds.
    pub fn subscribe<I, F>(&self, kinds: I, callback: F) -> SubscriptionId
    where
        I: IntoIterator<Item = E::Kind>,
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(Some(kinds.into_iter().collect()), Arc::new(callback))
    }

    /// Listen to every event.
    pub fn subscribe_all<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(None, Arc::new(callback))
    }

    /// Remove a listener. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.inner.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        listeners.len() < before
    }

    /// Invoke every interested listener with the event. Returns how many ran.
    pub fn emit(&self, event: &E) -> usize {
        let kind = event.kind();
        let targets: Vec<(SubscriptionId, Callback<E>)> = self
            .inner
            .listeners
            .read()
            .iter()
            .filter(|l| l.wants(kind))
            .map(|l| (l.id, Arc::clone(&l.callback)))
            .collect();
        for (id, callback) in &targets {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(event))) {
                warn!(
                    subscription = id.0,
                    error = %panic_message(panic.as_ref()),
                    "event listener panicked"
                );
            }
        }
        targets.len()
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }

    /// Handle that removes `id` from this bus when `unsubscribe` is called.
    pub fn subscription(&self, id: SubscriptionId) -> Subscription<E> {
        Subscription {
            bus: Arc::downgrade(&self.inner),
            id,
        }
    }
}

/// Unsubscribe handle returned by component-level `subscribe` calls.
///
/// Dropping the handle keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription<E: BusEvent> {
    bus: Weak<BusInner<E>>,
    id: SubscriptionId,
}

impl<E: BusEvent> Subscription<E> {
    /// Identifier of the listener.
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the listener. Returns `false` if it was already gone or the bus was dropped.
    pub fn unsubscribe(self) -> bool {
        self.bus.upgrade().is_some_and(|inner| {
            let mut listeners = inner.listeners.write();
            let before = listeners.len();
            listeners.retain(|l| l.id != self.id);
            listeners.len() < before
        })
    }
}

impl<E: BusEvent> fmt::Debug for Subscription<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Kinds of job lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobEventKind {
    /// `job:added`
    Added,
    /// `job:processing`
    Processing,
    /// `job:completed`
    Completed,
    /// `job:retrying`
    Retrying,
    /// `job:failed`
    Failed,
}

impl JobEventKind {
    /// Event name as exposed to observers.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Added => "job:added",
            Self::Processing => "job:processing",
            Self::Completed => "job:completed",
            Self::Retrying => "job:retrying",
            Self::Failed => "job:failed",
        }
    }
}

/// A job lifecycle event carrying the job snapshot at emission time.
#[derive(Debug, Clone, PartialEq)]
pub struct JobEvent {
    /// What happened.
    pub kind: JobEventKind,
    /// The job as it was when the event fired.
    pub job: Job,
}

impl JobEvent {
    /// Build an event from a job snapshot.
    pub fn new(kind: JobEventKind, job: Job) -> Self {
        Self { kind, job }
    }
}

impl BusEvent for JobEvent {
    type Kind = JobEventKind;

    fn kind(&self) -> JobEventKind {
        self.kind
    }
}

impl BusEvent for NotificationPayload {
    type Kind = NotificationType;

    fn kind(&self) -> NotificationType {
        self.kind
    }
}
