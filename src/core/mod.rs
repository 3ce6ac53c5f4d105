//! Core scheduling and notification abstractions.

pub mod dispatcher;
pub mod error;
pub mod events;
pub mod job;
pub mod notification;
pub mod processor;
pub mod scheduler;
pub mod spawn;

pub use dispatcher::{
    DeliveryOutcome, DeliveryReceipt, DeliveryStrategy, DispatcherStats, NotificationDispatcher,
};
pub use error::{AppResult, ChannelDeliveryError, DispatchError, ProcessorError, SchedulerError};
pub use events::{BusEvent, EventBus, JobEvent, JobEventKind, Subscription, SubscriptionId};
pub use job::{Job, JobId, JobOptions, JobStatus, Priority};
pub use notification::{
    Channel, ChannelKind, ChannelRegistry, ChannelSummary, NotificationPayload,
    NotificationPriority, NotificationType,
};
pub use processor::{processor_fn, FnProcessor, JobProcessor, ProcessorRegistry};
pub use scheduler::{JobQueueScheduler, SchedulerStats};
pub use spawn::Spawn;
