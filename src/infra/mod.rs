//! Infrastructure adapters: in-memory job queues and channel delivery backends.

pub mod delivery;
pub mod queue;

pub use delivery::{LogOnlyStrategy, WebhookStrategy, WebsocketStrategy};
pub use queue::TypeQueues;
