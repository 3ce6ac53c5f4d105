//! Delivery strategies, one per channel kind.

pub mod log_only;
pub mod webhook;
pub mod websocket;

pub use log_only::LogOnlyStrategy;
pub use webhook::{WebhookStrategy, NOTIFICATION_PRIORITY_HEADER, NOTIFICATION_TYPE_HEADER};
pub use websocket::WebsocketStrategy;
