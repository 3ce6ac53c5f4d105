//! Configuration models for the scheduler, the dispatcher, and startup channels.

pub mod settings;

pub use settings::{AppConfig, DispatcherConfig, SchedulerConfig, ENV_PREFIX};
