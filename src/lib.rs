//! # Jobcast
//!
//! In-process background job scheduling and multi-channel notification fan-out.
//!
//! The crate has two cooperating services:
//!
//! - **[`JobQueueScheduler`](core::JobQueueScheduler)** keeps one
//!   priority-ordered queue per job type and runs at most one job per type,
//!   and at most `max_concurrent` jobs overall. Failed jobs are retried with
//!   linear backoff until their attempt budget runs out. Every transition
//!   emits a lifecycle event (`job:added`, `job:processing`, `job:completed`,
//!   `job:retrying`, `job:failed`).
//! - **[`NotificationDispatcher`](core::NotificationDispatcher)** delivers
//!   notifications strictly one at a time in FIFO order, fanning each out
//!   concurrently to every enabled channel whose filters accept it
//!   (websocket, webhook, push, email). One channel failing never blocks
//!   the others.
//!
//! ## Scheduling jobs
//!
//! ```rust,ignore
//! use jobcast::config::SchedulerConfig;
//! use jobcast::core::{processor_fn, JobQueueScheduler, Priority};
//! use jobcast::runtime::TokioSpawner;
//!
//! let scheduler = JobQueueScheduler::new(SchedulerConfig::default(), TokioSpawner::current())?;
//! scheduler.register_processor("email", processor_fn(|job| async move {
//!     tracing::info!(to = %job.payload["to"], "sending");
//!     Ok(())
//! }));
//! scheduler.start();
//!
//! let id = scheduler.add_job("email", serde_json::json!({ "to": "ops@example.com" }), Priority::HIGH)?;
//! ```
//!
//! ## Sending notifications
//!
//! ```rust,ignore
//! use jobcast::config::DispatcherConfig;
//! use jobcast::core::{Channel, ChannelKind, NotificationDispatcher, NotificationPayload, NotificationType};
//!
//! let dispatcher = NotificationDispatcher::new(DispatcherConfig::default(), TokioSpawner::current())?;
//! dispatcher.add_channel(
//!     Channel::new("audit", ChannelKind::Webhook)
//!         .with_endpoint("https://audit.example.com/hook")
//!         .with_filters([NotificationType::SessionDelete]),
//! )?;
//! dispatcher
//!     .send_notification(NotificationPayload::new(NotificationType::SessionDelete, "topic-1"))
//!     .await?;
//! ```
//!
//! [`builders::build_services`] wires both from an [`config::AppConfig`], and
//! [`runtime::forward_job_events`] turns terminal job events into
//! `job_completed` / `job_failed` notifications.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Job scheduling, notification dispatch, and shared domain types.
pub mod core;
/// Configuration models, validation, and environment overrides.
pub mod config;
/// Builders to construct services from configuration.
pub mod builders;
/// In-memory queues and channel delivery backends.
pub mod infra;
/// Tokio spawner, lifecycle bridge, and API models.
pub mod runtime;
/// Shared utilities.
pub mod util;
