//! Runtime adapters, lifecycle bridging, and API models.

pub mod api;
pub mod bridge;
pub mod tokio_spawner;

pub use api::{health, job_status, submit_job, Health, JobStatusResponse, JobSubmission};
pub use bridge::{forward_job_events, job_notification};
pub use tokio_spawner::TokioSpawner;
