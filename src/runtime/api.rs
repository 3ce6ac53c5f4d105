//! Transport-agnostic request/response models for HTTP or RPC handlers.

use serde::{Deserialize, Serialize};

use crate::core::{
    JobId, JobOptions, JobQueueScheduler, JobStatus, NotificationDispatcher, Priority,
    SchedulerError, Spawn,
};

/// Job submission payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSubmission {
    /// Job type; selects the processor.
    #[serde(rename = "type")]
    pub job_type: String,
    /// Opaque job payload.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Priority, `NORMAL` when omitted.
    #[serde(default)]
    pub priority: Option<Priority>,
    /// Attempt budget, scheduler default when omitted.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

/// Job status response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusResponse {
    /// Job identifier.
    pub id: JobId,
    /// Job type.
    #[serde(rename = "type")]
    pub job_type: String,
    /// Current status.
    pub status: JobStatus,
    /// Attempts made so far.
    pub attempts: u32,
    /// Attempt budget.
    pub max_attempts: u32,
    /// Last failure message.
    pub error: Option<String>,
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
    /// Whether the scheduler's dispatch loop is running.
    pub scheduler_running: bool,
    /// Pending jobs across all types.
    pub pending_jobs: usize,
    /// In-flight jobs.
    pub in_flight_jobs: usize,
    /// Undelivered notifications.
    pub notification_queue_depth: usize,
}

/// Submit a job and report its initial status.
pub fn submit_job<S>(
    scheduler: &JobQueueScheduler<S>,
    req: JobSubmission,
) -> Result<JobStatusResponse, SchedulerError>
where
    S: Spawn + Send + Sync + 'static,
{
    let options = JobOptions {
        priority: req.priority.unwrap_or_default(),
        max_attempts: req.max_attempts,
    };
    let max_attempts = options
        .max_attempts
        .unwrap_or(scheduler.config().max_attempts);
    let id = scheduler.add_job_with(req.job_type.clone(), req.payload, options)?;
    Ok(JobStatusResponse {
        id,
        job_type: req.job_type,
        status: JobStatus::Pending,
        attempts: 0,
        max_attempts,
        error: None,
    })
}

/// Current status of a job, if known.
pub fn job_status<S>(scheduler: &JobQueueScheduler<S>, id: &JobId) -> Option<JobStatusResponse>
where
    S: Spawn + Send + Sync + 'static,
{
    scheduler.get_job_status(id).map(|job| JobStatusResponse {
        id: job.id,
        job_type: job.job_type,
        status: job.status,
        attempts: job.attempts,
        max_attempts: job.max_attempts,
        error: job.error,
    })
}

/// Health payload built from both services.
pub fn health<S1, S2>(
    scheduler: &JobQueueScheduler<S1>,
    dispatcher: &NotificationDispatcher<S2>,
) -> Health
where
    S1: Spawn + Send + Sync + 'static,
    S2: Spawn + Send + Sync + 'static,
{
    let jobs = scheduler.get_stats();
    let notifications = dispatcher.get_stats();
    Health {
        ok: true,
        scheduler_running: jobs.running,
        pending_jobs: jobs.total_pending,
        in_flight_jobs: jobs.in_flight,
        notification_queue_depth: notifications.queue_depth,
    }
}
