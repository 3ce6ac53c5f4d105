//! Job records and their lifecycle state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique job identifier.
pub type JobId = Uuid;

/// Job priority. Higher values are dispatched first among eligible candidates.
///
/// Any integer is a valid priority; the associated constants name the levels
/// producers normally use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub i32);

impl Priority {
    /// Background work.
    pub const LOW: Self = Self(1);
    /// Default priority.
    pub const NORMAL: Self = Self(5);
    /// User-facing work.
    pub const HIGH: Self = Self(10);
    /// Must run before anything else.
    pub const CRITICAL: Self = Self(20);
}

impl Default for Priority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

/// Status of a job in the scheduler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Waiting in its type queue.
    Pending,
    /// The processor is running.
    Processing,
    /// Last attempt failed; waiting for the backoff timer or re-dispatch.
    Retrying,
    /// Finished successfully. Terminal.
    Completed,
    /// Exhausted its attempt budget. Terminal.
    Failed,
}

impl JobStatus {
    /// Whether the job will never be processed again.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Per-job overrides accepted by `add_job_with`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobOptions {
    /// Dispatch priority.
    pub priority: Priority,
    /// Attempt budget; falls back to the scheduler default when `None`.
    pub max_attempts: Option<u32>,
}

impl JobOptions {
    /// Options with the given priority and the default attempt budget.
    pub fn with_priority(priority: Priority) -> Self {
        Self {
            priority,
            max_attempts: None,
        }
    }

    /// Override the attempt budget.
    #[must_use]
    pub const fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

/// A unit of work owned by the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier.
    pub id: JobId,
    /// Job type; selects the processor and the queue.
    #[serde(rename = "type")]
    pub job_type: String,
    /// Opaque payload handed to the processor.
    pub payload: serde_json::Value,
    /// Dispatch priority.
    pub priority: Priority,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Number of processor invocations so far.
    pub attempts: u32,
    /// Attempt budget.
    pub max_attempts: u32,
    /// Creation time (ms since epoch).
    pub created_at_ms: u128,
    /// Last state change (ms since epoch).
    pub updated_at_ms: u128,
    /// Completion time (ms since epoch), set on success.
    pub processed_at_ms: Option<u128>,
    /// Message of the most recent failure.
    pub error: Option<String>,
}

impl Job {
    /// Create a pending job.
    pub fn new(
        job_type: impl Into<String>,
        payload: serde_json::Value,
        priority: Priority,
        max_attempts: u32,
        now_ms: u128,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type: job_type.into(),
            payload,
            priority,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            processed_at_ms: None,
            error: None,
        }
    }

    /// Transition PENDING/RETRYING -> PROCESSING and count the attempt.
    pub(crate) fn begin_attempt(&mut self, now_ms: u128) {
        self.status = JobStatus::Processing;
        self.attempts += 1;
        self.updated_at_ms = now_ms;
    }

    pub(crate) fn complete(&mut self, now_ms: u128) {
        self.status = JobStatus::Completed;
        self.processed_at_ms = Some(now_ms);
        self.updated_at_ms = now_ms;
    }

    /// Record a failed attempt. Returns `true` if the job may be retried.
    pub(crate) fn fail_attempt(&mut self, message: String, now_ms: u128) -> bool {
        self.error = Some(message);
        self.updated_at_ms = now_ms;
        if self.attempts < self.max_attempts {
            self.status = JobStatus::Retrying;
            true
        } else {
            self.status = JobStatus::Failed;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_priority_levels() {
        assert!(Priority::CRITICAL > Priority::HIGH);
        assert!(Priority::HIGH > Priority::NORMAL);
        assert!(Priority::NORMAL > Priority::LOW);
        assert_eq!(Priority::default(), Priority::NORMAL);
    }

    #[test]
    fn test_attempt_budget() {
        let mut job = Job::new("email", json!({}), Priority::NORMAL, 2, 10);
        job.begin_attempt(11);
        assert!(job.fail_attempt("first".into(), 12));
        assert_eq!(job.status, JobStatus::Retrying);

        job.begin_attempt(13);
        assert!(!job.fail_attempt("second".into(), 14));
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 2);
        assert_eq!(job.error.as_deref(), Some("second"));
        assert!(job.status.is_terminal());
    }

    #[test]
    fn test_job_serializes_type_field() {
        let job = Job::new("sync", json!({"k": 1}), Priority::HIGH, 3, 1);
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["type"], "sync");
        assert_eq!(value["status"], "PENDING");
        assert_eq!(value["priority"], 10);
    }
}
