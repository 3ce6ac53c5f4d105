//! Forwards terminal job lifecycle events into the notification dispatcher.

use serde_json::json;
use tracing::warn;

use crate::core::{
    JobEvent, JobEventKind, JobQueueScheduler, NotificationDispatcher, NotificationPayload,
    NotificationPriority, NotificationType, Spawn, Subscription,
};

/// Notification describing a completed or failed job.
pub fn job_notification(event: &JobEvent) -> NotificationPayload {
    let job = &event.job;
    let (kind, priority) = match event.kind {
        JobEventKind::Failed => (NotificationType::JobFailed, NotificationPriority::High),
        _ => (NotificationType::JobCompleted, NotificationPriority::Normal),
    };
    NotificationPayload::new(kind, job.id.to_string())
        .with_priority(priority)
        .with_data(json!({
            "job_id": job.id,
            "job_type": job.job_type,
            "attempts": job.attempts,
            "error": job.error,
        }))
}

/// Enqueue a `job_completed` / `job_failed` notification for every job that
/// reaches a terminal state. Unsubscribe the returned handle to stop.
pub fn forward_job_events<S1, S2>(
    scheduler: &JobQueueScheduler<S1>,
    dispatcher: &NotificationDispatcher<S2>,
) -> Subscription<JobEvent>
where
    S1: Spawn + Send + Sync + 'static,
    S2: Spawn + Send + Sync + 'static,
{
    let dispatcher = dispatcher.clone();
    scheduler.subscribe(
        [JobEventKind::Completed, JobEventKind::Failed],
        move |event: &JobEvent| {
            if let Err(err) = dispatcher.enqueue(job_notification(event)) {
                warn!(job_id = %event.job.id, error = %err, "failed to forward job event");
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Job, Priority};

    #[test]
    fn test_failed_job_maps_to_high_priority_notification() {
        let mut job = Job::new("render", json!({}), Priority::NORMAL, 1, 0);
        job.error = Some("boom".into());
        let payload = job_notification(&JobEvent::new(JobEventKind::Failed, job.clone()));

        assert_eq!(payload.kind, NotificationType::JobFailed);
        assert_eq!(payload.priority, NotificationPriority::High);
        assert_eq!(payload.topic, job.id.to_string());
        assert_eq!(payload.data["error"], "boom");
        assert_eq!(payload.data["job_type"], "render");
    }
}
