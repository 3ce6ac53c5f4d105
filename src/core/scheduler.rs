//! Priority multi-queue job scheduler with retry/backoff and bounded concurrency.
//!
//! Every job type has its own priority-ordered queue. A dispatch loop, driven
//! by a fixed interval and woken early whenever work or capacity appears,
//! selects the highest-priority head among types that have nothing in flight
//! and hands it to the type's processor.
//!
//! A failed job keeps its type's in-flight slot and its global concurrency
//! slot for the whole backoff window (`retry_delay * attempts`); only when the
//! backoff timer re-queues it does the type become eligible again.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::core::{
    BusEvent, EventBus, Job, JobEvent, JobEventKind, JobId, JobOptions, JobProcessor, JobStatus,
    Priority, ProcessorError, ProcessorRegistry, SchedulerError, Spawn, Subscription,
    SubscriptionId,
};
use crate::infra::queue::TypeQueues;
use crate::runtime::TokioSpawner;
use crate::util::clock::now_ms;
use crate::util::panic::panic_message;

/// Snapshot of scheduler state returned by [`JobQueueScheduler::get_stats`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Pending jobs per type.
    pub pending_by_type: BTreeMap<String, usize>,
    /// Pending jobs across all types.
    pub total_pending: usize,
    /// Jobs processing or waiting for their retry timer.
    pub in_flight: usize,
    /// Whether the dispatch loop is running.
    pub running: bool,
    /// Active configuration.
    pub config: SchedulerConfig,
    /// Jobs accepted since creation.
    pub added: u64,
    /// Jobs completed since creation.
    pub completed: u64,
    /// Jobs failed permanently since creation.
    pub failed: u64,
    /// Failed attempts that were scheduled for retry.
    pub retried: u64,
    /// Jobs dropped because no processor was registered.
    pub dropped: u64,
}

/// Lifetime counters (lock-free atomics).
#[derive(Debug, Default)]
struct SchedulerCounters {
    added: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Default)]
struct SchedulerState {
    queues: TypeQueues,
    /// In-flight jobs: processing, or failed and waiting for the backoff timer.
    active: HashMap<JobId, Job>,
    /// Types with a job in `active`.
    in_flight_types: HashSet<String>,
    /// Recently finished jobs, oldest first.
    finished: VecDeque<Job>,
}

impl SchedulerState {
    fn remember(&mut self, job: Job, retention: usize) {
        if retention == 0 {
            return;
        }
        if self.finished.len() >= retention {
            self.finished.pop_front();
        }
        self.finished.push_back(job);
    }
}

enum Selection {
    Dispatch(Job, Arc<dyn JobProcessor>),
    Dropped(Job),
}

struct SchedulerInner<S> {
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
    processors: RwLock<ProcessorRegistry>,
    events: EventBus<JobEvent>,
    counters: SchedulerCounters,
    running: AtomicBool,
    /// Incremented on every `start`; stale dispatch loops exit when it moves on.
    generation: AtomicU64,
    /// Wakes the dispatch loop early.
    wake: Notify,
    /// Signalled whenever a job leaves the processing state.
    idle: Notify,
    spawner: S,
}

/// Priority multi-queue job scheduler.
///
/// Cloning yields another handle to the same scheduler.
pub struct JobQueueScheduler<S = TokioSpawner> {
    inner: Arc<SchedulerInner<S>>,
}

impl<S> Clone for JobQueueScheduler<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> JobQueueScheduler<S>
where
    S: Spawn + Send + Sync + 'static,
{
    /// Create a stopped scheduler.
    pub fn new(config: SchedulerConfig, spawner: S) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;
        Ok(Self {
            inner: Arc::new(SchedulerInner {
                config,
                state: Mutex::new(SchedulerState::default()),
                processors: RwLock::new(ProcessorRegistry::new()),
                events: EventBus::new(),
                counters: SchedulerCounters::default(),
                running: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                wake: Notify::new(),
                idle: Notify::new(),
                spawner,
            }),
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Register the processor for a job type, replacing any existing one.
    pub fn register_processor<P>(&self, job_type: impl Into<String>, processor: P)
    where
        P: JobProcessor,
    {
        let job_type = job_type.into();
        info!(job_type = %job_type, "registering job processor");
        self.inner
            .processors
            .write()
            .register(job_type, Arc::new(processor));
        self.inner.wake.notify_one();
    }

    /// Remove the processor for a job type. Returns `true` if one was registered.
    pub fn unregister_processor(&self, job_type: &str) -> bool {
        self.inner.processors.write().unregister(job_type)
    }

    /// Queue a job with the default attempt budget. Returns its id immediately.
    pub fn add_job(
        &self,
        job_type: impl Into<String>,
        payload: serde_json::Value,
        priority: Priority,
    ) -> Result<JobId, SchedulerError> {
        self.add_job_with(job_type, payload, JobOptions::with_priority(priority))
    }

    /// Queue a job with explicit options. Returns its id immediately.
    pub fn add_job_with(
        &self,
        job_type: impl Into<String>,
        payload: serde_json::Value,
        options: JobOptions,
    ) -> Result<JobId, SchedulerError> {
        let job_type = job_type.into();
        if job_type.trim().is_empty() {
            return Err(SchedulerError::InvalidJob("job type must not be empty".into()));
        }
        let max_attempts = options.max_attempts.unwrap_or(self.inner.config.max_attempts);
        if max_attempts == 0 {
            return Err(SchedulerError::InvalidJob(
                "max_attempts must be greater than 0".into(),
            ));
        }

        let job = Job::new(job_type, payload, options.priority, max_attempts, now_ms());
        let id = job.id;
        debug!(
            job_id = %id,
            job_type = %job.job_type,
            priority = job.priority.0,
            "job added"
        );
        self.inner.counters.added.fetch_add(1, Ordering::Relaxed);
        // Announce before queueing so `job:added` always precedes `job:processing`.
        self.inner
            .events
            .emit(&JobEvent::new(JobEventKind::Added, job.clone()));
        self.inner.state.lock().queues.push(job);
        self.inner.wake.notify_one();
        Ok(id)
    }

    /// Look up a job: in-flight jobs first, then pending queues, then recent history.
    pub fn get_job_status(&self, id: &JobId) -> Option<Job> {
        let state = self.inner.state.lock();
        state
            .active
            .get(id)
            .or_else(|| state.queues.find(id))
            .or_else(|| state.finished.iter().rev().find(|job| &job.id == id))
            .cloned()
    }

    /// Start the dispatch loop. No-op if already running.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::AcqRel) {
            debug!("job scheduler already running");
            return;
        }
        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        info!(
            max_concurrent = self.inner.config.max_concurrent,
            tick_interval_ms = self.inner.config.tick_interval_ms,
            "job scheduler started"
        );
        let scheduler = self.clone();
        self.inner
            .spawner
            .spawn(async move { scheduler.run_loop(generation).await });
    }

    /// Stop the dispatch loop. In-flight jobs keep running. No-op if stopped.
    pub fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.inner.wake.notify_one();
        info!("job scheduler stopped");
    }

    /// Whether the dispatch loop is running.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Stop the loop and wait until no job is processing.
    ///
    /// Jobs waiting for a retry timer are not waited for; they return to their
    /// queue when the timer fires. Returns `false` if `timeout` elapsed first.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.stop();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let processing = self.processing_count();
            if processing == 0 {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                warn!(processing, "shutdown timed out with jobs still processing");
                return false;
            }
        }
    }

    /// Counts, configuration, and lifetime totals.
    pub fn get_stats(&self) -> SchedulerStats {
        let (pending_by_type, total_pending, in_flight) = {
            let state = self.inner.state.lock();
            let pending: BTreeMap<String, usize> = state.queues.depths().into_iter().collect();
            (pending, state.queues.len(), state.active.len())
        };
        let counters = &self.inner.counters;
        SchedulerStats {
            pending_by_type,
            total_pending,
            in_flight,
            running: self.is_running(),
            config: self.inner.config.clone(),
            added: counters.added.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            retried: counters.retried.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Drop every pending job. In-flight jobs, including those waiting for a
    /// retry timer, are untouched. Returns the number of removed jobs.
    pub fn clear_queues(&self) -> usize {
        let removed = self.inner.state.lock().queues.clear();
        info!(removed, "cleared pending job queues");
        removed
    }

    /// Listen to the given lifecycle events.
    pub fn subscribe<I, F>(&self, kinds: I, callback: F) -> Subscription<JobEvent>
    where
        I: IntoIterator<Item = JobEventKind>,
        F: Fn(&JobEvent) + Send + Sync + 'static,
    {
        let id = self.inner.events.subscribe(kinds, callback);
        self.inner.events.subscription(id)
    }

    /// Listen to every lifecycle event.
    pub fn subscribe_all<F>(&self, callback: F) -> Subscription<JobEvent>
    where
        F: Fn(&JobEvent) + Send + Sync + 'static,
    {
        let id = self.inner.events.subscribe_all(callback);
        self.inner.events.subscription(id)
    }

    /// Remove a lifecycle listener by id. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    /// Dispatch every job that is currently eligible. Returns how many
    /// processors were started.
    ///
    /// The dispatch loop calls this on every tick; it is public so callers can
    /// drive a stopped scheduler by hand.
    pub fn tick(&self) -> usize {
        let mut dispatched = 0;
        while let Some(selection) = self.select_next() {
            match selection {
                Selection::Dispatch(job, processor) => {
                    dispatched += 1;
                    debug!(
                        job_id = %job.id,
                        job_type = %job.job_type,
                        attempt = job.attempts,
                        "dispatching job"
                    );
                    self.inner
                        .events
                        .emit(&JobEvent::new(JobEventKind::Processing, job.clone()));
                    self.spawn_processor(job, processor);
                }
                Selection::Dropped(job) => {
                    self.inner.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        job_id = %job.id,
                        error = %SchedulerError::MissingProcessor(job.job_type.clone()),
                        "dropping job"
                    );
                }
            }
        }
        dispatched
    }

    /// Pick one eligible job and move it into the active set.
    fn select_next(&self) -> Option<Selection> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        if state.active.len() >= self.inner.config.max_concurrent {
            return None;
        }

        let in_flight = &state.in_flight_types;
        let job_type = state
            .queues
            .select_next(|t| in_flight.contains(t))?
            .to_owned();
        let mut job = state.queues.pop_head(&job_type)?;

        let Some(processor) = self.inner.processors.read().get(&job_type) else {
            return Some(Selection::Dropped(job));
        };

        job.begin_attempt(now_ms());
        state.in_flight_types.insert(job_type);
        state.active.insert(job.id, job.clone());
        Some(Selection::Dispatch(job, processor))
    }

    fn spawn_processor(&self, job: Job, processor: Arc<dyn JobProcessor>) {
        let scheduler = self.clone();
        let timeout_ms = self.inner.config.processor_timeout_ms;
        self.inner.spawner.spawn(async move {
            let id = job.id;
            let outcome = execute(processor, job, timeout_ms).await;
            scheduler.finish(id, outcome);
        });
    }

    /// Apply a processor outcome to the job state machine.
    fn finish(&self, id: JobId, outcome: Result<(), ProcessorError>) {
        let now = now_ms();
        let retention = self.inner.config.finished_job_retention;
        let (event, retry_after) = {
            let mut state = self.inner.state.lock();
            let Some(mut job) = state.active.remove(&id) else {
                error!(job_id = %id, "finished job is no longer active");
                return;
            };
            match outcome {
                Ok(()) => {
                    job.complete(now);
                    state.in_flight_types.remove(&job.job_type);
                    state.remember(job.clone(), retention);
                    (JobEvent::new(JobEventKind::Completed, job), None)
                }
                Err(err) => {
                    if job.fail_attempt(err.to_string(), now) {
                        let delay = self.inner.config.retry_delay(job.attempts);
                        // Keeps both the type slot and the concurrency slot until re-queued.
                        state.active.insert(id, job.clone());
                        (JobEvent::new(JobEventKind::Retrying, job), Some(delay))
                    } else {
                        state.in_flight_types.remove(&job.job_type);
                        state.remember(job.clone(), retention);
                        (JobEvent::new(JobEventKind::Failed, job), None)
                    }
                }
            }
        };

        let job = &event.job;
        match event.kind() {
            JobEventKind::Completed => {
                self.inner.counters.completed.fetch_add(1, Ordering::Relaxed);
                info!(job_id = %job.id, job_type = %job.job_type, attempts = job.attempts, "job completed");
            }
            JobEventKind::Retrying => {
                self.inner.counters.retried.fetch_add(1, Ordering::Relaxed);
                warn!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    attempt = job.attempts,
                    max_attempts = job.max_attempts,
                    delay_ms = retry_after.map_or(0, |d| d.as_millis()),
                    error = job.error.as_deref().unwrap_or_default(),
                    "job failed, retrying"
                );
            }
            JobEventKind::Failed => {
                self.inner.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    attempts = job.attempts,
                    error = job.error.as_deref().unwrap_or_default(),
                    "job failed permanently"
                );
            }
            JobEventKind::Added | JobEventKind::Processing => {}
        }

        self.inner.events.emit(&event);
        if let Some(delay) = retry_after {
            self.schedule_requeue(id, delay);
        }
        self.inner.wake.notify_one();
        self.inner.idle.notify_waiters();
    }

    fn schedule_requeue(&self, id: JobId, delay: Duration) {
        let scheduler = self.clone();
        self.inner.spawner.spawn(async move {
            tokio::time::sleep(delay).await;
            scheduler.requeue(id);
        });
    }

    /// Move a job out of its backoff window and back into its queue.
    fn requeue(&self, id: JobId) {
        {
            let mut state = self.inner.state.lock();
            let Some(job) = state.active.remove(&id) else {
                return;
            };
            state.in_flight_types.remove(&job.job_type);
            debug!(job_id = %id, job_type = %job.job_type, "re-queueing job after backoff");
            state.queues.push(job);
        }
        self.inner.wake.notify_one();
    }

    fn processing_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .active
            .values()
            .filter(|job| job.status == JobStatus::Processing)
            .count()
    }

    async fn run_loop(self, generation: u64) {
        let mut interval = tokio::time::interval(self.inner.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                () = self.inner.wake.notified() => {}
            }
            if !self.is_running() || self.inner.generation.load(Ordering::Acquire) != generation {
                break;
            }
            self.tick();
        }
        debug!(generation, "dispatch loop exited");
    }
}

/// Run a processor, turning panics and timeouts into processor errors.
async fn execute(
    processor: Arc<dyn JobProcessor>,
    job: Job,
    timeout_ms: Option<u64>,
) -> Result<(), ProcessorError> {
    let run = AssertUnwindSafe(processor.process(job)).catch_unwind();
    let result = match timeout_ms {
        Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), run).await {
            Ok(result) => result,
            Err(_) => return Err(ProcessorError::Timeout(ms)),
        },
        None => run.await,
    };
    result.unwrap_or_else(|panic| Err(ProcessorError::Panicked(panic_message(panic.as_ref()))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::processor_fn;
    use serde_json::json;

    fn scheduler(max_concurrent: usize) -> JobQueueScheduler {
        JobQueueScheduler::new(
            SchedulerConfig {
                max_concurrent,
                tick_interval_ms: 10,
                retry_delay_ms: 10,
                ..SchedulerConfig::default()
            },
            TokioSpawner::current(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_rejects_malformed_jobs() {
        let s = scheduler(1);
        assert!(matches!(
            s.add_job("  ", json!({}), Priority::NORMAL),
            Err(SchedulerError::InvalidJob(_))
        ));
        assert!(matches!(
            s.add_job_with("a", json!({}), JobOptions::default().max_attempts(0)),
            Err(SchedulerError::InvalidJob(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let cfg = SchedulerConfig {
            max_concurrent: 0,
            ..SchedulerConfig::default()
        };
        assert!(matches!(
            JobQueueScheduler::new(cfg, TokioSpawner::current()),
            Err(SchedulerError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_manual_tick_respects_concurrency_limit() {
        let s = scheduler(2);
        let (tx, rx) = tokio::sync::watch::channel(false);
        for job_type in ["a", "b", "c"] {
            let rx = rx.clone();
            s.register_processor(
                job_type,
                processor_fn(move |_| {
                    let mut rx = rx.clone();
                    async move {
                        let _ = rx.wait_for(|done| *done).await;
                        Ok::<(), ProcessorError>(())
                    }
                }),
            );
            s.add_job(job_type, json!({}), Priority::NORMAL).unwrap();
        }

        assert_eq!(s.tick(), 2);
        assert_eq!(s.tick(), 0);
        let stats = s.get_stats();
        assert_eq!(stats.in_flight, 2);
        assert_eq!(stats.total_pending, 1);
        tx.send(true).unwrap();
    }

    #[tokio::test]
    async fn test_missing_processor_drops_job() {
        let s = scheduler(1);
        let id = s.add_job("orphan", json!({}), Priority::HIGH).unwrap();
        assert_eq!(s.tick(), 0);
        assert!(s.get_job_status(&id).is_none());
        assert_eq!(s.get_stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_panicking_processor_counts_as_failure() {
        let outcome = execute(
            Arc::new(processor_fn(|_| async {
                if true {
                    panic!("kaboom");
                }
                Ok::<(), ProcessorError>(())
            })),
            Job::new("p", json!({}), Priority::NORMAL, 1, 0),
            None,
        )
        .await;
        assert_eq!(outcome, Err(ProcessorError::Panicked("kaboom".into())));
    }

    #[tokio::test]
    async fn test_processor_timeout() {
        let outcome = execute(
            Arc::new(processor_fn(|_| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<(), ProcessorError>(())
            })),
            Job::new("slow", json!({}), Priority::NORMAL, 1, 0),
            Some(20),
        )
        .await;
        assert_eq!(outcome, Err(ProcessorError::Timeout(20)));
    }
}
