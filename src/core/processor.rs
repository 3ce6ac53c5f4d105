//! Job processors and the per-type processor registry.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{Job, ProcessorError};

/// Business logic for one job type.
///
/// The processor receives a snapshot of the job (with `attempts` already
/// incremented) and either completes or returns an error. Errors drive the
/// retry/backoff state machine and never reach the job's producer.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use jobcast::core::{Job, JobProcessor, ProcessorError};
///
/// struct SendEmail;
///
/// #[async_trait]
/// impl JobProcessor for SendEmail {
///     async fn process(&self, job: Job) -> Result<(), ProcessorError> {
///         let to = job.payload["to"].as_str().ok_or("missing recipient")?;
///         tracing::info!(%to, "sending email");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait JobProcessor: Send + Sync + 'static {
    /// Process a job.
    async fn process(&self, job: Job) -> Result<(), ProcessorError>;
}

/// Adapter turning an async closure into a [`JobProcessor`].
pub struct FnProcessor<F> {
    f: F,
}

/// Wrap an async closure as a processor.
///
/// ```rust,ignore
/// scheduler.register_processor("ping", processor_fn(|job| async move {
///     tracing::debug!(id = %job.id, "pong");
///     Ok(())
/// }));
/// ```
pub fn processor_fn<F, Fut>(f: F) -> FnProcessor<F>
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ProcessorError>> + Send + 'static,
{
    FnProcessor { f }
}

#[async_trait]
impl<F, Fut> JobProcessor for FnProcessor<F>
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ProcessorError>> + Send + 'static,
{
    async fn process(&self, job: Job) -> Result<(), ProcessorError> {
        (self.f)(job).await
    }
}

/// Mapping of job type to processor.
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn JobProcessor>>,
}

impl ProcessorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor, replacing any existing one for the type.
    pub fn register(&mut self, job_type: impl Into<String>, processor: Arc<dyn JobProcessor>) {
        self.processors.insert(job_type.into(), processor);
    }

    /// Remove the processor for a type. Returns `true` if one was registered.
    pub fn unregister(&mut self, job_type: &str) -> bool {
        self.processors.remove(job_type).is_some()
    }

    /// Processor for a type, if registered.
    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobProcessor>> {
        self.processors.get(job_type).cloned()
    }

    /// Whether a processor is registered for the type.
    pub fn contains(&self, job_type: &str) -> bool {
        self.processors.contains_key(job_type)
    }

    /// Registered job types, sorted.
    pub fn job_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.processors.keys().cloned().collect();
        types.sort();
        types
    }
}

impl fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("job_types", &self.job_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Priority;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_processor_runs_closure() {
        let processor = processor_fn(|job: Job| async move {
            if job.payload["ok"].as_bool().unwrap_or(false) {
                Ok(())
            } else {
                Err(ProcessorError::failed("not ok"))
            }
        });

        let good = Job::new("t", json!({ "ok": true }), Priority::NORMAL, 1, 0);
        let bad = Job::new("t", json!({ "ok": false }), Priority::NORMAL, 1, 0);
        assert!(processor.process(good).await.is_ok());
        assert_eq!(
            processor.process(bad).await,
            Err(ProcessorError::Failed("not ok".into()))
        );
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = ProcessorRegistry::new();
        registry.register("a", Arc::new(processor_fn(|_| async { Ok::<(), ProcessorError>(()) })));
        registry.register("a", Arc::new(processor_fn(|_| async { Ok::<(), ProcessorError>(()) })));
        registry.register("b", Arc::new(processor_fn(|_| async { Ok::<(), ProcessorError>(()) })));

        assert_eq!(registry.job_types(), vec!["a", "b"]);
        assert!(registry.unregister("a"));
        assert!(!registry.unregister("a"));
        assert!(!registry.contains("a"));
        assert!(registry.get("b").is_some());
    }
}
