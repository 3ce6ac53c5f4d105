//! Error types for scheduler and dispatcher operations.

use thiserror::Error;

/// Errors produced by the job scheduler's public API.
///
/// Only malformed calls surface to producers; operational failures are
/// recorded on the job instead.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The job request was malformed (empty type, zero attempt budget).
    #[error("invalid job: {0}")]
    InvalidJob(String),
    /// No processor is registered for the job type. Logged when a job is dropped.
    #[error("no processor registered for job type `{0}`")]
    MissingProcessor(String),
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Failure raised by a job processor.
///
/// Captured by the scheduler and stored on the job as its `error` message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProcessorError {
    /// The processor reported a failure.
    #[error("{0}")]
    Failed(String),
    /// The processor did not finish within the configured timeout.
    #[error("processor timed out after {0}ms")]
    Timeout(u64),
    /// The processor panicked.
    #[error("processor panicked: {0}")]
    Panicked(String),
}

impl ProcessorError {
    /// Build a `Failed` error from any displayable message.
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

impl From<String> for ProcessorError {
    fn from(msg: String) -> Self {
        Self::Failed(msg)
    }
}

impl From<&str> for ProcessorError {
    fn from(msg: &str) -> Self {
        Self::Failed(msg.to_string())
    }
}

impl From<anyhow::Error> for ProcessorError {
    fn from(err: anyhow::Error) -> Self {
        Self::Failed(format!("{err:#}"))
    }
}

/// Failure of a single channel's delivery attempt.
///
/// Isolated to the channel: logged and counted, never escalated.
#[derive(Debug, Error)]
pub enum ChannelDeliveryError {
    /// The channel has no endpoint configured.
    #[error("channel `{0}` has no endpoint")]
    MissingEndpoint(String),
    /// The outbound request could not be completed.
    #[error("transport error: {0}")]
    Transport(String),
    /// The endpoint answered with a non-2xx status.
    #[error("endpoint returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },
    /// A custom delivery strategy refused the notification.
    #[error("delivery rejected: {0}")]
    Rejected(String),
    /// The delivery strategy panicked.
    #[error("delivery strategy panicked: {0}")]
    Panicked(String),
}

/// Errors produced by the notification dispatcher's public API.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The notification payload was malformed.
    #[error("invalid notification: {0}")]
    InvalidPayload(String),
    /// The channel definition was malformed.
    #[error("invalid channel: {0}")]
    InvalidChannel(String),
    /// Configuration validation failed or a delivery client could not be built.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processor_error_conversions() {
        assert_eq!(ProcessorError::from("boom"), ProcessorError::Failed("boom".into()));
        assert_eq!(
            ProcessorError::from(anyhow::anyhow!("outer")).to_string(),
            "outer"
        );
        assert_eq!(ProcessorError::Timeout(250).to_string(), "processor timed out after 250ms");
    }

    #[test]
    fn test_channel_error_display() {
        let err = ChannelDeliveryError::Status {
            status: 502,
            body: "bad gateway".into(),
        };
        assert_eq!(err.to_string(), "endpoint returned 502: bad gateway");
        assert_eq!(
            ChannelDeliveryError::MissingEndpoint("hook".into()).to_string(),
            "channel `hook` has no endpoint"
        );
    }
}
