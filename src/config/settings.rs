//! Scheduler, dispatcher, and application configuration structures.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::{AppResult, Channel};

/// Prefix of environment variables read by [`AppConfig::load`].
pub const ENV_PREFIX: &str = "JOBCAST_";

/// Job scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum jobs in flight (processing or awaiting retry) at once.
    pub max_concurrent: usize,
    /// Interval of the dispatch loop in milliseconds.
    pub tick_interval_ms: u64,
    /// Base retry delay in milliseconds; attempt `n` waits `n * retry_delay_ms`.
    pub retry_delay_ms: u64,
    /// Default attempt budget for new jobs.
    pub max_attempts: u32,
    /// Optional per-invocation processor timeout in milliseconds.
    pub processor_timeout_ms: Option<u64>,
    /// Number of completed/failed jobs kept for status queries.
    pub finished_job_retention: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            tick_interval_ms: 100,
            retry_delay_ms: 1_000,
            max_attempts: 3,
            processor_timeout_ms: None,
            finished_job_retention: 1_000,
        }
    }
}

impl SchedulerConfig {
    /// Validate scheduler configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent == 0 {
            return Err("max_concurrent must be greater than 0".into());
        }
        if self.tick_interval_ms == 0 {
            return Err("tick_interval_ms must be greater than 0".into());
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be greater than 0".into());
        }
        if self.processor_timeout_ms == Some(0) {
            return Err("processor_timeout_ms must be greater than 0 when set".into());
        }
        Ok(())
    }

    /// Dispatch loop interval.
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Backoff before re-queueing a job that has made `attempts` attempts.
    pub fn retry_delay(&self, attempts: u32) -> Duration {
        Duration::from_millis(self.retry_delay_ms.saturating_mul(u64::from(attempts)))
    }
}

/// Notification dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Timeout for a single webhook request in seconds.
    pub webhook_timeout_secs: u64,
    /// Capacity of the local websocket broadcast feed.
    pub websocket_buffer: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            webhook_timeout_secs: 30,
            websocket_buffer: 256,
        }
    }
}

impl DispatcherConfig {
    /// Validate dispatcher configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.webhook_timeout_secs == 0 {
            return Err("webhook_timeout_secs must be greater than 0".into());
        }
        if self.websocket_buffer == 0 {
            return Err("websocket_buffer must be greater than 0".into());
        }
        Ok(())
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Job scheduler settings.
    pub scheduler: SchedulerConfig,
    /// Notification dispatcher settings.
    pub dispatcher: DispatcherConfig,
    /// Channels registered at startup.
    pub channels: Vec<Channel>,
}

impl AppConfig {
    /// Validate every section and the channel list.
    pub fn validate(&self) -> Result<(), String> {
        self.scheduler
            .validate()
            .map_err(|e| format!("scheduler invalid: {e}"))?;
        self.dispatcher
            .validate()
            .map_err(|e| format!("dispatcher invalid: {e}"))?;
        for channel in &self.channels {
            if channel.id.trim().is_empty() {
                return Err("channel id must not be empty".into());
            }
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `JOBCAST_*` overrides using the given variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), String>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, String> {
            raw.trim()
                .parse()
                .map_err(|_| format!("{ENV_PREFIX}{name} has invalid value `{raw}`"))
        }
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(raw) = get("MAX_CONCURRENT") {
            self.scheduler.max_concurrent = parse("MAX_CONCURRENT", &raw)?;
        }
        if let Some(raw) = get("TICK_INTERVAL_MS") {
            self.scheduler.tick_interval_ms = parse("TICK_INTERVAL_MS", &raw)?;
        }
        if let Some(raw) = get("RETRY_DELAY_MS") {
            self.scheduler.retry_delay_ms = parse("RETRY_DELAY_MS", &raw)?;
        }
        if let Some(raw) = get("MAX_ATTEMPTS") {
            self.scheduler.max_attempts = parse("MAX_ATTEMPTS", &raw)?;
        }
        if let Some(raw) = get("PROCESSOR_TIMEOUT_MS") {
            self.scheduler.processor_timeout_ms = Some(parse("PROCESSOR_TIMEOUT_MS", &raw)?);
        }
        if let Some(raw) = get("WEBHOOK_TIMEOUT_SECS") {
            self.dispatcher.webhook_timeout_secs = parse("WEBHOOK_TIMEOUT_SECS", &raw)?;
        }
        Ok(())
    }

    /// Load configuration for the process.
    ///
    /// Reads `.env` if present, starts from the JSON file named by
    /// `JOBCAST_CONFIG` (or defaults), applies `JOBCAST_*` overrides, and
    /// validates the result.
    pub fn load() -> AppResult<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }

        let mut cfg = match std::env::var(format!("{ENV_PREFIX}CONFIG")) {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading config file `{path}`"))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("parsing config file `{path}`"))?
            }
            Err(_) => Self::default(),
        };

        cfg.apply_overrides(|name| std::env::var(name).ok())
            .map_err(anyhow::Error::msg)?;
        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}
