//! Wires a scheduler and a dispatcher from [`AppConfig`].

use anyhow::Context;
use tracing::info;

use crate::config::AppConfig;
use crate::core::{AppResult, JobQueueScheduler, NotificationDispatcher, Spawn};

/// The process-wide service instances.
pub struct Services<S> {
    /// Job scheduler (stopped; call `start`).
    pub scheduler: JobQueueScheduler<S>,
    /// Notification dispatcher with the configured channels registered.
    pub dispatcher: NotificationDispatcher<S>,
}

/// Validate the configuration and build both services on the given spawner.
pub fn build_services<S>(cfg: &AppConfig, spawner: S) -> AppResult<Services<S>>
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    cfg.validate()
        .map_err(|e| anyhow::anyhow!("config invalid: {e}"))?;

    let scheduler = JobQueueScheduler::new(cfg.scheduler.clone(), spawner.clone())
        .context("building job scheduler")?;
    let dispatcher = NotificationDispatcher::new(cfg.dispatcher.clone(), spawner)
        .context("building notification dispatcher")?;
    for channel in &cfg.channels {
        dispatcher
            .add_channel(channel.clone())
            .with_context(|| format!("registering channel `{}`", channel.id))?;
    }

    info!(
        max_concurrent = cfg.scheduler.max_concurrent,
        channels = cfg.channels.len(),
        "services built"
    );
    Ok(Services {
        scheduler,
        dispatcher,
    })
}
