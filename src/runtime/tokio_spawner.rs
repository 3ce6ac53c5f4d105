//! Tokio runtime spawner implementation.

use std::future::Future;
use std::sync::Arc;

use crate::core::Spawn;

/// Spawner that runs scheduler and dispatcher tasks on a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioSpawner {
    handle: Arc<tokio::runtime::Handle>,
}

impl TokioSpawner {
    /// Create a spawner from a tokio runtime handle.
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Spawner for the runtime the caller is running on.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }

    /// Spawner for the current runtime, or `None` outside one.
    pub fn try_current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl Spawn for TokioSpawner {
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(fut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_current_outside_runtime() {
        assert!(TokioSpawner::try_current().is_none());
    }

    #[tokio::test]
    async fn test_spawns_on_current_runtime() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        TokioSpawner::current().spawn(async move {
            let _ = tx.send(7);
        });
        assert_eq!(rx.await.unwrap(), 7);
    }
}
