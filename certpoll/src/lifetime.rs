//! Host application lifecycle signals
//!
//! Selectors register here at construction and are driven by the host: the
//! started signal performs the initial fetch, the stopping signal ends polling.

use crate::selector::SelectorError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

/// Receiver of the host's started/stopping signals
#[async_trait]
pub trait LifecycleListener: Send + Sync {
    /// Called once when the host has started. Errors abort startup.
    async fn application_started(&self) -> Result<(), SelectorError>;

    /// Called once when the host begins shutting down
    fn application_stopping(&self);
}

/// Registry of lifecycle listeners owned by the host
#[derive(Clone, Default)]
pub struct ApplicationLifetime {
    listeners: Arc<Mutex<Vec<Arc<dyn LifecycleListener>>>>,
}

impl ApplicationLifetime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Arc<dyn LifecycleListener>) {
        self.listeners.lock().push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    fn snapshot(&self) -> Vec<Arc<dyn LifecycleListener>> {
        self.listeners.lock().clone()
    }

    /// Signal startup to every listener in registration order.
    ///
    /// Stops at the first failing listener and returns its error.
    pub async fn notify_started(&self) -> Result<(), SelectorError> {
        for listener in self.snapshot() {
            listener.application_started().await?;
        }
        Ok(())
    }

    pub fn notify_stopping(&self) {
        for listener in self.snapshot() {
            listener.application_stopping();
        }
    }
}

impl std::fmt::Debug for ApplicationLifetime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationLifetime")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
