//! Periodic polling selector
//!
//! Holds the currently published server certificate and keeps it fresh:
//! - the host's started signal performs one awaited fetch; its failure aborts startup
//! - afterwards a background task polls the source every interval
//! - a different certificate is swapped in atomically and announced via `on_update`
//! - failures keep the published certificate and are announced via `on_failure`
//!
//! `select()` is a lock-free load and safe to call from the TLS handshake path.

mod events;

pub use events::{CertificateUpdated, SelectorFailure};

use crate::certificate::ServerCertificate;
use crate::config::{self, ConfigError};
use crate::lifetime::{ApplicationLifetime, LifecycleListener};
use crate::source::{CertificateSource, SourceError};
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use events::{FailureObserver, UpdateObserver};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Errors produced while selecting a certificate
#[derive(Debug, Clone, Error)]
pub enum SelectorError {
    #[error("No usable certificate found in {0}")]
    NoUsableCertificate(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Certificate selector has not been started")]
    NotStarted,

    #[error("Certificate selector has been stopped")]
    Stopped,
}

/// Selector lifecycle; `Stopped` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorState {
    Uninitialized,
    Polling,
    Stopped,
}

/// Read side of a selector, as seen by the TLS stack
pub trait CertificateSelector: Send + Sync {
    /// Currently published certificate, `None` before the first successful fetch
    fn select(&self) -> Option<Arc<ServerCertificate>>;

    fn certificate_source(&self) -> &str;

    fn valid_certificates_only(&self) -> bool;
}

/// Selector that polls a [`CertificateSource`] on a fixed interval.
///
/// Cloning is cheap and every clone shares the same published certificate.
#[derive(Clone)]
pub struct PollingCertificateSelector {
    inner: Arc<SelectorInner>,
}

struct SelectorInner {
    source: Arc<dyn CertificateSource>,
    source_description: String,
    polling_interval: Duration,
    valid_certificates_only: bool,
    current: ArcSwapOption<ServerCertificate>,
    update_observers: RwLock<Vec<UpdateObserver>>,
    failure_observers: RwLock<Vec<FailureObserver>>,
    state: Mutex<SelectorState>,
    stop_tx: watch::Sender<bool>,
    // Serialises the initial fetch against polling ticks
    fetch_lock: tokio::sync::Mutex<()>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PollingCertificateSelector {
    /// Create a selector and register it with the host lifetime.
    ///
    /// Nothing is fetched until the lifetime signals that the host started.
    pub fn new(
        lifetime: &ApplicationLifetime,
        source: Arc<dyn CertificateSource>,
        polling_interval: Duration,
        valid_certificates_only: bool,
    ) -> Result<Self, ConfigError> {
        config::validate_polling_interval(polling_interval)?;

        let (stop_tx, _) = watch::channel(false);
        let selector = Self {
            inner: Arc::new(SelectorInner {
                source_description: source.describe(),
                source,
                polling_interval,
                valid_certificates_only,
                current: ArcSwapOption::empty(),
                update_observers: RwLock::new(Vec::new()),
                failure_observers: RwLock::new(Vec::new()),
                state: Mutex::new(SelectorState::Uninitialized),
                stop_tx,
                fetch_lock: tokio::sync::Mutex::new(()),
                task: Mutex::new(None),
            }),
        };

        lifetime.register(Arc::new(selector.clone()));

        tracing::debug!(
            source = %selector.inner.source_description,
            interval_secs = polling_interval.as_secs(),
            valid_only = valid_certificates_only,
            "Certificate selector created"
        );

        Ok(selector)
    }

    pub fn state(&self) -> SelectorState {
        *self.inner.state.lock()
    }

    pub fn polling_interval(&self) -> Duration {
        self.inner.polling_interval
    }

    /// Register a callback for certificate rotations.
    ///
    /// Observers run synchronously on the polling task, in registration order,
    /// after the new certificate is visible to `select()`. A slow observer
    /// delays the next tick by as long as it runs.
    pub fn on_update<F>(&self, observer: F)
    where
        F: Fn(&CertificateUpdated) + Send + Sync + 'static,
    {
        self.inner.update_observers.write().push(Arc::new(observer));
    }

    /// Register a callback for failed polls after startup.
    ///
    /// Runs synchronously on the polling task like `on_update` observers and
    /// delays the next tick the same way.
    pub fn on_failure<F>(&self, observer: F)
    where
        F: Fn(&SelectorFailure) + Send + Sync + 'static,
    {
        self.inner.failure_observers.write().push(Arc::new(observer));
    }

    /// Perform the initial fetch and begin polling.
    ///
    /// The initial fetch error is returned as-is and not reported to `on_failure`.
    pub async fn start(&self) -> Result<(), SelectorError> {
        match self.state() {
            SelectorState::Polling => return Ok(()),
            SelectorState::Stopped => return Err(SelectorError::Stopped),
            SelectorState::Uninitialized => {}
        }

        self.inner.refresh().await?;

        {
            let mut state = self.inner.state.lock();
            // Lost a race with another start, or stopped mid-fetch
            if *state != SelectorState::Uninitialized {
                return Ok(());
            }
            *state = SelectorState::Polling;
        }

        let handle = tokio::spawn(poll_loop(
            Arc::downgrade(&self.inner),
            self.inner.polling_interval,
            self.inner.stop_tx.subscribe(),
        ));
        *self.inner.task.lock() = Some(handle);

        tracing::info!(
            source = %self.inner.source_description,
            interval_secs = self.inner.polling_interval.as_secs(),
            "Certificate polling started"
        );
        Ok(())
    }

    /// Run one poll immediately, exactly as a timer tick would.
    ///
    /// Returns whether a new certificate was published. Failures are also
    /// reported to `on_failure`. Only available while polling; the first
    /// certificate is always published by `start()`. A poll already in flight
    /// is waited for rather than overlapped.
    pub async fn poll_now(&self) -> Result<bool, SelectorError> {
        match self.state() {
            SelectorState::Uninitialized => return Err(SelectorError::NotStarted),
            SelectorState::Stopped => return Err(SelectorError::Stopped),
            SelectorState::Polling => {}
        }
        self.inner.tick().await
    }

    /// Stop polling. An in-flight fetch completes but no new one is scheduled.
    pub fn stop(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state == SelectorState::Stopped {
                return;
            }
            *state = SelectorState::Stopped;
        }

        self.inner.stop_tx.send_replace(true);
        tracing::info!(source = %self.inner.source_description, "Certificate polling stopped");
    }

    /// Stop polling and wait for the background task to exit
    pub async fn shutdown(&self) {
        self.stop();
        let handle = self.inner.task.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::warn!("Certificate polling task ended abnormally: {}", e);
        }
    }
}

impl CertificateSelector for PollingCertificateSelector {
    fn select(&self) -> Option<Arc<ServerCertificate>> {
        self.inner.current.load_full()
    }

    fn certificate_source(&self) -> &str {
        &self.inner.source_description
    }

    fn valid_certificates_only(&self) -> bool {
        self.inner.valid_certificates_only
    }
}

#[async_trait]
impl LifecycleListener for PollingCertificateSelector {
    async fn application_started(&self) -> Result<(), SelectorError> {
        self.start().await
    }

    fn application_stopping(&self) {
        self.stop();
    }
}

impl std::fmt::Debug for PollingCertificateSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingCertificateSelector")
            .field("source", &self.inner.source_description)
            .field("polling_interval", &self.inner.polling_interval)
            .field("valid_certificates_only", &self.inner.valid_certificates_only)
            .field("state", &self.state())
            .finish()
    }
}

async fn poll_loop(
    inner: Weak<SelectorInner>,
    interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        if *stop_rx.borrow() {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            // Fires on stop, or when the sender is gone
            _ = stop_rx.changed() => break,
        }

        let Some(inner) = inner.upgrade() else {
            break;
        };

        // Failures are already reported by tick()
        let _ = inner.tick().await;

        if *inner.state.lock() == SelectorState::Stopped {
            break;
        }
    }

    tracing::debug!("Certificate polling loop exited");
}

impl SelectorInner {
    /// Fetch and publish if changed. Returns whether a new certificate was published.
    async fn refresh(&self) -> Result<bool, SelectorError> {
        let _guard = self.fetch_lock.lock().await;

        tracing::debug!(source = %self.source_description, "Polling certificate source");

        let latest = self
            .source
            .fetch_latest(self.valid_certificates_only)
            .await?
            .ok_or_else(|| SelectorError::NoUsableCertificate(self.source_description.clone()))?;

        let previous = self.current.load_full();
        if previous.as_deref() == Some(&latest) {
            tracing::debug!(source = %self.source_description, "No new certificate found");
            return Ok(false);
        }

        let latest = Arc::new(latest);
        self.current.store(Some(latest.clone()));

        match &previous {
            Some(previous) => tracing::info!(
                source = %self.source_description,
                previous = %previous,
                current = %latest,
                "Server certificate rotated"
            ),
            None => tracing::info!(
                source = %self.source_description,
                current = %latest,
                "Server certificate selected"
            ),
        }

        self.notify_update(&CertificateUpdated {
            certificate: latest,
            previous,
        });
        Ok(true)
    }

    /// A steady-state poll: failures are logged and reported, never propagated to the loop
    async fn tick(&self) -> Result<bool, SelectorError> {
        match self.refresh().await {
            Ok(updated) => Ok(updated),
            Err(error) => {
                tracing::warn!(
                    source = %self.source_description,
                    "Failed to refresh server certificate: {}", error
                );
                self.notify_failure(&SelectorFailure {
                    error: error.clone(),
                    certificate_source: self.source_description.clone(),
                });
                Err(error)
            }
        }
    }

    fn notify_update(&self, event: &CertificateUpdated) {
        let observers = self.update_observers.read().clone();
        for observer in observers {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| observer(event))) {
                tracing::error!(
                    source = %self.source_description,
                    "Certificate update observer panicked: {}",
                    panic_message(&*panic)
                );
            }
        }
    }

    fn notify_failure(&self, event: &SelectorFailure) {
        let observers = self.failure_observers.read().clone();
        for observer in observers {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| observer(event))) {
                tracing::error!(
                    source = %self.source_description,
                    "Certificate failure observer panicked: {}",
                    panic_message(&*panic)
                );
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
