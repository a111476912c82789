//! The supervising re-arm loop.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use tablestream_core::errors::{Error, Result};
use tablestream_core::notify::{
    Backoff, ChangeCallback, ChangeNotifier, Debouncer, ListenRequest, DEFAULT_DEBOUNCE,
};

use crate::driver::{
    registration_query, SessionOptions, SubscriptionDriver, SubscriptionNotice,
    SubscriptionSession,
};
use crate::enablement::BrokerEnablement;

/// Configuration for [`SubscriptionChangeNotifier`].
#[derive(Clone)]
pub struct SubscriptionOptions {
    debounce: Duration,
    rearm_delay: Duration,
    backoff_base: Duration,
    backoff_cap: Duration,
    enablement: Arc<BrokerEnablement>,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionOptions {
    pub fn new() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            rearm_delay: Duration::from_millis(100),
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
            enablement: BrokerEnablement::global(),
        }
    }

    pub fn debounce(mut self, interval: Duration) -> Self {
        self.debounce = interval;
        self
    }

    /// Fixed delay between a delivered notification and the re-subscription.
    pub fn rearm_delay(mut self, delay: Duration) -> Self {
        self.rearm_delay = delay;
        self
    }

    pub fn backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_cap = cap;
        self
    }

    /// Injects a broker-enablement state instead of the process default.
    pub fn enablement(mut self, enablement: Arc<BrokerEnablement>) -> Self {
        self.enablement = enablement;
        self
    }
}

/// Drives one-shot dependency subscriptions behind the uniform
/// [`ChangeNotifier`] contract.
///
/// A single supervising task per notifier arms a subscription, waits for the
/// one notification it will deliver, classifies it, and re-arms after a short
/// fixed delay. Repeated arming failures back off proportionally to the
/// consecutive-failure count, capped, retrying until cancelled. The session's
/// connection never executes two commands concurrently: all session use goes
/// through a single-slot semaphore, so overlapping re-subscribe attempts
/// collapse into one.
pub struct SubscriptionChangeNotifier<D: SubscriptionDriver + 'static> {
    driver: Arc<D>,
    options: SubscriptionOptions,
    stop_tx: watch::Sender<bool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl<D: SubscriptionDriver + 'static> SubscriptionChangeNotifier<D> {
    pub fn new(driver: Arc<D>, options: SubscriptionOptions) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            driver,
            options,
            stop_tx,
            supervisor: Mutex::new(None),
        }
    }

    async fn join_supervisor(&self) {
        let task = self.supervisor.lock().unwrap().take();
        if let Some(task) = task {
            if task.await.is_err() {
                warn!("Subscription supervisor ended abnormally");
            }
        }
    }
}

#[async_trait]
impl<D: SubscriptionDriver + 'static> ChangeNotifier for SubscriptionChangeNotifier<D> {
    async fn start_listening(
        &self,
        request: ListenRequest,
        on_changed: ChangeCallback,
        cancel: watch::Receiver<bool>,
    ) -> Result<()> {
        // Fail fast on a select-* registration before touching the backend.
        let query = registration_query(&request).map_err(Error::Setup)?;

        // Starting again replaces any previous supervisor.
        self.stop_tx.send_replace(true);
        self.join_supervisor().await;
        self.stop_tx.send_replace(false);

        let stop_rx = self.stop_tx.subscribe();
        let task = tokio::spawn(supervise(
            Arc::clone(&self.driver),
            self.options.clone(),
            query,
            on_changed,
            cancel,
            stop_rx,
        ));
        *self.supervisor.lock().unwrap() = Some(task);
        Ok(())
    }

    async fn stop_listening(&self) {
        self.stop_tx.send_replace(true);
        self.join_supervisor().await;
    }
}

impl<D: SubscriptionDriver + 'static> Drop for SubscriptionChangeNotifier<D> {
    fn drop(&mut self) {
        if let Some(task) = self.supervisor.get_mut().unwrap().take() {
            task.abort();
        }
    }
}

/// Opens the session on first use and arms one subscription.
async fn arm<D: SubscriptionDriver>(
    driver: &D,
    session: &mut Option<D::Session>,
    query: &str,
) -> std::result::Result<(), crate::driver::DriverError> {
    if session.is_none() {
        *session = Some(driver.open_session(&SessionOptions::required()).await?);
    }
    match session.as_mut() {
        Some(active) => active.register(query).await,
        None => Ok(()),
    }
}

async fn supervise<D: SubscriptionDriver>(
    driver: Arc<D>,
    options: SubscriptionOptions,
    query: String,
    on_changed: ChangeCallback,
    mut cancel: watch::Receiver<bool>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let backend = driver.backend_name().to_string();
    let database = driver.database_name().to_string();

    // The enablement check runs at most once per (backend, database) pair
    // per process; a failed attempt is only ever logged afterwards.
    if options.enablement.claim_attempt(&backend, &database) {
        match driver.enable_broker().await {
            Ok(()) => {
                options.enablement.record_outcome(&backend, &database, true);
                info!("Enabled message broker for {}/{}", backend, database);
            }
            Err(error) => {
                options.enablement.record_outcome(&backend, &database, false);
                warn!(
                    "Could not enable message broker for {}/{}: {}; notifications may be unavailable",
                    backend, database, error
                );
            }
        }
    } else if !options.enablement.is_enabled(&backend, &database) {
        debug!(
            "Message broker for {}/{} was previously reported disabled",
            backend, database
        );
    }

    let gate = Semaphore::new(1);
    let debouncer = Debouncer::new(options.debounce);
    let mut backoff = Backoff::proportional(options.backoff_base, options.backoff_cap);
    let mut session: Option<D::Session> = None;

    'supervise: loop {
        if *cancel.borrow() || *stop_rx.borrow() {
            break;
        }

        // The session connection cannot tolerate concurrent command
        // execution; overlapping re-subscribe attempts collapse on the gate.
        let armed = match gate.acquire().await {
            Ok(_permit) => arm(&*driver, &mut session, &query).await,
            Err(_) => break,
        };

        if let Err(error) = armed {
            session = None;
            let delay = backoff.next_delay();
            warn!("Failed to arm subscription ({}); retrying in {:?}", error, delay);
            tokio::select! {
                _ = sleep(delay) => continue 'supervise,
                _ = cancel.wait_for(|stop| *stop) => break 'supervise,
                _ = stop_rx.wait_for(|stop| *stop) => break 'supervise,
            }
        }
        backoff.reset();

        let active = match session.as_mut() {
            Some(active) => active,
            None => continue,
        };
        let notice = tokio::select! {
            notice = active.wait_notice() => notice,
            _ = cancel.wait_for(|stop| *stop) => break 'supervise,
            _ = stop_rx.wait_for(|stop| *stop) => break 'supervise,
        };

        match notice {
            Ok(SubscriptionNotice::DataChange) => {
                if debouncer.accept() {
                    on_changed();
                }
            }
            Ok(SubscriptionNotice::BackendError(detail)) => {
                warn!("Subscription delivered a backend error: {}", detail);
            }
            Ok(SubscriptionNotice::Invalid(detail)) => {
                warn!("Subscription was invalid: {}", detail);
            }
            Err(error) => {
                warn!("Waiting for notification failed: {}", error);
                session = None;
            }
        }

        // One-shot semantics: whatever the classification, the delivered
        // subscription is spent. Re-arm after a short fixed delay.
        tokio::select! {
            _ = sleep(options.rearm_delay) => {}
            _ = cancel.wait_for(|stop| *stop) => break,
            _ = stop_rx.wait_for(|stop| *stop) => break,
        }
    }

    if let Some(mut active) = session.take() {
        if let Ok(_permit) = gate.acquire().await {
            active.close().await;
        }
    }
    debug!("Subscription supervisor for {}/{} ended", backend, database);
}
