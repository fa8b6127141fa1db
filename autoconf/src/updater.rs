//! Periodic background refresh of a single autoconf URL.
use crate::client::Client;
use crate::error::AutoConfError;
use crate::fetch::FetchResponse;
use crate::metrics_defs::REFRESH_FAILURE;
use shared::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, sleep};
use tokio_util::sync::CancellationToken;

const BACKOFF_BASE: Duration = Duration::from_secs(60);
const BACKOFF_MAX_MINUTES: u64 = 24 * 60;

/// Delay before the next attempt after `failures` consecutive failures:
/// `2^failures` minutes, capped at 24 hours.
pub fn backoff_delay(failures: u32) -> Duration {
    if failures == 0 {
        return BACKOFF_BASE;
    }
    let minutes = 1u64
        .checked_shl(failures)
        .unwrap_or(u64::MAX)
        .min(BACKOFF_MAX_MINUTES);
    BACKOFF_BASE * minutes as u32
}

/// The configured interval, shortened to the document's `CacheTTL` when the
/// server recommends refreshing sooner.
pub fn effective_refresh_interval(configured: Duration, cache_ttl_secs: i64) -> Duration {
    if cache_ttl_secs > 0 {
        configured.min(Duration::from_secs(cache_ttl_secs as u64))
    } else {
        configured
    }
}

type VersionChangeFn = dyn Fn(i64, i64, &str) + Send + Sync;
type UpdateSuccessFn = dyn Fn(&FetchResponse) + Send + Sync;
type UpdateErrorFn = dyn Fn(&AutoConfError, u32, Duration) + Send + Sync;

#[derive(Clone, Default)]
struct Callbacks {
    on_version_change: Option<Arc<VersionChangeFn>>,
    on_update_success: Option<Arc<UpdateSuccessFn>>,
    on_update_error: Option<Arc<UpdateErrorFn>>,
}

#[derive(thiserror::Error, Debug)]
pub enum UpdaterError {
    #[error("background updater is already started")]
    AlreadyStarted,

    #[error("background updater is not running")]
    NotRunning,

    #[error("refresh failed: {0}")]
    Refresh(#[from] AutoConfError),
}

#[derive(Debug)]
pub enum Command {
    // Refresh now instead of waiting for the next tick. The worker replies
    // with the outcome once the fetch has finished.
    Refresh(oneshot::Sender<Result<FetchResponse, AutoConfError>>),
}

struct Running {
    cancel: CancellationToken,
    tx: mpsc::Sender<Command>,
    handle: JoinHandle<()>,
}

/// Keeps the cached document for one URL fresh.
///
/// All fetches, including on-demand refreshes, run on a single task so the
/// callbacks are never invoked concurrently.
pub struct BackgroundUpdater {
    client: Arc<Client>,
    url: String,
    refresh_interval: Duration,
    callbacks: Callbacks,
    running: Option<Running>,
}

impl BackgroundUpdater {
    pub fn new(client: Arc<Client>, url: impl Into<String>, refresh_interval: Duration) -> Self {
        BackgroundUpdater {
            client,
            url: url.into(),
            refresh_interval,
            callbacks: Callbacks::default(),
            running: None,
        }
    }

    /// Called with `(old_version, new_version, url)` when a fetch returns a
    /// document with a different version. The old version is 0 when nothing
    /// was cached before.
    pub fn on_version_change(mut self, f: impl Fn(i64, i64, &str) + Send + Sync + 'static) -> Self {
        self.callbacks.on_version_change = Some(Arc::new(f));
        self
    }

    pub fn on_update_success(mut self, f: impl Fn(&FetchResponse) + Send + Sync + 'static) -> Self {
        self.callbacks.on_update_success = Some(Arc::new(f));
        self
    }

    /// Called with the error, the consecutive failure count and the delay
    /// before the next attempt.
    pub fn on_update_error(
        mut self,
        f: impl Fn(&AutoConfError, u32, Duration) + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.on_update_error = Some(Arc::new(f));
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Spawns the refresh task. It stops when `stop` is called or `parent`
    /// is cancelled.
    pub fn start(&mut self, parent: &CancellationToken) -> Result<(), UpdaterError> {
        if self.running.is_some() {
            return Err(UpdaterError::AlreadyStarted);
        }

        let cancel = parent.child_token();
        let (tx, rx) = mpsc::channel::<Command>(8);
        let worker = Worker {
            client: self.client.clone(),
            url: self.url.clone(),
            refresh_interval: self.refresh_interval,
            callbacks: self.callbacks.clone(),
            failures: 0,
        };
        let handle = tokio::spawn(worker.run(cancel.clone(), rx));

        tracing::debug!(url = %self.url, "started autoconf background updater");
        self.running = Some(Running { cancel, tx, handle });
        Ok(())
    }

    /// Fetches immediately on the updater task and returns the outcome.
    pub async fn refresh(&self) -> Result<FetchResponse, UpdaterError> {
        let running = self.running.as_ref().ok_or(UpdaterError::NotRunning)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        running
            .tx
            .send(Command::Refresh(reply_tx))
            .await
            .map_err(|_| UpdaterError::NotRunning)?;
        let result = reply_rx.await.map_err(|_| UpdaterError::NotRunning)?;
        Ok(result?)
    }

    /// Cancels the task and waits for it to exit. Calling it again, or on an
    /// updater that was never started, does nothing.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.cancel.cancel();
        if let Err(e) = running.handle.await {
            tracing::error!(url = %self.url, "autoconf updater task failed: {e}");
        }
        tracing::debug!(url = %self.url, "stopped autoconf background updater");
    }
}

impl Drop for BackgroundUpdater {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.cancel.cancel();
        }
    }
}

struct Worker {
    client: Arc<Client>,
    url: String,
    refresh_interval: Duration,
    callbacks: Callbacks,
    failures: u32,
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

impl Worker {
    async fn run(mut self, cancel: CancellationToken, mut rx: mpsc::Receiver<Command>) {
        let mut period = self.refresh_interval;
        let mut ticks = ticker(period);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(url = %self.url, "autoconf updater shutting down");
                    return;
                }
                Some(command) = rx.recv() => match command {
                    Command::Refresh(reply) => {
                        let result = self.perform_update(&cancel).await;
                        if let Ok(response) = &result {
                            self.failures = 0;
                            let next = effective_refresh_interval(self.refresh_interval, response.document.cache_ttl);
                            if next != period {
                                period = next;
                                ticks = ticker(period);
                            }
                        }
                        let _ = reply.send(result);
                    }
                },
                _ = ticks.tick() => {
                    match self.perform_update(&cancel).await {
                        Ok(response) => {
                            if self.failures > 0 {
                                tracing::info!(url = %self.url, "autoconf refresh succeeded after {} failures", self.failures);
                                self.failures = 0;
                            }
                            let next = effective_refresh_interval(self.refresh_interval, response.document.cache_ttl);
                            if next != period {
                                tracing::debug!(url = %self.url, "autoconf refresh interval is now {next:?}");
                                period = next;
                                ticks = ticker(period);
                            }
                        }
                        Err(AutoConfError::Cancelled) => return,
                        Err(err) => {
                            self.failures += 1;
                            let delay = backoff_delay(self.failures);
                            counter!(REFRESH_FAILURE).increment(1);
                            tracing::warn!(
                                url = %self.url,
                                attempt = self.failures,
                                "autoconf refresh failed, retrying in {delay:?}: {err}"
                            );
                            if let Some(callback) = &self.callbacks.on_update_error {
                                callback(&err, self.failures, delay);
                            }

                            tokio::select! {
                                _ = cancel.cancelled() => return,
                                _ = sleep(delay) => {}
                            }
                            ticks = ticker(period);
                        }
                    }
                }
            }
        }
    }

    async fn perform_update(&self, cancel: &CancellationToken) -> Result<FetchResponse, AutoConfError> {
        let old_version = self
            .client
            .get_cached_only(&self.url)
            .map(|doc| doc.version)
            .unwrap_or(0);

        let response = self.client.refresh(&self.url, cancel).await?;

        if !response.from_cache && response.document.version != old_version {
            if old_version == 0 {
                tracing::info!(url = %self.url, "fetched autoconf version {}", response.document.version);
            } else {
                tracing::info!(
                    url = %self.url,
                    "fetched autoconf version {} (updated from {old_version})",
                    response.document.version
                );
            }
            if let Some(callback) = &self.callbacks.on_version_change {
                callback(old_version, response.document.version, &self.url);
            }
        }

        if let Some(callback) = &self.callbacks.on_update_success {
            callback(&response);
        }

        Ok(response)
    }
}
