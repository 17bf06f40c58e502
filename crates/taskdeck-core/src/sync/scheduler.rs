//! Timers that decide when a sync runs.
//!
//! Bursts of local edits are debounced into one sync, the remote blob is
//! polled on an interval, and connectivity transitions are tracked. Nothing
//! here surfaces errors to callers; failures are logged and reflected in the
//! published status by the orchestrator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::network::NetworkMonitor;
use super::orchestrator::{SyncOrchestrator, SyncOutcome};
use super::queue::ChangeQueue;
use super::status::SyncStatusHandle;
use crate::auth::AuthSessionManager;
use crate::models::SyncStatus;
use crate::remote::RemoteBackupClient;
use crate::store::SessionRepository;
use crate::{Error, Result};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);

const OFFLINE_MESSAGE: &str = "Offline: changes will sync when the connection returns";

/// Timer settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub enabled: bool,
    pub debounce: Duration,
    pub poll_interval: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce: DEFAULT_DEBOUNCE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

pub struct SyncScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    queue: Arc<ChangeQueue>,
    auth: Arc<AuthSessionManager>,
    remote: Arc<dyn RemoteBackupClient>,
    session: Arc<dyn SessionRepository>,
    network: Arc<NetworkMonitor>,
    status: SyncStatusHandle,
    settings: SchedulerSettings,
    // Generation of the armed debounce timer, 0 when none is armed
    armed: AtomicU64,
    generations: AtomicU64,
    debounce_timer: Mutex<Option<JoinHandle<()>>>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl SyncScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orchestrator: Arc<SyncOrchestrator>,
        queue: Arc<ChangeQueue>,
        auth: Arc<AuthSessionManager>,
        remote: Arc<dyn RemoteBackupClient>,
        session: Arc<dyn SessionRepository>,
        network: Arc<NetworkMonitor>,
        status: SyncStatusHandle,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            orchestrator,
            queue,
            auth,
            remote,
            session,
            network,
            status,
            settings,
            armed: AtomicU64::new(0),
            generations: AtomicU64::new(0),
            debounce_timer: Mutex::new(None),
            poller: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn settings(&self) -> SchedulerSettings {
        self.settings
    }

    /// Whether a debounced sync is waiting to run
    #[must_use]
    pub fn is_sync_pending(&self) -> bool {
        self.armed.load(Ordering::SeqCst) != 0
    }

    /// Sync runs only when enabled and a credential is stored.
    pub async fn is_sync_enabled(&self) -> bool {
        if !self.settings.enabled {
            return false;
        }
        match self.auth.get().await {
            Ok(credential) => credential.is_some(),
            Err(error) => {
                tracing::warn!("Could not read stored credential: {}", error);
                false
            }
        }
    }

    /// Start (or restart) the debounce timer.
    pub async fn schedule_debounced_sync(self: &Arc<Self>) {
        if !self.is_sync_enabled().await {
            return;
        }
        if !self.network.is_online() {
            self.status
                .set(SyncStatus::Offline, Some(OFFLINE_MESSAGE.to_string()));
            return;
        }

        let mut timer = self.debounce_timer.lock().await;
        if let Some(previous) = timer.take() {
            previous.abort();
        }
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        self.armed.store(generation, Ordering::SeqCst);

        let scheduler = Arc::clone(self);
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(scheduler.settings.debounce).await;
            // Detached so that restarting the timer never cancels a running sync
            let run = tokio::spawn(async move { scheduler.run_debounced(generation).await });
            if let Err(error) = run.await {
                tracing::warn!("Debounced sync task failed: {}", error);
            }
        }));
        tracing::debug!("Debounced sync scheduled in {:?}", self.settings.debounce);
    }

    async fn run_debounced(&self, generation: u64) {
        if self.network.is_online() {
            if let Err(error) = self.orchestrator.perform_sync().await {
                tracing::debug!("Debounced sync ended with error: {}", error);
            }
        } else {
            self.status
                .set(SyncStatus::Offline, Some(OFFLINE_MESSAGE.to_string()));
        }
        // A timer armed while this sync ran stays pending
        let _ = self
            .armed
            .compare_exchange(generation, 0, Ordering::SeqCst, Ordering::SeqCst);
    }

    /// Cancel a waiting debounce timer. A sync already running is not affected.
    pub async fn cancel_debounced_sync(&self) {
        if let Some(timer) = self.debounce_timer.lock().await.take() {
            timer.abort();
        }
        self.armed.store(0, Ordering::SeqCst);
    }

    /// Check the remote now and then on every poll interval.
    pub async fn start_remote_check_polling(self: &Arc<Self>) {
        self.stop_remote_check_polling().await;

        let scheduler: Weak<Self> = Arc::downgrade(self);
        let period = self.settings.poll_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(scheduler) = scheduler.upgrade() else {
                    break;
                };
                scheduler.poll_once().await;
            }
        });

        *self.poller.lock().await = Some(handle);
        tracing::info!("Remote polling started every {:?}", period);
    }

    pub async fn stop_remote_check_polling(&self) {
        if let Some(handle) = self.poller.lock().await.take() {
            handle.abort();
            tracing::info!("Remote polling stopped");
        }
    }

    async fn poll_once(self: &Arc<Self>) {
        // Sync in its own task so stopping the poller never cuts a sync short
        let scheduler = Arc::clone(self);
        let run = tokio::spawn(async move { scheduler.check_remote_once().await });
        match run.await {
            Ok(Ok(true)) => tracing::debug!("Remote poll triggered a sync"),
            Ok(Ok(false)) => tracing::debug!("Remote poll found nothing new"),
            Ok(Err(error)) => tracing::debug!("Remote poll failed: {}", error),
            Err(error) => tracing::warn!("Remote poll task failed: {}", error),
        }
    }

    /// Compare the remote modification time with the watermark and sync when
    /// the remote is newer. Returns whether a sync ran.
    pub async fn check_remote_once(&self) -> Result<bool> {
        if !self.network.is_online() || !self.is_sync_enabled().await {
            return Ok(false);
        }
        let Some(credential) = self.auth.get().await? else {
            return Ok(false);
        };

        let due = match self.remote.last_modified(&credential.access_token).await {
            Ok(remote_modified) => {
                let watermark = self.session.last_synced_at().await?;
                match (remote_modified, watermark) {
                    (Some(modified), Some(watermark)) => modified > watermark,
                    (Some(_), None) => true,
                    (None, _) => false,
                }
            }
            // The orchestrator owns refresh-and-retry
            Err(error) => {
                let error = Error::from(error);
                if !error.is_auth_expired() {
                    return Err(error);
                }
                true
            }
        };
        if !due {
            return Ok(false);
        }

        match self.orchestrator.try_perform_sync().await? {
            SyncOutcome::Completed(_) => Ok(true),
            SyncOutcome::Skipped => Ok(false),
        }
    }

    pub fn handle_offline(&self) {
        self.network.set_online(false);
        self.status
            .set(SyncStatus::Offline, Some(OFFLINE_MESSAGE.to_string()));
        tracing::info!("Connectivity lost");
    }

    pub async fn handle_online(self: &Arc<Self>) {
        self.network.set_online(true);
        if self.status.current().status == SyncStatus::Offline {
            self.status.set(SyncStatus::Idle, None);
        }
        tracing::info!("Connectivity restored");

        match self.queue.is_empty().await {
            Ok(false) => self.schedule_debounced_sync().await,
            Ok(true) => {}
            Err(error) => tracing::warn!("Could not read change queue: {}", error),
        }
    }

    /// Cancel every timer owned by the scheduler.
    pub async fn shutdown(&self) {
        self.cancel_debounced_sync().await;
        self.stop_remote_check_polling().await;
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.poller.get_mut().take() {
            handle.abort();
        }
        if let Some(handle) = self.debounce_timer.get_mut().take() {
            handle.abort();
        }
    }
}
