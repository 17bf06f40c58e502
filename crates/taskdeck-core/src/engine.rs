//! Session object wiring the sync components together.
//!
//! One `SyncEngine` exists per local database. It is built explicitly with
//! [`SyncEngine::builder`] and shared through `Arc`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::auth::{
    AuthSessionManager, Credential, CredentialStore, SessionCredentialStore, TokenIssuer,
};
use crate::backup::RemoteBackupBlob;
use crate::clock::{Clock, SystemClock};
use crate::config::SyncSettings;
use crate::models::{
    ChangeKind, ConflictChoice, PendingChange, StatusReport, SyncConflict, SyncStatus, TaskId,
    TaskRecord,
};
use crate::remote::RemoteBackupClient;
use crate::store::{SessionRepository, TaskStore};
use crate::sync::{
    ChangeQueue, ConflictLedger, ConnectOutcome, FirstConnectCoordinator, FirstConnectSummary,
    MergeChoice, NetworkMonitor, SyncOrchestrator, SyncReport, SyncScheduler, SyncStatusHandle,
};
use crate::{Error, Result};

/// Builder for [`SyncEngine`]
#[derive(Default)]
pub struct SyncEngineBuilder {
    tasks: Option<Arc<dyn TaskStore>>,
    session: Option<Arc<dyn SessionRepository>>,
    remote: Option<Arc<dyn RemoteBackupClient>>,
    credentials: Option<Arc<dyn CredentialStore>>,
    issuer: Option<Arc<dyn TokenIssuer>>,
    clock: Option<Arc<dyn Clock>>,
    settings: SyncSettings,
    online: Option<bool>,
}

impl SyncEngineBuilder {
    #[must_use]
    pub fn task_store(mut self, tasks: Arc<dyn TaskStore>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    #[must_use]
    pub fn session_repository(mut self, session: Arc<dyn SessionRepository>) -> Self {
        self.session = Some(session);
        self
    }

    #[must_use]
    pub fn remote(mut self, remote: Arc<dyn RemoteBackupClient>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Defaults to plaintext storage in the session repository.
    #[must_use]
    pub fn credential_store(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    #[must_use]
    pub fn token_issuer(mut self, issuer: Arc<dyn TokenIssuer>) -> Self {
        self.issuer = Some(issuer);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Initial connectivity; defaults to online.
    #[must_use]
    pub const fn online(mut self, online: bool) -> Self {
        self.online = Some(online);
        self
    }

    pub async fn build(self) -> Result<SyncEngine> {
        let tasks = self
            .tasks
            .ok_or_else(|| Error::InvalidInput("sync engine needs a task store".to_string()))?;
        let session = self.session.ok_or_else(|| {
            Error::InvalidInput("sync engine needs a session repository".to_string())
        })?;
        let remote = self
            .remote
            .ok_or_else(|| Error::InvalidInput("sync engine needs a remote client".to_string()))?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let credentials = self.credentials.unwrap_or_else(|| {
            Arc::new(SessionCredentialStore::new(Arc::clone(&session)))
        });

        let auth = Arc::new(AuthSessionManager::new(credentials));
        if let Some(issuer) = self.issuer {
            auth.set_issuer(issuer).await;
        }

        let status = SyncStatusHandle::new();
        let network = Arc::new(NetworkMonitor::new(self.online.unwrap_or(true)));
        let queue = Arc::new(ChangeQueue::new(Arc::clone(&session), Arc::clone(&clock)));
        let conflicts = Arc::new(ConflictLedger::new(
            Arc::clone(&session),
            Arc::clone(&tasks),
            Arc::clone(&clock),
        ));
        let orchestrator = Arc::new(SyncOrchestrator::new(
            Arc::clone(&tasks),
            Arc::clone(&session),
            Arc::clone(&remote),
            Arc::clone(&auth),
            Arc::clone(&queue),
            Arc::clone(&conflicts),
            status.clone(),
            Arc::clone(&clock),
        ));
        let scheduler = Arc::new(SyncScheduler::new(
            Arc::clone(&orchestrator),
            Arc::clone(&queue),
            Arc::clone(&auth),
            Arc::clone(&remote),
            Arc::clone(&session),
            Arc::clone(&network),
            status.clone(),
            self.settings.scheduler(),
        ));
        let first_connect = FirstConnectCoordinator::new(
            Arc::clone(&tasks),
            Arc::clone(&session),
            Arc::clone(&remote),
            Arc::clone(&auth),
            Arc::clone(&orchestrator),
        );

        // Restore the visible state of the previous session
        let open_conflicts = conflicts.count().await?;
        if !network.is_online() {
            status.set(
                SyncStatus::Offline,
                Some("Offline: changes will sync when the connection returns".to_string()),
            );
        } else if open_conflicts > 0 {
            status.set(
                SyncStatus::Conflict,
                Some(format!("{open_conflicts} conflicting tasks need review")),
            );
        }

        tracing::info!("Sync engine ready");
        Ok(SyncEngine {
            tasks,
            session,
            remote,
            auth,
            queue,
            conflicts,
            orchestrator,
            scheduler,
            first_connect,
            status,
            clock,
            settings: self.settings,
        })
    }
}

/// Sync session for one local database.
pub struct SyncEngine {
    tasks: Arc<dyn TaskStore>,
    session: Arc<dyn SessionRepository>,
    remote: Arc<dyn RemoteBackupClient>,
    auth: Arc<AuthSessionManager>,
    queue: Arc<ChangeQueue>,
    conflicts: Arc<ConflictLedger>,
    orchestrator: Arc<SyncOrchestrator>,
    scheduler: Arc<SyncScheduler>,
    first_connect: FirstConnectCoordinator,
    status: SyncStatusHandle,
    clock: Arc<dyn Clock>,
    settings: SyncSettings,
}

impl SyncEngine {
    #[must_use]
    pub fn builder() -> SyncEngineBuilder {
        SyncEngineBuilder::default()
    }

    #[must_use]
    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    #[must_use]
    pub fn auth(&self) -> &AuthSessionManager {
        &self.auth
    }

    #[must_use]
    pub fn task_store(&self) -> &Arc<dyn TaskStore> {
        &self.tasks
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // -- status and derived counts -------------------------------------

    #[must_use]
    pub fn status(&self) -> StatusReport {
        self.status.current()
    }

    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<StatusReport> {
        self.status.subscribe()
    }

    pub async fn pending_change_count(&self) -> Result<usize> {
        self.queue.len().await
    }

    pub async fn pending_task_count(&self) -> Result<usize> {
        self.queue.pending_task_count().await
    }

    pub async fn pending_changes(&self) -> Result<Vec<PendingChange>> {
        self.queue.list().await
    }

    pub async fn conflict_count(&self) -> Result<usize> {
        self.conflicts.count().await
    }

    pub async fn conflicts(&self) -> Result<Vec<SyncConflict>> {
        self.conflicts.list().await
    }

    pub async fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>> {
        self.session.last_synced_at().await
    }

    pub async fn is_connected(&self) -> Result<bool> {
        Ok(self.auth.get().await?.is_some())
    }

    #[must_use]
    pub fn is_sync_pending(&self) -> bool {
        self.scheduler.is_sync_pending()
    }

    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.orchestrator.is_syncing()
    }

    // -- actions -------------------------------------------------------

    /// Record a local mutation and schedule a debounced sync.
    ///
    /// Called by the task CRUD layer after every create, update or delete.
    /// Waits for a sync in flight so the entry is not cleared unsent.
    pub async fn track_change(
        &self,
        task_id: TaskId,
        kind: ChangeKind,
        snapshot: Option<TaskRecord>,
    ) -> Result<PendingChange> {
        let change = self
            .orchestrator
            .exclusive(|| self.queue.enqueue(task_id, kind, snapshot))
            .await?;
        self.scheduler.schedule_debounced_sync().await;
        Ok(change)
    }

    /// Write `task` to the local store and track the change.
    pub async fn save_task(&self, task: &TaskRecord, kind: ChangeKind) -> Result<PendingChange> {
        let change = self
            .orchestrator
            .exclusive(|| self.put_and_enqueue(task, kind))
            .await?;
        self.scheduler.schedule_debounced_sync().await;
        Ok(change)
    }

    async fn put_and_enqueue(&self, task: &TaskRecord, kind: ChangeKind) -> Result<PendingChange> {
        self.tasks.put(task).await?;
        self.queue.enqueue(task.id, kind, Some(task.clone())).await
    }

    pub async fn perform_sync(&self) -> Result<SyncReport> {
        self.orchestrator.perform_sync().await
    }

    pub async fn schedule_sync(&self) {
        self.scheduler.schedule_debounced_sync().await;
    }

    /// Keep one side of a conflict and push the choice with the next sync.
    /// Runs after any sync in flight so that pass cannot overwrite the choice.
    pub async fn resolve_conflict(
        &self,
        task_id: &TaskId,
        choice: ConflictChoice,
    ) -> Result<Option<TaskRecord>> {
        let resolved = self
            .orchestrator
            .exclusive(|| self.resolve_and_enqueue(task_id, choice))
            .await?;
        let Some(resolved) = resolved else {
            return Ok(None);
        };
        self.scheduler.schedule_debounced_sync().await;
        Ok(Some(resolved))
    }

    async fn resolve_and_enqueue(
        &self,
        task_id: &TaskId,
        choice: ConflictChoice,
    ) -> Result<Option<TaskRecord>> {
        let Some(resolved) = self.conflicts.resolve(task_id, choice).await? else {
            return Ok(None);
        };
        self.queue
            .enqueue(resolved.id, ChangeKind::Update, Some(resolved.clone()))
            .await?;

        if self.conflicts.count().await? == 0 && self.status().status == SyncStatus::Conflict {
            self.status.set(SyncStatus::Idle, None);
        }
        Ok(Some(resolved))
    }

    /// Store a freshly acquired credential and run the first-connect flow.
    pub async fn connect(&self, credential: &Credential) -> Result<ConnectOutcome> {
        self.first_connect.on_authenticated(credential).await
    }

    pub async fn pending_first_connect(&self) -> Option<FirstConnectSummary> {
        self.first_connect.pending_decision().await
    }

    pub async fn apply_first_connect_decision(&self, choice: MergeChoice) -> Result<SyncReport> {
        self.first_connect.apply_decision(choice).await
    }

    /// Forget the credential, the watermark and outstanding conflicts.
    /// Pending local changes are kept for the next connection.
    pub async fn disconnect(&self) -> Result<()> {
        self.scheduler.shutdown().await;
        self.first_connect.discard().await;
        self.orchestrator.exclusive(|| self.forget_session()).await?;
        self.status.set(SyncStatus::Idle, None);
        tracing::info!("Disconnected from remote backup");
        Ok(())
    }

    async fn forget_session(&self) -> Result<()> {
        self.auth.clear().await?;
        self.session.set_last_synced_at(None).await?;
        self.conflicts.clear().await
    }

    /// Delete the remote blob and reset the watermark.
    pub async fn delete_remote_backup(&self) -> Result<()> {
        self.orchestrator
            .exclusive(|| self.delete_remote_and_reset())
            .await?;
        tracing::info!("Deleted remote backup");
        Ok(())
    }

    async fn delete_remote_and_reset(&self) -> Result<()> {
        let credential = self.auth.get().await?.ok_or(Error::NotAuthenticated)?;
        self.remote.delete(&credential.access_token).await?;
        self.session.set_last_synced_at(None).await
    }

    /// Snapshot of every local record as a verified backup blob.
    pub async fn export_backup(&self) -> Result<RemoteBackupBlob> {
        RemoteBackupBlob::from_tasks(self.tasks.list_all().await?, self.clock.now())
    }

    /// Replace local records with a backup file.
    ///
    /// The checksum is verified before anything is written; a mismatch leaves
    /// the store untouched. Every imported record is queued as an update.
    /// Returns the number of imported records.
    pub async fn import_backup(&self, raw: &str) -> Result<usize> {
        let blob = RemoteBackupBlob::from_json(raw)?;
        self.orchestrator
            .exclusive(|| self.replace_and_enqueue(&blob.tasks))
            .await?;
        tracing::info!("Imported {} tasks from backup", blob.tasks.len());
        self.scheduler.schedule_debounced_sync().await;
        Ok(blob.tasks.len())
    }

    async fn replace_and_enqueue(&self, tasks: &[TaskRecord]) -> Result<()> {
        self.tasks.replace_all(tasks).await?;
        for task in tasks {
            self.queue
                .enqueue(task.id, ChangeKind::Update, Some(task.clone()))
                .await?;
        }
        Ok(())
    }

    // -- timers and connectivity ---------------------------------------

    pub async fn start_polling(&self) {
        self.scheduler.start_remote_check_polling().await;
    }

    pub async fn stop_polling(&self) {
        self.scheduler.stop_remote_check_polling().await;
    }

    pub async fn check_remote(&self) -> Result<bool> {
        self.scheduler.check_remote_once().await
    }

    pub fn handle_offline(&self) {
        self.scheduler.handle_offline();
    }

    pub async fn handle_online(&self) {
        self.scheduler.handle_online().await;
    }

    /// Stop every timer. Pending state stays persisted.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}
