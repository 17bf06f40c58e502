//! Two-way reconciliation of the local task set against the remote blob.
//!
//! A sync downloads the whole blob, resolves every task id from either side,
//! applies remote winners locally, and then either records conflicts (leaving
//! the remote untouched) or uploads one merged replacement blob. The upload
//! is the only remote write.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::conflicts::ConflictLedger;
use super::queue::ChangeQueue;
use super::status::SyncStatusHandle;
use crate::auth::{AuthSessionManager, Credential};
use crate::backup::RemoteBackupBlob;
use crate::clock::Clock;
use crate::merge::{self, MergeDecision};
use crate::models::{SyncConflict, SyncStatus, TaskId, TaskRecord};
use crate::remote::RemoteBackupClient;
use crate::store::{SessionRepository, TaskStore};
use crate::{Error, Result};

/// Counts produced by one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Tasks whose local copy was missing or older remotely
    pub uploaded_count: usize,
    /// Tasks written locally from the remote blob
    pub downloaded_count: usize,
    /// Conflicts detected in this pass
    pub conflicts: usize,
    /// Size of the merged task set
    pub merged_count: usize,
    /// Whether a replacement blob was uploaded
    pub uploaded_blob: bool,
}

impl SyncReport {
    #[must_use]
    pub const fn has_conflicts(&self) -> bool {
        self.conflicts > 0
    }
}

/// Result of a sync trigger that may be skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another sync was already running
    Skipped,
}

pub struct SyncOrchestrator {
    tasks: Arc<dyn TaskStore>,
    session: Arc<dyn SessionRepository>,
    remote: Arc<dyn RemoteBackupClient>,
    auth: Arc<AuthSessionManager>,
    queue: Arc<ChangeQueue>,
    conflicts: Arc<ConflictLedger>,
    status: SyncStatusHandle,
    clock: Arc<dyn Clock>,
    gate: Mutex<()>,
}

impl SyncOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        session: Arc<dyn SessionRepository>,
        remote: Arc<dyn RemoteBackupClient>,
        auth: Arc<AuthSessionManager>,
        queue: Arc<ChangeQueue>,
        conflicts: Arc<ConflictLedger>,
        status: SyncStatusHandle,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tasks,
            session,
            remote,
            auth,
            queue,
            conflicts,
            status,
            clock,
            gate: Mutex::new(()),
        }
    }

    /// Run a full sync, waiting for any sync already in flight.
    pub async fn perform_sync(&self) -> Result<SyncReport> {
        let _gate = self.gate.lock().await;
        self.with_auth_retry(|| self.reconcile()).await
    }

    /// Run a full sync unless one is already in flight.
    pub async fn try_perform_sync(&self) -> Result<SyncOutcome> {
        let Ok(_gate) = self.gate.try_lock() else {
            tracing::debug!("Sync already in flight; skipping trigger");
            return Ok(SyncOutcome::Skipped);
        };
        self.with_auth_retry(|| self.reconcile())
            .await
            .map(SyncOutcome::Completed)
    }

    /// Discard local data and adopt the remote blob wholesale.
    pub async fn replace_local_with_remote(&self) -> Result<SyncReport> {
        let _gate = self.gate.lock().await;
        self.with_auth_retry(|| self.adopt_remote()).await
    }

    /// Discard the remote blob and upload the local set wholesale.
    pub async fn replace_remote_with_local(&self) -> Result<SyncReport> {
        let _gate = self.gate.lock().await;
        self.with_auth_retry(|| self.adopt_local()).await
    }

    /// Run `operation` with the sync gate held, so local writes never land
    /// between the reads and writes of a reconciliation pass.
    pub async fn exclusive<F, Fut, T>(&self, operation: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _gate = self.gate.lock().await;
        operation().await
    }

    /// Whether a sync currently holds the gate
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.gate.try_lock().is_err()
    }

    /// Run `operation`, retrying once after a silent refresh when the
    /// provider rejects the credential. Classifies the final failure into
    /// the published status.
    async fn with_auth_retry<'a, F, Fut>(&'a self, operation: F) -> Result<SyncReport>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<SyncReport>> + 'a,
    {
        let mut is_retry = false;
        loop {
            let error = match operation().await {
                Ok(report) => return Ok(report),
                Err(error) => error,
            };

            if !is_retry && error.is_auth_expired() {
                match self.auth.refresh_silently().await {
                    Ok(_) => {
                        tracing::info!("Retrying sync with refreshed credential");
                        is_retry = true;
                        continue;
                    }
                    Err(refresh_error) => {
                        tracing::warn!("Could not refresh credential: {}", refresh_error);
                    }
                }
            }

            self.report_failure(&error);
            return Err(error);
        }
    }

    fn report_failure(&self, error: &Error) {
        if error.is_network_unavailable() {
            tracing::warn!("Sync deferred while offline: {}", error);
            self.status.set(
                SyncStatus::Offline,
                Some("Offline: changes will sync when the connection returns".to_string()),
            );
        } else {
            tracing::warn!("Sync failed: {}", error);
            self.status.set(SyncStatus::Error, Some(error.to_string()));
        }
    }

    async fn credential(&self) -> Result<Credential> {
        self.auth.get().await?.ok_or(Error::NotAuthenticated)
    }

    async fn download_verified(&self, credential: &Credential) -> Result<Option<RemoteBackupBlob>> {
        let Some(blob) = self.remote.download(&credential.access_token).await? else {
            return Ok(None);
        };
        blob.verify()?;
        Ok(Some(blob))
    }

    async fn advance_watermark(&self) -> Result<DateTime<Utc>> {
        let now = self.clock.now();
        self.session.set_last_synced_at(Some(now)).await?;
        Ok(now)
    }

    async fn reconcile(&self) -> Result<SyncReport> {
        let credential = self.credential().await?;
        self.status.set(SyncStatus::Syncing, None);

        let local = index_by_id(self.tasks.list_all().await?);
        let remote = index_by_id(
            self.download_verified(&credential)
                .await?
                .map(|blob| blob.tasks)
                .unwrap_or_default(),
        );
        let watermark = self.session.last_synced_at().await?;
        let detected_at = self.clock.now();

        let ids: BTreeSet<TaskId> = local.keys().chain(remote.keys()).copied().collect();
        let mut report = SyncReport::default();
        let mut merged = Vec::with_capacity(ids.len());
        let mut conflicts = Vec::new();

        for id in ids {
            let resolution = merge::resolve(id, local.get(&id), remote.get(&id), watermark)?;
            match resolution.decision {
                MergeDecision::KeepLocal => report.uploaded_count += 1,
                MergeDecision::KeepRemote => {
                    self.tasks.put(&resolution.winner).await?;
                    report.downloaded_count += 1;
                }
                MergeDecision::Conflict => {
                    if let Some(remote_snapshot) = resolution.conflicting.clone() {
                        conflicts.push(SyncConflict {
                            task_id: id,
                            local_snapshot: resolution.winner.clone(),
                            remote_snapshot,
                            detected_at,
                        });
                    }
                }
                MergeDecision::NoChange => {}
            }
            merged.push(resolution.winner);
        }
        report.merged_count = merged.len();

        if !conflicts.is_empty() {
            report.conflicts = conflicts.len();
            self.conflicts.upsert_all(&conflicts).await?;
            tracing::info!(
                "Sync paused: {} conflicts need review ({} downloaded)",
                report.conflicts,
                report.downloaded_count
            );
            self.status.set(
                SyncStatus::Conflict,
                Some(format!("{} conflicting tasks need review", report.conflicts)),
            );
            return Ok(report);
        }

        let blob = RemoteBackupBlob::from_tasks(merged, self.clock.now())?;
        self.remote.upload(&credential.access_token, &blob).await?;
        report.uploaded_blob = true;

        self.queue.clear().await?;
        self.advance_watermark().await?;

        tracing::info!(
            "Sync complete: {} uploaded, {} downloaded, {} tasks total",
            report.uploaded_count,
            report.downloaded_count,
            report.merged_count
        );
        self.status.set(SyncStatus::Synced, None);
        Ok(report)
    }

    async fn adopt_remote(&self) -> Result<SyncReport> {
        let credential = self.credential().await?;
        self.status.set(SyncStatus::Syncing, None);

        let blob = self
            .download_verified(&credential)
            .await?
            .ok_or_else(|| Error::NotFound("remote backup".to_string()))?;

        self.tasks.replace_all(&blob.tasks).await?;
        self.queue.clear().await?;
        self.conflicts.clear().await?;
        self.advance_watermark().await?;

        tracing::info!("Replaced local tasks with {} remote tasks", blob.tasks.len());
        self.status.set(SyncStatus::Synced, None);
        Ok(SyncReport {
            downloaded_count: blob.tasks.len(),
            merged_count: blob.tasks.len(),
            ..SyncReport::default()
        })
    }

    async fn adopt_local(&self) -> Result<SyncReport> {
        let credential = self.credential().await?;
        self.status.set(SyncStatus::Syncing, None);

        let blob = RemoteBackupBlob::from_tasks(self.tasks.list_all().await?, self.clock.now())?;
        self.remote.upload(&credential.access_token, &blob).await?;
        self.queue.clear().await?;
        self.conflicts.clear().await?;
        self.advance_watermark().await?;

        tracing::info!("Replaced remote backup with {} local tasks", blob.tasks.len());
        self.status.set(SyncStatus::Synced, None);
        Ok(SyncReport {
            uploaded_count: blob.tasks.len(),
            merged_count: blob.tasks.len(),
            uploaded_blob: true,
            ..SyncReport::default()
        })
    }
}

fn index_by_id(tasks: Vec<TaskRecord>) -> BTreeMap<TaskId, TaskRecord> {
    tasks.into_iter().map(|task| (task.id, task)).collect()
}
