//! Decision point on the first successful authentication.
//!
//! When this device and the remote both hold data and have never been
//! reconciled, no sync runs until the caller picks a [`MergeChoice`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::orchestrator::{SyncOrchestrator, SyncReport};
use crate::auth::{AuthSessionManager, Credential};
use crate::remote::RemoteBackupClient;
use crate::store::{SessionRepository, TaskStore};
use crate::{Error, Result};

/// What the user is shown before choosing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirstConnectSummary {
    /// Non-tombstoned local tasks
    pub local_task_count: usize,
    /// Non-tombstoned tasks in the remote blob
    pub remote_task_count: usize,
    pub remote_exported_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeChoice {
    /// Regular two-way sync
    Merge,
    /// Replace local tasks with the remote blob
    UseRemote,
    /// Replace the remote blob with local tasks
    UseLocal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Both sides hold data; call `apply_decision`
    DecisionRequired(FirstConnectSummary),
    /// A regular sync ran
    Synced(SyncReport),
}

pub struct FirstConnectCoordinator {
    tasks: Arc<dyn TaskStore>,
    session: Arc<dyn SessionRepository>,
    remote: Arc<dyn RemoteBackupClient>,
    auth: Arc<AuthSessionManager>,
    orchestrator: Arc<SyncOrchestrator>,
    pending: Mutex<Option<FirstConnectSummary>>,
}

impl FirstConnectCoordinator {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        session: Arc<dyn SessionRepository>,
        remote: Arc<dyn RemoteBackupClient>,
        auth: Arc<AuthSessionManager>,
        orchestrator: Arc<SyncOrchestrator>,
    ) -> Self {
        Self {
            tasks,
            session,
            remote,
            auth,
            orchestrator,
            pending: Mutex::new(None),
        }
    }

    /// Store `credential` and either sync or ask for a decision.
    pub async fn on_authenticated(&self, credential: &Credential) -> Result<ConnectOutcome> {
        self.auth.store(credential).await?;

        let local_task_count = self
            .tasks
            .list_all()
            .await?
            .iter()
            .filter(|task| !task.is_deleted())
            .count();
        let ever_synced = self.session.last_synced_at().await?.is_some();

        if local_task_count > 0 && !ever_synced {
            if let Some(blob) = self.remote.download(&credential.access_token).await? {
                blob.verify()?;
                let summary = FirstConnectSummary {
                    local_task_count,
                    remote_task_count: blob.live_task_count(),
                    remote_exported_at: Some(blob.export_timestamp),
                };
                tracing::info!(
                    "First connect found {} local and {} remote tasks; waiting for a decision",
                    summary.local_task_count,
                    summary.remote_task_count
                );
                *self.pending.lock().await = Some(summary.clone());
                return Ok(ConnectOutcome::DecisionRequired(summary));
            }
        }

        self.orchestrator
            .perform_sync()
            .await
            .map(ConnectOutcome::Synced)
    }

    /// Decision currently waiting, if any
    pub async fn pending_decision(&self) -> Option<FirstConnectSummary> {
        self.pending.lock().await.clone()
    }

    /// Apply the user's choice. The pending decision is kept if the choice
    /// fails so it can be retried.
    pub async fn apply_decision(&self, choice: MergeChoice) -> Result<SyncReport> {
        let mut pending = self.pending.lock().await;
        let Some(summary) = pending.take() else {
            return Err(Error::InvalidInput(
                "no first-connect decision is pending".to_string(),
            ));
        };

        let result = match choice {
            MergeChoice::Merge => self.orchestrator.perform_sync().await,
            MergeChoice::UseRemote => self.orchestrator.replace_local_with_remote().await,
            MergeChoice::UseLocal => self.orchestrator.replace_remote_with_local().await,
        };

        if result.is_err() {
            *pending = Some(summary);
        }
        result
    }

    /// Forget a pending decision (disconnect)
    pub async fn discard(&self) {
        self.pending.lock().await.take();
    }
}
