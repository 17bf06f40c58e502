use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{SessionRepository, TaskStore};
use crate::auth::Credential;
use crate::models::{PendingChange, SyncConflict, SyncSessionState, TaskId, TaskRecord};
use crate::Result;

/// Task store held in memory, ordered by id.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<BTreeMap<TaskId, TaskRecord>>,
}

impl MemoryTaskStore {
    #[must_use]
    pub fn with_tasks(tasks: impl IntoIterator<Item = TaskRecord>) -> Self {
        Self {
            tasks: Mutex::new(tasks.into_iter().map(|task| (task.id, task)).collect()),
        }
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn list_all(&self) -> Result<Vec<TaskRecord>> {
        Ok(self.tasks.lock().await.values().cloned().collect())
    }

    async fn get(&self, id: &TaskId) -> Result<Option<TaskRecord>> {
        Ok(self.tasks.lock().await.get(id).cloned())
    }

    async fn put(&self, task: &TaskRecord) -> Result<()> {
        self.tasks.lock().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn replace_all(&self, tasks: &[TaskRecord]) -> Result<()> {
        *self.tasks.lock().await = tasks.iter().map(|task| (task.id, task.clone())).collect();
        Ok(())
    }
}

/// Session record held in memory.
#[derive(Debug, Default)]
pub struct MemorySessionRepository {
    state: Mutex<SyncSessionState>,
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn load_credential(&self) -> Result<Option<Credential>> {
        Ok(self.state.lock().await.credential.clone())
    }

    async fn save_credential(&self, credential: Option<&Credential>) -> Result<()> {
        self.state.lock().await.credential = credential.cloned();
        Ok(())
    }

    async fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.state.lock().await.last_synced_at)
    }

    async fn set_last_synced_at(&self, value: Option<DateTime<Utc>>) -> Result<()> {
        self.state.lock().await.last_synced_at = value;
        Ok(())
    }

    async fn append_pending_change(&self, change: &PendingChange) -> Result<()> {
        self.state.lock().await.pending_changes.push(change.clone());
        Ok(())
    }

    async fn list_pending_changes(&self) -> Result<Vec<PendingChange>> {
        Ok(self.state.lock().await.pending_changes.clone())
    }

    async fn clear_pending_changes(&self) -> Result<()> {
        self.state.lock().await.pending_changes.clear();
        Ok(())
    }

    async fn upsert_conflict(&self, conflict: &SyncConflict) -> Result<()> {
        let mut state = self.state.lock().await;
        match state
            .conflicts
            .iter_mut()
            .find(|existing| existing.task_id == conflict.task_id)
        {
            Some(existing) => *existing = conflict.clone(),
            None => state.conflicts.push(conflict.clone()),
        }
        Ok(())
    }

    async fn list_conflicts(&self) -> Result<Vec<SyncConflict>> {
        Ok(self.state.lock().await.conflicts.clone())
    }

    async fn get_conflict(&self, task_id: &TaskId) -> Result<Option<SyncConflict>> {
        Ok(self
            .state
            .lock()
            .await
            .conflicts
            .iter()
            .find(|conflict| conflict.task_id == *task_id)
            .cloned())
    }

    async fn remove_conflict(&self, task_id: &TaskId) -> Result<bool> {
        let mut state = self.state.lock().await;
        let before = state.conflicts.len();
        state.conflicts.retain(|conflict| conflict.task_id != *task_id);
        Ok(state.conflicts.len() != before)
    }

    async fn clear_conflicts(&self) -> Result<()> {
        self.state.lock().await.conflicts.clear();
        Ok(())
    }

    async fn load_state(&self) -> Result<SyncSessionState> {
        Ok(self.state.lock().await.clone())
    }
}
