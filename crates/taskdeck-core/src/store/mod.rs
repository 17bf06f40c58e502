//! Storage seams used by the sync engine.

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::auth::Credential;
use crate::models::{PendingChange, SyncConflict, SyncSessionState, TaskId, TaskRecord};
use crate::Result;

pub use memory::{MemorySessionRepository, MemoryTaskStore};

/// Local task collection owned by the CRUD layer.
///
/// The engine reads every record and conditionally overwrites single records;
/// tombstone purging is the store's own business.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// All records including tombstones
    async fn list_all(&self) -> Result<Vec<TaskRecord>>;

    async fn get(&self, id: &TaskId) -> Result<Option<TaskRecord>>;

    /// Insert or overwrite a record by id
    async fn put(&self, task: &TaskRecord) -> Result<()>;

    /// Replace the whole collection in one step
    async fn replace_all(&self, tasks: &[TaskRecord]) -> Result<()>;
}

/// Persistence for the single sync session record.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn load_credential(&self) -> Result<Option<Credential>>;

    async fn save_credential(&self, credential: Option<&Credential>) -> Result<()>;

    async fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>>;

    async fn set_last_synced_at(&self, value: Option<DateTime<Utc>>) -> Result<()>;

    async fn append_pending_change(&self, change: &PendingChange) -> Result<()>;

    /// Pending changes in queue order
    async fn list_pending_changes(&self) -> Result<Vec<PendingChange>>;

    async fn clear_pending_changes(&self) -> Result<()>;

    /// Insert a conflict or overwrite the one already recorded for its task
    async fn upsert_conflict(&self, conflict: &SyncConflict) -> Result<()>;

    async fn list_conflicts(&self) -> Result<Vec<SyncConflict>>;

    async fn get_conflict(&self, task_id: &TaskId) -> Result<Option<SyncConflict>>;

    /// Returns whether a conflict was removed
    async fn remove_conflict(&self, task_id: &TaskId) -> Result<bool>;

    async fn clear_conflicts(&self) -> Result<()>;

    /// Snapshot of the whole session record
    async fn load_state(&self) -> Result<SyncSessionState> {
        Ok(SyncSessionState {
            credential: self.load_credential().await?,
            last_synced_at: self.last_synced_at().await?,
            pending_changes: self.list_pending_changes().await?,
            conflicts: self.list_conflicts().await?,
        })
    }
}
