//! Sync conflict model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::{TaskId, TaskRecord};

/// Unresolved conflict: both sides changed the task since the last reconciled sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflict {
    /// Task involved in the conflict
    pub task_id: TaskId,
    /// Local copy at detection time
    pub local_snapshot: TaskRecord,
    /// Remote copy at detection time
    pub remote_snapshot: TaskRecord,
    /// When the conflict was (last) detected
    pub detected_at: DateTime<Utc>,
}

/// Which side the user keeps when resolving a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictChoice {
    Local,
    Remote,
}

impl SyncConflict {
    /// Snapshot selected by `choice`
    #[must_use]
    pub const fn snapshot(&self, choice: ConflictChoice) -> &TaskRecord {
        match choice {
            ConflictChoice::Local => &self.local_snapshot,
            ConflictChoice::Remote => &self.remote_snapshot,
        }
    }

    /// Latest `updated_at` across both snapshots
    #[must_use]
    pub fn latest_updated_at(&self) -> DateTime<Utc> {
        self.local_snapshot
            .updated_at
            .max(self.remote_snapshot.updated_at)
    }
}
