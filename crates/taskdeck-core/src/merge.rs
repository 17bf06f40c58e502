//! Per-task merge decisions.
//!
//! The resolver is a pure function of the two snapshots and the watermark
//! (`last_synced_at`). It never touches storage.

use chrono::{DateTime, Utc};

use crate::models::{TaskId, TaskRecord};
use crate::{Error, Result};

/// Outcome category for a single task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    /// Local copy wins and will be uploaded
    KeepLocal,
    /// Remote copy wins and is written locally
    KeepRemote,
    /// Both sides changed since the watermark
    Conflict,
    /// Both sides carry the same `updated_at`
    NoChange,
}

/// Decision plus the snapshots it refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResolution {
    pub task_id: TaskId,
    pub decision: MergeDecision,
    /// Snapshot that belongs in the merged set. For conflicts this is the
    /// local copy, which stays in place until the user resolves it.
    pub winner: TaskRecord,
    /// Remote snapshot when `decision` is `Conflict`
    pub conflicting: Option<TaskRecord>,
}

/// Decide what to do with one task id.
///
/// Rules, in order:
/// 1. only local -> keep local
/// 2. only remote -> keep remote
/// 3. equal `updated_at` -> no change
/// 4. watermark known and both edits strictly after it -> conflict
/// 5. otherwise the later `updated_at` wins
pub fn resolve(
    task_id: TaskId,
    local: Option<&TaskRecord>,
    remote: Option<&TaskRecord>,
    last_synced_at: Option<DateTime<Utc>>,
) -> Result<MergeResolution> {
    let resolution = |decision, winner: &TaskRecord, conflicting: Option<&TaskRecord>| {
        MergeResolution {
            task_id,
            decision,
            winner: winner.clone(),
            conflicting: conflicting.cloned(),
        }
    };

    match (local, remote) {
        (None, None) => Err(Error::InvalidInput(format!(
            "merge invoked for task {task_id} with neither a local nor a remote copy"
        ))),
        (Some(local), None) => Ok(resolution(MergeDecision::KeepLocal, local, None)),
        (None, Some(remote)) => Ok(resolution(MergeDecision::KeepRemote, remote, None)),
        (Some(local), Some(remote)) => {
            if local.updated_at == remote.updated_at {
                return Ok(resolution(MergeDecision::NoChange, local, None));
            }

            let both_after_watermark = last_synced_at.is_some_and(|watermark| {
                local.updated_at > watermark && remote.updated_at > watermark
            });
            if both_after_watermark {
                return Ok(resolution(MergeDecision::Conflict, local, Some(remote)));
            }

            if local.updated_at > remote.updated_at {
                Ok(resolution(MergeDecision::KeepLocal, local, None))
            } else {
                Ok(resolution(MergeDecision::KeepRemote, remote, None))
            }
        }
    }
}
