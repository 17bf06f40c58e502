//! Data models for Taskdeck

mod change;
mod conflict;
mod session;
mod task;

pub use change::{ChangeKind, PendingChange};
pub use conflict::{ConflictChoice, SyncConflict};
pub use session::{StatusReport, SyncSessionState, SyncStatus};
pub use task::{later_than, TaskId, TaskPriority, TaskRecord, TaskStatus};
