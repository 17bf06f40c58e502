//! Pending local change model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::{TaskId, TaskRecord};

/// Kind of local mutation recorded in the change queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

impl ChangeKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// A local mutation not yet confirmed as synced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChange {
    pub task_id: TaskId,
    pub kind: ChangeKind,
    pub queued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<TaskRecord>,
}

impl PendingChange {
    #[must_use]
    pub const fn new(
        task_id: TaskId,
        kind: ChangeKind,
        queued_at: DateTime<Utc>,
        snapshot: Option<TaskRecord>,
    ) -> Self {
        Self {
            task_id,
            kind,
            queued_at,
            snapshot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_kind_parses_stored_names() {
        for kind in [ChangeKind::Create, ChangeKind::Update, ChangeKind::Delete] {
            assert_eq!(ChangeKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ChangeKind::parse("upsert"), None);
    }
}
