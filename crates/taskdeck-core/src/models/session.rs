//! Sync session state shared by the engine components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::change::PendingChange;
use super::conflict::SyncConflict;
use crate::auth::Credential;

/// Unified sync state reported to UI consumers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Synced,
    Conflict,
    Offline,
    Error,
}

impl SyncStatus {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Conflict => "conflict",
            Self::Offline => "offline",
            Self::Error => "error",
        }
    }
}

/// Status plus the optional one-line message shown next to it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusReport {
    pub status: SyncStatus,
    pub message: Option<String>,
}

/// Full persisted session record.
///
/// There is exactly one logical instance per local database. Components read
/// it through the session repository instead of holding a global.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncSessionState {
    pub credential: Option<Credential>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub pending_changes: Vec<PendingChange>,
    pub conflicts: Vec<SyncConflict>,
}
