use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] taskdeck_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No task title provided")]
    EmptyTitle,
    #[error("Task ID cannot be empty")]
    EmptyTaskId,
    #[error("Task not found for id/prefix: {0}")]
    TaskNotFound(String),
    #[error("{0}")]
    AmbiguousTaskId(String),
    #[error("No conflict recorded for task {0}")]
    ConflictNotFound(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error(
        "Backup is not configured. Run `taskdeck config init --backup-url <URL>` or set TASKDECK_BACKUP_URL."
    )]
    SyncNotConfigured,
    #[error(
        "This device has {local} tasks and the backup has {remote}. Run `taskdeck auth login` again with `--first-sync merge|use-remote|use-local`."
    )]
    FirstSyncDecisionRequired { local: usize, remote: usize },
    #[error("Refusing to delete the remote backup without --yes")]
    ConfirmationRequired,
}

impl From<taskdeck_core::auth::AuthError> for CliError {
    fn from(error: taskdeck_core::auth::AuthError) -> Self {
        Self::Auth(error.to_string())
    }
}
