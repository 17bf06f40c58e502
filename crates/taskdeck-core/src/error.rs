//! Error types for taskdeck-core

use thiserror::Error;

/// Result type alias using taskdeck-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in taskdeck-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// No bearer credential is stored; sync cannot start
    #[error("Not authenticated: connect a backup account before syncing")]
    NotAuthenticated,

    /// The remote provider rejected the stored credential
    #[error("Authentication expired: {0}")]
    AuthExpired(String),

    /// The device is offline or the provider could not be reached
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// Backup checksum did not match its recomputed value
    #[error("Backup integrity check failed: expected checksum {expected}, computed {actual}")]
    IntegrityFailure {
        /// Checksum declared by the backup
        expected: String,
        /// Checksum recomputed from the task array
        actual: String,
    },

    /// Any other remote provider failure
    #[error("Remote backup error: {0}")]
    Remote(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the failure looks like an expired or rejected credential.
    #[must_use]
    pub const fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired(_))
    }

    /// Whether the failure is caused by missing connectivity.
    #[must_use]
    pub const fn is_network_unavailable(&self) -> bool {
        matches!(self, Self::NetworkUnavailable(_))
    }
}
