//! Remote backup provider interface.
//!
//! The provider stores exactly one blob per account. There is no delta
//! endpoint: `upload` always replaces the whole blob.

mod http;
mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::backup::RemoteBackupBlob;

pub use http::HttpBackupClient;
pub use memory::MemoryBackupClient;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Provider rejected the bearer token
    #[error("Provider rejected the credential: {0}")]
    Unauthorized(String),
    /// Provider could not be reached
    #[error("Provider unreachable: {0}")]
    Network(String),
    /// Provider answered with an unexpected status
    #[error("Provider error: {0}")]
    Api(String),
    /// Stored blob could not be decoded
    #[error("Malformed backup payload: {0}")]
    Decode(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

impl From<RemoteError> for crate::Error {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::Unauthorized(message) => Self::AuthExpired(message),
            RemoteError::Network(message) => Self::NetworkUnavailable(message),
            RemoteError::Api(message) | RemoteError::Decode(message) => Self::Remote(message),
        }
    }
}

/// Whole-file backup storage.
#[async_trait]
pub trait RemoteBackupClient: Send + Sync {
    /// Modification time of the stored blob, `None` when no blob exists.
    async fn last_modified(&self, token: &str) -> RemoteResult<Option<DateTime<Utc>>>;

    /// Stored blob, `None` when no blob exists. The checksum is not verified here.
    async fn download(&self, token: &str) -> RemoteResult<Option<RemoteBackupBlob>>;

    /// Replace the stored blob.
    async fn upload(&self, token: &str, blob: &RemoteBackupBlob) -> RemoteResult<()>;

    /// Remove the stored blob. Deleting a missing blob succeeds.
    async fn delete(&self, token: &str) -> RemoteResult<()>;
}

/// Map an unsuccessful HTTP status to a remote error.
pub fn classify_http_status(status: u16, message: String) -> RemoteError {
    match status {
        401 | 403 => RemoteError::Unauthorized(message),
        408 | 502..=504 => RemoteError::Network(message),
        _ => RemoteError::Api(message),
    }
}
