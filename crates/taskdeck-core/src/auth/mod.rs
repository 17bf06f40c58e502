//! Bearer credential storage and silent refresh.

mod http;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::store::SessionRepository;

pub use http::HttpTokenIssuer;

const EXPIRY_SKEW_SECONDS: i64 = 60;

/// Bearer credential for the remote backup provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Credential with only an access token.
    #[must_use]
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
        }
    }

    /// Whether the token expires within the skew window around `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at <= now + Duration::seconds(EXPIRY_SKEW_SECONDS))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No token issuer is configured; sign in interactively.")]
    NotConfigured,
    #[error("Invalid auth configuration: {0}")]
    InvalidConfiguration(String),
    #[error("No stored credential to refresh")]
    MissingCredential,
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to parse JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Token endpoint rejected the request: {0}")]
    Rejected(String),
    #[error("Auth API error: {0}")]
    Api(String),
    #[error("Credential storage error: {0}")]
    Storage(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl From<AuthError> for crate::Error {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::NotConfigured | AuthError::MissingCredential => Self::NotAuthenticated,
            AuthError::InvalidConfiguration(message) => Self::InvalidInput(message),
            AuthError::Http(error) if error.is_connect() || error.is_timeout() => {
                Self::NetworkUnavailable(error.to_string())
            }
            AuthError::Http(error) => Self::Remote(error.to_string()),
            AuthError::Json(error) => Self::Serialization(error),
            AuthError::Rejected(message) => Self::AuthExpired(message),
            AuthError::Api(message) => Self::Remote(message),
            AuthError::Storage(message) => Self::Database(message),
        }
    }
}

/// Where the bearer credential is persisted.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> AuthResult<Option<Credential>>;
    async fn save(&self, credential: &Credential) -> AuthResult<()>;
    async fn clear(&self) -> AuthResult<()>;
}

/// Non-interactive token acquisition.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Exchange `credential` for a fresh one without prompting the user.
    async fn refresh(&self, credential: &Credential) -> AuthResult<Credential>;
}

/// Process-local credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credential: Mutex<Option<Credential>>,
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> AuthResult<Option<Credential>> {
        Ok(self.credential.lock().await.clone())
    }

    async fn save(&self, credential: &Credential) -> AuthResult<()> {
        *self.credential.lock().await = Some(credential.clone());
        Ok(())
    }

    async fn clear(&self) -> AuthResult<()> {
        *self.credential.lock().await = None;
        Ok(())
    }
}

/// Stores the credential as plaintext in the session database.
///
/// Protection relies on the file permissions of the local database.
pub struct SessionCredentialStore {
    repository: Arc<dyn SessionRepository>,
}

impl SessionCredentialStore {
    pub fn new(repository: Arc<dyn SessionRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl CredentialStore for SessionCredentialStore {
    async fn load(&self) -> AuthResult<Option<Credential>> {
        self.repository
            .load_credential()
            .await
            .map_err(|error| AuthError::Storage(error.to_string()))
    }

    async fn save(&self, credential: &Credential) -> AuthResult<()> {
        self.repository
            .save_credential(Some(credential))
            .await
            .map_err(|error| AuthError::Storage(error.to_string()))
    }

    async fn clear(&self) -> AuthResult<()> {
        self.repository
            .save_credential(None)
            .await
            .map_err(|error| AuthError::Storage(error.to_string()))
    }
}

/// Owns the bearer credential and the optional token issuer.
pub struct AuthSessionManager {
    store: Arc<dyn CredentialStore>,
    issuer: RwLock<Option<Arc<dyn TokenIssuer>>>,
}

impl AuthSessionManager {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            issuer: RwLock::new(None),
        }
    }

    /// Register the client used for silent refresh.
    pub async fn set_issuer(&self, issuer: Arc<dyn TokenIssuer>) {
        *self.issuer.write().await = Some(issuer);
    }

    pub async fn has_issuer(&self) -> bool {
        self.issuer.read().await.is_some()
    }

    pub async fn store(&self, credential: &Credential) -> AuthResult<()> {
        self.store.save(credential).await
    }

    pub async fn get(&self) -> AuthResult<Option<Credential>> {
        self.store.load().await
    }

    pub async fn clear(&self) -> AuthResult<()> {
        self.store.clear().await
    }

    /// Request a new credential without user interaction.
    ///
    /// On success the new credential replaces the stored one. Failures are
    /// returned as-is; the stored credential is left in place.
    pub async fn refresh_silently(&self) -> AuthResult<Credential> {
        let issuer = self
            .issuer
            .read()
            .await
            .clone()
            .ok_or(AuthError::NotConfigured)?;
        let current = self.store.load().await?.ok_or(AuthError::MissingCredential)?;

        match issuer.refresh(&current).await {
            Ok(refreshed) => {
                self.store.save(&refreshed).await?;
                tracing::info!("Silently refreshed backup credential");
                Ok(refreshed)
            }
            Err(error) => {
                tracing::warn!("Silent credential refresh failed: {}", error);
                Err(error)
            }
        }
    }
}
