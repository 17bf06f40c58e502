//! Keychain persistence for the backup credential.

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

use async_trait::async_trait;
#[cfg(not(test))]
use keyring::Entry;
use taskdeck_core::auth::{AuthError, AuthResult, Credential, CredentialStore};

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "taskdeck-cli";

/// Credential store backed by the system keychain, one entry per profile.
#[derive(Clone)]
pub struct KeyringCredentialStore {
    username: String,
}

impl KeyringCredentialStore {
    pub fn new(profile_name: &str) -> Self {
        Self {
            username: format!("backup_credential:{profile_name}"),
        }
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(not(test))]
    fn entry(&self) -> AuthResult<Entry> {
        Entry::new(KEYRING_SERVICE_NAME, &self.username)
            .map_err(|error| AuthError::Storage(error.to_string()))
    }

    #[cfg(not(test))]
    fn read_raw(&self) -> AuthResult<Option<String>> {
        match self.entry()?.get_password() {
            Ok(raw) => Ok(Some(raw)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(AuthError::Storage(error.to_string())),
        }
    }

    #[cfg(test)]
    fn read_raw(&self) -> AuthResult<Option<String>> {
        let guard = Self::test_store()
            .lock()
            .map_err(|error| AuthError::Storage(error.to_string()))?;
        Ok(guard.get(&self.username).cloned())
    }

    #[cfg(not(test))]
    fn write_raw(&self, raw: &str) -> AuthResult<()> {
        self.entry()?
            .set_password(raw)
            .map_err(|error| AuthError::Storage(error.to_string()))
    }

    #[cfg(test)]
    fn write_raw(&self, raw: &str) -> AuthResult<()> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| AuthError::Storage(error.to_string()))?;
        guard.insert(self.username.clone(), raw.to_string());
        Ok(())
    }

    #[cfg(not(test))]
    fn delete_raw(&self) -> AuthResult<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(AuthError::Storage(error.to_string())),
        }
    }

    #[cfg(test)]
    fn delete_raw(&self) -> AuthResult<()> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| AuthError::Storage(error.to_string()))?;
        guard.remove(&self.username);
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for KeyringCredentialStore {
    async fn load(&self) -> AuthResult<Option<Credential>> {
        self.read_raw()?
            .map(|raw| serde_json::from_str(&raw).map_err(AuthError::from))
            .transpose()
    }

    async fn save(&self, credential: &Credential) -> AuthResult<()> {
        self.write_raw(&serde_json::to_string(credential)?)
    }

    async fn clear(&self) -> AuthResult<()> {
        self.delete_raw()
    }
}
