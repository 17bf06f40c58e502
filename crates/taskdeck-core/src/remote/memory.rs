//! In-process provider with failure injection.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{RemoteBackupClient, RemoteError, RemoteResult};
use crate::backup::RemoteBackupBlob;
use crate::clock::{Clock, SystemClock};

#[derive(Default)]
struct State {
    blob: Option<RemoteBackupBlob>,
    last_modified: Option<DateTime<Utc>>,
    accepted_token: Option<String>,
    injected_failures: VecDeque<RemoteError>,
    downloads: usize,
    uploads: usize,
}

/// Remote provider kept in memory.
///
/// Optionally accepts a single bearer token; any other token is answered with
/// `Unauthorized`. Failures queued with [`MemoryBackupClient::fail_next`] are
/// returned by the next calls in order.
pub struct MemoryBackupClient {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryBackupClient {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryBackupClient {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            clock,
        }
    }

    /// Replace the stored blob without going through `upload`.
    pub async fn seed(&self, blob: RemoteBackupBlob) {
        let mut state = self.state.lock().await;
        state.last_modified = Some(self.clock.now());
        state.blob = Some(blob);
    }

    pub async fn set_last_modified(&self, value: Option<DateTime<Utc>>) {
        self.state.lock().await.last_modified = value;
    }

    /// Only `token` is accepted from now on.
    pub async fn accept_only(&self, token: impl Into<String>) {
        self.state.lock().await.accepted_token = Some(token.into());
    }

    pub async fn fail_next(&self, error: RemoteError) {
        self.state.lock().await.injected_failures.push_back(error);
    }

    pub async fn blob(&self) -> Option<RemoteBackupBlob> {
        self.state.lock().await.blob.clone()
    }

    pub async fn download_count(&self) -> usize {
        self.state.lock().await.downloads
    }

    pub async fn upload_count(&self) -> usize {
        self.state.lock().await.uploads
    }

    fn check(state: &mut State, token: &str) -> RemoteResult<()> {
        if let Some(error) = state.injected_failures.pop_front() {
            return Err(error);
        }
        match state.accepted_token.as_deref() {
            Some(accepted) if accepted != token => Err(RemoteError::Unauthorized(
                "token rejected (401)".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteBackupClient for MemoryBackupClient {
    async fn last_modified(&self, token: &str) -> RemoteResult<Option<DateTime<Utc>>> {
        let mut state = self.state.lock().await;
        Self::check(&mut state, token)?;
        Ok(state.blob.as_ref().and(state.last_modified))
    }

    async fn download(&self, token: &str) -> RemoteResult<Option<RemoteBackupBlob>> {
        let mut state = self.state.lock().await;
        Self::check(&mut state, token)?;
        state.downloads += 1;
        Ok(state.blob.clone())
    }

    async fn upload(&self, token: &str, blob: &RemoteBackupBlob) -> RemoteResult<()> {
        let mut state = self.state.lock().await;
        Self::check(&mut state, token)?;
        state.uploads += 1;
        state.blob = Some(blob.clone());
        state.last_modified = Some(self.clock.now());
        Ok(())
    }

    async fn delete(&self, token: &str) -> RemoteResult<()> {
        let mut state = self.state.lock().await;
        Self::check(&mut state, token)?;
        state.blob = None;
        state.last_modified = None;
        Ok(())
    }
}
