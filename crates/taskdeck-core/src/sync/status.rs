use std::sync::Arc;

use tokio::sync::watch;

use crate::models::{StatusReport, SyncStatus};

/// Shared publisher for the current sync status.
///
/// Clones publish to the same channel.
#[derive(Clone, Debug)]
pub struct SyncStatusHandle {
    sender: Arc<watch::Sender<StatusReport>>,
}

impl Default for SyncStatusHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStatusHandle {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(StatusReport::default());
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn set(&self, status: SyncStatus, message: Option<String>) {
        let report = StatusReport { status, message };
        self.sender.send_if_modified(|current| {
            if *current == report {
                false
            } else {
                *current = report;
                true
            }
        });
    }

    #[must_use]
    pub fn current(&self) -> StatusReport {
        self.sender.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<StatusReport> {
        self.sender.subscribe()
    }
}
