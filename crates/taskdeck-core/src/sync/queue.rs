//! Ledger of local mutations not yet confirmed by a successful sync.
//!
//! Entries are never deduplicated: repeated edits of one task each add an
//! entry, and the whole queue is cleared at once after an upload.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::clock::Clock;
use crate::models::{ChangeKind, PendingChange, TaskId, TaskRecord};
use crate::store::SessionRepository;
use crate::Result;

pub struct ChangeQueue {
    session: Arc<dyn SessionRepository>,
    clock: Arc<dyn Clock>,
}

impl ChangeQueue {
    pub fn new(session: Arc<dyn SessionRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { session, clock }
    }

    /// Append a change stamped with the current time.
    pub async fn enqueue(
        &self,
        task_id: TaskId,
        kind: ChangeKind,
        snapshot: Option<TaskRecord>,
    ) -> Result<PendingChange> {
        let change = PendingChange::new(task_id, kind, self.clock.now(), snapshot);
        self.session.append_pending_change(&change).await?;
        tracing::debug!("Queued {} for task {}", kind.as_str(), task_id);
        Ok(change)
    }

    pub async fn list(&self) -> Result<Vec<PendingChange>> {
        self.session.list_pending_changes().await
    }

    /// Number of queued entries, duplicates included
    pub async fn len(&self) -> Result<usize> {
        Ok(self.list().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Number of distinct tasks with queued entries
    pub async fn pending_task_count(&self) -> Result<usize> {
        let ids: BTreeSet<TaskId> = self
            .list()
            .await?
            .into_iter()
            .map(|change| change.task_id)
            .collect();
        Ok(ids.len())
    }

    pub async fn clear(&self) -> Result<()> {
        self.session.clear_pending_changes().await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemorySessionRepository;

    #[tokio::test]
    async fn repeated_edits_accumulate_until_cleared() {
        let start: DateTime<Utc> = "2024-04-01T08:00:00Z".parse().unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let queue = ChangeQueue::new(
            Arc::new(MemorySessionRepository::default()),
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        let task = TaskRecord::new("Buy milk", start);

        queue
            .enqueue(task.id, ChangeKind::Create, Some(task.clone()))
            .await
            .unwrap();
        clock.advance(Duration::seconds(5));
        let second = queue
            .enqueue(task.id, ChangeKind::Update, Some(task.clone()))
            .await
            .unwrap();
        queue
            .enqueue(TaskId::new(), ChangeKind::Delete, None)
            .await
            .unwrap();

        assert_eq!(second.queued_at, start + Duration::seconds(5));
        assert_eq!(queue.len().await.unwrap(), 3);
        assert_eq!(queue.pending_task_count().await.unwrap(), 2);

        queue.clear().await.unwrap();
        assert!(queue.is_empty().await.unwrap());
    }
}
