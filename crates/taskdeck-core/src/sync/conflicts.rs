//! Unresolved per-task conflicts.
//!
//! Entries leave the ledger only through explicit resolution (or a
//! first-connect bulk replace / disconnect, which discard them wholesale).

use std::sync::Arc;

use crate::clock::Clock;
use crate::models::{later_than, ConflictChoice, SyncConflict, TaskId, TaskRecord};
use crate::store::{SessionRepository, TaskStore};
use crate::Result;

pub struct ConflictLedger {
    session: Arc<dyn SessionRepository>,
    tasks: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
}

impl ConflictLedger {
    pub fn new(
        session: Arc<dyn SessionRepository>,
        tasks: Arc<dyn TaskStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            session,
            tasks,
            clock,
        }
    }

    /// Record conflicts, replacing any entry already held for the same task.
    pub async fn upsert_all(&self, conflicts: &[SyncConflict]) -> Result<()> {
        for conflict in conflicts {
            self.session.upsert_conflict(conflict).await?;
        }
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<SyncConflict>> {
        self.session.list_conflicts().await
    }

    pub async fn get(&self, task_id: &TaskId) -> Result<Option<SyncConflict>> {
        self.session.get_conflict(task_id).await
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.list().await?.len())
    }

    pub async fn clear(&self) -> Result<()> {
        self.session.clear_conflicts().await
    }

    /// Keep one side of a conflict.
    ///
    /// The chosen snapshot is written back with an `updated_at` later than
    /// both snapshots, the entry is removed, and the watermark moves to the
    /// conflict's detection time. Returns `None` when no conflict is recorded
    /// for `task_id`.
    pub async fn resolve(
        &self,
        task_id: &TaskId,
        choice: ConflictChoice,
    ) -> Result<Option<TaskRecord>> {
        let Some(conflict) = self.get(task_id).await? else {
            tracing::debug!("No conflict recorded for task {task_id}; nothing to resolve");
            return Ok(None);
        };

        let now = self.clock.now();
        let mut chosen = conflict.snapshot(choice).clone();
        chosen.updated_at = later_than(now, conflict.latest_updated_at());

        self.tasks.put(&chosen).await?;
        self.session.remove_conflict(task_id).await?;
        self.session
            .set_last_synced_at(Some(conflict.detected_at.min(now)))
            .await?;

        tracing::info!(
            "Resolved conflict for task {} keeping the {} copy",
            task_id,
            match choice {
                ConflictChoice::Local => "local",
                ConflictChoice::Remote => "remote",
            }
        );
        Ok(Some(chosen))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{MemorySessionRepository, MemoryTaskStore};

    fn at(value: &str) -> DateTime<Utc> {
        value.parse().unwrap()
    }

    struct Fixture {
        ledger: ConflictLedger,
        session: Arc<MemorySessionRepository>,
        tasks: Arc<MemoryTaskStore>,
        conflict: SyncConflict,
    }

    async fn fixture(now: &str) -> Fixture {
        let mut local = TaskRecord::new("local title", at("2024-01-01T10:00:00Z"));
        local.updated_at = at("2024-01-01T10:00:00Z");
        let mut remote = local.clone();
        remote.title = "remote title".to_string();
        remote.updated_at = at("2024-01-01T11:00:00Z");

        let conflict = SyncConflict {
            task_id: local.id,
            local_snapshot: local.clone(),
            remote_snapshot: remote,
            detected_at: at("2024-01-01T12:00:00Z"),
        };

        let session = Arc::new(MemorySessionRepository::default());
        let tasks = Arc::new(MemoryTaskStore::with_tasks([local]));
        session.upsert_conflict(&conflict).await.unwrap();
        session
            .set_last_synced_at(Some(at("2024-01-01T09:00:00Z")))
            .await
            .unwrap();

        let ledger = ConflictLedger::new(
            Arc::clone(&session) as Arc<dyn SessionRepository>,
            Arc::clone(&tasks) as Arc<dyn TaskStore>,
            Arc::new(ManualClock::new(at(now))),
        );
        Fixture {
            ledger,
            session,
            tasks,
            conflict,
        }
    }

    #[tokio::test]
    async fn resolving_local_rewrites_task_and_rewinds_watermark() {
        let fixture = fixture("2024-01-01T13:00:00Z").await;
        let task_id = fixture.conflict.task_id;

        let resolved = fixture
            .ledger
            .resolve(&task_id, ConflictChoice::Local)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(resolved.title, "local title");
        assert_eq!(resolved.updated_at, at("2024-01-01T13:00:00Z"));
        assert!(resolved.updated_at > fixture.conflict.local_snapshot.updated_at);
        assert!(resolved.updated_at > fixture.conflict.remote_snapshot.updated_at);
        assert_eq!(fixture.tasks.get(&task_id).await.unwrap(), Some(resolved));
        assert_eq!(fixture.ledger.count().await.unwrap(), 0);
        assert_eq!(
            fixture.session.last_synced_at().await.unwrap(),
            Some(fixture.conflict.detected_at)
        );
    }

    #[tokio::test]
    async fn resolving_remote_stays_fresh_under_clock_skew() {
        // Clock behind both snapshots
        let fixture = fixture("2024-01-01T08:00:00Z").await;
        let task_id = fixture.conflict.task_id;

        let resolved = fixture
            .ledger
            .resolve(&task_id, ConflictChoice::Remote)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(resolved.title, "remote title");
        assert_eq!(
            resolved.updated_at,
            at("2024-01-01T11:00:00Z") + Duration::milliseconds(1)
        );
        assert_eq!(
            fixture.session.last_synced_at().await.unwrap(),
            Some(at("2024-01-01T08:00:00Z"))
        );
    }

    #[tokio::test]
    async fn resolving_unknown_task_is_a_no_op() {
        let fixture = fixture("2024-01-01T13:00:00Z").await;

        let resolved = fixture
            .ledger
            .resolve(&TaskId::new(), ConflictChoice::Local)
            .await
            .unwrap();

        assert_eq!(resolved, None);
        assert_eq!(fixture.ledger.count().await.unwrap(), 1);
        assert_eq!(
            fixture.session.last_synced_at().await.unwrap(),
            Some(at("2024-01-01T09:00:00Z"))
        );
    }
}
