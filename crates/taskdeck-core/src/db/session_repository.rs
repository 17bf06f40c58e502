//! Sync session persistence backed by libSQL

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::Value;
use tokio::sync::Mutex;

use super::Database;
use crate::auth::Credential;
use crate::error::{Error, Result};
use crate::models::{ChangeKind, PendingChange, SyncConflict, TaskId, TaskRecord};
use crate::store::SessionRepository;
use crate::util::{format_timestamp, parse_timestamp};

/// libSQL implementation of `SessionRepository`
///
/// The credential column holds the bearer credential as plaintext JSON.
#[derive(Clone)]
pub struct LibSqlSessionRepository {
    db: Arc<Mutex<Database>>,
}

impl LibSqlSessionRepository {
    pub const fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    async fn session_column(&self, column: &str) -> Result<Option<String>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(&format!("SELECT {column} FROM sync_session WHERE id = 1"), ())
            .await?;

        match rows.next().await? {
            Some(row) => optional_text(row.get_value(0)?),
            None => Ok(None),
        }
    }

    async fn set_session_column(&self, column: &str, value: Option<String>) -> Result<()> {
        let db = self.db.lock().await;
        db.connection()
            .execute(
                &format!("UPDATE sync_session SET {column} = ? WHERE id = 1"),
                vec![value.map_or(Value::Null, Value::Text)],
            )
            .await?;
        Ok(())
    }
}

fn optional_text(value: Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::Text(text) => Ok(Some(text)),
        other => Err(Error::Database(format!(
            "expected TEXT or NULL column, found {other:?}"
        ))),
    }
}

fn required_timestamp(value: &str) -> Result<DateTime<Utc>> {
    parse_timestamp(value)
        .ok_or_else(|| Error::Database(format!("invalid timestamp in session store: {value}")))
}

fn required_task_id(value: &str) -> Result<TaskId> {
    value
        .parse()
        .map_err(|_| Error::Database(format!("invalid task id in session store: {value}")))
}

fn parse_snapshot(value: &str) -> Result<TaskRecord> {
    serde_json::from_str(value)
        .map_err(|error| Error::Database(format!("corrupt task snapshot: {error}")))
}

fn parse_conflict(row: &libsql::Row) -> Result<SyncConflict> {
    let task_id: String = row.get(0)?;
    let local: String = row.get(1)?;
    let remote: String = row.get(2)?;
    let detected_at: String = row.get(3)?;

    Ok(SyncConflict {
        task_id: required_task_id(&task_id)?,
        local_snapshot: parse_snapshot(&local)?,
        remote_snapshot: parse_snapshot(&remote)?,
        detected_at: required_timestamp(&detected_at)?,
    })
}

#[async_trait]
impl SessionRepository for LibSqlSessionRepository {
    async fn load_credential(&self) -> Result<Option<Credential>> {
        self.session_column("credential")
            .await?
            .map(|raw| serde_json::from_str(&raw).map_err(Error::from))
            .transpose()
    }

    async fn save_credential(&self, credential: Option<&Credential>) -> Result<()> {
        let raw = credential.map(serde_json::to_string).transpose()?;
        self.set_session_column("credential", raw).await
    }

    async fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>> {
        self.session_column("last_synced_at")
            .await?
            .map(|raw| required_timestamp(&raw))
            .transpose()
    }

    async fn set_last_synced_at(&self, value: Option<DateTime<Utc>>) -> Result<()> {
        self.set_session_column("last_synced_at", value.map(format_timestamp))
            .await
    }

    async fn append_pending_change(&self, change: &PendingChange) -> Result<()> {
        let snapshot = change
            .snapshot
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let db = self.db.lock().await;
        db.connection()
            .execute(
                "INSERT INTO pending_changes (task_id, kind, queued_at, snapshot) VALUES (?, ?, ?, ?)",
                vec![
                    Value::Text(change.task_id.to_string()),
                    Value::Text(change.kind.as_str().to_string()),
                    Value::Text(format_timestamp(change.queued_at)),
                    snapshot.map_or(Value::Null, Value::Text),
                ],
            )
            .await?;
        Ok(())
    }

    async fn list_pending_changes(&self) -> Result<Vec<PendingChange>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                "SELECT task_id, kind, queued_at, snapshot FROM pending_changes ORDER BY seq",
                (),
            )
            .await?;

        let mut changes = Vec::new();
        while let Some(row) = rows.next().await? {
            let task_id: String = row.get(0)?;
            let kind: String = row.get(1)?;
            let queued_at: String = row.get(2)?;
            let snapshot = optional_text(row.get_value(3)?)?
                .map(|raw| parse_snapshot(&raw))
                .transpose()?;
            let kind = ChangeKind::parse(&kind)
                .ok_or_else(|| Error::Database(format!("unknown change kind: {kind}")))?;

            changes.push(PendingChange::new(
                required_task_id(&task_id)?,
                kind,
                required_timestamp(&queued_at)?,
                snapshot,
            ));
        }
        Ok(changes)
    }

    async fn clear_pending_changes(&self) -> Result<()> {
        let db = self.db.lock().await;
        db.connection()
            .execute("DELETE FROM pending_changes", ())
            .await?;
        Ok(())
    }

    async fn upsert_conflict(&self, conflict: &SyncConflict) -> Result<()> {
        let local = serde_json::to_string(&conflict.local_snapshot)?;
        let remote = serde_json::to_string(&conflict.remote_snapshot)?;
        let db = self.db.lock().await;
        db.connection()
            .execute(
                "INSERT INTO sync_conflicts (task_id, local_snapshot, remote_snapshot, detected_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(task_id) DO UPDATE SET
                    local_snapshot = excluded.local_snapshot,
                    remote_snapshot = excluded.remote_snapshot,
                    detected_at = excluded.detected_at",
                [
                    conflict.task_id.to_string(),
                    local,
                    remote,
                    format_timestamp(conflict.detected_at),
                ],
            )
            .await?;
        Ok(())
    }

    async fn list_conflicts(&self) -> Result<Vec<SyncConflict>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                "SELECT task_id, local_snapshot, remote_snapshot, detected_at
                 FROM sync_conflicts
                 ORDER BY detected_at, task_id",
                (),
            )
            .await?;

        let mut conflicts = Vec::new();
        while let Some(row) = rows.next().await? {
            conflicts.push(parse_conflict(&row)?);
        }
        Ok(conflicts)
    }

    async fn get_conflict(&self, task_id: &TaskId) -> Result<Option<SyncConflict>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                "SELECT task_id, local_snapshot, remote_snapshot, detected_at
                 FROM sync_conflicts
                 WHERE task_id = ?",
                [task_id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(parse_conflict(&row)?)),
            None => Ok(None),
        }
    }

    async fn remove_conflict(&self, task_id: &TaskId) -> Result<bool> {
        let db = self.db.lock().await;
        let removed = db
            .connection()
            .execute(
                "DELETE FROM sync_conflicts WHERE task_id = ?",
                [task_id.to_string()],
            )
            .await?;
        Ok(removed > 0)
    }

    async fn clear_conflicts(&self) -> Result<()> {
        let db = self.db.lock().await;
        db.connection()
            .execute("DELETE FROM sync_conflicts", ())
            .await?;
        Ok(())
    }
}
