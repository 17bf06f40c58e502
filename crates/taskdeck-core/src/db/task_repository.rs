//! Task store backed by libSQL

use std::sync::Arc;

use async_trait::async_trait;
use libsql::{Connection, Value};
use tokio::sync::Mutex;

use super::Database;
use crate::error::{Error, Result};
use crate::models::{TaskId, TaskRecord};
use crate::store::TaskStore;
use crate::util::format_timestamp;

/// libSQL implementation of `TaskStore`
#[derive(Clone)]
pub struct LibSqlTaskStore {
    db: Arc<Mutex<Database>>,
}

impl LibSqlTaskStore {
    pub const fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    async fn upsert(conn: &Connection, task: &TaskRecord) -> Result<()> {
        let payload = serde_json::to_string(task)?;
        conn.execute(
            "INSERT INTO tasks (id, title, updated_at, deleted_at, payload) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                updated_at = excluded.updated_at,
                deleted_at = excluded.deleted_at,
                payload = excluded.payload",
            vec![
                Value::Text(task.id.to_string()),
                Value::Text(task.title.clone()),
                Value::Text(format_timestamp(task.updated_at)),
                task.deleted_at
                    .map_or(Value::Null, |deleted_at| Value::Text(format_timestamp(deleted_at))),
                Value::Text(payload),
            ],
        )
        .await?;
        Ok(())
    }

    fn parse_task(row: &libsql::Row) -> Result<TaskRecord> {
        let payload: String = row.get(0)?;
        serde_json::from_str(&payload).map_err(|error| {
            Error::Database(format!("corrupt task payload in local store: {error}"))
        })
    }
}

#[async_trait]
impl TaskStore for LibSqlTaskStore {
    async fn list_all(&self) -> Result<Vec<TaskRecord>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query("SELECT payload FROM tasks ORDER BY id", ())
            .await?;

        let mut tasks = Vec::new();
        while let Some(row) = rows.next().await? {
            tasks.push(Self::parse_task(&row)?);
        }
        Ok(tasks)
    }

    async fn get(&self, id: &TaskId) -> Result<Option<TaskRecord>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query("SELECT payload FROM tasks WHERE id = ?", [id.to_string()])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_task(&row)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, task: &TaskRecord) -> Result<()> {
        let db = self.db.lock().await;
        Self::upsert(db.connection(), task).await
    }

    async fn replace_all(&self, tasks: &[TaskRecord]) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();

        conn.execute("BEGIN TRANSACTION", ()).await?;
        let written = async {
            conn.execute("DELETE FROM tasks", ()).await?;
            for task in tasks {
                Self::upsert(conn, task).await?;
            }
            Ok::<_, Error>(())
        }
        .await;

        match written {
            Ok(()) => {
                conn.execute("COMMIT", ()).await?;
                tracing::debug!("Replaced local task set with {} records", tasks.len());
                Ok(())
            }
            Err(error) => {
                conn.execute("ROLLBACK", ()).await.ok();
                Err(error)
            }
        }
    }
}
