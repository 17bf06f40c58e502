//! Database migrations

use libsql::Connection;

use crate::error::Result;

/// Current schema version
pub(crate) const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        apply(conn, 1, &MIGRATION_V1).await?;
    }
    if version < 2 {
        apply(conn, 2, &MIGRATION_V2).await?;
    }
    if version < CURRENT_VERSION {
        tracing::info!("Migrated database to version {CURRENT_VERSION}");
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Version 1: tasks and the sync session record
const MIGRATION_V1: [&str; 6] = [
    "CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY
    )",
    // Full record as JSON; indexed columns are copies for ordering and filtering
    "CREATE TABLE IF NOT EXISTS tasks (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        deleted_at TEXT,
        payload TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_tasks_updated ON tasks(updated_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_deleted ON tasks(deleted_at)",
    // Exactly one row
    "CREATE TABLE IF NOT EXISTS sync_session (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        credential TEXT,
        last_synced_at TEXT
    )",
    "INSERT OR IGNORE INTO sync_session (id, credential, last_synced_at) VALUES (1, NULL, NULL)",
];

/// Version 2: change queue and conflict ledger
const MIGRATION_V2: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS pending_changes (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        queued_at TEXT NOT NULL,
        snapshot TEXT
    )",
    "CREATE TABLE IF NOT EXISTS sync_conflicts (
        task_id TEXT PRIMARY KEY,
        local_snapshot TEXT NOT NULL,
        remote_snapshot TEXT NOT NULL,
        detected_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_sync_conflicts_detected ON sync_conflicts(detected_at)",
];

async fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn
        .execute(
            "INSERT INTO schema_version (version) VALUES (?)",
            [i64::from(version)],
        )
        .await
    {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {version}");
    Ok(())
}
