use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use taskdeck_core::models::{ConflictChoice, StatusReport, SyncConflict};
use taskdeck_core::sync::SyncReport;
use taskdeck_core::SyncEngine;

use crate::commands::common::{
    conflict_to_item, format_conflict_lines, format_timestamp, normalize_task_identifier,
    open_session, short_id, ConflictItem, OpenMode,
};
use crate::error::CliError;

const QUEUE_CHECK_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize)]
pub struct SyncStatusItem {
    pub status: String,
    pub message: Option<String>,
    pub connected: bool,
    pub backup_url: Option<String>,
    pub pending_changes: usize,
    pub pending_tasks: usize,
    pub conflicts: usize,
    pub last_synced_at: Option<String>,
}

pub async fn run_sync(db_path: &Path, profile: Option<&str>) -> Result<(), CliError> {
    let session = open_session(db_path, profile, OpenMode::RequireBackup).await?;
    let report = session.engine.perform_sync().await?;

    println!("{}", describe_report(&report));
    Ok(())
}

pub fn describe_report(report: &SyncReport) -> String {
    if report.has_conflicts() {
        format!(
            "Sync paused: {} conflicts need review (run `taskdeck sync conflicts`); {} tasks downloaded",
            report.conflicts, report.downloaded_count
        )
    } else {
        format!(
            "Sync completed: {} uploaded, {} downloaded, {} tasks in backup",
            report.uploaded_count, report.downloaded_count, report.merged_count
        )
    }
}

pub async fn run_sync_status(
    as_json: bool,
    db_path: &Path,
    profile: Option<&str>,
) -> Result<(), CliError> {
    let session = open_session(db_path, profile, OpenMode::Local).await?;
    let item = status_item(&session.engine, session.settings.backup_url.clone()).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&item)?);
        return Ok(());
    }

    println!("Profile:         {}", session.profile_name);
    println!(
        "Backup:          {}",
        item.backup_url.as_deref().unwrap_or("(not configured)")
    );
    println!(
        "Connected:       {}",
        if item.connected { "yes" } else { "no" }
    );
    match &item.message {
        Some(message) => println!("Status:          {} ({message})", item.status),
        None => println!("Status:          {}", item.status),
    }
    println!(
        "Pending changes: {} ({} tasks)",
        item.pending_changes, item.pending_tasks
    );
    println!("Conflicts:       {}", item.conflicts);
    println!(
        "Last synced:     {}",
        item.last_synced_at.as_deref().unwrap_or("never")
    );
    Ok(())
}

async fn status_item(
    engine: &SyncEngine,
    backup_url: Option<String>,
) -> Result<SyncStatusItem, CliError> {
    let StatusReport { status, message } = engine.status();
    Ok(SyncStatusItem {
        status: status.label().to_string(),
        message,
        connected: engine.is_connected().await?,
        backup_url,
        pending_changes: engine.pending_change_count().await?,
        pending_tasks: engine.pending_task_count().await?,
        conflicts: engine.conflict_count().await?,
        last_synced_at: engine.last_synced_at().await?.map(format_timestamp),
    })
}

pub async fn run_sync_conflicts(
    as_json: bool,
    db_path: &Path,
    profile: Option<&str>,
) -> Result<(), CliError> {
    let session = open_session(db_path, profile, OpenMode::Local).await?;
    let conflicts = session.engine.conflicts().await?;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(conflict_to_item)
            .collect::<Vec<ConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_sync_resolve(
    id: &str,
    choice: ConflictChoice,
    db_path: &Path,
    profile: Option<&str>,
) -> Result<(), CliError> {
    let session = open_session(db_path, profile, OpenMode::RequireBackup).await?;
    let conflicts = session.engine.conflicts().await?;
    let conflict = find_conflict(id, &conflicts)?;

    let resolved = session
        .engine
        .resolve_conflict(&conflict.task_id, choice)
        .await?
        .ok_or_else(|| CliError::ConflictNotFound(conflict.task_id.to_string()))?;
    // Push the choice now instead of waiting for the debounce timer
    session.engine.shutdown().await;
    println!("Kept '{}' for task {}", resolved.title, resolved.id);

    let remaining = session.engine.conflict_count().await?;
    if remaining > 0 {
        println!("{remaining} conflicts remain; sync resumes once all are resolved.");
        return Ok(());
    }

    let report = session.engine.perform_sync().await?;
    println!("{}", describe_report(&report));
    Ok(())
}

pub fn find_conflict<'a>(
    query: &str,
    conflicts: &'a [SyncConflict],
) -> Result<&'a SyncConflict, CliError> {
    let query = normalize_task_identifier(query)?;
    let matching: Vec<&SyncConflict> = conflicts
        .iter()
        .filter(|conflict| conflict.task_id.to_string().starts_with(&query))
        .collect();

    match matching.as_slice() {
        [] => Err(CliError::ConflictNotFound(query)),
        [conflict] => Ok(*conflict),
        many => Err(CliError::AmbiguousTaskId(format!(
            "ID prefix '{query}' matches {} conflicts: {}",
            many.len(),
            many.iter()
                .take(3)
                .map(|conflict| short_id(&conflict.task_id.to_string()))
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

/// Run the scheduler until Ctrl-C: queued edits sync after the debounce
/// delay and the backup is polled for changes from other devices.
pub async fn run_sync_watch(db_path: &Path, profile: Option<&str>) -> Result<(), CliError> {
    let session = open_session(db_path, profile, OpenMode::RequireBackup).await?;
    let engine = &session.engine;
    if !engine.is_connected().await? {
        return Err(CliError::Auth(
            "this device is not connected; run `taskdeck auth login` first".to_string(),
        ));
    }

    let mut statuses = engine.subscribe_status();
    let mut queue_check = tokio::time::interval(QUEUE_CHECK_INTERVAL.max(session.settings.debounce()));
    engine.start_polling().await;
    println!(
        "Watching profile '{}' (poll every {:?}). Press Ctrl-C to stop.",
        session.profile_name,
        session.settings.poll_interval()
    );

    loop {
        tokio::select! {
            changed = statuses.changed() => {
                if changed.is_err() {
                    break;
                }
                let report = statuses.borrow_and_update().clone();
                print_status(&report);
            }
            _ = queue_check.tick() => {
                // Edits made by other taskdeck invocations land in the queue
                if !engine.is_sync_pending()
                    && !engine.is_syncing()
                    && engine.pending_change_count().await? > 0
                    && engine.conflict_count().await? == 0
                {
                    engine.schedule_sync().await;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    engine.shutdown().await;
    println!("Stopped watching.");
    Ok(())
}

fn print_status(report: &StatusReport) {
    match &report.message {
        Some(message) => println!("[{}] {message}", report.status.label()),
        None => println!("[{}]", report.status.label()),
    }
}

pub async fn run_sync_delete_remote(
    confirmed: bool,
    db_path: &Path,
    profile: Option<&str>,
) -> Result<(), CliError> {
    if !confirmed {
        return Err(CliError::ConfirmationRequired);
    }
    let session = open_session(db_path, profile, OpenMode::RequireBackup).await?;
    session.engine.delete_remote_backup().await?;
    println!("Deleted the remote backup. The next sync uploads every local task.");
    Ok(())
}
