use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use taskdeck_core::auth::{CredentialStore, HttpTokenIssuer};
use taskdeck_core::backup::RemoteBackupBlob;
use taskdeck_core::config::SyncSettings;
use taskdeck_core::db;
use taskdeck_core::models::{SyncConflict, TaskRecord, TaskStatus};
use taskdeck_core::remote::{HttpBackupClient, RemoteBackupClient, RemoteError, RemoteResult};
use taskdeck_core::SyncEngine;

use crate::auth::KeyringCredentialStore;
use crate::config_profiles::{CliProfile, CliProfilesConfig, CredentialStorage};
use crate::error::CliError;

const DB_PATH_ENV: &str = "TASKDECK_DB_PATH";

#[derive(Debug, Serialize)]
pub struct TaskListItem {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub notes: Option<String>,
    pub due_date: Option<String>,
    pub tags: Vec<String>,
    pub updated_at: String,
    pub relative_time: String,
}

#[derive(Debug, Serialize)]
pub struct ConflictItem {
    pub task_id: String,
    pub local_title: String,
    pub remote_title: String,
    pub local_updated_at: String,
    pub remote_updated_at: String,
    pub detected_at: String,
}

/// Opened engine plus the profile it was configured from.
pub struct Session {
    pub engine: SyncEngine,
    pub profile_name: String,
    pub settings: SyncSettings,
    pub issuer: Option<Arc<HttpTokenIssuer>>,
}

#[derive(Clone, Copy)]
pub enum OpenMode {
    /// Local task commands; the backup may be unconfigured
    Local,
    /// Commands that talk to the backup
    RequireBackup,
}

impl OpenMode {
    const fn requires_backup(self) -> bool {
        matches!(self, Self::RequireBackup)
    }
}

pub async fn open_session(
    db_path: &Path,
    profile: Option<&str>,
    mode: OpenMode,
) -> Result<Session, CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile);
    let profile = config.profile(&profile_name).cloned().unwrap_or_default();
    let settings = profile
        .sync_settings(|name| env::var(name).ok())
        .map_err(CliError::Config)?;

    let remote: Arc<dyn RemoteBackupClient> = match settings.backup_url.as_deref() {
        Some(url) => Arc::new(HttpBackupClient::new(url, settings.http_timeout())?),
        None if mode.requires_backup() => return Err(CliError::SyncNotConfigured),
        None => Arc::new(UnconfiguredBackup),
    };
    let issuer = match settings.token_endpoint() {
        Some((url, client_id)) => Some(Arc::new(HttpTokenIssuer::new(
            url,
            client_id,
            settings.http_timeout(),
        )?)),
        None => None,
    };

    let (tasks, session) = db::open_stores(db_path).await?;
    let mut builder = SyncEngine::builder()
        .task_store(Arc::new(tasks))
        .session_repository(Arc::new(session))
        .remote(remote)
        .settings(settings.clone());
    if let Some(store) = credential_store(&profile_name, &profile) {
        builder = builder.credential_store(store);
    }
    if let Some(issuer) = issuer.clone() {
        builder = builder.token_issuer(issuer);
    }

    tracing::debug!("Opened {} with profile '{}'", db_path.display(), profile_name);
    Ok(Session {
        engine: builder.build().await?,
        profile_name,
        settings,
        issuer,
    })
}

fn credential_store(profile_name: &str, profile: &CliProfile) -> Option<Arc<dyn CredentialStore>> {
    match profile.credential_storage {
        CredentialStorage::Database => None,
        CredentialStorage::Keyring => Some(Arc::new(KeyringCredentialStore::new(profile_name))),
    }
}

/// Stand-in remote for profiles without a backup URL. Local commands never
/// reach it because sync only runs with a stored credential.
struct UnconfiguredBackup;

impl UnconfiguredBackup {
    fn unavailable<T>() -> RemoteResult<T> {
        Err(RemoteError::Api("no backup URL is configured".to_string()))
    }
}

#[async_trait]
impl RemoteBackupClient for UnconfiguredBackup {
    async fn last_modified(&self, _token: &str) -> RemoteResult<Option<DateTime<Utc>>> {
        Self::unavailable()
    }

    async fn download(&self, _token: &str) -> RemoteResult<Option<RemoteBackupBlob>> {
        Self::unavailable()
    }

    async fn upload(&self, _token: &str, _blob: &RemoteBackupBlob) -> RemoteResult<()> {
        Self::unavailable()
    }

    async fn delete(&self, _token: &str) -> RemoteResult<()> {
        Self::unavailable()
    }
}

/// Live (non-deleted) tasks, open ones first, then by most recent edit.
pub async fn list_live_tasks(engine: &SyncEngine) -> Result<Vec<TaskRecord>, CliError> {
    let mut tasks: Vec<TaskRecord> = engine
        .task_store()
        .list_all()
        .await?
        .into_iter()
        .filter(|task| !task.is_deleted())
        .collect();
    tasks.sort_by(|left, right| {
        (left.status == TaskStatus::Done)
            .cmp(&(right.status == TaskStatus::Done))
            .then(right.updated_at.cmp(&left.updated_at))
    });
    Ok(tasks)
}

/// Find a live task by full id or unique id prefix.
pub fn resolve_task(query: &str, tasks: &[TaskRecord]) -> Result<TaskRecord, CliError> {
    let query = normalize_task_identifier(query)?;
    let matching: Vec<&TaskRecord> = tasks
        .iter()
        .filter(|task| !task.is_deleted() && task.id.to_string().starts_with(&query))
        .collect();

    match matching.as_slice() {
        [] => Err(CliError::TaskNotFound(query)),
        [task] => Ok((*task).clone()),
        many => {
            let options = many
                .iter()
                .take(3)
                .map(|task| short_id(&task.id.to_string()))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousTaskId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn format_task_lines(tasks: &[TaskRecord], now: DateTime<Utc>) -> Vec<String> {
    tasks
        .iter()
        .map(|task| {
            let marker = if task.status == TaskStatus::Done {
                "[x]"
            } else {
                "[ ]"
            };
            let title = task_preview(task, 40);
            let relative_time = format_relative_time(task.updated_at, now);
            let tags = render_tags(task);

            if tags.is_empty() {
                format!(
                    "{}  {marker} {title:<40}  {relative_time}",
                    short_id(&task.id.to_string())
                )
            } else {
                format!(
                    "{}  {marker} {title:<40}  {relative_time:<10}  {tags}",
                    short_id(&task.id.to_string())
                )
            }
        })
        .collect()
}

pub fn task_to_list_item(task: &TaskRecord, now: DateTime<Utc>) -> TaskListItem {
    let mut tags = task.tags.clone();
    tags.sort();

    TaskListItem {
        id: task.id.to_string(),
        title: task.title.clone(),
        status: task.status,
        notes: task.notes.clone(),
        due_date: task.due_date.map(|date| date.to_string()),
        tags,
        updated_at: format_timestamp(task.updated_at),
        relative_time: format_relative_time(task.updated_at, now),
    }
}

pub fn conflict_to_item(conflict: &SyncConflict) -> ConflictItem {
    ConflictItem {
        task_id: conflict.task_id.to_string(),
        local_title: conflict.local_snapshot.title.clone(),
        remote_title: conflict.remote_snapshot.title.clone(),
        local_updated_at: format_timestamp(conflict.local_snapshot.updated_at),
        remote_updated_at: format_timestamp(conflict.remote_snapshot.updated_at),
        detected_at: format_timestamp(conflict.detected_at),
    }
}

pub fn format_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  local: {} ({})  remote: {} ({})",
                short_id(&conflict.task_id.to_string()),
                task_preview(&conflict.local_snapshot, 30),
                format_timestamp(conflict.local_snapshot.updated_at),
                task_preview(&conflict.remote_snapshot, 30),
                format_timestamp(conflict.remote_snapshot.updated_at),
            )
        })
        .collect()
}

pub fn task_preview(task: &TaskRecord, max_chars: usize) -> String {
    let collapsed = task.title.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn render_tags(task: &TaskRecord) -> String {
    let mut tags = task.tags.clone();
    tags.sort();
    tags.into_iter()
        .map(|tag| format!("#{tag}"))
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn format_relative_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now
        .signed_duration_since(timestamp)
        .num_milliseconds()
        .max(0);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

/// Title from the arguments, falling back to piped stdin.
pub fn resolve_task_title(title_parts: &[String]) -> Result<String, CliError> {
    if let Some(title) = normalize_title(&title_parts.join(" ")) {
        return Ok(title);
    }

    if let Some(title) = read_piped_stdin()? {
        return Ok(title);
    }

    Err(CliError::EmptyTitle)
}

pub fn normalize_title(title: &str) -> Option<String> {
    let collapsed = title.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

pub fn normalize_task_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyTaskId)
    } else {
        Ok(trimmed.to_ascii_lowercase())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_title(&buffer))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os(DB_PATH_ENV).map(PathBuf::from)) {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("taskdeck").join("taskdeck.db"))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}
