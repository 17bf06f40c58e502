use std::path::Path;

use chrono::NaiveDate;
use taskdeck_core::models::{ChangeKind, TaskPriority, TaskRecord};

use crate::commands::common::{open_session, resolve_task_title, OpenMode};
use crate::error::CliError;

pub struct NewTask {
    pub title_parts: Vec<String>,
    pub notes: Option<String>,
    pub priority: TaskPriority,
    pub due_date: Option<NaiveDate>,
    pub tags: Vec<String>,
}

pub async fn run_add(
    new_task: NewTask,
    db_path: &Path,
    profile: Option<&str>,
) -> Result<(), CliError> {
    let title = resolve_task_title(&new_task.title_parts)?;
    let session = open_session(db_path, profile, OpenMode::Local).await?;

    let mut task = TaskRecord::new(title, session.engine.now());
    task.notes = taskdeck_core::util::normalize_text_option(new_task.notes);
    task.priority = new_task.priority;
    task.due_date = new_task.due_date;
    task.tags = normalize_tags(new_task.tags);

    session.engine.save_task(&task, ChangeKind::Create).await?;
    session.engine.shutdown().await;

    println!("{}", task.id);
    Ok(())
}

pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut normalized: Vec<String> = tags
        .into_iter()
        .map(|tag| tag.trim().trim_start_matches('#').to_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}
