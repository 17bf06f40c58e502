use std::path::Path;

use taskdeck_core::models::TaskStatus;

use crate::commands::common::{
    format_task_lines, list_live_tasks, open_session, task_to_list_item, OpenMode, TaskListItem,
};
use crate::error::CliError;

pub async fn run_list(
    include_done: bool,
    as_json: bool,
    db_path: &Path,
    profile: Option<&str>,
) -> Result<(), CliError> {
    let session = open_session(db_path, profile, OpenMode::Local).await?;
    let now = session.engine.now();
    let tasks: Vec<_> = list_live_tasks(&session.engine)
        .await?
        .into_iter()
        .filter(|task| include_done || task.status != TaskStatus::Done)
        .collect();

    if as_json {
        let json_items = tasks
            .iter()
            .map(|task| task_to_list_item(task, now))
            .collect::<Vec<TaskListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if tasks.is_empty() {
        println!("No tasks.");
    } else {
        for line in format_task_lines(&tasks, now) {
            println!("{line}");
        }
    }

    Ok(())
}
