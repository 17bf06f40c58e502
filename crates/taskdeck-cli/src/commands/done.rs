use std::path::Path;

use taskdeck_core::models::ChangeKind;

use crate::commands::common::{list_live_tasks, open_session, resolve_task, OpenMode};
use crate::error::CliError;

pub async fn run_done(id: &str, db_path: &Path, profile: Option<&str>) -> Result<(), CliError> {
    let session = open_session(db_path, profile, OpenMode::Local).await?;
    let mut task = resolve_task(id, &list_live_tasks(&session.engine).await?)?;

    task.complete(session.engine.now());
    session.engine.save_task(&task, ChangeKind::Update).await?;
    session.engine.shutdown().await;

    println!("{}", task.id);
    Ok(())
}
