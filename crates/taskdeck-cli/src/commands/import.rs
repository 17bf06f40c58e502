use std::path::Path;

use crate::commands::common::{open_session, OpenMode};
use crate::error::CliError;

pub async fn run_import(path: &Path, db_path: &Path, profile: Option<&str>) -> Result<(), CliError> {
    let raw = std::fs::read_to_string(path)?;
    let session = open_session(db_path, profile, OpenMode::Local).await?;

    let imported = session.engine.import_backup(&raw).await?;
    session.engine.shutdown().await;

    println!("Imported {imported} tasks from {}", path.display());
    Ok(())
}
