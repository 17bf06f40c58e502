use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use taskdeck_core::backup::suggested_backup_file_name;

use crate::commands::common::{open_session, OpenMode};
use crate::error::CliError;

pub async fn run_export(
    output_path: Option<&Path>,
    db_path: &Path,
    profile: Option<&str>,
) -> Result<(), CliError> {
    let session = open_session(db_path, profile, OpenMode::Local).await?;
    let blob = session.engine.export_backup().await?;
    let rendered = blob.to_json()?;

    if let Some(path) = output_path {
        let path = export_file_path(path, blob.export_timestamp);
        std::fs::write(&path, rendered)?;
        println!("{}", path.display());
    } else {
        println!("{rendered}");
    }

    Ok(())
}

/// A directory gets a timestamped file name inside it.
pub fn export_file_path(path: &Path, exported_at: DateTime<Utc>) -> PathBuf {
    if path.is_dir() {
        path.join(suggested_backup_file_name(exported_at))
    } else {
        path.to_path_buf()
    }
}
