//! Whole-file backup blob shared by remote sync, export, and import.
//!
//! The blob is an opaque unit: every sync either replaces it completely or
//! leaves it untouched. Its checksum is the lowercase hex SHA-256 of the JSON
//! serialization of the task array.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::TaskRecord;
use crate::{Error, Result};

/// Current backup format version written by this crate.
pub const BACKUP_FORMAT_VERSION: u32 = 1;

/// Remote backup representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteBackupBlob {
    pub version: u32,
    pub export_timestamp: DateTime<Utc>,
    pub tasks: Vec<TaskRecord>,
    pub checksum: String,
}

impl RemoteBackupBlob {
    /// Build a blob from `tasks`, ordered by id, stamped with `exported_at`.
    pub fn from_tasks(mut tasks: Vec<TaskRecord>, exported_at: DateTime<Utc>) -> Result<Self> {
        tasks.sort_by(|left, right| left.id.cmp(&right.id));
        let checksum = compute_checksum(&tasks)?;
        Ok(Self {
            version: BACKUP_FORMAT_VERSION,
            export_timestamp: exported_at,
            tasks,
            checksum,
        })
    }

    /// Recompute the checksum and compare it with the declared one.
    pub fn verify(&self) -> Result<()> {
        if self.version == 0 || self.version > BACKUP_FORMAT_VERSION {
            return Err(Error::InvalidInput(format!(
                "unsupported backup version {} (expected <= {BACKUP_FORMAT_VERSION})",
                self.version
            )));
        }

        let actual = compute_checksum(&self.tasks)?;
        let expected = self.checksum.trim().to_ascii_lowercase();
        if expected == actual {
            Ok(())
        } else {
            Err(Error::IntegrityFailure { expected, actual })
        }
    }

    /// Parse a blob and verify its checksum.
    pub fn from_json(raw: &str) -> Result<Self> {
        let blob: Self = serde_json::from_str(raw)?;
        blob.verify()?;
        Ok(blob)
    }

    /// Pretty-printed JSON for files and uploads.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Number of non-tombstoned tasks in the blob
    #[must_use]
    pub fn live_task_count(&self) -> usize {
        self.tasks.iter().filter(|task| !task.is_deleted()).count()
    }
}

/// SHA-256 over the serialized task array, as 64 lowercase hex characters.
pub fn compute_checksum(tasks: &[TaskRecord]) -> Result<String> {
    let serialized = serde_json::to_vec(tasks)?;
    Ok(sha256_hex(&serialized))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Suggested file name for a local export.
#[must_use]
pub fn suggested_backup_file_name(exported_at: DateTime<Utc>) -> String {
    format!("taskdeck-backup-{}.json", exported_at.format("%Y%m%d-%H%M%S"))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::models::TaskId;

    fn at(value: &str) -> DateTime<Utc> {
        value.parse().unwrap()
    }

    fn task(id: &str, title: &str) -> TaskRecord {
        let mut task = TaskRecord::new(title, at("2024-06-01T09:00:00Z"));
        task.id = id.parse::<TaskId>().unwrap();
        task
    }

    #[test]
    fn checksum_is_deterministic_for_equal_content() {
        let first = vec![task("018f0000-0000-7000-8000-000000000001", "A")];
        let second = vec![task("018f0000-0000-7000-8000-000000000001", "A")];

        let checksum = compute_checksum(&first).unwrap();
        assert_eq!(checksum, compute_checksum(&second).unwrap());
        assert_eq!(checksum.len(), 64);
        assert!(checksum
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn checksum_changes_on_any_field_difference() {
        let base = task("018f0000-0000-7000-8000-000000000001", "A");
        let mut renamed = base.clone();
        renamed.title = "B".to_string();
        let mut estimated = base.clone();
        estimated.estimate_minutes = Some(15);

        let base_checksum = compute_checksum(std::slice::from_ref(&base)).unwrap();
        assert_ne!(base_checksum, compute_checksum(&[renamed]).unwrap());
        assert_ne!(base_checksum, compute_checksum(&[estimated]).unwrap());
    }

    #[test]
    fn from_json_rejects_checksum_mismatch() {
        let blob = RemoteBackupBlob::from_tasks(
            vec![task("018f0000-0000-7000-8000-000000000001", "A")],
            at("2024-06-02T00:00:00Z"),
        )
        .unwrap();
        let mut tampered = blob.clone();
        tampered.tasks[0].title = "tampered".to_string();
        let raw = tampered.to_json().unwrap();

        let error = RemoteBackupBlob::from_json(&raw).unwrap_err();
        assert!(matches!(error, Error::IntegrityFailure { .. }));
        assert!(RemoteBackupBlob::from_json(&blob.to_json().unwrap()).is_ok());
    }

    #[test]
    fn from_tasks_orders_by_id() {
        let blob = RemoteBackupBlob::from_tasks(
            vec![
                task("018f0000-0000-7000-8000-000000000002", "second"),
                task("018f0000-0000-7000-8000-000000000001", "first"),
            ],
            at("2024-06-02T00:00:00Z"),
        )
        .unwrap();
        assert_eq!(blob.tasks[0].title, "first");
        assert_eq!(blob.version, BACKUP_FORMAT_VERSION);
    }

    #[test]
    fn blob_uses_camel_case_wire_names() {
        let blob = RemoteBackupBlob::from_tasks(Vec::new(), at("2024-06-02T00:00:00Z")).unwrap();
        let value = serde_json::to_value(&blob).unwrap();
        assert_eq!(value["exportTimestamp"], "2024-06-02T00:00:00Z");
        assert!(value["tasks"].as_array().unwrap().is_empty());
    }

    #[test]
    fn suggested_backup_file_name_uses_timestamp() {
        assert_eq!(
            suggested_backup_file_name(at("2024-06-02T10:11:12Z")),
            "taskdeck-backup-20240602-101112.json"
        );
    }
}
