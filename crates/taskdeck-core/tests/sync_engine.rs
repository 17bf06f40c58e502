//! End-to-end sync behavior over in-memory collaborators.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use pretty_assertions::assert_eq;
use tokio::sync::{Notify, Semaphore};

use taskdeck_core::auth::{AuthError, AuthResult, Credential, TokenIssuer};
use taskdeck_core::backup::RemoteBackupBlob;
use taskdeck_core::clock::{Clock, ManualClock};
use taskdeck_core::config::SyncSettings;
use taskdeck_core::models::{ChangeKind, ConflictChoice, SyncStatus, TaskRecord};
use taskdeck_core::remote::{MemoryBackupClient, RemoteBackupClient, RemoteError, RemoteResult};
use taskdeck_core::store::{MemorySessionRepository, MemoryTaskStore, SessionRepository, TaskStore};
use taskdeck_core::sync::{ConnectOutcome, MergeChoice};
use taskdeck_core::{Error, SyncEngine};

const TOKEN: &str = "token-1";

fn at(value: &str) -> DateTime<Utc> {
    value.parse().unwrap()
}

fn task(title: &str, updated_at: &str) -> TaskRecord {
    let mut task = TaskRecord::new(title, at("2024-01-01T00:00:00Z"));
    task.updated_at = at(updated_at);
    task
}

struct Harness {
    engine: SyncEngine,
    tasks: Arc<MemoryTaskStore>,
    session: Arc<MemorySessionRepository>,
    remote: Arc<MemoryBackupClient>,
    clock: Arc<ManualClock>,
}

struct HarnessBuilder {
    local: Vec<TaskRecord>,
    remote: Vec<TaskRecord>,
    watermark: Option<DateTime<Utc>>,
    credential: Option<Credential>,
    issuer: Option<Arc<dyn TokenIssuer>>,
    online: bool,
}

impl HarnessBuilder {
    fn new() -> Self {
        Self {
            local: Vec::new(),
            remote: Vec::new(),
            watermark: None,
            credential: Some(Credential::bearer(TOKEN)),
            issuer: None,
            online: true,
        }
    }

    fn local(mut self, tasks: &[TaskRecord]) -> Self {
        self.local = tasks.to_vec();
        self
    }

    fn remote(mut self, tasks: &[TaskRecord]) -> Self {
        self.remote = tasks.to_vec();
        self
    }

    fn watermark(mut self, value: &str) -> Self {
        self.watermark = Some(at(value));
        self
    }

    fn credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    fn issuer(mut self, issuer: Arc<dyn TokenIssuer>) -> Self {
        self.issuer = Some(issuer);
        self
    }

    fn offline(mut self) -> Self {
        self.online = false;
        self
    }

    async fn build(self) -> Harness {
        let clock = Arc::new(ManualClock::new(at("2024-06-01T12:00:00Z")));
        let tasks = Arc::new(MemoryTaskStore::with_tasks(self.local));
        let session = Arc::new(MemorySessionRepository::default());
        let remote = Arc::new(MemoryBackupClient::new(clock.clone()));

        if !self.remote.is_empty() {
            remote
                .seed(RemoteBackupBlob::from_tasks(self.remote, at("2024-05-01T00:00:00Z")).unwrap())
                .await;
        }
        session.set_last_synced_at(self.watermark).await.unwrap();
        session
            .save_credential(self.credential.as_ref())
            .await
            .unwrap();

        let mut builder = SyncEngine::builder()
            .task_store(tasks.clone())
            .session_repository(session.clone())
            .remote(remote.clone())
            .clock(clock.clone())
            .settings(SyncSettings::default())
            .online(self.online);
        if let Some(issuer) = self.issuer {
            builder = builder.token_issuer(issuer);
        }

        Harness {
            engine: builder.build().await.unwrap(),
            tasks,
            session,
            remote,
            clock,
        }
    }
}

struct CountingIssuer {
    calls: AtomicUsize,
    next_token: Option<&'static str>,
}

impl CountingIssuer {
    fn issuing(token: &'static str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            next_token: Some(token),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            next_token: None,
        })
    }
}

#[async_trait]
impl TokenIssuer for CountingIssuer {
    async fn refresh(&self, _credential: &Credential) -> AuthResult<Credential> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.next_token
            .map(Credential::bearer)
            .ok_or_else(|| AuthError::Rejected("interaction required".to_string()))
    }
}

/// Remote that can park the next download until the test releases it.
struct HeldRemote {
    inner: MemoryBackupClient,
    hold_next: AtomicBool,
    parked: Notify,
    released: Semaphore,
}

impl HeldRemote {
    fn new(inner: MemoryBackupClient) -> Arc<Self> {
        Arc::new(Self {
            inner,
            hold_next: AtomicBool::new(false),
            parked: Notify::new(),
            released: Semaphore::new(0),
        })
    }

    fn hold_next_download(&self) {
        self.hold_next.store(true, Ordering::SeqCst);
    }

    async fn wait_until_parked(&self) {
        self.parked.notified().await;
    }

    fn release(&self) {
        self.released.add_permits(1);
    }
}

#[async_trait]
impl RemoteBackupClient for HeldRemote {
    async fn last_modified(&self, token: &str) -> RemoteResult<Option<DateTime<Utc>>> {
        self.inner.last_modified(token).await
    }

    async fn download(&self, token: &str) -> RemoteResult<Option<RemoteBackupBlob>> {
        if self.hold_next.swap(false, Ordering::SeqCst) {
            self.parked.notify_one();
            if let Ok(permit) = self.released.acquire().await {
                permit.forget();
            }
        }
        self.inner.download(token).await
    }

    async fn upload(&self, token: &str, blob: &RemoteBackupBlob) -> RemoteResult<()> {
        self.inner.upload(token, blob).await
    }

    async fn delete(&self, token: &str) -> RemoteResult<()> {
        self.inner.delete(token).await
    }
}

struct HeldHarness {
    engine: Arc<SyncEngine>,
    tasks: Arc<MemoryTaskStore>,
    remote: Arc<HeldRemote>,
}

async fn held_harness(
    local: &[TaskRecord],
    remote_tasks: &[TaskRecord],
    watermark: Option<&str>,
) -> HeldHarness {
    let clock = Arc::new(ManualClock::new(at("2024-06-01T12:00:00Z")));
    let tasks = Arc::new(MemoryTaskStore::with_tasks(local.to_vec()));
    let session = Arc::new(MemorySessionRepository::default());
    let inner = MemoryBackupClient::new(clock.clone());
    if !remote_tasks.is_empty() {
        inner
            .seed(
                RemoteBackupBlob::from_tasks(remote_tasks.to_vec(), at("2024-05-01T00:00:00Z"))
                    .unwrap(),
            )
            .await;
    }
    session
        .set_last_synced_at(watermark.map(at))
        .await
        .unwrap();
    session
        .save_credential(Some(&Credential::bearer(TOKEN)))
        .await
        .unwrap();
    let remote = HeldRemote::new(inner);

    let engine = SyncEngine::builder()
        .task_store(tasks.clone())
        .session_repository(session)
        .remote(remote.clone())
        .clock(clock)
        .build()
        .await
        .unwrap();
    HeldHarness {
        engine: Arc::new(engine),
        tasks,
        remote,
    }
}

async fn let_spawned_tasks_run() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

async fn remote_titles(remote: &MemoryBackupClient) -> Vec<String> {
    let mut titles: Vec<String> = remote
        .blob()
        .await
        .map(|blob| blob.tasks.into_iter().map(|task| task.title).collect())
        .unwrap_or_default();
    titles.sort();
    titles
}

#[tokio::test]
async fn local_only_task_is_uploaded_and_watermark_advances() {
    let x = task("Task X", "2024-05-30T08:00:00Z");
    let h = HarnessBuilder::new().local(&[x.clone()]).build().await;

    let report = h.engine.perform_sync().await.unwrap();

    assert_eq!(report.uploaded_count, 1);
    assert_eq!(report.downloaded_count, 0);
    assert_eq!(report.conflicts, 0);
    assert_eq!(h.engine.last_synced_at().await.unwrap(), Some(h.clock.now()));
    assert_eq!(h.remote.blob().await.unwrap().tasks, vec![x]);
    assert_eq!(h.engine.status().status, SyncStatus::Synced);
}

#[tokio::test]
async fn second_sync_without_changes_moves_nothing() {
    let h = HarnessBuilder::new()
        .local(&[task("Local", "2024-05-30T08:00:00Z")])
        .remote(&[task("Remote", "2024-05-29T08:00:00Z")])
        .build()
        .await;

    h.engine.perform_sync().await.unwrap();
    let first_blob = h.remote.blob().await.unwrap();
    h.clock.advance(Duration::minutes(5));
    let second = h.engine.perform_sync().await.unwrap();

    assert_eq!(second.uploaded_count, 0);
    assert_eq!(second.downloaded_count, 0);
    assert_eq!(second.conflicts, 0);
    assert_eq!(h.remote.blob().await.unwrap().checksum, first_blob.checksum);
}

#[tokio::test]
async fn remote_only_task_is_written_locally_verbatim() {
    let mut remote_task = task("From laptop", "2024-05-20T10:00:00Z");
    remote_task.tags = vec!["errand".to_string()];
    remote_task.notes = Some("pick up keys".to_string());
    let h = HarnessBuilder::new().remote(&[remote_task.clone()]).build().await;

    let report = h.engine.perform_sync().await.unwrap();

    assert_eq!(report.downloaded_count, 1);
    assert_eq!(h.tasks.get(&remote_task.id).await.unwrap(), Some(remote_task));
}

#[tokio::test]
async fn newer_local_edit_replaces_remote_copy() {
    let remote_copy = task("Old title", "2024-05-01T09:00:00Z");
    let mut local_copy = remote_copy.clone();
    local_copy.title = "New title".to_string();
    local_copy.updated_at = at("2024-05-10T09:00:00Z");
    let h = HarnessBuilder::new()
        .local(&[local_copy])
        .remote(&[remote_copy])
        .watermark("2024-05-05T00:00:00Z")
        .build()
        .await;

    let report = h.engine.perform_sync().await.unwrap();

    assert_eq!(report.uploaded_count, 1);
    assert_eq!(remote_titles(&h.remote).await, vec!["New title".to_string()]);
}

#[tokio::test]
async fn newer_remote_edit_is_downloaded() {
    // Local edit predates the watermark; remote edit follows it
    let local_copy = task("Y on phone", "2024-05-02T00:00:00Z");
    let mut remote_copy = local_copy.clone();
    remote_copy.title = "Y on laptop".to_string();
    remote_copy.updated_at = at("2024-05-04T00:00:00Z");
    let h = HarnessBuilder::new()
        .local(&[local_copy.clone()])
        .remote(&[remote_copy.clone()])
        .watermark("2024-05-03T00:00:00Z")
        .build()
        .await;

    let report = h.engine.perform_sync().await.unwrap();

    assert_eq!(report.downloaded_count, 1);
    assert_eq!(report.conflicts, 0);
    assert_eq!(h.tasks.get(&local_copy.id).await.unwrap(), Some(remote_copy));
}

#[tokio::test]
async fn concurrent_edits_pause_on_conflict_and_leave_remote_untouched() {
    let local_copy = task("Z local", "2024-05-02T00:00:00Z");
    let mut remote_copy = local_copy.clone();
    remote_copy.title = "Z remote".to_string();
    remote_copy.updated_at = at("2024-05-03T00:00:00Z");
    let bystander = task("Unrelated", "2024-05-02T06:00:00Z");
    let h = HarnessBuilder::new()
        .local(&[local_copy.clone(), bystander])
        .remote(&[remote_copy.clone()])
        .watermark("2024-05-01T00:00:00Z")
        .build()
        .await;
    h.engine
        .track_change(local_copy.id, ChangeKind::Update, Some(local_copy.clone()))
        .await
        .unwrap();
    let uploads_before = h.remote.upload_count().await;

    let report = h.engine.perform_sync().await.unwrap();

    assert_eq!(report.conflicts, 1);
    assert_eq!(h.remote.upload_count().await, uploads_before);
    assert_eq!(remote_titles(&h.remote).await, vec!["Z remote".to_string()]);
    assert_eq!(h.tasks.get(&local_copy.id).await.unwrap(), Some(local_copy.clone()));
    assert_eq!(h.engine.status().status, SyncStatus::Conflict);
    assert_eq!(h.engine.pending_change_count().await.unwrap(), 1);

    let conflicts = h.engine.conflicts().await.unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].local_snapshot, local_copy);
    assert_eq!(conflicts[0].remote_snapshot, remote_copy);

    // Detecting the same conflict again keeps a single entry
    h.engine.perform_sync().await.unwrap();
    assert_eq!(h.engine.conflict_count().await.unwrap(), 1);
}

#[tokio::test]
async fn resolving_a_conflict_pushes_the_choice_on_next_sync() {
    let local_copy = task("Keep me", "2024-05-02T00:00:00Z");
    let mut remote_copy = local_copy.clone();
    remote_copy.title = "Drop me".to_string();
    remote_copy.updated_at = at("2024-05-03T00:00:00Z");
    let h = HarnessBuilder::new()
        .local(&[local_copy.clone()])
        .remote(&[remote_copy.clone()])
        .watermark("2024-05-01T00:00:00Z")
        .build()
        .await;
    h.engine.perform_sync().await.unwrap();

    h.clock.advance(Duration::minutes(1));
    let resolved = h
        .engine
        .resolve_conflict(&local_copy.id, ConflictChoice::Local)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(resolved.title, "Keep me");
    assert!(resolved.updated_at > local_copy.updated_at);
    assert!(resolved.updated_at > remote_copy.updated_at);
    assert_eq!(h.engine.conflict_count().await.unwrap(), 0);
    assert_eq!(h.engine.pending_change_count().await.unwrap(), 1);
    assert_eq!(h.engine.status().status, SyncStatus::Idle);

    let report = h.engine.perform_sync().await.unwrap();
    assert_eq!(report.conflicts, 0);
    assert_eq!(remote_titles(&h.remote).await, vec!["Keep me".to_string()]);
    assert_eq!(h.engine.pending_change_count().await.unwrap(), 0);
}

#[tokio::test]
async fn resolving_an_unknown_task_is_a_no_op() {
    let h = HarnessBuilder::new().build().await;
    let resolved = h
        .engine
        .resolve_conflict(&taskdeck_core::TaskId::new(), ConflictChoice::Remote)
        .await
        .unwrap();
    assert_eq!(resolved, None);
    assert_eq!(h.engine.pending_change_count().await.unwrap(), 0);
}

#[tokio::test]
async fn sync_without_credential_fails_fast() {
    let h = HarnessBuilder::new().credential(None).build().await;

    let error = h.engine.perform_sync().await.unwrap_err();

    assert!(matches!(error, Error::NotAuthenticated));
    assert_eq!(h.remote.download_count().await, 0);
}

#[tokio::test]
async fn rejected_token_is_refreshed_and_retried_once() {
    let issuer = CountingIssuer::issuing("token-2");
    let h = HarnessBuilder::new()
        .local(&[task("A", "2024-05-30T08:00:00Z")])
        .issuer(issuer.clone())
        .build()
        .await;
    h.remote.accept_only("token-2").await;

    let report = h.engine.perform_sync().await.unwrap();

    assert!(report.uploaded_blob);
    assert_eq!(issuer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.session.load_credential().await.unwrap().unwrap().access_token,
        "token-2"
    );
}

#[tokio::test]
async fn second_auth_failure_reports_error() {
    let issuer = CountingIssuer::issuing("token-2");
    let h = HarnessBuilder::new().issuer(issuer.clone()).build().await;
    h.remote.accept_only("token-3").await;

    let error = h.engine.perform_sync().await.unwrap_err();

    assert!(error.is_auth_expired());
    assert_eq!(issuer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.engine.status().status, SyncStatus::Error);
}

#[tokio::test]
async fn failed_refresh_reports_error_without_retry() {
    let issuer = CountingIssuer::failing();
    let h = HarnessBuilder::new().issuer(issuer.clone()).build().await;
    h.remote.accept_only("other").await;

    assert!(h.engine.perform_sync().await.is_err());
    assert_eq!(h.remote.download_count().await, 0);
    assert_eq!(h.engine.status().status, SyncStatus::Error);
}

#[tokio::test]
async fn network_failure_goes_offline_and_keeps_queue() {
    let pending = task("Queued", "2024-05-30T08:00:00Z");
    let h = HarnessBuilder::new().local(&[pending.clone()]).build().await;
    h.engine
        .track_change(pending.id, ChangeKind::Create, Some(pending.clone()))
        .await
        .unwrap();
    h.engine.shutdown().await;
    h.remote
        .fail_next(RemoteError::Network("connection reset".to_string()))
        .await;

    let error = h.engine.perform_sync().await.unwrap_err();

    assert!(error.is_network_unavailable());
    assert_eq!(h.engine.status().status, SyncStatus::Offline);
    assert_eq!(h.engine.pending_change_count().await.unwrap(), 1);
    assert!(h.remote.blob().await.is_none());
}

#[tokio::test]
async fn tampered_remote_blob_is_rejected_before_any_write() {
    let local_copy = task("Local", "2024-05-30T08:00:00Z");
    let h = HarnessBuilder::new().local(&[local_copy.clone()]).build().await;
    let mut blob = RemoteBackupBlob::from_tasks(
        vec![task("Remote", "2024-05-29T08:00:00Z")],
        at("2024-05-29T09:00:00Z"),
    )
    .unwrap();
    blob.tasks[0].title = "Edited in transit".to_string();
    h.remote.seed(blob).await;

    let error = h.engine.perform_sync().await.unwrap_err();

    assert!(matches!(error, Error::IntegrityFailure { .. }));
    assert_eq!(h.tasks.list_all().await.unwrap(), vec![local_copy]);
    assert_eq!(h.engine.last_synced_at().await.unwrap(), None);
}

#[tokio::test]
async fn import_with_bad_checksum_leaves_store_untouched() {
    let existing = task("Existing", "2024-05-30T08:00:00Z");
    let h = HarnessBuilder::new().local(&[existing.clone()]).build().await;
    let exported = RemoteBackupBlob::from_tasks(
        vec![task("Imported", "2024-05-01T00:00:00Z")],
        at("2024-05-01T01:00:00Z"),
    )
    .unwrap();
    let tampered = exported
        .to_json()
        .unwrap()
        .replace("Imported", "Imported!");

    let error = h.engine.import_backup(&tampered).await.unwrap_err();

    assert!(matches!(error, Error::IntegrityFailure { .. }));
    assert_eq!(h.tasks.list_all().await.unwrap(), vec![existing]);
    assert_eq!(h.engine.pending_change_count().await.unwrap(), 0);
}

#[tokio::test]
async fn export_then_import_replaces_local_tasks() {
    let source = HarnessBuilder::new()
        .local(&[task("One", "2024-05-01T00:00:00Z"), task("Two", "2024-05-02T00:00:00Z")])
        .build()
        .await;
    let raw = source.engine.export_backup().await.unwrap().to_json().unwrap();

    let target = HarnessBuilder::new()
        .local(&[task("Stale", "2024-04-01T00:00:00Z")])
        .build()
        .await;
    let imported = target.engine.import_backup(&raw).await.unwrap();
    target.engine.shutdown().await;

    assert_eq!(imported, 2);
    let mut titles: Vec<String> = target
        .tasks
        .list_all()
        .await
        .unwrap()
        .into_iter()
        .map(|task| task.title)
        .collect();
    titles.sort();
    assert_eq!(titles, vec!["One".to_string(), "Two".to_string()]);
    assert_eq!(target.engine.pending_change_count().await.unwrap(), 2);
}

#[tokio::test(start_paused = true)]
async fn bursts_of_changes_coalesce_into_one_sync() {
    let h = HarnessBuilder::new().build().await;
    let mut record = task("Draft", "2024-05-30T08:00:00Z");

    for title in ["Draft 1", "Draft 2", "Draft 3"] {
        record.title = title.to_string();
        record.touch(h.clock.now());
        h.engine
            .save_task(&record, ChangeKind::Update)
            .await
            .unwrap();
        tokio::time::sleep(StdDuration::from_millis(500)).await;
    }
    assert!(h.engine.is_sync_pending());
    assert_eq!(h.remote.upload_count().await, 0);

    tokio::time::sleep(StdDuration::from_secs(5)).await;

    assert_eq!(h.remote.upload_count().await, 1);
    assert!(!h.engine.is_sync_pending());
    assert_eq!(remote_titles(&h.remote).await, vec!["Draft 3".to_string()]);
    assert_eq!(h.engine.pending_task_count().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn offline_changes_wait_for_reconnect() {
    let h = HarnessBuilder::new().offline().build().await;
    assert_eq!(h.engine.status().status, SyncStatus::Offline);

    let record = task("Written on a plane", "2024-05-30T08:00:00Z");
    h.engine
        .save_task(&record, ChangeKind::Create)
        .await
        .unwrap();
    assert!(!h.engine.is_sync_pending());

    tokio::time::sleep(StdDuration::from_secs(10)).await;
    assert_eq!(h.remote.upload_count().await, 0);

    h.engine.handle_online().await;
    assert_eq!(h.engine.status().status, SyncStatus::Idle);
    assert!(h.engine.is_sync_pending());

    tokio::time::sleep(StdDuration::from_secs(5)).await;
    assert_eq!(h.remote.upload_count().await, 1);
    assert_eq!(h.engine.status().status, SyncStatus::Synced);
}

#[tokio::test]
async fn going_offline_is_published() {
    let h = HarnessBuilder::new().build().await;
    let mut statuses = h.engine.subscribe_status();

    h.engine.handle_offline();

    statuses.changed().await.unwrap();
    assert_eq!(statuses.borrow().status, SyncStatus::Offline);
}

#[tokio::test(start_paused = true)]
async fn polling_syncs_when_remote_is_newer_than_watermark() {
    let h = HarnessBuilder::new()
        .remote(&[task("From laptop", "2024-05-20T10:00:00Z")])
        .watermark("2024-05-01T00:00:00Z")
        .build()
        .await;

    assert!(h.engine.check_remote().await.unwrap());
    assert_eq!(h.tasks.list_all().await.unwrap().len(), 1);

    // Watermark now postdates the blob
    h.clock.advance(Duration::minutes(1));
    assert!(!h.engine.check_remote().await.unwrap());

    h.engine.start_polling().await;
    tokio::time::sleep(StdDuration::from_secs(1)).await;
    assert_eq!(h.remote.download_count().await, 1);
    h.engine.stop_polling().await;
}

#[tokio::test]
async fn first_connect_with_data_on_both_sides_waits_for_decision() {
    let h = HarnessBuilder::new()
        .credential(None)
        .local(&[task("Phone task", "2024-05-30T08:00:00Z")])
        .remote(&[task("Laptop task", "2024-05-29T08:00:00Z")])
        .build()
        .await;

    let outcome = h.engine.connect(&Credential::bearer(TOKEN)).await.unwrap();

    let ConnectOutcome::DecisionRequired(summary) = outcome else {
        panic!("expected a merge decision, got {outcome:?}");
    };
    assert_eq!(summary.local_task_count, 1);
    assert_eq!(summary.remote_task_count, 1);
    assert_eq!(h.remote.upload_count().await, 0);
    assert_eq!(h.engine.pending_first_connect().await, Some(summary));

    let report = h
        .engine
        .apply_first_connect_decision(MergeChoice::Merge)
        .await
        .unwrap();
    assert_eq!(report.merged_count, 2);
    assert_eq!(
        remote_titles(&h.remote).await,
        vec!["Laptop task".to_string(), "Phone task".to_string()]
    );
    assert_eq!(h.engine.pending_first_connect().await, None);
}

#[tokio::test]
async fn first_connect_use_remote_discards_local_tasks() {
    let laptop = task("Laptop task", "2024-05-29T08:00:00Z");
    let h = HarnessBuilder::new()
        .credential(None)
        .local(&[task("Phone task", "2024-05-30T08:00:00Z")])
        .remote(&[laptop.clone()])
        .build()
        .await;
    h.engine.connect(&Credential::bearer(TOKEN)).await.unwrap();

    h.engine
        .apply_first_connect_decision(MergeChoice::UseRemote)
        .await
        .unwrap();

    assert_eq!(h.tasks.list_all().await.unwrap(), vec![laptop]);
    assert_eq!(h.remote.upload_count().await, 0);
    assert!(h.engine.last_synced_at().await.unwrap().is_some());
}

#[tokio::test]
async fn first_connect_use_local_overwrites_remote() {
    let h = HarnessBuilder::new()
        .credential(None)
        .local(&[task("Phone task", "2024-05-30T08:00:00Z")])
        .remote(&[task("Laptop task", "2024-05-29T08:00:00Z")])
        .build()
        .await;
    h.engine.connect(&Credential::bearer(TOKEN)).await.unwrap();

    h.engine
        .apply_first_connect_decision(MergeChoice::UseLocal)
        .await
        .unwrap();

    assert_eq!(remote_titles(&h.remote).await, vec!["Phone task".to_string()]);
    assert_eq!(h.engine.status().status, SyncStatus::Synced);
}

#[tokio::test]
async fn first_connect_without_remote_data_syncs_directly() {
    let h = HarnessBuilder::new()
        .credential(None)
        .local(&[task("Phone task", "2024-05-30T08:00:00Z")])
        .build()
        .await;

    let outcome = h.engine.connect(&Credential::bearer(TOKEN)).await.unwrap();

    assert!(matches!(outcome, ConnectOutcome::Synced(report) if report.uploaded_count == 1));
    assert!(h.engine.is_connected().await.unwrap());
    let error = h
        .engine
        .apply_first_connect_decision(MergeChoice::Merge)
        .await
        .unwrap_err();
    assert!(matches!(error, Error::InvalidInput(_)));
}

#[tokio::test]
async fn disconnect_keeps_pending_changes() {
    let record = task("Unsynced", "2024-05-30T08:00:00Z");
    let h = HarnessBuilder::new()
        .watermark("2024-05-01T00:00:00Z")
        .build()
        .await;
    h.engine
        .save_task(&record, ChangeKind::Create)
        .await
        .unwrap();

    h.engine.disconnect().await.unwrap();

    assert!(!h.engine.is_connected().await.unwrap());
    assert!(!h.engine.is_sync_pending());
    assert_eq!(h.engine.last_synced_at().await.unwrap(), None);
    assert_eq!(h.engine.pending_change_count().await.unwrap(), 1);
    assert_eq!(h.engine.status().status, SyncStatus::Idle);
}

#[tokio::test]
async fn deleting_remote_backup_resets_watermark() {
    let h = HarnessBuilder::new()
        .local(&[task("A", "2024-05-30T08:00:00Z")])
        .build()
        .await;
    h.engine.perform_sync().await.unwrap();

    h.engine.delete_remote_backup().await.unwrap();

    assert!(h.remote.blob().await.is_none());
    assert_eq!(h.engine.last_synced_at().await.unwrap(), None);
}

#[tokio::test]
async fn engine_restores_conflict_status_on_startup() {
    let local_copy = task("Z local", "2024-05-02T00:00:00Z");
    let mut remote_copy = local_copy.clone();
    remote_copy.updated_at = at("2024-05-03T00:00:00Z");
    let h = HarnessBuilder::new()
        .local(&[local_copy])
        .remote(&[remote_copy])
        .watermark("2024-05-01T00:00:00Z")
        .build()
        .await;
    h.engine.perform_sync().await.unwrap();

    let reopened = SyncEngine::builder()
        .task_store(h.tasks.clone())
        .session_repository(h.session.clone())
        .remote(h.remote.clone())
        .build()
        .await
        .unwrap();

    assert_eq!(reopened.status().status, SyncStatus::Conflict);
    assert_eq!(reopened.conflict_count().await.unwrap(), 1);
}

#[tokio::test]
async fn builder_requires_collaborators() {
    let result = SyncEngine::builder()
        .task_store(Arc::new(MemoryTaskStore::default()))
        .build()
        .await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));
}

#[tokio::test]
async fn overlapping_syncs_run_one_after_another() {
    let h = held_harness(
        &[task("Local", "2024-05-30T08:00:00Z")],
        &[task("Remote", "2024-05-29T08:00:00Z")],
        None,
    )
    .await;

    h.remote.hold_next_download();
    let first = tokio::spawn({
        let engine = Arc::clone(&h.engine);
        async move { engine.perform_sync().await }
    });
    h.remote.wait_until_parked().await;
    assert!(h.engine.is_syncing());

    let second = tokio::spawn({
        let engine = Arc::clone(&h.engine);
        async move { engine.perform_sync().await }
    });
    let_spawned_tasks_run().await;
    assert!(!second.is_finished());
    assert_eq!(h.remote.inner.download_count().await, 0);

    // A timer-driven check while the gate is held is skipped
    assert!(!h.engine.check_remote().await.unwrap());
    assert_eq!(h.remote.inner.download_count().await, 0);

    h.remote.release();
    first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    assert_eq!(second.uploaded_count, 0);
    assert_eq!(second.downloaded_count, 0);
    assert_eq!(h.remote.inner.download_count().await, 2);
    assert_eq!(h.remote.inner.upload_count().await, 2);
    assert!(!h.engine.is_syncing());
}

#[tokio::test]
async fn resolving_during_a_sync_waits_and_keeps_the_choice() {
    let local = task("Z local", "2024-05-02T00:00:00Z");
    let mut remote = local.clone();
    remote.title = "Z remote".to_string();
    remote.updated_at = at("2024-05-03T00:00:00Z");
    let h = held_harness(&[local.clone()], &[remote], Some("2024-05-01T00:00:00Z")).await;
    assert_eq!(h.engine.perform_sync().await.unwrap().conflicts, 1);

    h.remote.hold_next_download();
    let in_flight = tokio::spawn({
        let engine = Arc::clone(&h.engine);
        async move { engine.perform_sync().await }
    });
    h.remote.wait_until_parked().await;

    let resolve = tokio::spawn({
        let engine = Arc::clone(&h.engine);
        async move {
            engine
                .resolve_conflict(&local.id, ConflictChoice::Local)
                .await
        }
    });
    let_spawned_tasks_run().await;
    assert!(!resolve.is_finished());

    h.remote.release();
    in_flight.await.unwrap().unwrap();
    let resolved = resolve.await.unwrap().unwrap().unwrap();
    h.engine.shutdown().await;

    assert_eq!(resolved.title, "Z local");
    assert_eq!(
        h.tasks.get(&local.id).await.unwrap().map(|task| task.title),
        Some("Z local".to_string())
    );

    let report = h.engine.perform_sync().await.unwrap();
    assert_eq!(report.conflicts, 0);
    assert_eq!(
        remote_titles(&h.remote.inner).await,
        vec!["Z local".to_string()]
    );
    assert_eq!(h.engine.status().status, SyncStatus::Synced);
}

#[tokio::test(start_paused = true)]
async fn rescheduling_during_a_debounced_sync_stays_pending() {
    let h = held_harness(&[], &[], None).await;

    h.remote.hold_next_download();
    h.engine
        .save_task(&task("First", "2024-05-30T08:00:00Z"), ChangeKind::Create)
        .await
        .unwrap();
    h.remote.wait_until_parked().await;
    assert_eq!(h.remote.inner.upload_count().await, 0);

    h.engine.schedule_sync().await;
    h.remote.release();
    tokio::time::sleep(StdDuration::from_millis(100)).await;

    assert_eq!(h.remote.inner.upload_count().await, 1);
    assert!(h.engine.is_sync_pending());

    tokio::time::sleep(StdDuration::from_secs(5)).await;
    assert_eq!(h.remote.inner.upload_count().await, 2);
    assert!(!h.engine.is_sync_pending());
}

#[tokio::test(start_paused = true)]
async fn polling_picks_up_remote_changes_on_each_interval() {
    let laptop = task("From laptop", "2024-05-20T10:00:00Z");
    let h = HarnessBuilder::new()
        .remote(&[laptop.clone()])
        .build()
        .await;
    h.engine.perform_sync().await.unwrap();
    let poll_interval = h.engine.settings().poll_interval();

    h.engine.start_polling().await;
    tokio::time::sleep(StdDuration::from_secs(1)).await;
    assert_eq!(h.remote.download_count().await, 1);

    // Another device replaces the backup
    h.clock.advance(Duration::minutes(1));
    h.remote
        .seed(
            RemoteBackupBlob::from_tasks(
                vec![laptop, task("From tablet", "2024-06-01T12:00:30Z")],
                h.clock.now(),
            )
            .unwrap(),
        )
        .await;

    tokio::time::sleep(poll_interval).await;
    assert_eq!(h.remote.download_count().await, 2);
    assert_eq!(h.tasks.list_all().await.unwrap().len(), 2);

    tokio::time::sleep(poll_interval).await;
    assert_eq!(h.remote.download_count().await, 2);
    h.engine.stop_polling().await;
}
