//! Upload queue: validation, per-item state machine, retry, removal and readiness.
//!
//! Items keep insertion order whatever order their transfers finish in. Each transfer
//! runs as its own Tokio task; every state change is applied under the queue lock in
//! one step (the lock is never held across an `.await`), then announced through a
//! revision counter that renderers can [`subscribe`](UploadQueue::subscribe) to.
//!
//! Teardown: dropping the queue (or calling [`UploadQueue::clear`]) cancels in-flight
//! transfers and releases every preview still held.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use outreach_core::{MediaFile, RemoteResult, UploadPolicy, UploadStatus, ValidationError};
use outreach_storage::{ProgressReporter, TransportResult, UploadTransport};
use serde::Serialize;
use tokio::sync::{watch, Semaphore};
use uuid::Uuid;

use crate::item::{UploadItem, UploadItemView, UploadJob, UploadState};
use crate::preview::{PreviewHandle, PreviewResourceManager};

/// Illegal caller operations on the queue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Upload {0} not found")]
    NotFound(Uuid),

    #[error("Upload {id} cannot be retried while {status}")]
    InvalidState { id: Uuid, status: UploadStatus },

    #[error("Upload {0} is part of a submission that is being saved")]
    Submitting(Uuid),
}

#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub policy: UploadPolicy,
    /// Start uploading as soon as files are added.
    pub auto_start: bool,
    /// Upper bound on simultaneous transfers; unbounded when `None`.
    pub max_concurrent_uploads: Option<usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            policy: UploadPolicy::default(),
            auto_start: true,
            max_concurrent_uploads: None,
        }
    }
}

impl QueueConfig {
    pub fn new(policy: UploadPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }
}

/// A file refused at add time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub filename: String,
    #[serde(serialize_with = "serialize_display")]
    pub error: ValidationError,
}

fn serialize_display<S>(error: &ValidationError, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_str(error)
}

/// Outcome of one `add` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AddOutcome {
    pub accepted: Vec<Uuid>,
    pub rejected: Vec<Rejection>,
}

/// Read model of the whole queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub items: Vec<UploadItemView>,
    pub is_ready_for_submission: bool,
}

struct Shared {
    items: Mutex<Vec<UploadItem>>,
    transport: Arc<dyn UploadTransport>,
    previews: Arc<dyn PreviewResourceManager>,
    policy: UploadPolicy,
    auto_start: bool,
    limiter: Option<Arc<Semaphore>>,
    revision: watch::Sender<u64>,
}

/// Ordered collection of uploads.
///
/// Methods that start transfers, and `remove` on a succeeded item (which deletes the
/// remote object in the background), spawn Tokio tasks and must be called from within
/// a Tokio runtime.
pub struct UploadQueue {
    shared: Arc<Shared>,
}

impl UploadQueue {
    pub fn new(
        transport: Arc<dyn UploadTransport>,
        previews: Arc<dyn PreviewResourceManager>,
        config: QueueConfig,
    ) -> Self {
        let (revision, _) = watch::channel(0);
        let limiter = config
            .max_concurrent_uploads
            .map(|permits| Arc::new(Semaphore::new(permits.max(1))));

        Self {
            shared: Arc::new(Shared {
                items: Mutex::new(Vec::new()),
                transport,
                previews,
                policy: config.policy,
                auto_start: config.auto_start,
                limiter,
                revision,
            }),
        }
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.shared.policy
    }

    /// Validate and enqueue files. Valid files get a preview right away; rejected
    /// files never enter the queue.
    pub fn add(&self, files: Vec<MediaFile>) -> AddOutcome {
        let mut outcome = AddOutcome::default();

        {
            let mut items = self.shared.lock();
            for file in files {
                let checked = self
                    .shared
                    .policy
                    .validate_count(items.len())
                    .and_then(|_| self.shared.policy.validate(&file));

                if let Err(error) = checked {
                    tracing::warn!(
                        filename = %file.filename(),
                        size_bytes = file.size(),
                        content_type = %file.content_type(),
                        error = %error,
                        "File rejected by upload policy"
                    );
                    outcome.rejected.push(Rejection {
                        filename: file.filename().to_string(),
                        error,
                    });
                    continue;
                }

                let preview = self.shared.previews.acquire(&file);
                let item = UploadItem::new(file, preview);
                tracing::debug!(
                    item_id = %item.id,
                    filename = %item.info.filename,
                    size_bytes = item.info.size,
                    "File queued"
                );
                outcome.accepted.push(item.id);
                items.push(item);
            }
        }

        if !outcome.accepted.is_empty() {
            self.shared.bump();
            if self.shared.auto_start {
                self.start_all();
            }
        }

        outcome
    }

    /// Start every `Idle` item. Returns how many transfers were started.
    pub fn start_all(&self) -> usize {
        self.start_where(|state| matches!(state, UploadState::Idle))
    }

    /// Start every `Idle` or `Failed` item. Returns how many transfers were started.
    pub fn start_pending(&self) -> usize {
        self.start_where(|state| matches!(state, UploadState::Idle | UploadState::Failed { .. }))
    }

    fn start_where<F>(&self, eligible: F) -> usize
    where
        F: Fn(&UploadState) -> bool,
    {
        let jobs: Vec<UploadJob> = {
            let mut items = self.shared.lock();
            items
                .iter_mut()
                .filter(|item| eligible(&item.state))
                .filter_map(UploadItem::begin_attempt)
                .collect()
        };

        let started = jobs.len();
        if started > 0 {
            self.shared.bump();
            for job in jobs {
                Shared::spawn_upload(&self.shared, job);
            }
        }
        started
    }

    /// Re-send a failed item's original bytes under the same id.
    pub fn retry(&self, id: Uuid) -> Result<(), QueueError> {
        let job = {
            let mut items = self.shared.lock();
            let item = items
                .iter_mut()
                .find(|item| item.id == id)
                .ok_or(QueueError::NotFound(id))?;

            if !matches!(item.state, UploadState::Failed { .. }) {
                return Err(QueueError::InvalidState {
                    id,
                    status: item.status(),
                });
            }
            item.begin_attempt().ok_or(QueueError::InvalidState {
                id,
                status: item.status(),
            })?
        };

        tracing::info!(item_id = %id, attempt = job.attempt, "Retrying upload");
        self.shared.bump();
        Shared::spawn_upload(&self.shared, job);
        Ok(())
    }

    /// Remove an item in any state except while its submission is being saved.
    ///
    /// An in-flight transfer is aborted, a held preview is released and a succeeded
    /// upload's remote object is deleted best-effort in the background.
    pub fn remove(&self, id: Uuid) -> Result<(), QueueError> {
        let item = {
            let mut items = self.shared.lock();
            let position = items
                .iter()
                .position(|item| item.id == id)
                .ok_or(QueueError::NotFound(id))?;
            if items[position].submitting {
                return Err(QueueError::Submitting(id));
            }
            items.remove(position)
        };

        tracing::info!(item_id = %id, status = %item.status(), "Removing upload");
        self.shared.discard(item, true);
        self.shared.bump();
        Ok(())
    }

    /// Drop every item: cancel transfers and release previews. Remote objects are kept.
    pub fn clear(&self) {
        let items: Vec<UploadItem> = std::mem::take(&mut *self.shared.lock());
        if items.is_empty() {
            return;
        }

        tracing::debug!(count = items.len(), "Clearing upload queue");
        for item in items {
            self.shared.discard(item, false);
        }
        self.shared.bump();
    }

    /// Remove the given items after they were persisted. Their remote objects are kept.
    pub fn clear_submitted(&self, ids: &[Uuid]) {
        let removed: Vec<UploadItem> = {
            let mut items = self.shared.lock();
            let (submitted, kept) = std::mem::take(&mut *items)
                .into_iter()
                .partition(|item| ids.contains(&item.id));
            *items = kept;
            submitted
        };

        if removed.is_empty() {
            return;
        }
        for item in removed {
            self.shared.discard(item, false);
        }
        self.shared.bump();
    }

    /// True iff the queue is non-empty and every item has succeeded.
    pub fn is_ready_for_submission(&self) -> bool {
        let items = self.shared.lock();
        is_ready(&items)
    }

    /// Remote results of every item in insertion order, or a description of what
    /// blocks them.
    pub fn completed_results(&self) -> Result<Vec<(Uuid, RemoteResult)>, String> {
        collect_results(&self.shared.lock())
    }

    /// Collect every remote result like [`completed_results`](Self::completed_results)
    /// and pin those items against removal until the returned lease settles.
    pub(crate) fn lease_for_submission(&self) -> Result<SubmissionLease<'_>, String> {
        let results = {
            let mut items = self.shared.lock();
            let results = collect_results(&items)?;
            for item in items.iter_mut() {
                item.submitting = true;
            }
            results
        };

        Ok(SubmissionLease {
            queue: self,
            ids: results.iter().map(|(id, _)| *id).collect(),
            results,
            committed: false,
        })
    }

    fn release_lease(&self, ids: &[Uuid]) {
        let mut items = self.shared.lock();
        for item in items.iter_mut().filter(|item| ids.contains(&item.id)) {
            item.submitting = false;
        }
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let items = self.shared.lock();
        QueueSnapshot {
            items: items.iter().map(UploadItem::view).collect(),
            is_ready_for_submission: is_ready(&items),
        }
    }

    pub fn item(&self, id: Uuid) -> Option<UploadItemView> {
        self.shared
            .lock()
            .iter()
            .find(|item| item.id == id)
            .map(UploadItem::view)
    }

    pub fn len(&self) -> usize {
        self.shared.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.lock().is_empty()
    }

    /// Revision counter bumped on every change to the queue.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    /// Wait until no item is uploading.
    pub async fn settle(&self) {
        let mut changes = self.shared.revision.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = changes.wait_for(|_| !self.shared.has_uploading()).await;
    }
}

impl Drop for UploadQueue {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Items pinned for the duration of one save.
///
/// Dropping the lease without [`commit`](SubmissionLease::commit) makes the items
/// removable again and leaves them in the queue.
pub(crate) struct SubmissionLease<'a> {
    queue: &'a UploadQueue,
    ids: Vec<Uuid>,
    results: Vec<(Uuid, RemoteResult)>,
    committed: bool,
}

impl SubmissionLease<'_> {
    pub(crate) fn results(&self) -> &[(Uuid, RemoteResult)] {
        &self.results
    }

    /// The save succeeded: the submitted items leave the queue, remote objects kept.
    pub(crate) fn commit(mut self) {
        self.committed = true;
        self.queue.clear_submitted(&self.ids);
    }
}

impl Drop for SubmissionLease<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.queue.release_lease(&self.ids);
        }
    }
}

fn collect_results(items: &[UploadItem]) -> Result<Vec<(Uuid, RemoteResult)>, String> {
    let mut results = Vec::with_capacity(items.len());
    let mut blocking = Vec::new();
    for item in items {
        match &item.state {
            UploadState::Succeeded(remote) => results.push((item.id, remote.clone())),
            UploadState::Failed { error } => {
                blocking.push(format!("{} failed: {}", item.info.filename, error))
            }
            other => blocking.push(format!("{} is {}", item.info.filename, other.status())),
        }
    }

    if blocking.is_empty() {
        Ok(results)
    } else {
        Err(blocking.join("; "))
    }
}

fn is_ready(items: &[UploadItem]) -> bool {
    !items.is_empty()
        && items
            .iter()
            .all(|item| matches!(item.state, UploadState::Succeeded(_)))
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Vec<UploadItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    fn has_uploading(&self) -> bool {
        self.lock()
            .iter()
            .any(|item| matches!(item.state, UploadState::Uploading { .. }))
    }

    fn release_preview(&self, preview: Option<PreviewHandle>) {
        if let Some(preview) = preview {
            self.previews.release(preview);
        }
    }

    /// Tear down an item that already left the queue.
    fn discard(self: &Arc<Self>, mut item: UploadItem, delete_remote: bool) {
        if let Some(cancel) = item.cancel.take() {
            cancel.cancel();
        }
        self.release_preview(item.preview.take());

        if delete_remote {
            if let UploadState::Succeeded(remote) = item.state {
                self.spawn_remote_delete(remote.public_id);
            }
        }
    }

    fn spawn_remote_delete(self: &Arc<Self>, public_id: String) {
        let transport = self.transport.clone();
        tokio::spawn(async move {
            match transport.delete(&public_id).await {
                Ok(()) => tracing::info!(public_id = %public_id, "Remote object deleted"),
                Err(e) => tracing::warn!(
                    error = %e,
                    public_id = %public_id,
                    "Best-effort remote delete failed"
                ),
            }
        });
    }

    fn spawn_upload(shared: &Arc<Self>, job: UploadJob) {
        let shared = shared.clone();
        tokio::spawn(async move {
            shared.run_upload(job).await;
        });
    }

    async fn run_upload(self: Arc<Self>, job: UploadJob) {
        let permit = match &self.limiter {
            Some(limiter) => tokio::select! {
                biased;
                _ = job.cancel.cancelled() => {
                    self.finish(job.id, job.attempt, Err(outreach_storage::TransportError::Aborted));
                    return;
                }
                permit = limiter.clone().acquire_owned() => permit.ok(),
            },
            None => None,
        };

        let progress = {
            let shared = self.clone();
            let (id, attempt) = (job.id, job.attempt);
            ProgressReporter::new(move |percent| shared.set_progress(id, attempt, percent))
        };

        let start = std::time::Instant::now();
        let result = self
            .transport
            .send(&job.file, progress, job.cancel.clone())
            .await;
        drop(permit);

        tracing::debug!(
            item_id = %job.id,
            attempt = job.attempt,
            ok = result.is_ok(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Transfer settled"
        );
        self.finish(job.id, job.attempt, result);
    }

    fn set_progress(&self, id: Uuid, attempt: u32, percent: u8) {
        let changed = {
            let mut items = self.lock();
            match items
                .iter_mut()
                .find(|item| item.id == id && item.is_current(attempt))
            {
                Some(item) => match &mut item.state {
                    UploadState::Uploading { progress } if percent > *progress => {
                        *progress = percent.min(100);
                        true
                    }
                    _ => false,
                },
                None => false,
            }
        };

        if changed {
            self.bump();
        }
    }

    /// Apply a transfer outcome if it still belongs to the item's current attempt.
    fn finish(self: &Arc<Self>, id: Uuid, attempt: u32, result: TransportResult<RemoteResult>) {
        let released = {
            let mut items = self.lock();
            let position = items
                .iter()
                .position(|item| item.id == id && item.is_current(attempt));
            let Some(position) = position else {
                drop(items);
                if let Ok(remote) = result {
                    tracing::info!(
                        item_id = %id,
                        public_id = %remote.public_id,
                        "Upload finished after removal; deleting orphaned object"
                    );
                    self.spawn_remote_delete(remote.public_id);
                }
                return;
            };

            let item = &mut items[position];
            item.cancel = None;
            match result {
                Ok(remote) => {
                    tracing::info!(
                        item_id = %id,
                        filename = %item.info.filename,
                        public_id = %remote.public_id,
                        attempt,
                        "Upload succeeded"
                    );
                    item.state = UploadState::Succeeded(remote);
                    item.source = None;
                    item.preview.take()
                }
                Err(e) => {
                    tracing::warn!(
                        item_id = %id,
                        filename = %item.info.filename,
                        error = %e,
                        attempt,
                        "Upload failed"
                    );
                    item.state = UploadState::Failed {
                        error: e.to_string(),
                    };
                    None
                }
            }
        };

        self.release_preview(released);
        self.bump();
    }
}
