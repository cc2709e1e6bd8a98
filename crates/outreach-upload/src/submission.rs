//! Gated submission: metadata is persisted together with every upload result, and
//! only once all uploads have succeeded.

use std::sync::Arc;

use outreach_core::RemoteResult;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::persistence::{PersistenceBoundary, PersistenceError};
use crate::queue::UploadQueue;

/// Key under which the upload results are added to the metadata object.
pub const MEDIA_KEY: &str = "media";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("Submission blocked: {reason}")]
    Blocked { reason: String },

    #[error("Failed to save submission: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("A submission is already in progress")]
    InProgress,
}

/// Outcome of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    /// Record id returned by the persistence layer, if any.
    pub id: Option<String>,
    pub media_count: usize,
}

pub struct SubmissionCoordinator {
    persistence: Arc<dyn PersistenceBoundary>,
    require_media: bool,
    in_flight: Mutex<()>,
}

impl SubmissionCoordinator {
    pub fn new(persistence: Arc<dyn PersistenceBoundary>) -> Self {
        Self {
            persistence,
            require_media: true,
            in_flight: Mutex::new(()),
        }
    }

    /// Allow submitting with an empty queue (an empty `media` list is sent).
    pub fn allow_empty(mut self) -> Self {
        self.require_media = false;
        self
    }

    /// Upload whatever is still pending, then persist `metadata` plus every remote
    /// result in one call.
    ///
    /// The persistence boundary is never called unless every item succeeded. On
    /// success the submitted items leave the queue; on failure the queue is left as
    /// it was so the save can be retried without re-uploading.
    #[tracing::instrument(skip_all, fields(queued = queue.len()))]
    pub async fn submit<M>(
        &self,
        metadata: &M,
        queue: &UploadQueue,
    ) -> Result<SubmissionReceipt, SubmissionError>
    where
        M: Serialize + ?Sized,
    {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| SubmissionError::InProgress)?;

        let mut fields = metadata_object(metadata)?;

        let started = queue.start_pending();
        if started > 0 {
            tracing::info!(started, "Uploading pending files before submission");
        }
        queue.settle().await;

        let lease = queue
            .lease_for_submission()
            .map_err(|reason| SubmissionError::Blocked { reason })?;

        if lease.results().is_empty() && self.require_media {
            return Err(SubmissionError::Blocked {
                reason: "No media has been uploaded".to_string(),
            });
        }

        let media: Vec<&RemoteResult> = lease.results().iter().map(|(_, r)| r).collect();
        let media_count = media.len();
        let media = serde_json::to_value(&media)
            .map_err(|e| SubmissionError::InvalidMetadata(e.to_string()))?;
        fields.insert(MEDIA_KEY.to_string(), media);

        // Items in the payload cannot be removed until the save settles.
        let receipt = match self.persistence.persist(Value::Object(fields)).await {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    field_errors = e.errors.len(),
                    media_count,
                    "Submission rejected by persistence; queue kept for retry"
                );
                return Err(e.into());
            }
        };

        lease.commit();
        tracing::info!(
            record_id = receipt.id.as_deref().unwrap_or("-"),
            media_count,
            "Submission saved"
        );

        Ok(SubmissionReceipt {
            id: receipt.id,
            media_count,
        })
    }
}

fn metadata_object<M>(metadata: &M) -> Result<Map<String, Value>, SubmissionError>
where
    M: Serialize + ?Sized,
{
    let value = serde_json::to_value(metadata)
        .map_err(|e| SubmissionError::InvalidMetadata(e.to_string()))?;

    match value {
        Value::Object(fields) if fields.contains_key(MEDIA_KEY) => Err(
            SubmissionError::InvalidMetadata(format!("`{}` is a reserved field", MEDIA_KEY)),
        ),
        Value::Object(fields) => Ok(fields),
        other => Err(SubmissionError::InvalidMetadata(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::PersistReceipt;
    use crate::preview::PreviewRegistry;
    use crate::queue::QueueConfig;
    use async_trait::async_trait;
    use outreach_core::{MediaFile, UploadStatus};
    use outreach_storage::{
        CancellationToken, ProgressReporter, TransportBackend, TransportError, TransportResult,
        UploadTransport,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails files whose name starts with "fail" on the first attempt only.
    #[derive(Default)]
    struct FlakyTransport {
        sends: AtomicUsize,
    }

    #[async_trait]
    impl UploadTransport for FlakyTransport {
        async fn send(
            &self,
            file: &MediaFile,
            progress: ProgressReporter,
            _cancel: CancellationToken,
        ) -> TransportResult<RemoteResult> {
            let attempt = self.sends.fetch_add(1, Ordering::SeqCst);
            if file.filename().starts_with("fail") && attempt == 0 {
                return Err(TransportError::Network("timeout".to_string()));
            }
            progress.complete();
            Ok(RemoteResult {
                url: format!("https://cdn.example.org/{}", file.filename()),
                public_id: format!("outreach/{}", file.filename()),
                format: "jpg".to_string(),
                bytes: file.size(),
                width: Some(640),
                height: Some(480),
                resource_type: None,
            })
        }

        async fn delete(&self, _public_id: &str) -> TransportResult<()> {
            Ok(())
        }

        fn backend_type(&self) -> TransportBackend {
            TransportBackend::Local
        }
    }

    #[derive(Default)]
    struct RecordingPersistence {
        payloads: std::sync::Mutex<Vec<Value>>,
        reject: bool,
    }

    impl RecordingPersistence {
        fn payloads(&self) -> Vec<Value> {
            self.payloads.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PersistenceBoundary for RecordingPersistence {
        async fn persist(&self, payload: Value) -> Result<PersistReceipt, PersistenceError> {
            self.payloads.lock().unwrap().push(payload);
            if self.reject {
                return Err(PersistenceError::new("title is required"));
            }
            Ok(PersistReceipt {
                id: Some("rec-1".to_string()),
            })
        }
    }

    fn jpeg(name: &str) -> MediaFile {
        MediaFile::new(name, "image/jpeg", vec![7u8; 32])
    }

    fn queue(auto_start: bool) -> (UploadQueue, Arc<FlakyTransport>) {
        let transport = Arc::new(FlakyTransport::default());
        let config = QueueConfig {
            auto_start,
            ..QueueConfig::default()
        };
        let queue = UploadQueue::new(transport.clone(), Arc::new(PreviewRegistry::new()), config);
        (queue, transport)
    }

    #[tokio::test]
    async fn submit_uploads_pending_items_then_persists_once() {
        let (queue, transport) = queue(false);
        queue.add(vec![jpeg("a.jpg"), jpeg("b.jpg")]);

        let persistence = Arc::new(RecordingPersistence::default());
        let coordinator = SubmissionCoordinator::new(persistence.clone());
        let receipt = coordinator
            .submit(&json!({ "title": "Food drive" }), &queue)
            .await
            .unwrap();

        assert_eq!(receipt.id.as_deref(), Some("rec-1"));
        assert_eq!(receipt.media_count, 2);
        assert_eq!(transport.sends.load(Ordering::SeqCst), 2);

        let payloads = persistence.payloads();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["title"], "Food drive");
        assert_eq!(payloads[0]["media"][0]["public_id"], "outreach/a.jpg");
        assert_eq!(payloads[0]["media"][1]["public_id"], "outreach/b.jpg");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn failed_item_is_retried_inline() {
        let (queue, transport) = queue(true);
        queue.add(vec![jpeg("fail.jpg")]);
        queue.settle().await;
        assert_eq!(queue.snapshot().items[0].status, UploadStatus::Failed);

        let persistence = Arc::new(RecordingPersistence::default());
        let receipt = SubmissionCoordinator::new(persistence.clone())
            .submit(&json!({ "title": "Retry" }), &queue)
            .await
            .unwrap();

        assert_eq!(receipt.media_count, 1);
        assert_eq!(transport.sends.load(Ordering::SeqCst), 2);
        assert_eq!(persistence.payloads().len(), 1);
    }

    #[tokio::test]
    async fn empty_queue_blocks_unless_allowed() {
        let (queue, _) = queue(true);
        let persistence = Arc::new(RecordingPersistence::default());

        let err = SubmissionCoordinator::new(persistence.clone())
            .submit(&json!({ "title": "Nothing" }), &queue)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Blocked { .. }));
        assert!(persistence.payloads().is_empty());

        let receipt = SubmissionCoordinator::new(persistence.clone())
            .allow_empty()
            .submit(&json!({ "title": "Nothing" }), &queue)
            .await
            .unwrap();
        assert_eq!(receipt.media_count, 0);
        assert_eq!(persistence.payloads()[0]["media"], json!([]));
    }

    #[tokio::test]
    async fn metadata_must_be_an_object_without_media() {
        let (queue, _) = queue(true);
        queue.add(vec![jpeg("a.jpg")]);
        let persistence = Arc::new(RecordingPersistence::default());
        let coordinator = SubmissionCoordinator::new(persistence.clone());

        let err = coordinator.submit(&json!(["a"]), &queue).await.unwrap_err();
        assert!(matches!(err, SubmissionError::InvalidMetadata(_)));

        let err = coordinator
            .submit(&json!({ "media": [] }), &queue)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::InvalidMetadata(_)));
        assert!(persistence.payloads().is_empty());
    }

    #[tokio::test]
    async fn persistence_failure_keeps_queue() {
        let (queue, transport) = queue(true);
        queue.add(vec![jpeg("a.jpg")]);

        let persistence = Arc::new(RecordingPersistence {
            reject: true,
            ..Default::default()
        });
        let err = SubmissionCoordinator::new(persistence)
            .submit(&json!({}), &queue)
            .await
            .unwrap_err();

        assert!(matches!(err, SubmissionError::Persistence(_)));
        assert!(queue.is_ready_for_submission());
        assert_eq!(transport.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_submit_fails_fast() {
        struct GatedPersistence {
            gate: tokio::sync::Notify,
        }

        #[async_trait]
        impl PersistenceBoundary for GatedPersistence {
            async fn persist(&self, _payload: Value) -> Result<PersistReceipt, PersistenceError> {
                self.gate.notified().await;
                Ok(PersistReceipt::default())
            }
        }

        let (queue, _) = queue(true);
        queue.add(vec![jpeg("a.jpg")]);
        queue.settle().await;

        let persistence = Arc::new(GatedPersistence {
            gate: tokio::sync::Notify::new(),
        });
        let coordinator = SubmissionCoordinator::new(persistence.clone());

        let empty = json!({});
        let (first, second) = tokio::join!(coordinator.submit(&empty, &queue), async {
            let result = coordinator.submit(&json!({}), &queue).await;
            persistence.gate.notify_one();
            result
        });

        assert!(first.is_ok());
        assert_eq!(second, Err(SubmissionError::InProgress));
    }
}
