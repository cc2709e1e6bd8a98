//! Test helpers: scripted transport, recording persistence and queue setup.
//!
//! Run from workspace root: `cargo test -p outreach-upload`.
#![allow(dead_code)]

pub mod fixtures;
pub mod persistence;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use outreach_core::UploadPolicy;
use outreach_upload::{PreviewRegistry, QueueConfig, UploadQueue};

pub use persistence::RecordingPersistence;
pub use transport::{ScriptedTransport, Step};

pub struct TestQueue {
    pub queue: UploadQueue,
    pub transport: Arc<ScriptedTransport>,
    pub previews: Arc<PreviewRegistry>,
}

pub fn setup_queue(config: QueueConfig) -> TestQueue {
    let transport = Arc::new(ScriptedTransport::new());
    let previews = Arc::new(PreviewRegistry::new());
    let queue = UploadQueue::new(transport.clone(), previews.clone(), config);

    TestQueue {
        queue,
        transport,
        previews,
    }
}

/// Gallery policy with auto-start, like the submission form uses.
pub fn setup_gallery_queue() -> TestQueue {
    setup_queue(QueueConfig::new(UploadPolicy::gallery()))
}

/// Poll `condition` until it holds, panicking after a few seconds.
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
