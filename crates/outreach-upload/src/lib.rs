//! Outreach Upload Library
//!
//! Client-side orchestration of media uploads: a queue that validates files, shows
//! local previews immediately, uploads each file through an [`UploadTransport`],
//! tracks per-item progress and status, retries individual failures, and a
//! coordinator that only persists a submission once every upload has succeeded.
//!
//! [`UploadTransport`]: outreach_storage::UploadTransport

pub mod item;
pub mod persistence;
pub mod preview;
pub mod queue;
pub mod submission;

// Re-export commonly used types
pub use item::{UploadItemView, UploadState};
#[cfg(feature = "persistence-http")]
pub use persistence::HttpPersistence;
pub use persistence::{FieldError, PersistReceipt, PersistenceBoundary, PersistenceError};
pub use preview::{PreviewHandle, PreviewRegistry, PreviewResourceManager};
pub use queue::{AddOutcome, QueueConfig, QueueError, QueueSnapshot, Rejection, UploadQueue};
pub use submission::{SubmissionCoordinator, SubmissionError, SubmissionReceipt};
