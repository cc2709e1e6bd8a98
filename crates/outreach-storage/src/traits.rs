//! Upload transport trait
//!
//! This module defines the UploadTransport trait that all transports must implement.

use crate::progress::ProgressReporter;
use crate::TransportBackend;
use async_trait::async_trait;
use outreach_core::{MediaFile, RemoteResult};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Transport operation errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Upload rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Upload aborted")]
    Aborted,

    #[error("Invalid public id: {0}")]
    InvalidPublicId(String),

    #[error("Invalid response from object store: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TransportError {
    /// Whether the transfer ended because its cancellation token fired.
    pub fn is_abort(&self) -> bool {
        matches!(self, TransportError::Aborted)
    }
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Sends one file to remote object storage.
///
/// Implementations report progress through `progress` (non-decreasing, ending at 100
/// on success) and stop promptly with [`TransportError::Aborted`] once `cancel` fires.
/// Retry policy belongs to the caller.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Upload `file` and return the descriptor of the stored object.
    async fn send(
        &self,
        file: &MediaFile,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> TransportResult<RemoteResult>;

    /// Delete a stored object by its public id.
    ///
    /// Deleting an object that no longer exists is not an error.
    async fn delete(&self, public_id: &str) -> TransportResult<()>;

    /// Get the transport backend type
    fn backend_type(&self) -> TransportBackend;
}
