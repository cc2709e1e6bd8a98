//! Upload status and the descriptor returned by remote object storage.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Lifecycle status of a queued upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Idle,
    Uploading,
    Succeeded,
    Failed,
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Succeeded | UploadStatus::Failed)
    }
}

impl Display for UploadStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            UploadStatus::Idle => write!(f, "idle"),
            UploadStatus::Uploading => write!(f, "uploading"),
            UploadStatus::Succeeded => write!(f, "succeeded"),
            UploadStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Durable descriptor of an object stored remotely.
///
/// `public_id` is what the object store needs to delete the object later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteResult {
    pub url: String,
    pub public_id: String,
    pub format: String,
    pub bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
}
