//! One file's upload lifecycle.

use chrono::{DateTime, Utc};
use outreach_core::{FileInfo, MediaFile, RemoteResult, UploadStatus};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::preview::PreviewHandle;

/// Upload state. The remote result and the error can only exist in their terminal
/// variants, never together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Uploading { progress: u8 },
    Succeeded(RemoteResult),
    Failed { error: String },
}

impl UploadState {
    pub fn status(&self) -> UploadStatus {
        match self {
            UploadState::Idle => UploadStatus::Idle,
            UploadState::Uploading { .. } => UploadStatus::Uploading,
            UploadState::Succeeded(_) => UploadStatus::Succeeded,
            UploadState::Failed { .. } => UploadStatus::Failed,
        }
    }

    pub fn progress(&self) -> u8 {
        match self {
            UploadState::Uploading { progress } => *progress,
            UploadState::Succeeded(_) => 100,
            UploadState::Idle | UploadState::Failed { .. } => 0,
        }
    }
}

/// Queue-owned record of one file.
///
/// The item owns the source bytes until the upload succeeds and owns the preview
/// handle until it is released.
#[derive(Debug)]
pub(crate) struct UploadItem {
    pub(crate) id: Uuid,
    pub(crate) info: FileInfo,
    pub(crate) source: Option<MediaFile>,
    pub(crate) preview: Option<PreviewHandle>,
    pub(crate) state: UploadState,
    pub(crate) attempt: u32,
    pub(crate) cancel: Option<CancellationToken>,
    /// Part of a payload whose save has not settled yet.
    pub(crate) submitting: bool,
    pub(crate) added_at: DateTime<Utc>,
}

/// Work order for one transfer attempt.
pub(crate) struct UploadJob {
    pub(crate) id: Uuid,
    pub(crate) attempt: u32,
    pub(crate) file: MediaFile,
    pub(crate) cancel: CancellationToken,
}

impl UploadItem {
    pub(crate) fn new(source: MediaFile, preview: PreviewHandle) -> Self {
        Self {
            id: Uuid::new_v4(),
            info: source.info(),
            source: Some(source),
            preview: Some(preview),
            state: UploadState::Idle,
            attempt: 0,
            cancel: None,
            submitting: false,
            added_at: Utc::now(),
        }
    }

    pub(crate) fn status(&self) -> UploadStatus {
        self.state.status()
    }

    /// Move to `Uploading` for a new attempt. Only `Idle` and `Failed` items with
    /// their source bytes can start.
    pub(crate) fn begin_attempt(&mut self) -> Option<UploadJob> {
        if !matches!(self.state, UploadState::Idle | UploadState::Failed { .. }) {
            return None;
        }
        let file = self.source.clone()?;
        let cancel = CancellationToken::new();

        self.attempt += 1;
        self.state = UploadState::Uploading { progress: 0 };
        self.cancel = Some(cancel.clone());

        Some(UploadJob {
            id: self.id,
            attempt: self.attempt,
            file,
            cancel,
        })
    }

    /// Whether a completion for `attempt` still applies to this item.
    pub(crate) fn is_current(&self, attempt: u32) -> bool {
        self.attempt == attempt && matches!(self.state, UploadState::Uploading { .. })
    }

    pub(crate) fn view(&self) -> UploadItemView {
        let (remote, error) = match &self.state {
            UploadState::Succeeded(remote) => (Some(remote.clone()), None),
            UploadState::Failed { error } => (None, Some(error.clone())),
            _ => (None, None),
        };

        UploadItemView {
            id: self.id,
            file: self.info.clone(),
            status: self.status(),
            progress: self.state.progress(),
            preview_uri: self.preview.as_ref().map(|p| p.uri().to_string()),
            remote,
            error,
            attempt: self.attempt,
            added_at: self.added_at,
        }
    }
}

/// Read model of one item for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadItemView {
    pub id: Uuid,
    pub file: FileInfo,
    pub status: UploadStatus,
    pub progress: u8,
    pub preview_uri: Option<String>,
    pub remote: Option<RemoteResult>,
    pub error: Option<String>,
    pub attempt: u32,
    pub added_at: DateTime<Utc>,
}
