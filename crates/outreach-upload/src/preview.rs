//! Local preview handles for files that are not uploaded yet.
//!
//! A [`PreviewHandle`] is the analog of a browser object URL: a `preview://` URI
//! that resolves to the file's bytes until it is released. Handles are not `Clone`
//! and [`PreviewResourceManager::release`] consumes them, so the owner can release a
//! handle at most once. The registry still guards against forged or stale handles.

use bytes::Bytes;
use outreach_core::constants::PREVIEW_URI_SCHEME;
use outreach_core::MediaFile;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Ownership-tracked reference to a locally renderable preview.
#[derive(Debug, PartialEq, Eq)]
pub struct PreviewHandle {
    id: Uuid,
    uri: String,
}

impl PreviewHandle {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            uri: format!("{}://{}", PREVIEW_URI_SCHEME, id),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

/// Creates and frees preview resources.
///
/// Every `acquire` must be paired with exactly one `release` before the owner is
/// discarded.
pub trait PreviewResourceManager: Send + Sync {
    /// Register a preview for `file`. Never fails for a well-formed file.
    fn acquire(&self, file: &MediaFile) -> PreviewHandle;

    /// Free the preview. Returns `false` if the handle was not live (a caller bug).
    fn release(&self, handle: PreviewHandle) -> bool;
}

#[derive(Debug, Clone)]
struct PreviewEntry {
    data: Bytes,
    content_type: String,
}

/// In-memory preview registry keyed by handle id.
#[derive(Debug, Default)]
pub struct PreviewRegistry {
    entries: Mutex<HashMap<Uuid, PreviewEntry>>,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Uuid, PreviewEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up the bytes and MIME type behind a `preview://` URI.
    pub fn resolve(&self, uri: &str) -> Option<(Bytes, String)> {
        let id = parse_preview_uri(uri)?;
        self.entries()
            .get(&id)
            .map(|entry| (entry.data.clone(), entry.content_type.clone()))
    }

    /// Number of previews currently held.
    pub fn live_count(&self) -> usize {
        self.entries().len()
    }

    pub fn acquired_count(&self) -> usize {
        self.acquired.load(Ordering::Acquire)
    }

    pub fn released_count(&self) -> usize {
        self.released.load(Ordering::Acquire)
    }
}

impl PreviewResourceManager for PreviewRegistry {
    fn acquire(&self, file: &MediaFile) -> PreviewHandle {
        let handle = PreviewHandle::new(Uuid::new_v4());
        self.entries().insert(
            handle.id(),
            PreviewEntry {
                data: file.data().clone(),
                content_type: file.content_type().to_string(),
            },
        );
        self.acquired.fetch_add(1, Ordering::AcqRel);

        tracing::debug!(uri = %handle.uri(), filename = %file.filename(), "Preview acquired");
        handle
    }

    fn release(&self, handle: PreviewHandle) -> bool {
        if self.entries().remove(&handle.id()).is_none() {
            tracing::warn!(uri = %handle.uri(), "Preview released twice or never acquired");
            return false;
        }
        self.released.fetch_add(1, Ordering::AcqRel);

        tracing::debug!(uri = %handle.uri(), "Preview released");
        true
    }
}

fn parse_preview_uri(uri: &str) -> Option<Uuid> {
    let rest = uri.strip_prefix(PREVIEW_URI_SCHEME)?.strip_prefix("://")?;
    Uuid::parse_str(rest).ok()
}
