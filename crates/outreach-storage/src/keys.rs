//! Shared public id generation for transports.
//!
//! Format: `{folder}/{uuid}`, or `{uuid}` when no folder is configured.

use crate::traits::{TransportError, TransportResult};
use uuid::Uuid;

/// Generate a public id for a new object in `folder`.
pub fn generate_public_id(folder: &str, id: Uuid) -> String {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        id.to_string()
    } else {
        format!("{}/{}", folder, id)
    }
}

/// Reject public ids that could escape the storage root.
pub fn validate_public_id(public_id: &str) -> TransportResult<()> {
    if public_id.is_empty()
        || public_id.contains("..")
        || public_id.starts_with('/')
        || public_id.contains('\\')
    {
        return Err(TransportError::InvalidPublicId(public_id.to_string()));
    }
    Ok(())
}

/// Coarse resource type reported alongside a stored object.
pub fn resource_type_for(content_type: &str) -> &'static str {
    let content_type = content_type.to_lowercase();
    if content_type.starts_with("image/") {
        "image"
    } else if content_type.starts_with("video/") || content_type.starts_with("audio/") {
        "video"
    } else {
        "raw"
    }
}
