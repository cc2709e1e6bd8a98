//! Upload policy: which files may enter the upload queue.

use crate::constants::{BYTES_PER_MB, DEFAULT_MAX_FILE_SIZE_MB};
use crate::models::MediaFile;

/// Reasons a file is refused before it is queued.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("File too large: {size} bytes (max: {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Invalid content type: {content_type} (allowed: {allowed:?})")]
    InvalidContentType {
        content_type: String,
        allowed: Vec<String>,
    },

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Empty file")]
    EmptyFile,

    #[error("Too many files: at most {max} may be queued")]
    TooManyFiles { max: usize },
}

/// Per-batch validation rules for one kind of media.
///
/// An entry in `allowed_content_types` ending in `/` matches every subtype
/// (`image/` accepts `image/png`); any other entry must match exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_file_size: u64,
    pub allowed_content_types: Vec<String>,
    pub max_files: Option<usize>,
}

impl UploadPolicy {
    pub fn new(max_file_size: u64, allowed_content_types: Vec<String>) -> Self {
        Self {
            max_file_size,
            allowed_content_types,
            max_files: None,
        }
    }

    /// Gallery entries: photos and short videos.
    pub fn gallery() -> Self {
        Self::new(
            DEFAULT_MAX_FILE_SIZE_MB * BYTES_PER_MB,
            vec!["image/".to_string(), "video/".to_string()],
        )
    }

    /// Message attachments: images and common office documents.
    pub fn attachments() -> Self {
        Self::new(
            DEFAULT_MAX_FILE_SIZE_MB * BYTES_PER_MB,
            vec![
                "image/".to_string(),
                "application/pdf".to_string(),
                "application/msword".to_string(),
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
                    .to_string(),
                "application/vnd.ms-excel".to_string(),
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet".to_string(),
                "text/plain".to_string(),
            ],
        )
    }

    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = Some(max_files);
        self
    }

    /// Validate a single file against this policy.
    pub fn validate(&self, file: &MediaFile) -> Result<(), ValidationError> {
        self.validate_filename(file.filename())?;
        self.validate_file_size(file.size())?;
        self.validate_content_type(file.content_type())
    }

    pub fn validate_file_size(&self, size: u64) -> Result<(), ValidationError> {
        if size == 0 {
            return Err(ValidationError::EmptyFile);
        }

        if size > self.max_file_size {
            return Err(ValidationError::FileTooLarge {
                size,
                max: self.max_file_size,
            });
        }

        Ok(())
    }

    /// Compares the normalized MIME type only, so parameters cannot bypass the allowlist.
    pub fn validate_content_type(&self, content_type: &str) -> Result<(), ValidationError> {
        let normalized = normalize_mime_type(content_type).to_lowercase();

        let allowed = self.allowed_content_types.iter().any(|allowed| {
            let allowed = allowed.to_lowercase();
            if allowed.ends_with('/') {
                normalized.starts_with(&allowed) && normalized.len() > allowed.len()
            } else {
                normalized == allowed
            }
        });

        if !allowed {
            return Err(ValidationError::InvalidContentType {
                content_type: content_type.to_string(),
                allowed: self.allowed_content_types.clone(),
            });
        }

        Ok(())
    }

    pub fn validate_filename(&self, filename: &str) -> Result<(), ValidationError> {
        if filename.trim().is_empty()
            || filename.contains('/')
            || filename.contains('\\')
            || filename.contains('\0')
        {
            return Err(ValidationError::InvalidFilename(filename.to_string()));
        }
        Ok(())
    }

    /// Check that one more file fits next to `queued` ones.
    pub fn validate_count(&self, queued: usize) -> Result<(), ValidationError> {
        match self.max_files {
            Some(max) if queued >= max => Err(ValidationError::TooManyFiles { max }),
            _ => Ok(()),
        }
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::gallery()
    }
}

/// Strip MIME parameters (e.g. "image/jpeg; charset=utf-8" -> "image/jpeg").
fn normalize_mime_type(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .map(|s| s.trim())
        .unwrap_or(content_type)
}
