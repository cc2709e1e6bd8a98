//! Source file handed to the upload pipeline by the caller.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Raw bytes of a file plus the name and MIME type supplied with it.
///
/// Cloning is cheap: the bytes are reference counted and never copied.
#[derive(Debug, Clone)]
pub struct MediaFile {
    filename: String,
    content_type: String,
    data: Bytes,
}

/// Display metadata of a [`MediaFile`], kept after its bytes are released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub filename: String,
    pub content_type: String,
    pub size: u64,
}

impl MediaFile {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    /// Read a file from disk, guessing its MIME type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let content_type = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(content_type_for_extension)
            .unwrap_or("application/octet-stream");

        Ok(Self::new(filename, content_type, data))
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Lowercased extension of the filename, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }

    pub fn info(&self) -> FileInfo {
        FileInfo {
            filename: self.filename.clone(),
            content_type: self.content_type.clone(),
            size: self.size(),
        }
    }
}

/// Map common file extensions to their MIME type.
pub fn content_type_for_extension(extension: &str) -> Option<&'static str> {
    let content_type = match extension.to_lowercase().as_str() {
        // Images
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        // Videos
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "m4v" => "video/x-m4v",
        // Audio
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        // Documents
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "txt" => "text/plain",
        _ => return None,
    };
    Some(content_type)
}
