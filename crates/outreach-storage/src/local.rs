use crate::keys::{generate_public_id, resource_type_for, validate_public_id};
use crate::progress::ProgressReporter;
use crate::traits::{TransportError, TransportResult, UploadTransport};
use crate::TransportBackend;
use async_trait::async_trait;
use outreach_core::{MediaFile, RemoteResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Filesystem-backed object store.
///
/// Objects land at `{base_path}/{public_id}.{ext}` and are served from
/// `{base_url}/{public_id}.{ext}`.
#[derive(Clone, Debug)]
pub struct LocalTransport {
    base_path: PathBuf,
    base_url: String,
    folder: String,
    chunk_size: usize,
}

impl LocalTransport {
    /// Create a new LocalTransport instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for stored objects (e.g., "/var/lib/outreach/media")
    /// * `base_url` - Base URL for serving objects (e.g., "http://localhost:3000/media")
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> TransportResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            TransportError::Config(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalTransport {
            base_path,
            base_url,
            folder: String::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    /// Group new objects under `folder`.
    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = folder.into();
        self
    }

    /// Write size between progress reports and cancellation checks.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn public_id_to_path(&self, public_id: &str, format: &str) -> TransportResult<PathBuf> {
        validate_public_id(public_id)?;
        Ok(self.base_path.join(format!("{}.{}", public_id, format)))
    }

    fn generate_url(&self, public_id: &str, format: &str) -> String {
        format!(
            "{}/{}.{}",
            self.base_url.trim_end_matches('/'),
            public_id,
            format
        )
    }

    async fn ensure_parent_dir(&self, path: &Path) -> TransportResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn write_chunks(
        &self,
        path: &Path,
        file: &MediaFile,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> TransportResult<()> {
        let mut out = fs::File::create(path).await.map_err(|e| {
            TransportError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to create file {}: {}", path.display(), e),
            ))
        })?;

        let total = file.size();
        let mut written = 0u64;

        for chunk in file.data().chunks(self.chunk_size) {
            if cancel.is_cancelled() {
                return Err(TransportError::Aborted);
            }

            out.write_all(chunk).await?;
            written += chunk.len() as u64;
            progress.report_bytes(written, total);

            tokio::task::yield_now().await;
        }

        if cancel.is_cancelled() {
            return Err(TransportError::Aborted);
        }

        out.sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl UploadTransport for LocalTransport {
    async fn send(
        &self,
        file: &MediaFile,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> TransportResult<RemoteResult> {
        let public_id = generate_public_id(&self.folder, Uuid::new_v4());
        let format = file.extension().unwrap_or_else(|| "bin".to_string());
        let path = self.public_id_to_path(&public_id, &format)?;
        let start = std::time::Instant::now();

        self.ensure_parent_dir(&path).await?;

        if let Err(e) = self.write_chunks(&path, file, &progress, &cancel).await {
            if let Err(cleanup) = fs::remove_file(&path).await {
                tracing::debug!(
                    error = %cleanup,
                    path = %path.display(),
                    "No partial object to clean up"
                );
            }
            tracing::warn!(
                error = %e,
                public_id = %public_id,
                filename = %file.filename(),
                "Local upload did not complete"
            );
            return Err(e);
        }

        let (width, height) = match image_dimensions(file) {
            Some((w, h)) => (Some(w), Some(h)),
            None => (None, None),
        };

        progress.complete();

        tracing::info!(
            path = %path.display(),
            public_id = %public_id,
            size_bytes = file.size(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local upload successful"
        );

        Ok(RemoteResult {
            url: self.generate_url(&public_id, &format),
            public_id,
            format,
            bytes: file.size(),
            width,
            height,
            resource_type: Some(resource_type_for(file.content_type()).to_string()),
        })
    }

    async fn delete(&self, public_id: &str) -> TransportResult<()> {
        validate_public_id(public_id)?;
        let start = std::time::Instant::now();

        let stem_path = self.base_path.join(public_id);
        let (Some(dir), Some(stem)) = (
            stem_path.parent(),
            stem_path.file_name().and_then(|s| s.to_str()),
        ) else {
            return Err(TransportError::InvalidPublicId(public_id.to_string()));
        };

        if !fs::try_exists(dir).await.unwrap_or(false) {
            return Ok(());
        }

        let mut removed = 0usize;
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.file_stem().and_then(|s| s.to_str()) == Some(stem) {
                fs::remove_file(&path).await?;
                removed += 1;
            }
        }

        tracing::info!(
            public_id = %public_id,
            removed,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local delete successful"
        );

        Ok(())
    }

    fn backend_type(&self) -> TransportBackend {
        TransportBackend::Local
    }
}

#[cfg(feature = "image-dimensions")]
fn image_dimensions(file: &MediaFile) -> Option<(u32, u32)> {
    if !file.content_type().to_lowercase().starts_with("image/") {
        return None;
    }
    image::ImageReader::new(std::io::Cursor::new(file.data().as_ref()))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

#[cfg(not(feature = "image-dimensions"))]
fn image_dimensions(_file: &MediaFile) -> Option<(u32, u32)> {
    None
}
