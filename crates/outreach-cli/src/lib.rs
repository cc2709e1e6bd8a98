use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use outreach_core::{Config, MediaFile, UploadPolicy, UploadStatus};
use outreach_upload::{
    HttpPersistence, PersistReceipt, PersistenceBoundary, PersistenceError, UploadItemView,
    UploadQueue,
};
use serde_json::Value;
use uuid::Uuid;

/// Which upload policy a batch is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MediaKind {
    /// Photos and videos for a gallery entry
    Gallery,
    /// Images and documents attached to a message
    Attachments,
}

impl MediaKind {
    pub fn policy(self, config: &Config) -> UploadPolicy {
        match self {
            MediaKind::Gallery => config.gallery_policy(),
            MediaKind::Attachments => config.attachment_policy(),
        }
    }
}

/// Parse `--metadata`: inline JSON, or `@path` to read it from a file.
pub fn parse_metadata(raw: &str) -> anyhow::Result<Value> {
    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read metadata file {}", path))?,
        None => raw.to_string(),
    };

    let value: Value = serde_json::from_str(&text).context("Metadata is not valid JSON")?;
    if !value.is_object() {
        anyhow::bail!("Metadata must be a JSON object");
    }
    Ok(value)
}

pub async fn load_files(paths: &[PathBuf]) -> anyhow::Result<Vec<MediaFile>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let file = MediaFile::from_path(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        files.push(file);
    }
    Ok(files)
}

/// Prints the submission payload instead of saving it.
#[derive(Debug, Default)]
pub struct StdoutPersistence;

#[async_trait]
impl PersistenceBoundary for StdoutPersistence {
    async fn persist(&self, payload: Value) -> Result<PersistReceipt, PersistenceError> {
        let out = serde_json::to_string_pretty(&payload)
            .map_err(|e| PersistenceError::new(format!("Failed to serialize payload: {}", e)))?;
        println!("{}", out);
        Ok(PersistReceipt::default())
    }
}

/// HTTP persistence when an endpoint is configured, stdout otherwise.
pub fn build_persistence(config: &Config) -> anyhow::Result<Arc<dyn PersistenceBoundary>> {
    match &config.persist_url {
        Some(url) => {
            let persistence = HttpPersistence::new(url.clone(), config.persist_token.clone())
                .context("Failed to create persistence client")?;
            Ok(Arc::new(persistence))
        }
        None => {
            tracing::info!("OUTREACH_PERSIST_URL not set; printing submission to stdout");
            Ok(Arc::new(StdoutPersistence))
        }
    }
}

/// Human-readable byte count.
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;

    let value = bytes as f64;
    if value >= MB {
        format!("{:.1} MB", value / MB)
    } else if value >= KB {
        format!("{:.1} KB", value / KB)
    } else {
        format!("{} B", bytes)
    }
}

/// One status line for an item, e.g. `[ 45%] harbor.jpg (2.0 MB) uploading`.
pub fn render_item(item: &UploadItemView) -> String {
    let mut line = format!(
        "[{:>3}%] {} ({}) {}",
        item.progress,
        item.file.filename,
        format_size(item.file.size),
        item.status
    );

    match (&item.status, &item.error, &item.remote) {
        (UploadStatus::Failed, Some(error), _) => line.push_str(&format!(": {}", error)),
        (UploadStatus::Succeeded, _, Some(remote)) => line.push_str(&format!(" -> {}", remote.url)),
        _ => {}
    }
    line
}

/// Print a line whenever an item's status or progress changes. Returns when the
/// queue goes away.
pub async fn print_progress(queue: &UploadQueue) {
    let mut changes = queue.subscribe();
    let mut last: HashMap<Uuid, (UploadStatus, u8)> = HashMap::new();

    loop {
        for item in queue.snapshot().items {
            let current = (item.status, item.progress);
            if last.get(&item.id) != Some(&current) {
                eprintln!("{}", render_item(&item));
                last.insert(item.id, current);
            }
        }

        if changes.changed().await.is_err() {
            return;
        }
    }
}

/// File name for display, falling back to the full path.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
