//! Configuration module
//!
//! Environment-driven settings for the upload transport, the upload policy and the
//! persistence endpoint.

use std::env;
use std::path::PathBuf;

use crate::constants::{
    BYTES_PER_MB, DEFAULT_LOCAL_STORAGE_BASE_URL, DEFAULT_LOCAL_STORAGE_PATH,
    DEFAULT_MAX_FILE_SIZE_MB, DEFAULT_UPLOAD_FOLDER, DEFAULT_UPLOAD_TIMEOUT_SECS,
};
use crate::transport_types::TransportBackend;
use crate::validation::UploadPolicy;

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub transport: TransportBackend,
    // Local transport
    pub local_storage_path: PathBuf,
    pub local_storage_base_url: String,
    // HTTP transport
    pub upload_url: Option<String>,
    pub delete_url: Option<String>,
    pub upload_preset: Option<String>,
    pub upload_folder: String,
    pub upload_timeout_secs: u64,
    // Queue
    pub max_file_size_bytes: u64,
    pub max_concurrent_uploads: Option<usize>,
    // Persistence
    pub persist_url: Option<String>,
    pub persist_token: Option<String>,
}

impl Config {
    /// Load configuration from the process environment (and `.env` if present).
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let transport = match non_empty("OUTREACH_TRANSPORT") {
            Some(value) => value.parse()?,
            None => TransportBackend::Local,
        };

        let upload_timeout_secs = match non_empty("OUTREACH_UPLOAD_TIMEOUT_SECS") {
            Some(value) => value.trim().parse().map_err(|_| {
                anyhow::anyhow!("OUTREACH_UPLOAD_TIMEOUT_SECS must be a valid number")
            })?,
            None => DEFAULT_UPLOAD_TIMEOUT_SECS,
        };

        let max_file_size_mb = match non_empty("OUTREACH_MAX_FILE_SIZE_MB") {
            Some(value) => value.trim().parse::<u64>().map_err(|_| {
                anyhow::anyhow!("OUTREACH_MAX_FILE_SIZE_MB must be a valid number")
            })?,
            None => DEFAULT_MAX_FILE_SIZE_MB,
        };

        let max_file_size_bytes = max_file_size_mb
            .checked_mul(BYTES_PER_MB)
            .ok_or_else(|| {
                anyhow::anyhow!("OUTREACH_MAX_FILE_SIZE_MB must be a valid number")
            })?;

        let max_concurrent_uploads = match non_empty("OUTREACH_MAX_CONCURRENT_UPLOADS") {
            Some(value) => Some(value.trim().parse::<usize>().map_err(|_| {
                anyhow::anyhow!("OUTREACH_MAX_CONCURRENT_UPLOADS must be a valid number")
            })?),
            None => None,
        };

        let config = Self {
            transport,
            local_storage_path: non_empty("OUTREACH_LOCAL_STORAGE_PATH")
                .unwrap_or_else(|| DEFAULT_LOCAL_STORAGE_PATH.to_string())
                .into(),
            local_storage_base_url: non_empty("OUTREACH_LOCAL_STORAGE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_LOCAL_STORAGE_BASE_URL.to_string()),
            upload_url: non_empty("OUTREACH_UPLOAD_URL"),
            delete_url: non_empty("OUTREACH_DELETE_URL"),
            upload_preset: non_empty("OUTREACH_UPLOAD_PRESET"),
            upload_folder: non_empty("OUTREACH_UPLOAD_FOLDER")
                .unwrap_or_else(|| DEFAULT_UPLOAD_FOLDER.to_string()),
            upload_timeout_secs,
            max_file_size_bytes,
            max_concurrent_uploads,
            persist_url: non_empty("OUTREACH_PERSIST_URL"),
            persist_token: non_empty("OUTREACH_PERSIST_TOKEN"),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.max_file_size_bytes == 0 {
            return Err(anyhow::anyhow!(
                "OUTREACH_MAX_FILE_SIZE_MB must be greater than zero"
            ));
        }

        if self.max_concurrent_uploads == Some(0) {
            return Err(anyhow::anyhow!(
                "OUTREACH_MAX_CONCURRENT_UPLOADS must be greater than zero when set"
            ));
        }

        match self.transport {
            TransportBackend::Http => {
                if self.upload_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "OUTREACH_UPLOAD_URL must be set when using the http transport"
                    ));
                }
            }
            TransportBackend::Local => {
                if self.local_storage_base_url.trim().is_empty() {
                    return Err(anyhow::anyhow!(
                        "OUTREACH_LOCAL_STORAGE_BASE_URL must not be empty"
                    ));
                }
            }
        }

        Ok(())
    }

    /// Gallery policy with the configured size limit.
    pub fn gallery_policy(&self) -> UploadPolicy {
        UploadPolicy::gallery().with_max_file_size(self.max_file_size_bytes)
    }

    /// Attachment policy with the configured size limit.
    pub fn attachment_policy(&self) -> UploadPolicy {
        UploadPolicy::attachments().with_max_file_size(self.max_file_size_bytes)
    }
}
