#[cfg(feature = "transport-http")]
use crate::HttpTransport;
#[cfg(feature = "transport-local")]
use crate::LocalTransport;
use crate::{TransportBackend, TransportError, TransportResult, UploadTransport};
use outreach_core::Config;
use std::sync::Arc;

/// Create an upload transport based on configuration
pub async fn create_transport(config: &Config) -> TransportResult<Arc<dyn UploadTransport>> {
    match config.transport {
        #[cfg(feature = "transport-local")]
        TransportBackend::Local => {
            let transport = LocalTransport::new(
                config.local_storage_path.clone(),
                config.local_storage_base_url.clone(),
            )
            .await?
            .with_folder(config.upload_folder.clone());
            Ok(Arc::new(transport))
        }

        #[cfg(not(feature = "transport-local"))]
        TransportBackend::Local => Err(TransportError::Config(
            "Local transport not available (transport-local feature not enabled)".to_string(),
        )),

        #[cfg(feature = "transport-http")]
        TransportBackend::Http => {
            let upload_url = config.upload_url.clone().ok_or_else(|| {
                TransportError::Config("OUTREACH_UPLOAD_URL not configured".to_string())
            })?;

            let mut transport = HttpTransport::new(
                upload_url,
                std::time::Duration::from_secs(config.upload_timeout_secs),
            )?
            .with_folder(config.upload_folder.clone());

            if let Some(delete_url) = &config.delete_url {
                transport = transport.with_delete_url(delete_url.clone());
            }
            if let Some(preset) = &config.upload_preset {
                transport = transport.with_upload_preset(preset.clone());
            }

            Ok(Arc::new(transport))
        }

        #[cfg(not(feature = "transport-http"))]
        TransportBackend::Http => Err(TransportError::Config(
            "HTTP transport not available (transport-http feature not enabled)".to_string(),
        )),
    }
}
