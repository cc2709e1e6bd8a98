//! Multipart upload to a remote object store over HTTP.
//!
//! The endpoint receives a `file` part plus optional `folder` and `upload_preset`
//! fields and answers with a JSON descriptor of the stored object.

use crate::keys::{resource_type_for, validate_public_id};
use crate::progress::ProgressReporter;
use crate::traits::{TransportError, TransportResult, UploadTransport};
use crate::TransportBackend;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use outreach_core::{MediaFile, RemoteResult};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Object store response to a successful upload.
#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    secure_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
    public_id: String,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    bytes: Option<u64>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    resource_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<ErrorDetail>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Message { message: String },
    Text(String),
}

/// HTTP object store transport.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    upload_url: String,
    delete_url: Option<String>,
    upload_preset: Option<String>,
    folder: Option<String>,
    chunk_size: usize,
}

impl HttpTransport {
    pub fn new(upload_url: String, timeout: Duration) -> TransportResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            upload_url,
            delete_url: None,
            upload_preset: None,
            folder: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    pub fn with_delete_url(mut self, delete_url: impl Into<String>) -> Self {
        self.delete_url = Some(delete_url.into());
        self
    }

    pub fn with_upload_preset(mut self, preset: impl Into<String>) -> Self {
        self.upload_preset = Some(preset.into());
        self
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn file_part(
        &self,
        file: &MediaFile,
        progress: &ProgressReporter,
    ) -> TransportResult<reqwest::multipart::Part> {
        let data = file.data().clone();
        let total = file.size();
        let chunks: Vec<Bytes> = (0..data.len())
            .step_by(self.chunk_size)
            .map(|start| data.slice(start..(start + self.chunk_size).min(data.len())))
            .collect();

        let reporter = progress.clone();
        let mut sent = 0u64;
        let body = stream::iter(chunks).map(move |chunk| {
            sent += chunk.len() as u64;
            reporter.report_bytes(sent, total);
            Ok::<Bytes, std::io::Error>(chunk)
        });

        reqwest::multipart::Part::stream_with_length(reqwest::Body::wrap_stream(body), total)
            .file_name(file.filename().to_string())
            .mime_str(file.content_type())
            .map_err(|e| TransportError::Config(format!("Invalid content type: {}", e)))
    }

    async fn upload(
        &self,
        file: &MediaFile,
        progress: &ProgressReporter,
    ) -> TransportResult<RemoteResult> {
        let mut form = reqwest::multipart::Form::new();
        if let Some(folder) = &self.folder {
            form = form.text("folder", folder.clone());
        }
        if let Some(preset) = &self.upload_preset {
            form = form.text("upload_preset", preset.clone());
        }
        form = form.part("file", self.file_part(file, progress)?);

        let response = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(rejection(status, &body));
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;

        let url = body.secure_url.or(body.url).ok_or_else(|| {
            TransportError::InvalidResponse("response carries no object url".to_string())
        })?;

        Ok(RemoteResult {
            url,
            format: body
                .format
                .or_else(|| file.extension())
                .unwrap_or_else(|| "bin".to_string()),
            bytes: body.bytes.unwrap_or_else(|| file.size()),
            width: body.width,
            height: body.height,
            resource_type: body
                .resource_type
                .or_else(|| Some(resource_type_for(file.content_type()).to_string())),
            public_id: body.public_id,
        })
    }
}

fn network_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Network(format!("request timed out: {}", e))
    } else {
        TransportError::Network(e.to_string())
    }
}

fn rejection(status: StatusCode, body: &str) -> TransportError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| match b.error {
            Some(ErrorDetail::Message { message }) | Some(ErrorDetail::Text(message)) => {
                Some(message)
            }
            None => b.message,
        })
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                body.trim().to_string()
            }
        });

    TransportError::Rejected {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl UploadTransport for HttpTransport {
    async fn send(
        &self,
        file: &MediaFile,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> TransportResult<RemoteResult> {
        let start = std::time::Instant::now();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Aborted),
            result = self.upload(file, &progress) => result,
        };

        match &result {
            Ok(remote) => {
                progress.complete();
                tracing::info!(
                    public_id = %remote.public_id,
                    filename = %file.filename(),
                    size_bytes = file.size(),
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "HTTP upload successful"
                );
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    filename = %file.filename(),
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "HTTP upload failed"
                );
            }
        }

        result
    }

    async fn delete(&self, public_id: &str) -> TransportResult<()> {
        validate_public_id(public_id)?;
        let delete_url = self.delete_url.as_deref().ok_or_else(|| {
            TransportError::Config("delete endpoint not configured".to_string())
        })?;

        let response = self
            .client
            .post(delete_url)
            .json(&serde_json::json!({ "public_id": public_id }))
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!(public_id = %public_id, "Remote object already gone");
            return Ok(());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(rejection(status, &body));
        }

        tracing::info!(public_id = %public_id, "HTTP delete successful");
        Ok(())
    }

    fn backend_type(&self) -> TransportBackend {
        TransportBackend::Http
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn transport(server: &mockito::ServerGuard) -> HttpTransport {
        HttpTransport::new(format!("{}/upload", server.url()), Duration::from_secs(5))
            .unwrap()
            .with_delete_url(format!("{}/delete", server.url()))
            .with_folder("gallery")
            .with_chunk_size(4)
    }

    #[tokio::test]
    async fn test_http_send_parses_descriptor() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/upload")
            .match_header(
                "content-type",
                Matcher::Regex("multipart/form-data".to_string()),
            )
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"secure_url":"https://cdn.example.org/gallery/abc.jpg","public_id":"gallery/abc","format":"jpg","bytes":12,"width":640,"height":480,"resource_type":"image"}"#,
            )
            .create_async()
            .await;

        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress = ProgressReporter::new(move |p| sink.lock().unwrap().push(p));

        let file = MediaFile::new("photo.jpg", "image/jpeg", vec![9u8; 12]);
        let result = transport(&server)
            .send(&file, progress, CancellationToken::new())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.url, "https://cdn.example.org/gallery/abc.jpg");
        assert_eq!(result.public_id, "gallery/abc");
        assert_eq!(result.width, Some(640));
        assert_eq!(seen.lock().unwrap().last(), Some(&100));
    }

    #[tokio::test]
    async fn test_http_send_maps_rejection() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/upload")
            .with_status(400)
            .with_body(r#"{"error":{"message":"File size too large"}}"#)
            .create_async()
            .await;

        let file = MediaFile::new("photo.jpg", "image/jpeg", vec![9u8; 12]);
        let err = transport(&server)
            .send(&file, ProgressReporter::noop(), CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            TransportError::Rejected { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "File size too large");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_http_send_missing_url_is_invalid_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/upload")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"public_id":"gallery/abc"}"#)
            .create_async()
            .await;

        let file = MediaFile::new("photo.jpg", "image/jpeg", vec![9u8; 12]);
        let err = transport(&server)
            .send(&file, ProgressReporter::noop(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_http_send_cancelled() {
        let server = mockito::Server::new_async().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let file = MediaFile::new("photo.jpg", "image/jpeg", vec![9u8; 12]);
        let err = transport(&server)
            .send(&file, ProgressReporter::noop(), cancel)
            .await
            .unwrap_err();
        assert!(err.is_abort());
    }

    #[tokio::test]
    async fn test_http_delete_posts_public_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/delete")
            .match_body(Matcher::PartialJson(
                serde_json::json!({ "public_id": "gallery/abc" }),
            ))
            .with_status(200)
            .create_async()
            .await;

        transport(&server).delete("gallery/abc").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_delete_without_endpoint() {
        let server = mockito::Server::new_async().await;
        let transport =
            HttpTransport::new(format!("{}/upload", server.url()), Duration::from_secs(5))
                .unwrap();
        let err = transport.delete("gallery/abc").await.unwrap_err();
        assert!(matches!(err, TransportError::Config(_)));
    }
}
