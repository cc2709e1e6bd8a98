//! Persistence boundary: where a finished submission is saved.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One structured validation message returned by the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

/// The persistence layer refused or failed to save a submission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct PersistenceError {
    pub message: String,
    pub errors: Vec<FieldError>,
}

impl PersistenceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn with_errors(mut self, errors: Vec<FieldError>) -> Self {
        self.errors = errors;
        self
    }
}

/// Acknowledgement of a saved submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistReceipt {
    /// Identifier of the stored record, when the persistence layer returns one.
    pub id: Option<String>,
}

/// Saves one JSON payload `{ ...metadata, media: [...] }`.
#[async_trait]
pub trait PersistenceBoundary: Send + Sync {
    async fn persist(&self, payload: serde_json::Value)
        -> Result<PersistReceipt, PersistenceError>;
}

#[cfg(feature = "persistence-http")]
mod http {
    use super::*;
    use reqwest::Client;
    use std::time::Duration;

    #[derive(Debug, Deserialize)]
    struct ErrorResponse {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        errors: Vec<FieldError>,
    }

    /// Posts submissions as JSON to an HTTP endpoint.
    #[derive(Clone, Debug)]
    pub struct HttpPersistence {
        client: Client,
        url: String,
        token: Option<String>,
    }

    impl HttpPersistence {
        pub fn new(url: String, token: Option<String>) -> Result<Self, PersistenceError> {
            let client = Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .map_err(|e| {
                    PersistenceError::new(format!("Failed to build HTTP client: {}", e))
                })?;

            Ok(Self { client, url, token })
        }
    }

    #[async_trait]
    impl PersistenceBoundary for HttpPersistence {
        async fn persist(
            &self,
            payload: serde_json::Value,
        ) -> Result<PersistReceipt, PersistenceError> {
            let mut request = self.client.post(&self.url).json(&payload);
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| PersistenceError::new(format!("Network error: {}", e)))?;

            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if !status.is_success() {
                let parsed = serde_json::from_str::<ErrorResponse>(&body).ok();
                let (message, errors) = match parsed {
                    Some(parsed) => (
                        parsed
                            .message
                            .or(parsed.error)
                            .unwrap_or_else(|| format!("Save failed with status {}", status)),
                        parsed.errors,
                    ),
                    None => (format!("Save failed with status {}", status), Vec::new()),
                };
                return Err(PersistenceError::new(message).with_errors(errors));
            }

            let id = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|value| match value.get("id") {
                    Some(serde_json::Value::String(id)) => Some(id.clone()),
                    Some(serde_json::Value::Number(id)) => Some(id.to_string()),
                    _ => None,
                });

            Ok(PersistReceipt { id })
        }
    }

}

#[cfg(feature = "persistence-http")]
pub use http::HttpPersistence;
