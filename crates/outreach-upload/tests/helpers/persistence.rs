//! Persistence boundary that records every payload.

use async_trait::async_trait;
use outreach_upload::{FieldError, PersistReceipt, PersistenceBoundary, PersistenceError};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;

pub struct RecordingPersistence {
    payloads: Mutex<Vec<Value>>,
    failing: AtomicBool,
    open: watch::Sender<bool>,
}

impl Default for RecordingPersistence {
    fn default() -> Self {
        let (open, _) = watch::channel(true);
        Self {
            payloads: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            open,
        }
    }
}

impl RecordingPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every save wait (after recording its payload) until `release()`.
    pub fn hold(&self) {
        self.open.send_replace(false);
    }

    pub fn release(&self) {
        self.open.send_replace(true);
    }

    /// Reject every call until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn payloads(&self) -> Vec<Value> {
        self.payloads.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.payloads.lock().unwrap().len()
    }
}

#[async_trait]
impl PersistenceBoundary for RecordingPersistence {
    async fn persist(&self, payload: Value) -> Result<PersistReceipt, PersistenceError> {
        let call = {
            let mut payloads = self.payloads.lock().unwrap();
            payloads.push(payload);
            payloads.len()
        };

        let mut open = self.open.subscribe();
        let _ = open.wait_for(|open| *open).await;

        if self.failing.load(Ordering::SeqCst) {
            return Err(
                PersistenceError::new("Validation failed").with_errors(vec![FieldError {
                    field: Some("title".to_string()),
                    message: "is required".to_string(),
                }]),
            );
        }

        Ok(PersistReceipt {
            id: Some(format!("entry-{}", call)),
        })
    }
}
