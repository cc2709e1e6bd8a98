//! Transport whose per-file behavior is scripted by the test.

use async_trait::async_trait;
use outreach_core::{MediaFile, RemoteResult};
use outreach_storage::{
    CancellationToken, ProgressReporter, TransportBackend, TransportError, TransportResult,
    UploadTransport,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;

/// What one `send` call for a file does. Unscripted sends succeed.
#[derive(Debug, Clone)]
pub enum Step {
    Succeed,
    Fail(&'static str),
    /// Wait for `release()`, aborting early when cancelled.
    Hold,
    /// Wait for `release()` and succeed even if cancelled meanwhile.
    HoldIgnoringCancel,
}

pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    sends: Mutex<Vec<String>>,
    deletes: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    open: watch::Sender<bool>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        let (open, _) = watch::channel(false);
        Self {
            scripts: Mutex::new(HashMap::new()),
            sends: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            open,
        }
    }

    pub fn script(&self, filename: &str, steps: Vec<Step>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(filename.to_string(), steps.into());
    }

    /// Let every held send (current and future) complete.
    pub fn release(&self) {
        self.open.send_replace(true);
    }

    pub fn sends(&self) -> Vec<String> {
        self.sends.lock().unwrap().clone()
    }

    pub fn send_count(&self, filename: &str) -> usize {
        self.sends().iter().filter(|name| *name == filename).count()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_step(&self, filename: &str) -> Step {
        self.scripts
            .lock()
            .unwrap()
            .get_mut(filename)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Step::Succeed)
    }

    async fn opened(&self) {
        let mut open = self.open.subscribe();
        let _ = open.wait_for(|open| *open).await;
    }

    async fn run(
        &self,
        file: &MediaFile,
        progress: &ProgressReporter,
        cancel: CancellationToken,
    ) -> TransportResult<RemoteResult> {
        progress.report(10);
        match self.next_step(file.filename()) {
            Step::Succeed => {}
            Step::Fail(message) => return Err(TransportError::Network(message.to_string())),
            Step::Hold => {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(TransportError::Aborted),
                    _ = self.opened() => {}
                }
            }
            Step::HoldIgnoringCancel => self.opened().await,
        }
        progress.report(60);
        progress.complete();

        Ok(public_result(file))
    }
}

pub fn public_id_for(filename: &str) -> String {
    format!("outreach/{}", filename)
}

fn public_result(file: &MediaFile) -> RemoteResult {
    RemoteResult {
        url: format!("https://cdn.example.org/{}", public_id_for(file.filename())),
        public_id: public_id_for(file.filename()),
        format: file.extension().unwrap_or_default(),
        bytes: file.size(),
        width: Some(1200),
        height: Some(800),
        resource_type: Some("image".to_string()),
    }
}

#[async_trait]
impl UploadTransport for ScriptedTransport {
    async fn send(
        &self,
        file: &MediaFile,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> TransportResult<RemoteResult> {
        self.sends.lock().unwrap().push(file.filename().to_string());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let result = self.run(file, &progress, cancel).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn delete(&self, public_id: &str) -> TransportResult<()> {
        self.deletes.lock().unwrap().push(public_id.to_string());
        Ok(())
    }

    fn backend_type(&self) -> TransportBackend {
        TransportBackend::Http
    }
}
