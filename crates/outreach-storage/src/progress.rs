//! Progress callback handed to a transport for one transfer.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

type ProgressFn = dyn Fn(u8) + Send + Sync;

/// Monotonic percentage reporter.
///
/// Values are clamped to 100 and only forwarded when they exceed everything reported
/// before, so the callback sees a strictly increasing sequence whatever the transport
/// does.
#[derive(Clone)]
pub struct ProgressReporter {
    callback: Arc<ProgressFn>,
    last: Arc<AtomicU8>,
}

impl ProgressReporter {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
            last: Arc::new(AtomicU8::new(0)),
        }
    }

    /// Reporter that discards every update.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    pub fn report(&self, percent: u8) {
        let percent = percent.min(100);
        let previous = self.last.fetch_max(percent, Ordering::AcqRel);
        if percent > previous {
            (self.callback)(percent);
        }
    }

    /// Report `sent` out of `total` bytes, capped at 99 until the transfer is confirmed.
    pub fn report_bytes(&self, sent: u64, total: u64) {
        if total == 0 {
            return;
        }
        let percent = ((sent.min(total) * 100) / total).min(99) as u8;
        self.report(percent);
    }

    pub fn complete(&self) {
        self.report(100);
    }

    pub fn last(&self) -> u8 {
        self.last.load(Ordering::Acquire)
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("last", &self.last())
            .finish()
    }
}
