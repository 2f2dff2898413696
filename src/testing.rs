use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::exporter::{ExportError, Exporter};
use crate::record::{Batch, Record};

/// Records every batch it receives, in arrival order.
#[derive(Clone, Default)]
pub struct RecordingExporter {
    batches: Arc<Mutex<Vec<Vec<Record>>>>,
}

impl RecordingExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<Vec<Record>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().iter().map(Vec::len).collect()
    }

    pub fn record_count(&self) -> usize {
        self.batches.lock().unwrap().iter().map(Vec::len).sum()
    }

    pub fn messages(&self) -> Vec<String> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .map(|r| r.message.clone())
            .collect()
    }
}

impl Exporter for RecordingExporter {
    async fn export(&self, batch: &Batch) -> Result<(), ExportError> {
        self.batches.lock().unwrap().push(batch.records().to_vec());
        Ok(())
    }
}

/// Always fails with a retryable error.
#[derive(Clone, Default)]
pub struct RetryableFailExporter {
    pub attempts: Arc<AtomicU32>,
}

impl Exporter for RetryableFailExporter {
    async fn export(&self, _batch: &Batch) -> Result<(), ExportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ExportError::retryable("collector unavailable"))
    }
}

/// Always fails with a permanent error.
#[derive(Clone, Default)]
pub struct PermanentFailExporter {
    pub attempts: Arc<AtomicU32>,
}

impl Exporter for PermanentFailExporter {
    async fn export(&self, _batch: &Batch) -> Result<(), ExportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ExportError::permanent("collector rejected payload"))
    }
}

/// Fails with a retryable error a fixed number of times, then succeeds and
/// records like [`RecordingExporter`].
#[derive(Clone)]
pub struct FlakyExporter {
    failures_left: Arc<AtomicU32>,
    pub inner: RecordingExporter,
}

impl FlakyExporter {
    pub fn failing(times: u32) -> Self {
        Self {
            failures_left: Arc::new(AtomicU32::new(times)),
            inner: RecordingExporter::new(),
        }
    }
}

impl Exporter for FlakyExporter {
    async fn export(&self, batch: &Batch) -> Result<(), ExportError> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(ExportError::retryable("collector unavailable"));
        }
        self.inner.export(batch).await
    }
}

/// Sleeps for a fixed delay before delegating to a [`RecordingExporter`].
#[derive(Clone)]
pub struct SlowExporter {
    pub delay: Duration,
    pub inner: RecordingExporter,
}

impl SlowExporter {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            inner: RecordingExporter::new(),
        }
    }
}

impl Exporter for SlowExporter {
    async fn export(&self, batch: &Batch) -> Result<(), ExportError> {
        tokio::time::sleep(self.delay).await;
        self.inner.export(batch).await
    }
}
