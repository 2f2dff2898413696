use std::sync::atomic::{AtomicU64, Ordering};

/// Observable side channel: atomic counters for records moving through the
/// pipeline. Consumed by external monitoring, not required for correctness.
#[derive(Debug, Default)]
pub struct PipelineCounters {
    enqueued: AtomicU64,
    dropped_overflow: AtomicU64,
    dropped_failed: AtomicU64,
    dropped_shutdown: AtomicU64,
    exported: AtomicU64,
    export_retries: AtomicU64,
}

impl PipelineCounters {
    pub(crate) fn incr_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn incr_dropped_overflow(&self) {
        self.dropped_overflow.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_dropped_failed(&self, n: u64) {
        self.dropped_failed.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_dropped_shutdown(&self, n: u64) {
        self.dropped_shutdown.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_exported(&self, n: u64) {
        self.exported.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn incr_export_retries(&self) {
        self.export_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped_overflow: self.dropped_overflow.load(Ordering::Relaxed),
            dropped_failed: self.dropped_failed.load(Ordering::Relaxed),
            dropped_shutdown: self.dropped_shutdown.load(Ordering::Relaxed),
            exported: self.exported.load(Ordering::Relaxed),
            export_retries: self.export_retries.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`PipelineCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Records accepted into the queue.
    pub enqueued: u64,
    /// Records evicted under the drop-oldest overflow policy.
    pub dropped_overflow: u64,
    /// Records lost to permanent export failures or exhausted retries.
    pub dropped_failed: u64,
    /// Records abandoned because the shutdown deadline elapsed.
    pub dropped_shutdown: u64,
    /// Records successfully exported.
    pub exported: u64,
    /// Export attempts beyond the first, across all batches.
    pub export_retries: u64,
}

impl CounterSnapshot {
    /// Total records dropped on any path.
    pub fn dropped(&self) -> u64 {
        self.dropped_overflow + self.dropped_failed + self.dropped_shutdown
    }
}
