use std::mem;
use std::time::Duration;

use tokio::time::Instant;

use crate::record::{Batch, Record};

/// Accumulates dequeued records into the next batch.
///
/// Flush triggers, first to occur wins: the batch reaches `max_batch_size`,
/// or `max_delay` elapses since its first record was added. Owned exclusively
/// by the drain loop, so no interior locking.
pub(crate) struct Batcher {
    max_batch_size: usize,
    max_delay: Duration,
    pending: Vec<Record>,
    first_added_at: Option<Instant>,
}

impl Batcher {
    pub(crate) fn new(max_batch_size: usize, max_delay: Duration) -> Self {
        Self {
            max_batch_size,
            max_delay,
            pending: Vec::with_capacity(max_batch_size),
            first_added_at: None,
        }
    }

    pub(crate) fn add(&mut self, record: Record) {
        if self.pending.is_empty() {
            self.first_added_at = Some(Instant::now());
        }
        self.pending.push(record);
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.pending.len() >= self.max_batch_size
    }

    /// Room left before the size trigger fires.
    pub(crate) fn remaining_capacity(&self) -> usize {
        self.max_batch_size.saturating_sub(self.pending.len())
    }

    /// When the delay trigger will fire, or `None` while nothing is pending.
    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.first_added_at.map(|t| t + self.max_delay)
    }

    pub(crate) fn should_flush(&self) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        self.is_full() || self.deadline().is_some_and(|d| Instant::now() >= d)
    }

    /// Take the accumulated records as an ordered batch and reset for the
    /// next one. `None` when nothing is pending, since an empty batch is
    /// never flushed.
    pub(crate) fn take_batch(&mut self) -> Option<Batch> {
        if self.pending.is_empty() {
            return None;
        }
        self.first_added_at = None;
        Some(Batch::new(mem::take(&mut self.pending)))
    }
}
