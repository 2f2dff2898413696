use std::collections::VecDeque;
use std::pin::pin;
use std::sync::Mutex;

use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::{self, Instant};

use crate::config::OverflowPolicy;
use crate::record::Record;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    /// The queue is at capacity and the blocking wait (if any) timed out.
    #[error("queue is full")]
    QueueFull,

    /// The queue was closed by shutdown; the producer must stop.
    #[error("queue is closed")]
    QueueClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EnqueueOutcome {
    Accepted,
    /// Accepted after evicting the oldest queued record (drop-oldest policy).
    AcceptedEvictedOldest,
}

enum Rejected {
    Closed,
    /// Gives the record back so a blocked producer can retry with it.
    Full(Record),
}

struct QueueState {
    items: VecDeque<Record>,
    closed: bool,
}

/// Fixed-capacity FIFO shared by any number of producers and the single
/// drain-loop consumer.
///
/// Uses `std::sync::Mutex` (not tokio) because the lock is never held across
/// `.await`; waiting happens on the `Notify` pair outside the lock.
pub(crate) struct BoundedQueue {
    state: Mutex<QueueState>,
    capacity: usize,
    policy: OverflowPolicy,
    items_available: Notify,
    space_available: Notify,
}

impl BoundedQueue {
    pub(crate) fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            policy,
            items_available: Notify::new(),
            space_available: Notify::new(),
        }
    }

    fn push(&self, record: Record) -> Result<EnqueueOutcome, Rejected> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(Rejected::Closed);
        }
        if state.items.len() < self.capacity {
            state.items.push_back(record);
            self.items_available.notify_one();
            return Ok(EnqueueOutcome::Accepted);
        }
        match self.policy {
            OverflowPolicy::DropOldest => {
                state.items.pop_front();
                state.items.push_back(record);
                self.items_available.notify_one();
                Ok(EnqueueOutcome::AcceptedEvictedOldest)
            }
            OverflowPolicy::Block { .. } => Err(Rejected::Full(record)),
        }
    }

    /// Non-suspending enqueue. Under the blocking policy a full queue fails
    /// immediately with `QueueFull` instead of waiting.
    pub(crate) fn try_enqueue(&self, record: Record) -> Result<EnqueueOutcome, EnqueueError> {
        match self.push(record) {
            Ok(outcome) => Ok(outcome),
            Err(Rejected::Closed) => Err(EnqueueError::QueueClosed),
            Err(Rejected::Full(_)) => Err(EnqueueError::QueueFull),
        }
    }

    /// Enqueue honoring the overflow policy: drop-oldest admits immediately,
    /// blocking waits for space up to the policy's timeout.
    pub(crate) async fn enqueue(&self, record: Record) -> Result<EnqueueOutcome, EnqueueError> {
        let deadline = match self.policy {
            OverflowPolicy::Block {
                timeout: Some(wait),
            } => Some(Instant::now() + wait),
            _ => None,
        };

        let mut record = record;
        let mut space = pin!(self.space_available.notified());
        loop {
            // Register the waiter before re-checking, so a dequeue landing
            // between the failed push and the await cannot be missed.
            space.as_mut().enable();
            record = match self.push(record) {
                Ok(outcome) => return Ok(outcome),
                Err(Rejected::Closed) => return Err(EnqueueError::QueueClosed),
                Err(Rejected::Full(r)) => r,
            };
            match deadline {
                Some(deadline) => {
                    if time::timeout_at(deadline, space.as_mut()).await.is_err() {
                        return Err(EnqueueError::QueueFull);
                    }
                }
                None => space.as_mut().await,
            }
            space.set(self.space_available.notified());
        }
    }

    /// Move up to `max` records into `out`, preserving FIFO order.
    /// Returns the number moved.
    pub(crate) fn dequeue_up_to(&self, max: usize, out: &mut Vec<Record>) -> usize {
        let mut state = self.state.lock().unwrap();
        let n = max.min(state.items.len());
        out.extend(state.items.drain(..n));
        if n > 0 {
            self.space_available.notify_waiters();
        }
        n
    }

    /// Suspend until at least one record has been enqueued since the last
    /// dequeue. Single-consumer only.
    pub(crate) async fn items_available(&self) {
        self.items_available.notified().await;
    }

    /// Reject all subsequent enqueues with `QueueClosed`. Already-queued
    /// records remain drainable.
    pub(crate) fn close(&self) {
        self.state.lock().unwrap().closed = true;
        // Wake blocked producers so they observe the closure, and the
        // consumer so it can re-check state.
        self.space_available.notify_waiters();
        self.items_available.notify_one();
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }
}
