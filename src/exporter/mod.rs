mod console;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use crate::counters::PipelineCounters;
use crate::record::Batch;

pub use console::ConsoleExporter;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum ExportError {
    /// Transient transport or collector failure; retried with backoff.
    #[error("retryable export failure: {0}")]
    Retryable(#[source] BoxError),

    /// The collector rejected the batch outright (malformed, unauthorized);
    /// never retried.
    #[error("permanent export failure: {0}")]
    Permanent(#[source] BoxError),
}

impl ExportError {
    pub fn retryable(err: impl Into<BoxError>) -> Self {
        ExportError::Retryable(err.into())
    }

    pub fn permanent(err: impl Into<BoxError>) -> Self {
        ExportError::Permanent(err.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ExportError::Retryable(_))
    }
}

/// Capability that transmits a batch to a remote collector.
///
/// The pipeline is agnostic to the transport behind this: gRPC, HTTP, a
/// local writer. Implementations classify failures as retryable or
/// permanent; the pipeline owns retries, timeouts, and drop accounting.
pub trait Exporter: Send + Sync + 'static {
    fn export(&self, batch: &Batch) -> impl Future<Output = Result<(), ExportError>> + Send;
}

/// Exponential backoff between retryable export attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl RetryPolicy {
    /// Delay before the next attempt, given how many attempts have failed so
    /// far. Doubles per failure, capped at `backoff_max`.
    fn backoff_delay(&self, failed_attempts: u32) -> Duration {
        let doublings = failed_attempts.saturating_sub(1).min(31);
        self.backoff_base
            .saturating_mul(1u32 << doublings)
            .min(self.backoff_max)
    }
}

pub(crate) enum DispatchOutcome {
    Exported,
    /// Permanent failure or exhausted retries; records are gone.
    Dropped(ExportError),
    /// The shutdown deadline ran out before the batch could be exported.
    DeadlineExceeded,
}

/// Wraps the exporter capability with per-attempt timeouts, retry/backoff,
/// and drop accounting. One batch in flight at a time: the drain loop does
/// not dispatch the next batch before this one's outcome is known.
pub(crate) struct ExportDriver<E> {
    exporter: E,
    policy: RetryPolicy,
    attempt_timeout: Duration,
    counters: Arc<PipelineCounters>,
}

impl<E: Exporter> ExportDriver<E> {
    pub(crate) fn new(
        exporter: E,
        policy: RetryPolicy,
        attempt_timeout: Duration,
        counters: Arc<PipelineCounters>,
    ) -> Self {
        Self {
            exporter,
            policy,
            attempt_timeout,
            counters,
        }
    }

    /// Export `batch`, retrying transient failures until success, attempt
    /// exhaustion, or `deadline` (during shutdown drain).
    pub(crate) async fn dispatch(
        &self,
        batch: Batch,
        deadline: Option<Instant>,
    ) -> DispatchOutcome {
        let records = batch.len() as u64;
        let mut failed_attempts: u32 = 0;

        loop {
            let budget = match self.attempt_budget(deadline) {
                Some(budget) => budget,
                None => {
                    self.counters.add_dropped_shutdown(records);
                    warn!(records, "dropping batch: shutdown deadline reached");
                    return DispatchOutcome::DeadlineExceeded;
                }
            };

            let error = match time::timeout(budget, self.exporter.export(&batch)).await {
                Ok(Ok(())) => {
                    self.counters.add_exported(records);
                    debug!(records, "batch exported");
                    return DispatchOutcome::Exported;
                }
                Ok(Err(err)) => err,
                Err(_) => {
                    ExportError::retryable(format!("export attempt timed out after {budget:?}"))
                }
            };

            if !error.is_retryable() {
                self.counters.add_dropped_failed(records);
                warn!(records, error = %error, "dropping batch: permanent export failure");
                return DispatchOutcome::Dropped(error);
            }

            failed_attempts += 1;
            if failed_attempts >= self.policy.max_attempts {
                self.counters.add_dropped_failed(records);
                warn!(
                    records,
                    attempts = failed_attempts,
                    error = %error,
                    "dropping batch: retry attempts exhausted"
                );
                return DispatchOutcome::Dropped(error);
            }

            let delay = self.policy.backoff_delay(failed_attempts);
            if let Some(deadline) = deadline
                && Instant::now() + delay >= deadline
            {
                self.counters.add_dropped_shutdown(records);
                warn!(records, "dropping batch: backoff would exceed shutdown deadline");
                return DispatchOutcome::DeadlineExceeded;
            }
            self.counters.incr_export_retries();
            debug!(
                attempt = failed_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "export failed, backing off before retry"
            );
            time::sleep(delay).await;
        }
    }

    /// Time budget for the next attempt: the per-attempt timeout, clipped to
    /// whatever remains before `deadline`. `None` when the deadline has
    /// already passed.
    fn attempt_budget(&self, deadline: Option<Instant>) -> Option<Duration> {
        match deadline {
            None => Some(self.attempt_timeout),
            Some(deadline) => {
                let remaining = deadline.checked_duration_since(Instant::now())?;
                if remaining.is_zero() {
                    return None;
                }
                Some(self.attempt_timeout.min(remaining))
            }
        }
    }
}
